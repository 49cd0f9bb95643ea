//! State store adapters.
//!
//! - `PlatformStore`: a key-value store on the remote platform
//! - `FileStore`: JSON files in the local storage directory

pub mod file_store;
pub mod platform_store;

pub use file_store::FileStore;
pub use platform_store::PlatformStore;
