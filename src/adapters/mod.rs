//! Adapters for external systems.

pub mod apify;
pub mod mock;
pub mod notifier;
pub mod relauncher;
pub mod storage;

pub use apify::{ApifyClientConfig, ApifyPlatform};
pub use notifier::{NotifyTargets, PlatformNotifier};
pub use relauncher::{ProcessRelauncher, RELAUNCH_ENV};
pub use storage::{FileStore, PlatformStore};
