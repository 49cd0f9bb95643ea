//! Port trait definitions (Hexagonal Architecture)
//!
//! Adapters implement these to plug the engine into the outside world:
//! - Platform: remote job invocation, polling and artifact reads
//! - StateStore: persisted named records (`CALLS`, `OUTPUT`)
//! - RunInvoker: invoke-and-wait entry point
//! - Notifier: chat/email delivery
//! - Relauncher: process relaunch for the retry pass
//! - TestProgramLoader: test source text to runnable program

pub mod invoker;
pub mod notifier;
pub mod platform;
pub mod program_loader;
pub mod relauncher;
pub mod state_store;

pub use invoker::RunInvoker;
pub use notifier::{Notification, Notifier};
pub use platform::Platform;
pub use program_loader::{ProgramContext, TestProgramLoader};
pub use relauncher::Relauncher;
pub use state_store::StateStore;
