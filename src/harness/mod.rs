//! Declarative test harness: program loading, spec execution and result
//! collection.

pub mod assertions;
pub mod collector;
pub mod loader;
pub mod runner;

pub use assertions::AssertionVerifier;
pub use collector::{ResultCollector, SpecOutcome};
pub use loader::DeclarativeLoader;
pub use runner::{spec_filter, SpecRunner};
