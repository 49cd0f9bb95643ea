//! Application layer: a full test pass and the out-of-band signal paths.

pub mod session;
pub mod signals;

pub use session::{SessionDeps, SessionOutcome, TestSession, DEFAULT_TEST_NAME, OUTPUT_KEY};
pub use signals::{
    abort_recorded_runs, checkpoint_on_shutdown, notify_timeout, register_signal_webhooks,
    signal_webhooks, ShutdownSignal,
};
