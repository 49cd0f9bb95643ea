//! Domain models: runs, test programs, results, input and configuration.

pub mod config;
pub mod input;
pub mod platform;
pub mod program;
pub mod results;
pub mod run;

pub use config::{Config, EngineConfig, LoggingConfig, PlatformConfig};
pub use input::{HostEnv, RelaunchPlan, Signal, TestRunInput};
pub use platform::{
    ActorInfo, ActorRun, BuildInfo, ItemsPage, KeyValueRecord, ListItemsOptions, RunStatus,
    TaggedBuild, TaskInfo, WebhookSpec,
};
pub use program::{Assertion, CheckOp, ExpectationDef, SpecDef, StepDef, SuiteDef, TestProgram};
pub use results::{
    ExpectationResult, FailedExpectation, FailureSummary, ResultTree, SpecResult, SpecStatus,
    SuiteResult,
};
pub use run::{Fingerprint, RunData, RunOptions, RunRecord, RunRequest, RunResult, RunTarget};
