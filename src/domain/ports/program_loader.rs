//! Test program loader port.

use serde_json::Value;

use crate::domain::errors::EngineResult;
use crate::domain::models::TestProgram;

/// Context handed to a loader alongside the program source.
#[derive(Debug, Clone)]
pub struct ProgramContext {
    /// Name of the test run
    pub test_name: String,
    /// `customData` of the input, substituted into `${customData.*}`
    pub custom_data: Value,
    /// Matcher names registered for this session
    pub matchers: Vec<&'static str>,
}

/// Turns user supplied test source text into a program the harness can run.
pub trait TestProgramLoader: Send + Sync {
    /// Parse and validate `source`.
    fn load(&self, source: &str, context: &ProgramContext) -> EngineResult<TestProgram>;
}
