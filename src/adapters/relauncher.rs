//! Relaunch by replacing the current process image.

use std::ffi::CString;
use std::path::PathBuf;

use async_trait::async_trait;
use nix::unistd::execv;
use tracing::info;

use crate::domain::errors::{EngineError, EngineResult};
use crate::domain::models::RelaunchPlan;
use crate::domain::ports::Relauncher;

/// Environment variable carrying the JSON encoded [`RelaunchPlan`].
pub const RELAUNCH_ENV: &str = "RUNCHECK_RELAUNCH";

/// Re-executes the running binary with its original arguments. The plan is
/// handed over through [`RELAUNCH_ENV`] and merged over the test input by
/// the next process.
#[derive(Debug, Clone)]
pub struct ProcessRelauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessRelauncher {
    /// Relauncher that runs `program` with `args`.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Relauncher for the current process.
    pub fn current() -> EngineResult<Self> {
        let program = std::env::current_exe()?;
        Ok(Self::new(program, std::env::args().collect()))
    }

    fn c_string(value: &str) -> EngineResult<CString> {
        CString::new(value)
            .map_err(|e| EngineError::Config(format!("argument contains a NUL byte: {e}")))
    }
}

#[async_trait]
impl Relauncher for ProcessRelauncher {
    async fn relaunch(&self, plan: &RelaunchPlan) -> EngineResult<()> {
        let encoded = serde_json::to_string(plan)?;
        let program = Self::c_string(&self.program.to_string_lossy())?;
        let argv = self
            .args
            .iter()
            .map(|arg| Self::c_string(arg))
            .collect::<EngineResult<Vec<_>>>()?;

        info!(
            epoch = plan.retry_epoch,
            specs = plan.filter.len(),
            "relaunching narrowed to failing specs"
        );
        std::env::set_var(RELAUNCH_ENV, encoded);

        match execv(&program, &argv) {
            Ok(never) => match never {},
            Err(errno) => Err(EngineError::Config(format!("relaunch failed: {errno}"))),
        }
    }
}
