//! Matchers over the live run: status, log and run metadata.

use async_trait::async_trait;
use serde_json::Value;

use super::{Expected, Matcher, MatcherInput, Verdict};
use crate::domain::errors::EngineResult;

/// Re-fetches the run and compares its status.
pub struct ToHaveStatus;

#[async_trait]
impl Matcher for ToHaveStatus {
    fn name(&self) -> &'static str {
        "toHaveStatus"
    }

    async fn compare(&self, input: MatcherInput<'_>) -> EngineResult<Verdict> {
        let run = input.ctx.platform.get_run(input.result.run_id()).await?;

        let expected = match &input.expected {
            Expected::Value(Value::String(status)) => status.clone(),
            Expected::Value(other) => other.to_string(),
            Expected::Callback(_) => {
                return Ok(Verdict::fail(
                    input.format("toHaveStatus expects a status name, not a callback"),
                ))
            }
        };

        let message = input.format(&format!(
            "Expected status to be \"{expected}\", got \"{}\"",
            run.status
        ));
        Ok(Verdict {
            pass: run.status.as_str() == expected,
            message: Some(message),
        })
    }
}

/// Hands the run log text to the callback.
pub struct WithLog;

#[async_trait]
impl Matcher for WithLog {
    fn name(&self) -> &'static str {
        "withLog"
    }

    async fn compare(&self, input: MatcherInput<'_>) -> EngineResult<Verdict> {
        let log = input.ctx.platform.get_log(input.result.run_id()).await?;
        Ok(input.check(Value::String(log)).await)
    }
}

/// Hands the live run metadata to the callback.
pub struct WithRunInfo;

#[async_trait]
impl Matcher for WithRunInfo {
    fn name(&self) -> &'static str {
        "withRunInfo"
    }

    async fn compare(&self, input: MatcherInput<'_>) -> EngineResult<Verdict> {
        let info = input
            .ctx
            .platform
            .get_run_info(input.result.run_id())
            .await?;
        Ok(input.check(info).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RunStatus;
    use crate::services::matchers::test_support::{Fixture, Recording};
    use serde_json::json;

    #[tokio::test]
    async fn test_status_matches_live_status() {
        let fixture = Fixture::new().await;
        let result = fixture.run("X").await;

        let verdict = ToHaveStatus
            .compare(fixture.input(&result, Expected::Value(json!("SUCCEEDED")), vec![]))
            .await
            .unwrap();
        assert!(verdict.pass);
    }

    #[tokio::test]
    async fn test_status_mismatch_message() {
        let fixture = Fixture::new().await;
        fixture.platform.set_status_sequence(vec![RunStatus::Failed]);
        let result = fixture.run("X").await;

        let verdict = ToHaveStatus
            .compare(fixture.input(&result, Expected::Value(json!("SUCCEEDED")), vec![]))
            .await
            .unwrap();
        assert!(!verdict.pass);
        assert!(verdict
            .message
            .unwrap()
            .contains("Expected status to be \"SUCCEEDED\", got \"FAILED\""));
    }

    #[tokio::test]
    async fn test_log_reaches_callback() {
        let fixture = Fixture::new().await;
        fixture.platform.seed_log("X", "INFO crawler finished");
        let result = fixture.run("X").await;
        let verifier = Recording::ok();

        let verdict = WithLog
            .compare(fixture.input(&result, Expected::Callback(verifier.clone()), vec![]))
            .await
            .unwrap();
        assert!(verdict.pass);
        assert_eq!(verifier.seen(), Some(json!("INFO crawler finished")));
    }

    #[tokio::test]
    async fn test_run_info_reaches_callback() {
        let fixture = Fixture::new().await;
        let result = fixture.run("X").await;
        let verifier = Recording::ok();

        WithRunInfo
            .compare(fixture.input(&result, Expected::Callback(verifier.clone()), vec![]))
            .await
            .unwrap();
        let seen = verifier.seen().unwrap();
        assert_eq!(seen["id"], json!(result.run_id()));
        assert_eq!(seen["status"], json!("SUCCEEDED"));
    }
}
