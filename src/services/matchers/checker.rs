//! Matchers that verify a run by starting an auxiliary checker run against
//! its storages.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{Matcher, MatcherInput, Verdict};
use crate::domain::errors::EngineResult;
use crate::domain::models::{RunOptions, RunRequest, RunResult, RunStatus};

/// Outcome of an auxiliary run that reached the verification step.
enum AuxiliaryRun {
    Succeeded { result: RunResult, output: Value },
    Failed(String),
}

fn task_reference(options: &Value) -> Option<String> {
    options
        .get("taskId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Invoke the auxiliary run through the orchestrator, then read its status
/// and `OUTPUT`.
async fn run_auxiliary(
    input: &MatcherInput<'_>,
    request: RunRequest,
) -> EngineResult<AuxiliaryRun> {
    let result = input.ctx.invoker.invoke(request).await?;
    let run = input.ctx.platform.get_run(result.run_id()).await?;
    debug!(run_id = result.run_id(), status = %run.status, "auxiliary run finished");

    if run.status != RunStatus::Succeeded {
        return Ok(AuxiliaryRun::Failed(result.run_id().to_string()));
    }

    let output = input
        .ctx
        .platform
        .get_record(&result.data().default_key_value_store_id, "OUTPUT")
        .await?
        .map(|record| record.value)
        .filter(|value| !value.is_null())
        .unwrap_or_else(|| json!({}));

    Ok(AuxiliaryRun::Succeeded { result, output })
}

fn run_options(input: &MatcherInput<'_>, options: Value) -> Result<RunOptions, Verdict> {
    serde_json::from_value(options)
        .map_err(|e| Verdict::fail(input.format(&format!("Invalid run options: {e}"))))
}

/// Runs the results checker (or a checker task) over the run's dataset, or
/// over its key-value store when `recordKey` is given.
pub struct WithChecker;

#[async_trait]
impl Matcher for WithChecker {
    fn name(&self) -> &'static str {
        "withChecker"
    }

    async fn compare(&self, mut input: MatcherInput<'_>) -> EngineResult<Verdict> {
        let checker_args = input.next_options();
        let options = input.next_options();
        let task_id = task_reference(&checker_args);

        let has_checker = checker_args
            .get("functionalChecker")
            .is_some_and(|f| !f.is_null());
        if task_id.is_none() && !has_checker {
            return Ok(Verdict::fail(input.format(
                "You must provide \"functionalChecker\" input to withChecker as a second parameter",
            )));
        }
        let options = match run_options(&input, options) {
            Ok(options) => options,
            Err(verdict) => return Ok(verdict),
        };

        input.ctx.settlement.settle().await;

        let data = input.result.data();
        let storage_id = if checker_args.get("recordKey").is_some_and(|k| !k.is_null()) {
            data.default_key_value_store_id.clone()
        } else {
            data.default_dataset_id.clone()
        };

        let mut checker_input = Map::new();
        checker_input.insert("apifyStorageId".to_string(), json!(storage_id));
        if let Value::Object(args) = &checker_args {
            checker_input.extend(args.clone());
        }

        let request = match task_id {
            Some(task_id) => RunRequest::task(task_id),
            None => RunRequest::actor(input.ctx.config.checker_actor_id.clone()),
        }
        .with_input(Value::Object(checker_input))
        .with_options(options);

        match run_auxiliary(&input, request).await? {
            AuxiliaryRun::Failed(run_id) => Ok(Verdict::fail(input.format(&format!(
                "Checker run {run_id} failed. Check the log for more information"
            )))),
            AuxiliaryRun::Succeeded { result, output } => {
                let subject = json!({ "runResult": serde_json::to_value(&result)?, "output": output });
                Ok(input.check(subject).await)
            }
        }
    }
}

/// Runs the duplications checker over the run's dataset. Requires a
/// `fields` array.
pub struct WithDuplicates;

#[async_trait]
impl Matcher for WithDuplicates {
    fn name(&self) -> &'static str {
        "withDuplicates"
    }

    async fn compare(&self, mut input: MatcherInput<'_>) -> EngineResult<Verdict> {
        let checker_args = input.next_options();
        let options = input.next_options();

        if !checker_args.get("fields").is_some_and(Value::is_array) {
            return Ok(Verdict::fail(input.format(
                "You need to provide a \"fields\" parameter as an array of strings on withDuplicates",
            )));
        }
        let options = match run_options(&input, options) {
            Ok(options) => options,
            Err(verdict) => return Ok(verdict),
        };

        input.ctx.settlement.settle().await;

        let mut checker_input = Map::new();
        checker_input.insert(
            "datasetId".to_string(),
            json!(input.result.data().default_dataset_id),
        );
        checker_input.insert("showItems".to_string(), json!(false));
        if let Value::Object(args) = &checker_args {
            checker_input.extend(args.clone());
        }

        let request = match task_reference(&checker_args) {
            Some(task_id) => RunRequest::task(task_id),
            None => RunRequest::actor(input.ctx.config.duplicates_actor_id.clone()),
        }
        .with_input(Value::Object(checker_input))
        .with_options(options);

        match run_auxiliary(&input, request).await? {
            AuxiliaryRun::Failed(run_id) => Ok(Verdict::fail(input.format(&format!(
                "Duplicates run {run_id} failed. Check the actor log for more information."
            )))),
            AuxiliaryRun::Succeeded { result, output } => {
                let subject = json!({ "runResult": serde_json::to_value(&result)?, "output": output });
                Ok(input.check(subject).await)
            }
        }
    }
}
