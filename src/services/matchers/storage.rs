//! Matchers over the run's default storages.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Matcher, MatcherInput, Verdict};
use crate::domain::errors::EngineResult;
use crate::domain::models::{ItemsPage, KeyValueRecord, ListItemsOptions};

const OUTPUT_KEY: &str = "OUTPUT";

fn record_value(record: &KeyValueRecord) -> Value {
    serde_json::to_value(record).unwrap_or(Value::Null)
}

async fn read_record(input: &MatcherInput<'_>, key: &str) -> EngineResult<Option<KeyValueRecord>> {
    let store_id = &input.result.data().default_key_value_store_id;
    Ok(input.ctx.platform.get_record(store_id, key).await?)
}

/// Hands the `OUTPUT` record to the callback.
pub struct WithOutput;

#[async_trait]
impl Matcher for WithOutput {
    fn name(&self) -> &'static str {
        "withOutput"
    }

    async fn compare(&self, input: MatcherInput<'_>) -> EngineResult<Verdict> {
        match read_record(&input, OUTPUT_KEY).await? {
            Some(record) => Ok(input.check(record_value(&record)).await),
            None => Ok(Verdict::fail(input.format("No OUTPUT"))),
        }
    }
}

/// Hands the crawler statistics record at `{ index }` (default 0) to the
/// callback.
pub struct WithStatistics;

#[async_trait]
impl Matcher for WithStatistics {
    fn name(&self) -> &'static str {
        "withStatistics"
    }

    async fn compare(&self, mut input: MatcherInput<'_>) -> EngineResult<Verdict> {
        let options = input.next_options();
        let index = options.get("index").and_then(Value::as_u64).unwrap_or(0);
        let key = format!("SDK_CRAWLER_STATISTICS_{index}");

        input.ctx.settlement.settle().await;

        match read_record(&input, &key).await? {
            Some(record) => {
                let value = if record.value.is_null() {
                    json!({})
                } else {
                    record.value
                };
                Ok(input.check(value).await)
            }
            None => Ok(Verdict::fail(input.format(&format!("No {key}")))),
        }
    }
}

/// Hands any named record to the callback. Requires `{ keyName }`.
pub struct WithKeyValueStore;

#[async_trait]
impl Matcher for WithKeyValueStore {
    fn name(&self) -> &'static str {
        "withKeyValueStore"
    }

    async fn compare(&self, mut input: MatcherInput<'_>) -> EngineResult<Verdict> {
        let options = input.next_options();
        let Some(key) = options
            .get("keyName")
            .and_then(Value::as_str)
            .filter(|k| !k.is_empty())
        else {
            return Ok(Verdict::fail(input.format(
                "You need to specify the \"keyName\" parameter as { keyName: \"KEY_NAME\" }",
            )));
        };

        input.ctx.settlement.settle().await;

        match read_record(&input, key).await? {
            Some(record) => Ok(input.check(record_value(&record)).await),
            None => Ok(Verdict::fail(
                input.format(&format!("Key \"{key}\" doesn't exist")),
            )),
        }
    }
}

/// Dataset info can lag behind the items. Without pagination options the
/// fetched page is the whole dataset, so its counts win.
fn reconcile_counts(info: &mut Value, page: &ItemsPage) {
    let Some(fields) = info.as_object_mut() else {
        return;
    };
    let total = page.total.max(page.items.len() as u64);
    let clean = page
        .items
        .iter()
        .filter(|item| item.as_object().is_none_or(|o| !o.is_empty()))
        .count();
    fields.insert("itemCount".to_string(), json!(total));
    fields.insert("cleanItemCount".to_string(), json!(clean));
}

/// Hands `{ dataset, info }` to the callback. The first option object is
/// forwarded as item listing options.
pub struct WithDataset;

#[async_trait]
impl Matcher for WithDataset {
    fn name(&self) -> &'static str {
        "withDataset"
    }

    async fn compare(&self, mut input: MatcherInput<'_>) -> EngineResult<Verdict> {
        let options = ListItemsOptions::from_value(&input.next_options());

        input.ctx.settlement.settle().await;

        let dataset_id = &input.result.data().default_dataset_id;
        let platform = &input.ctx.platform;
        let (info, page) = futures::try_join!(
            platform.get_dataset(dataset_id),
            platform.list_items(dataset_id, &options),
        )?;

        let mut info = info;
        if options.is_empty() {
            reconcile_counts(&mut info, &page);
        }

        let dataset = serde_json::to_value(&page)?;
        Ok(input.check(json!({ "dataset": dataset, "info": info })).await)
    }
}

/// Hands the request queue metadata to the callback.
pub struct WithRequestQueue;

#[async_trait]
impl Matcher for WithRequestQueue {
    fn name(&self) -> &'static str {
        "withRequestQueue"
    }

    async fn compare(&self, input: MatcherInput<'_>) -> EngineResult<Verdict> {
        let queue_id = &input.result.data().default_request_queue_id;
        let queue = input.ctx.platform.get_request_queue(queue_id).await?;
        Ok(input.check(queue).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::matchers::test_support::{Fixture, Recording};
    use crate::services::matchers::Expected;

    #[tokio::test]
    async fn test_missing_output_fails_with_header() {
        let fixture = Fixture::new().await;
        let result = fixture.run("X").await;

        let verdict = WithOutput
            .compare(fixture.input(&result, Expected::Callback(Recording::ok()), vec![]))
            .await
            .unwrap();
        assert!(!verdict.pass);
        let message = verdict.message.unwrap();
        assert!(message.contains(" : No OUTPUT"));
        assert!(message.contains(&result.link()));
    }

    #[tokio::test]
    async fn test_output_record_reaches_callback() {
        let fixture = Fixture::new().await;
        fixture.platform.seed_record("X", "OUTPUT", json!({ "items": 3 }));
        let result = fixture.run("X").await;
        let verifier = Recording::ok();

        let verdict = WithOutput
            .compare(fixture.input(&result, Expected::Callback(verifier.clone()), vec![]))
            .await
            .unwrap();
        assert!(verdict.pass);
        let seen = verifier.seen().unwrap();
        assert_eq!(seen["key"], "OUTPUT");
        assert_eq!(seen["value"], json!({ "items": 3 }));
    }

    #[tokio::test]
    async fn test_key_value_store_requires_key_name() {
        let fixture = Fixture::new().await;
        let result = fixture.run("X").await;

        let verdict = WithKeyValueStore
            .compare(fixture.input(&result, Expected::Callback(Recording::ok()), vec![]))
            .await
            .unwrap();
        assert!(!verdict.pass);
        assert!(verdict.message.unwrap().contains("\"keyName\""));
    }

    #[tokio::test]
    async fn test_key_value_store_missing_key_names_the_key() {
        let fixture = Fixture::new().await;
        let result = fixture.run("X").await;

        let verdict = WithKeyValueStore
            .compare(fixture.input(
                &result,
                Expected::Callback(Recording::ok()),
                vec![json!({ "keyName": "STATE" })],
            ))
            .await
            .unwrap();
        assert!(!verdict.pass);
        assert!(verdict.message.unwrap().contains("Key \"STATE\" doesn't exist"));
    }

    #[tokio::test]
    async fn test_statistics_index_selects_record() {
        let fixture = Fixture::new().await;
        fixture
            .platform
            .seed_record("X", "SDK_CRAWLER_STATISTICS_2", json!({ "requestsFinished": 9 }));
        let result = fixture.run("X").await;
        let verifier = Recording::ok();

        let verdict = WithStatistics
            .compare(fixture.input(
                &result,
                Expected::Callback(verifier.clone()),
                vec![json!({ "index": 2 })],
            ))
            .await
            .unwrap();
        assert!(verdict.pass);
        assert_eq!(verifier.seen(), Some(json!({ "requestsFinished": 9 })));

        let missing = WithStatistics
            .compare(fixture.input(&result, Expected::Callback(Recording::ok()), vec![]))
            .await
            .unwrap();
        assert!(missing.message.unwrap().contains("No SDK_CRAWLER_STATISTICS_0"));
        assert!(fixture.ctx.settlement.has_settled());
    }

    #[tokio::test]
    async fn test_dataset_counts_follow_items_without_pagination() {
        let fixture = Fixture::new().await;
        fixture.platform.seed_dataset(
            "X",
            json!({ "itemCount": 0, "cleanItemCount": 0 }),
            vec![json!({ "a": 1 }), json!({}), json!({ "a": 3 })],
        );
        let result = fixture.run("X").await;
        let verifier = Recording::ok();

        WithDataset
            .compare(fixture.input(&result, Expected::Callback(verifier.clone()), vec![]))
            .await
            .unwrap();
        let seen = verifier.seen().unwrap();
        assert_eq!(seen["info"]["itemCount"], 3);
        assert_eq!(seen["info"]["cleanItemCount"], 2);
        assert_eq!(seen["dataset"]["items"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_dataset_pagination_keeps_reported_info() {
        let fixture = Fixture::new().await;
        fixture.platform.seed_dataset(
            "X",
            json!({ "itemCount": 40, "cleanItemCount": 40 }),
            vec![json!({ "a": 1 }), json!({ "a": 2 })],
        );
        let result = fixture.run("X").await;
        let verifier = Recording::ok();

        WithDataset
            .compare(fixture.input(
                &result,
                Expected::Callback(verifier.clone()),
                vec![json!({ "limit": 1 })],
            ))
            .await
            .unwrap();
        let seen = verifier.seen().unwrap();
        assert_eq!(seen["info"]["itemCount"], 40);
        assert_eq!(seen["dataset"]["items"].as_array().unwrap().len(), 1);
        assert_eq!(seen["dataset"]["total"], 2);
    }

    #[tokio::test]
    async fn test_request_queue_reaches_callback() {
        let fixture = Fixture::new().await;
        let result = fixture.run("X").await;
        let verifier = Recording::ok();

        WithRequestQueue
            .compare(fixture.input(&result, Expected::Callback(verifier.clone()), vec![]))
            .await
            .unwrap();
        assert_eq!(verifier.seen().unwrap()["handledRequestCount"], 0);
    }
}
