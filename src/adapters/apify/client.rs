//! HTTP client for the Apify v2 REST API.
//!
//! Implements the [`Platform`] port. Every request is throttled through a
//! shared `governor` limiter and authenticated with a bearer token. Most
//! endpoints wrap their payload in a `{ "data": ... }` envelope; record and
//! dataset item endpoints return the raw body.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::domain::errors::{PlatformError, PlatformResult};
use crate::domain::models::{
    ActorInfo, ActorRun, BuildInfo, ItemsPage, KeyValueRecord, ListItemsOptions, PlatformConfig,
    RunOptions, RunTarget, TaskInfo, WebhookSpec,
};
use crate::domain::ports::Platform;

const PAGINATION_TOTAL: &str = "x-apify-pagination-total";
const PAGINATION_OFFSET: &str = "x-apify-pagination-offset";
const PAGINATION_COUNT: &str = "x-apify-pagination-count";
const PAGINATION_LIMIT: &str = "x-apify-pagination-limit";

/// Configuration for [`ApifyPlatform`]
#[derive(Debug, Clone)]
pub struct ApifyClientConfig {
    /// API root, without the `/v2` suffix
    pub base_url: String,
    /// Bearer token. Requests go out unauthenticated without one
    pub token: Option<String>,
    /// Client-side rate limit shared by all requests
    pub requests_per_second: u32,
    /// Timeout of a single HTTP request
    pub timeout_secs: u64,
}

impl Default for ApifyClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.apify.com".to_string(),
            token: None,
            requests_per_second: 30,
            timeout_secs: 60,
        }
    }
}

impl ApifyClientConfig {
    /// Client settings from the engine configuration. `token` wins over the configured one.
    pub fn from_platform_config(config: &PlatformConfig, token: Option<String>) -> Self {
        Self {
            base_url: config.api_base_url.clone(),
            token: token.or_else(|| config.token.clone()),
            requests_per_second: config.requests_per_second,
            timeout_secs: config.request_timeout_secs,
        }
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Apify platform client
#[derive(Clone)]
pub struct ApifyPlatform {
    http: Client,
    base_url: String,
    token: Option<String>,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl std::fmt::Debug for ApifyPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApifyPlatform")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

/// Resource ids in paths use `~` in place of the `owner/name` slash.
fn path_id(id: &str) -> String {
    id.replace('/', "~")
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.parse().ok()
}

impl ApifyPlatform {
    /// Client for the public API with default limits.
    pub fn new(token: Option<String>) -> PlatformResult<Self> {
        Self::with_config(ApifyClientConfig {
            token,
            ..Default::default()
        })
    }

    /// Client with explicit settings. A zero rate limit is raised to one request per second.
    pub fn with_config(config: ApifyClientConfig) -> PlatformResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("runcheck/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.filter(|t| !t.is_empty()),
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
        })
    }

    /// API root the client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Wait for a rate-limit slot and build an authorized request.
    async fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.limiter.until_ready().await;
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "platform request");

        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and map non-success statuses to [`PlatformError`].
    async fn send(&self, operation: &'static str, builder: RequestBuilder) -> PlatformResult<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().path().to_string();
        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED => Err(PlatformError::Unauthorized),
            StatusCode::NOT_FOUND => Err(PlatformError::NotFound(url)),
            status => {
                warn!(operation, %status, "platform request failed");
                Err(PlatformError::Status {
                    operation,
                    status,
                    body,
                })
            }
        }
    }

    async fn data<T: DeserializeOwned>(
        operation: &'static str,
        response: Response,
    ) -> PlatformResult<T> {
        let bytes = response.bytes().await?;
        serde_json::from_slice::<Envelope<T>>(&bytes)
            .map(|envelope| envelope.data)
            .map_err(|e| PlatformError::Decode {
                operation,
                message: e.to_string(),
            })
    }

    async fn get_data<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
    ) -> PlatformResult<T> {
        let builder = self.request(Method::GET, path).await;
        let response = self.send(operation, builder).await?;
        Self::data(operation, response).await
    }
}

#[async_trait]
impl Platform for ApifyPlatform {
    #[instrument(skip(self, input, options), fields(%target))]
    async fn start_run(
        &self,
        target: &RunTarget,
        input: &Value,
        options: &RunOptions,
    ) -> PlatformResult<ActorRun> {
        let path = match target {
            RunTarget::Actor(id) => format!("/v2/acts/{}/runs", path_id(id)),
            RunTarget::Task(id) => format!("/v2/actor-tasks/{}/runs", path_id(id)),
        };

        let mut query: Vec<(&str, String)> = vec![("waitForFinish", "0".to_string())];
        if let Some(build) = &options.build {
            query.push(("build", build.clone()));
        }
        if let Some(memory) = options.memory_mbytes {
            query.push(("memory", memory.to_string()));
        }
        if let Some(timeout) = options.timeout_secs {
            query.push(("timeout", timeout.to_string()));
        }

        let builder = self
            .request(Method::POST, &path)
            .await
            .query(&query)
            .json(input);
        let response = self.send("start_run", builder).await?;
        Self::data("start_run", response).await
    }

    async fn get_run(&self, run_id: &str) -> PlatformResult<ActorRun> {
        self.get_data("get_run", &format!("/v2/actor-runs/{run_id}"))
            .await
    }

    async fn get_run_info(&self, run_id: &str) -> PlatformResult<Value> {
        self.get_data("get_run_info", &format!("/v2/actor-runs/{run_id}"))
            .await
    }

    async fn abort_run(&self, run_id: &str) -> PlatformResult<()> {
        let builder = self
            .request(Method::POST, &format!("/v2/actor-runs/{run_id}/abort"))
            .await;
        self.send("abort_run", builder).await?;
        Ok(())
    }

    async fn get_log(&self, run_id: &str) -> PlatformResult<String> {
        let builder = self.request(Method::GET, &format!("/v2/logs/{run_id}")).await;
        let response = self.send("get_log", builder).await?;
        Ok(response.text().await?)
    }

    async fn get_actor(&self, actor_id: &str) -> PlatformResult<ActorInfo> {
        self.get_data("get_actor", &format!("/v2/acts/{}", path_id(actor_id)))
            .await
    }

    async fn get_task(&self, task_id: &str) -> PlatformResult<TaskInfo> {
        self.get_data("get_task", &format!("/v2/actor-tasks/{}", path_id(task_id)))
            .await
    }

    async fn get_build(&self, build_id: &str) -> PlatformResult<BuildInfo> {
        self.get_data("get_build", &format!("/v2/actor-builds/{build_id}"))
            .await
    }

    async fn get_record(
        &self,
        store_id: &str,
        key: &str,
    ) -> PlatformResult<Option<KeyValueRecord>> {
        let builder = self
            .request(
                Method::GET,
                &format!("/v2/key-value-stores/{}/records/{key}", path_id(store_id)),
            )
            .await;

        let response = match self.send("get_record", builder).await {
            Ok(response) => response,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        let is_json = content_type
            .as_deref()
            .is_none_or(|ct| ct.contains("json"));
        let value = if is_json {
            serde_json::from_str(&body).unwrap_or(Value::String(body))
        } else {
            Value::String(body)
        };

        Ok(Some(KeyValueRecord {
            key: key.to_string(),
            value,
            content_type,
        }))
    }

    async fn set_record(&self, store_id: &str, key: &str, value: &Value) -> PlatformResult<()> {
        let builder = self
            .request(
                Method::PUT,
                &format!("/v2/key-value-stores/{}/records/{key}", path_id(store_id)),
            )
            .await
            .json(value);
        self.send("set_record", builder).await?;
        Ok(())
    }

    async fn get_dataset(&self, dataset_id: &str) -> PlatformResult<Value> {
        self.get_data("get_dataset", &format!("/v2/datasets/{}", path_id(dataset_id)))
            .await
    }

    async fn list_items(
        &self,
        dataset_id: &str,
        options: &ListItemsOptions,
    ) -> PlatformResult<ItemsPage> {
        let mut query = options.to_query();
        if !query.iter().any(|(k, _)| k == "format") {
            query.push(("format".to_string(), "json".to_string()));
        }

        let builder = self
            .request(
                Method::GET,
                &format!("/v2/datasets/{}/items", path_id(dataset_id)),
            )
            .await
            .query(&query);
        let response = self.send("list_items", builder).await?;

        let headers = response.headers().clone();
        let bytes = response.bytes().await?;
        let items: Vec<Value> =
            serde_json::from_slice(&bytes).map_err(|e| PlatformError::Decode {
                operation: "list_items",
                message: e.to_string(),
            })?;

        let count = header_u64(&headers, PAGINATION_COUNT).unwrap_or(items.len() as u64);
        Ok(ItemsPage {
            total: header_u64(&headers, PAGINATION_TOTAL).unwrap_or(count),
            offset: header_u64(&headers, PAGINATION_OFFSET).unwrap_or(0),
            limit: header_u64(&headers, PAGINATION_LIMIT).unwrap_or(count),
            count,
            items,
        })
    }

    async fn get_request_queue(&self, queue_id: &str) -> PlatformResult<Value> {
        self.get_data(
            "get_request_queue",
            &format!("/v2/request-queues/{}", path_id(queue_id)),
        )
        .await
    }

    async fn create_webhook(&self, webhook: &WebhookSpec) -> PlatformResult<()> {
        let body = json!({
            "isAdHoc": true,
            "eventTypes": webhook.event_types,
            "condition": { "actorRunId": webhook.actor_run_id },
            "requestUrl": webhook.request_url,
            "payloadTemplate": webhook.payload_template,
            "idempotencyKey": webhook.idempotency_key,
        });
        let builder = self.request(Method::POST, "/v2/webhooks").await.json(&body);
        self.send("create_webhook", builder).await?;
        Ok(())
    }
}
