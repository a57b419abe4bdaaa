//! HTTP API module: one-shot requests and blocking polls.
//!
//! `call` performs a single request and reports the status code, body, and
//! final URL — 2xx as ok, anything else as fail with the same data.
//! `blocking_call` polls the endpoint until a success predicate holds
//! (expected status code, or a match-engine condition over the response
//! body) or the poll budget runs out, in which case the step times out.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use cascade_core::error::{EngineError, Result};
use cascade_core::matching::{evaluate_operator, extract_json_path, Operator};
use cascade_core::modules::{CallContext, WorkflowModule};
use cascade_core::result::StepResult;

pub const MODULE_NAME: &str = "api_module";

/// Static instance config from `context_modules`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Default request timeout in seconds for `call`
    pub timeout: Option<f64>,
    /// Headers applied to every request from this instance
    pub headers: Option<HashMap<String, String>>,
    pub poll_interval_seconds: Option<f64>,
    pub timeout_minutes: Option<f64>,
}

pub struct ApiModule {
    client: reqwest::Client,
    config: ApiConfig,
}

#[derive(Debug, Deserialize)]
struct CallArgs {
    method: String,
    url: String,
    #[serde(default)]
    headers: Option<HashMap<String, String>>,
    #[serde(default)]
    params: Option<HashMap<String, Value>>,
    #[serde(default)]
    json: Option<Value>,
    #[serde(default)]
    data: Option<HashMap<String, String>>,
    #[serde(default)]
    timeout: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PollingMode {
    StatusCode,
    ResponseBody,
}

#[derive(Debug, Deserialize)]
struct SuccessCondition {
    path: String,
    operator: Operator,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Deserialize)]
struct BlockingCallArgs {
    method: String,
    url: String,
    #[serde(default)]
    headers: Option<HashMap<String, String>>,
    #[serde(default)]
    params: Option<HashMap<String, Value>>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    poll_interval_seconds: Option<f64>,
    #[serde(default)]
    timeout_minutes: Option<f64>,
    #[serde(default = "default_polling_mode")]
    polling_mode: PollingMode,
    #[serde(default = "default_expected_status")]
    expected_status_code: u16,
    #[serde(default)]
    success_condition: Option<SuccessCondition>,
}

fn default_polling_mode() -> PollingMode {
    PollingMode::StatusCode
}

fn default_expected_status() -> u16 {
    200
}

impl ApiModule {
    pub fn from_config(config: &Value) -> Result<Self> {
        let config: ApiConfig = if config.is_null() {
            ApiConfig::default()
        } else {
            serde_json::from_value(config.clone())?
        };
        Ok(Self {
            client: reqwest::Client::new(),
            config,
        })
    }

    fn build_request(
        &self,
        method: &str,
        url: &str,
        headers: Option<&HashMap<String, String>>,
        params: Option<&HashMap<String, Value>>,
    ) -> Result<reqwest::RequestBuilder> {
        let method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
            .map_err(|_| EngineError::validation(format!("invalid HTTP method '{}'", method)))?;
        let mut request = self.client.request(method, url);
        for (key, value) in headers.or(self.config.headers.as_ref()).into_iter().flatten() {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some(params) = params {
            let pairs: Vec<(String, String)> = params
                .iter()
                .map(|(k, v)| (k.clone(), stringify(v)))
                .collect();
            request = request.query(&pairs);
        }
        Ok(request)
    }

    async fn call(&self, args: CallArgs) -> Result<StepResult> {
        let timeout = args.timeout.or(self.config.timeout).unwrap_or(10.0);
        let mut request = self
            .build_request(&args.method, &args.url, args.headers.as_ref(), args.params.as_ref())?
            .timeout(std::time::Duration::from_secs_f64(timeout));
        if let Some(body) = &args.json {
            request = request.json(body);
        } else if let Some(form) = &args.data {
            request = request.form(form);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(url = %args.url, error = %err, "api call errored");
                return Ok(StepResult::fail(format!(
                    "Exception occurred during API call: {}",
                    err
                )));
            }
        };
        let status_code = response.status();
        let final_url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        let data = json!({
            "status_code": status_code.as_u16(),
            "body": body,
            "url": final_url,
        });
        if status_code.is_success() {
            info!(url = %args.url, status = status_code.as_u16(), "api call succeeded");
            Ok(StepResult::ok(
                format!("Request to {} succeeded with status {}", args.url, status_code.as_u16()),
                data,
            ))
        } else {
            warn!(url = %args.url, status = status_code.as_u16(), "api call failed");
            Ok(StepResult::fail_with_data(
                format!("Request to {} failed with status {}", args.url, status_code.as_u16()),
                data,
            ))
        }
    }

    async fn blocking_call(&self, args: BlockingCallArgs) -> Result<StepResult> {
        let poll_interval = args
            .poll_interval_seconds
            .or(self.config.poll_interval_seconds)
            .unwrap_or(10.0);
        let timeout_minutes = args
            .timeout_minutes
            .or(self.config.timeout_minutes)
            .unwrap_or(5.0);
        let deadline = tokio::time::Instant::now()
            + std::time::Duration::from_secs_f64(timeout_minutes * 60.0);

        while tokio::time::Instant::now() < deadline {
            match self.poll_once(&args).await {
                Ok(Some(response)) => {
                    return Ok(StepResult::ok(
                        format!("Polling condition met for {}", args.url),
                        json!({"response": response}),
                    ));
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(url = %args.url, error = %err, "error during blocking call");
                }
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let nap = std::time::Duration::from_secs_f64(poll_interval).min(remaining);
            if nap.is_zero() {
                break;
            }
            tokio::time::sleep(nap).await;
        }

        Ok(StepResult::timeout(format!(
            "Polling timed out after {} minutes",
            timeout_minutes
        )))
    }

    /// One polling attempt. `Some` carries the successful response body.
    async fn poll_once(&self, args: &BlockingCallArgs) -> Result<Option<Value>> {
        let mut request = self.build_request(
            &args.method,
            &args.url,
            args.headers.as_ref(),
            args.params.as_ref(),
        )?;
        if let Some(body) = &args.body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|err| EngineError::Io {
                message: err.to_string(),
            })?;
        let status = response.status().as_u16();
        let body: Value = response.json().await.unwrap_or(Value::Object(Map::new()));

        match args.polling_mode {
            PollingMode::StatusCode => {
                if status == args.expected_status_code {
                    return Ok(Some(body));
                }
            }
            PollingMode::ResponseBody => {
                if let Some(condition) = &args.success_condition {
                    let actual = extract_json_path(&body, &condition.path);
                    if evaluate_operator(condition.operator, actual, &condition.value)? {
                        return Ok(Some(body));
                    }
                }
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl WorkflowModule for ApiModule {
    fn module_name(&self) -> &str {
        MODULE_NAME
    }

    async fn invoke(
        &self,
        method: &str,
        args: &Map<String, Value>,
        _call: &CallContext,
    ) -> Result<StepResult> {
        let args_value = Value::Object(args.clone());
        match method {
            "call" => self.call(serde_json::from_value(args_value)?).await,
            "blocking_call" => {
                self.blocking_call(serde_json::from_value(args_value)?)
                    .await
            }
            other => Err(EngineError::Dispatch {
                target: format!("{}.{}", MODULE_NAME, other),
                message: "method not implemented".to_string(),
            }),
        }
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::result::StepStatus;
    use uuid::Uuid;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn module() -> ApiModule {
        ApiModule::from_config(&Value::Null).unwrap()
    }

    fn call_ctx() -> CallContext {
        CallContext::new(Uuid::new_v4(), json!({}))
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn call_reports_success_with_body_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .and(query_param("env", "staging"))
            .respond_with(ResponseTemplate::new(200).set_body_string("all good"))
            .mount(&server)
            .await;

        let result = module()
            .invoke(
                "call",
                &args(json!({
                    "method": "get",
                    "url": format!("{}/status", server.uri()),
                    "params": {"env": "staging"},
                })),
                &call_ctx(),
            )
            .await
            .unwrap();

        assert_eq!(result.status, StepStatus::Ok);
        let data = result.data.unwrap();
        assert_eq!(data["status_code"], json!(200));
        assert_eq!(data["body"], json!("all good"));
    }

    #[tokio::test]
    async fn call_reports_non_2xx_as_fail_with_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/create"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let result = module()
            .invoke(
                "call",
                &args(json!({
                    "method": "POST",
                    "url": format!("{}/create", server.uri()),
                    "json": {"name": "x"},
                })),
                &call_ctx(),
            )
            .await
            .unwrap();

        assert_eq!(result.status, StepStatus::Fail);
        assert!(result.message.contains("503"));
        assert_eq!(result.data.unwrap()["body"], json!("unavailable"));
    }

    #[tokio::test]
    async fn blocking_call_returns_when_expected_status_arrives() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/job"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": true})))
            .mount(&server)
            .await;

        let result = module()
            .invoke(
                "blocking_call",
                &args(json!({
                    "method": "GET",
                    "url": format!("{}/job", server.uri()),
                    "poll_interval_seconds": 0.05,
                    "timeout_minutes": 0.1,
                })),
                &call_ctx(),
            )
            .await
            .unwrap();

        assert_eq!(result.status, StepStatus::Ok);
        assert_eq!(result.data.unwrap()["response"]["done"], json!(true));
    }

    #[tokio::test]
    async fn blocking_call_times_out_and_names_the_duration() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/job"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let result = module()
            .invoke(
                "blocking_call",
                &args(json!({
                    "method": "GET",
                    "url": format!("{}/job", server.uri()),
                    "poll_interval_seconds": 0.05,
                    "timeout_minutes": 0.01,
                })),
                &call_ctx(),
            )
            .await
            .unwrap();

        assert_eq!(result.status, StepStatus::Timeout);
        assert!(result.message.contains("0.01 minutes"));
    }

    #[tokio::test]
    async fn blocking_call_response_body_mode_uses_the_match_engine() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/job"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"job": {"state": "complete", "progress": 100}})),
            )
            .mount(&server)
            .await;

        let result = module()
            .invoke(
                "blocking_call",
                &args(json!({
                    "method": "GET",
                    "url": format!("{}/job", server.uri()),
                    "polling_mode": "response_body",
                    "success_condition": {
                        "path": "job.state",
                        "operator": "equals",
                        "value": "complete"
                    },
                    "poll_interval_seconds": 0.05,
                    "timeout_minutes": 0.1,
                })),
                &call_ctx(),
            )
            .await
            .unwrap();

        assert_eq!(result.status, StepStatus::Ok);
        assert_eq!(
            result.data.unwrap()["response"]["job"]["progress"],
            json!(100)
        );
    }
}
