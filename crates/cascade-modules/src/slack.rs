//! Slack webhook module.
//!
//! Posts attachment-style messages to an incoming webhook. The webhook URL
//! resolves from the call arguments, then the context
//! (`slack_webhook_url`, `webhook_url`), then the instance config —
//! missing everywhere is a `fail`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use cascade_core::error::{EngineError, Result};
use cascade_core::modules::{CallContext, WorkflowModule};
use cascade_core::result::StepResult;

pub const MODULE_NAME: &str = "slack_module";

/// Static instance config from `context_modules`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub webhook_url: Option<String>,
}

pub struct SlackModule {
    client: reqwest::Client,
    config: SlackConfig,
}

#[derive(Debug, Deserialize)]
struct InfoArgs {
    channel: String,
    title: String,
    #[serde(default)]
    message: Option<Value>,
    #[serde(default)]
    keyed_message: Option<Vec<Value>>,
    #[serde(default = "default_color")]
    color: String,
    #[serde(default)]
    webhook_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IncidentArgs {
    channel: String,
    message: String,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    oncall_user: Option<String>,
}

fn default_color() -> String {
    "info".to_string()
}

impl SlackModule {
    pub fn from_config(config: &Value) -> Result<Self> {
        let config: SlackConfig = if config.is_null() {
            SlackConfig::default()
        } else {
            serde_json::from_value(config.clone())?
        };
        Ok(Self {
            client: reqwest::Client::new(),
            config,
        })
    }

    fn resolve_webhook(&self, explicit: Option<&str>, call: &CallContext) -> Option<String> {
        explicit
            .map(String::from)
            .or_else(|| {
                call.get("slack_webhook_url")
                    .and_then(Value::as_str)
                    .map(String::from)
            })
            .or_else(|| {
                call.get("webhook_url")
                    .and_then(Value::as_str)
                    .map(String::from)
            })
            .or_else(|| self.config.webhook_url.clone())
    }

    async fn post(&self, webhook_url: &str, payload: Value, channel: &str) -> StepResult {
        match self.client.post(webhook_url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!(channel = %channel, "slack message sent");
                StepResult::ok(
                    format!("Message sent to {}", channel),
                    json!({"channel": channel}),
                )
            }
            Ok(response) => {
                warn!(channel = %channel, status = response.status().as_u16(), "slack webhook rejected message");
                StepResult::fail(format!(
                    "Slack webhook returned status {}",
                    response.status().as_u16()
                ))
            }
            Err(err) => {
                warn!(channel = %channel, error = %err, "slack webhook call failed");
                StepResult::fail(err.to_string())
            }
        }
    }

    async fn send_info_message(&self, args: InfoArgs, call: &CallContext) -> Result<StepResult> {
        let Some(webhook_url) = self.resolve_webhook(args.webhook_url.as_deref(), call) else {
            return Ok(StepResult::fail("Missing webhook URL"));
        };

        let mut fields = Vec::new();
        if let Some(message) = &args.message {
            fields.push(json!({
                "title": "Message",
                "value": render(message),
                "short": false,
            }));
        }
        for item in args.keyed_message.iter().flatten() {
            let (Some(key), Some(value)) = (item.get("key"), item.get("value")) else {
                warn!(item = %item, "keyed_message entry missing key or value, skipping");
                continue;
            };
            fields.push(json!({
                "title": render(key),
                "value": render(value),
                "short": true,
            }));
        }

        let payload = json!({
            "channel": args.channel,
            "text": args.title,
            "attachments": [{
                "color": color_code(&args.color),
                "fields": fields,
            }],
        });
        Ok(self.post(&webhook_url, payload, &args.channel).await)
    }

    async fn send_incident_message(
        &self,
        args: IncidentArgs,
        call: &CallContext,
    ) -> Result<StepResult> {
        let Some(webhook_url) = self.resolve_webhook(None, call) else {
            return Ok(StepResult::fail("Missing webhook URL"));
        };
        let severity = args.severity.as_deref().unwrap_or("none");
        let payload = json!({
            "channel": args.channel,
            "text": args.message,
            "attachments": [{
                "color": color_code(severity),
                "fields": [
                    {"title": "Severity", "value": args.severity.as_deref().unwrap_or("N/A"), "short": true},
                    {"title": "On-call", "value": args.oncall_user.as_deref().unwrap_or("N/A"), "short": true},
                ],
            }],
        });
        Ok(self.post(&webhook_url, payload, &args.channel).await)
    }
}

#[async_trait]
impl WorkflowModule for SlackModule {
    fn module_name(&self) -> &str {
        MODULE_NAME
    }

    async fn invoke(
        &self,
        method: &str,
        args: &Map<String, Value>,
        call: &CallContext,
    ) -> Result<StepResult> {
        let args_value = Value::Object(args.clone());
        match method {
            "send_info_message" => {
                self.send_info_message(serde_json::from_value(args_value)?, call)
                    .await
            }
            "send_incident_message" => {
                self.send_incident_message(serde_json::from_value(args_value)?, call)
                    .await
            }
            other => Err(EngineError::Dispatch {
                target: format!("{}.{}", MODULE_NAME, other),
                message: "method not implemented".to_string(),
            }),
        }
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn color_code(severity: &str) -> &'static str {
    match severity.to_lowercase().as_str() {
        "sev1" | "rejected" | "error" | "bad" => "#ff0000",
        "sev2" | "warning" => "#ffa500",
        "sev3" | "pending" => "#ffff00",
        "none" | "approved" | "good" => "#00ff00",
        "info" => "#0000ff",
        _ => "#cccccc",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::result::StepStatus;
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn posts_attachment_payload_to_the_webhook() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(json!({
                "channel": "#ops",
                "text": "deploy finished",
            })))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let module = SlackModule::from_config(&json!({
            "webhook_url": format!("{}/hook", server.uri()),
        }))
        .unwrap();
        let call = CallContext::new(Uuid::new_v4(), json!({}));
        let result = module
            .invoke(
                "send_info_message",
                &args(json!({
                    "channel": "#ops",
                    "title": "deploy finished",
                    "message": "all green",
                    "keyed_message": [{"key": "env", "value": "staging"}],
                })),
                &call,
            )
            .await
            .unwrap();

        assert_eq!(result.status, StepStatus::Ok);
        assert_eq!(result.data.unwrap()["channel"], json!("#ops"));
    }

    #[tokio::test]
    async fn webhook_url_falls_back_to_the_context() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let module = SlackModule::from_config(&Value::Null).unwrap();
        let call = CallContext::new(
            Uuid::new_v4(),
            json!({"slack_webhook_url": server.uri()}),
        );
        let result = module
            .invoke(
                "send_incident_message",
                &args(json!({"channel": "#inc", "message": "db down", "severity": "sev1"})),
                &call,
            )
            .await
            .unwrap();
        assert_eq!(result.status, StepStatus::Ok);
    }

    #[tokio::test]
    async fn missing_webhook_url_fails() {
        let module = SlackModule::from_config(&Value::Null).unwrap();
        let call = CallContext::new(Uuid::new_v4(), json!({}));
        let result = module
            .invoke(
                "send_info_message",
                &args(json!({"channel": "#ops", "title": "x"})),
                &call,
            )
            .await
            .unwrap();
        assert_eq!(result.status, StepStatus::Fail);
        assert_eq!(result.message, "Missing webhook URL");
    }

    #[test]
    fn severity_maps_to_attachment_colors() {
        assert_eq!(color_code("SEV1"), "#ff0000");
        assert_eq!(color_code("good"), "#00ff00");
        assert_eq!(color_code("unknown"), "#cccccc");
    }
}
