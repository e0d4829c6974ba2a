//! Deferred outbound HTTP call.
//!
//! Scheduled requests are stored as `[action, url, payload]` argument lists
//! and turned back into a [`CallSpec`] when they come due.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use delayq_queue::Executable;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Get,
    Post,
}

impl Action {
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        match raw.to_ascii_lowercase().as_str() {
            "get" => Ok(Self::Get),
            "post" => Ok(Self::Post),
            _ => Err(ApiError::UnknownAction(raw.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
        }
    }
}

/// A decoded outbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSpec {
    pub action: Action,
    pub url: String,
    pub payload: Map<String, Value>,
}

impl CallSpec {
    /// Encode as the argument list stored on the work item.
    pub fn into_args(self) -> Vec<Value> {
        vec![
            Value::from(self.action.as_str()),
            Value::from(self.url),
            Value::Object(self.payload),
        ]
    }

    /// Decode the stored `[action, url, payload]` argument list. The payload
    /// may be missing or `null`.
    pub fn from_args(args: &[Value]) -> Result<Self, ApiError> {
        if args.len() > 3 {
            return Err(ApiError::BadArgs(format!(
                "expected at most 3 arguments, got {}",
                args.len()
            )));
        }
        let action = args
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::BadArgs("action is not a string".to_string()))
            .and_then(Action::parse)?;
        let url = args
            .get(1)
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::BadArgs("url is not a string".to_string()))?
            .to_string();
        let payload = match args.get(2) {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => return Err(ApiError::BadArgs("payload is not an object".to_string())),
        };
        Ok(Self {
            action,
            url,
            payload,
        })
    }
}

/// Executes scheduled calls with a shared, connection-pooling client.
///
/// Failures are logged and dropped; nothing is retried.
#[derive(Debug, Clone, Default)]
pub struct HttpCall {
    client: reqwest::Client,
}

impl HttpCall {
    pub fn new() -> Self {
        Self::default()
    }

    async fn send(&self, call: CallSpec) -> Result<reqwest::StatusCode, reqwest::Error> {
        let request = match call.action {
            Action::Get => self.client.get(&call.url),
            Action::Post => self.client.post(&call.url).json(&call.payload),
        };
        Ok(request.send().await?.status())
    }
}

#[async_trait]
impl Executable for HttpCall {
    async fn execute(&self, args: Vec<Value>) {
        let call = match CallSpec::from_args(&args) {
            Ok(call) => call,
            Err(e) => {
                warn!(error = %e, "dropping malformed scheduled call");
                return;
            }
        };

        let action = call.action.as_str();
        let url = call.url.clone();
        match self.send(call).await {
            Ok(status) => debug!(action, url = %url, %status, "scheduled call sent"),
            Err(e) => warn!(action, url = %url, error = %e, "scheduled call failed"),
        }
    }
}
