use serde::{Serialize, Serializer};
use std::time::Duration;

use crate::record::FieldValue;

/// HTTP request context in the shape cloud logging expects under an
/// `httpRequest` field.
///
/// Only `requestMethod` and `requestUrl` are always present; the rest are
/// omitted until set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequest {
    pub request_method: String,
    pub request_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_latency"
    )]
    pub latency: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        HttpRequest {
            request_method: method.into(),
            request_url: url.into(),
            ..Default::default()
        }
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn remote_ip(mut self, remote_ip: impl Into<String>) -> Self {
        self.remote_ip = Some(remote_ip.into());
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

/// Durations go out as a decimal seconds string, e.g. `"0.250s"`.
fn serialize_latency<S>(latency: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match latency {
        Some(d) => serializer.serialize_str(&format!("{:.3}s", d.as_secs_f64())),
        None => serializer.serialize_none(),
    }
}

impl From<HttpRequest> for FieldValue {
    fn from(req: HttpRequest) -> Self {
        FieldValue::custom(req)
    }
}
