use crate::error::RefreshError;
use crate::paths::Settings;
use crate::profile::OAuthCredentials;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const CLAUDE_OAUTH_CLIENT_ID: &str = "9d1c250a-e61b-44d9-88ed-5944d1962f5e";
const CLAUDE_OAUTH_SCOPE: &str =
    "user:profile user:inference user:sessions:claude_code user:mcp_servers";
const CLAUDE_OAUTH_BETA: &str = "oauth-2025-04-20";
const REFRESH_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_EXPIRES_IN_SECS: f64 = 3600.0;

pub const EXPIRY_BUFFER_MS: u64 = 5 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct RefreshReply {
    pub status: u16,
    pub body: String,
}

pub type RefreshTransport = Arc<dyn Fn(&str) -> Result<RefreshReply, RefreshError> + Send + Sync>;

pub struct TokenRefresher {
    transport: RefreshTransport,
}

impl TokenRefresher {
    pub fn new(settings: &Settings) -> Self {
        let endpoint = settings.token_endpoint.clone();
        Self::with_transport(Arc::new(move |refresh_token| {
            default_refresh_transport(&endpoint, refresh_token)
        }))
    }

    pub fn with_transport(transport: RefreshTransport) -> Self {
        Self { transport }
    }

    pub fn refresh(&self, credentials: &OAuthCredentials) -> Result<OAuthCredentials, RefreshError> {
        let reply = (self.transport)(&credentials.refresh_token)?;
        apply_refresh_reply(credentials, &reply, now_ms())
    }
}

pub fn is_expired(credentials: &OAuthCredentials, now_ms: u64) -> bool {
    now_ms.saturating_add(EXPIRY_BUFFER_MS) >= credentials.expires_at
}

pub fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Scopes, tiers and any unrecognised credential keys are carried over from
/// `current`; the refresh token is only replaced when the server rotated it.
pub fn apply_refresh_reply(
    current: &OAuthCredentials,
    reply: &RefreshReply,
    now_ms: u64,
) -> Result<OAuthCredentials, RefreshError> {
    if !(200..300).contains(&reply.status) {
        if reply.body.contains("invalid_grant") {
            return Err(RefreshError::InvalidGrant);
        }
        return Err(RefreshError::Other {
            status: reply.status,
            body: truncate_chars(reply.body.trim(), 200),
        });
    }

    let root: Value = serde_json::from_str(&reply.body)
        .map_err(|err| RefreshError::MalformedResponse(format!("body is not JSON: {}", err)))?;
    let access_token = value_as_string(root.get("access_token"))
        .ok_or_else(|| RefreshError::MalformedResponse("missing access_token".to_string()))?;
    let refresh_token = value_as_string(root.get("refresh_token"))
        .unwrap_or_else(|| current.refresh_token.clone());
    let expires_in = root
        .get("expires_in")
        .and_then(value_as_f64)
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    let expires_at = now_ms.saturating_add((expires_in * 1000.0).round() as u64);

    Ok(OAuthCredentials {
        access_token,
        refresh_token,
        expires_at,
        ..current.clone()
    })
}

fn default_refresh_transport(
    token_endpoint: &str,
    refresh_token: &str,
) -> Result<RefreshReply, RefreshError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(REFRESH_TIMEOUT)
        .build()
        .map_err(|err| RefreshError::Transport(format!("failed to build HTTP client: {}", err)))?;

    let body = serde_json::json!({
        "grant_type": "refresh_token",
        "refresh_token": refresh_token,
        "client_id": CLAUDE_OAUTH_CLIENT_ID,
        "scope": CLAUDE_OAUTH_SCOPE,
    });
    let response = client
        .post(token_endpoint)
        .header("anthropic-beta", CLAUDE_OAUTH_BETA)
        .json(&body)
        .send()
        .map_err(|err| RefreshError::Transport(err.to_string()))?;
    let status = response.status().as_u16();
    let body = response
        .text()
        .map_err(|err| RefreshError::Transport(format!("failed to read refresh response: {}", err)))?;

    Ok(RefreshReply { status, body })
}

fn value_as_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(raw)) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        _ => None,
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn truncate_chars(raw: &str, max_chars: usize) -> String {
    raw.chars().take(max_chars).collect::<String>()
}
