use crate::app::AppConfig;
use crate::error::{Error, Result};
use reqwest::Client as HttpClient;
use reqwest::Response;
use serde_json::Value;
use std::sync::{Arc, RwLock};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared HTTP plumbing for every backend service: one connection pool, the
/// project settings and the signed-in user's ID token.
#[derive(Clone)]
pub struct FirebaseClient {
    pub http: HttpClient,
    config: Arc<AppConfig>,
    id_token: Arc<RwLock<Option<String>>>,
}

impl FirebaseClient {
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        // No overall request timeout: the feed stream stays open indefinitely.
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            config: Arc::new(config),
            id_token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn id_token(&self) -> Option<String> {
        match self.id_token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub(crate) fn set_id_token(&self, token: Option<String>) {
        match self.id_token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    pub fn require_token(&self) -> Result<String> {
        self.id_token().ok_or(Error::NotSignedIn)
    }
}

/// Turns a non-2xx response into [`Error::Status`], keeping the backend's
/// error message when the body carries one.
pub(crate) async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Status {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// Extracts `error.message` (Google APIs) or `error` (realtime database)
/// from an error body; falls back to the raw text.
pub(crate) fn error_message(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };
    json.get("error")
        .and_then(|e| e.get("message").or(Some(e)))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_reads_google_and_database_shapes() {
        assert_eq!(
            error_message(r#"{"error":{"code":400,"message":"EMAIL_NOT_FOUND"}}"#),
            "EMAIL_NOT_FOUND"
        );
        assert_eq!(
            error_message(r#"{"error":"Permission denied"}"#),
            "Permission denied"
        );
        assert_eq!(error_message("bad gateway\n"), "bad gateway");
    }

    #[test]
    fn token_is_shared_between_clones() {
        let config = AppConfig {
            api_key: "k".into(),
            project_id: "p".into(),
            database_url: "https://p.firebaseio.com/".into(),
            storage_bucket: "p.appspot.com".into(),
            ..AppConfig::default()
        };
        let client = FirebaseClient::new(config).unwrap();
        let other = client.clone();
        assert!(matches!(other.require_token(), Err(Error::NotSignedIn)));
        client.set_id_token(Some("tok".into()));
        assert_eq!(other.id_token().as_deref(), Some("tok"));
    }
}
