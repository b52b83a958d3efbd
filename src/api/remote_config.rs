use crate::api::client::{check, FirebaseClient};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;

const REMOTE_CONFIG_ROOT: &str = "https://firebaseremoteconfig.googleapis.com/v1";

/// A source of remote configuration entries (key to string value).
pub trait RemoteConfigSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<HashMap<String, String>>> + Send;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FetchRequest<'a> {
    app_id: &'a str,
    app_instance_id: &'a str,
}

#[derive(Deserialize)]
struct FetchResponse {
    #[serde(default)]
    entries: HashMap<String, String>,
    #[serde(default)]
    state: Option<String>,
}

pub struct RemoteConfigClient {
    client: FirebaseClient,
}

impl RemoteConfigClient {
    pub fn new(client: FirebaseClient) -> Self {
        Self { client }
    }
}

impl RemoteConfigSource for RemoteConfigClient {
    async fn fetch(&self) -> Result<HashMap<String, String>> {
        let config = self.client.config();
        let endpoint = format!(
            "{}/projects/{}/namespaces/firebase:fetch?key={}",
            REMOTE_CONFIG_ROOT, config.project_id, config.api_key
        );
        let resp = self
            .client
            .http
            .post(endpoint)
            .json(&FetchRequest {
                app_id: &config.app_id,
                app_instance_id: &config.instance_id,
            })
            .send()
            .await?;
        let body: FetchResponse = check(resp).await?.json().await?;
        log::debug!(
            "remote config state {:?}, {} entries",
            body.state,
            body.entries.len()
        );
        Ok(body.entries)
    }
}
