use crate::api::client::{check, FirebaseClient};
use crate::api::events::ChildEvent;
use crate::api::models::Message;
use crate::error::Result;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use tokio::sync::mpsc;
use url::Url;

/// Root node holding all chat messages.
pub const MESSAGES_PATH: &str = "messages";

const EVENT_BUFFER: usize = 64;

/// The message collection as seen by the feed synchronizer.
pub trait MessageStore: Send + Sync + 'static {
    /// Opens a child-event stream on the message collection. The stream ends
    /// when the receiver is dropped or the backend cancels it.
    fn listen(&self) -> impl Future<Output = Result<mpsc::Receiver<ChildEvent>>> + Send;

    /// Writes `message` under a backend-generated key and returns that key.
    fn push(&self, message: &Message) -> impl Future<Output = Result<String>> + Send;
}

#[derive(Deserialize)]
struct PushResponse {
    name: String,
}

/// Realtime database REST client: writes via `POST`, reads via the
/// `text/event-stream` streaming endpoint.
#[derive(Clone)]
pub struct RealtimeDatabase {
    client: FirebaseClient,
    root: Url,
}

impl RealtimeDatabase {
    pub fn new(client: FirebaseClient) -> Result<Self> {
        let root = Url::parse(&crate::utils::normalize_url(&client.config().database_url))?;
        Ok(Self { client, root })
    }

    fn node_url(&self, path: &str) -> Result<Url> {
        let mut url = self.root.join(&format!("{}.json", path))?;
        if let Some(token) = self.client.id_token() {
            url.query_pairs_mut().append_pair("auth", &token);
        }
        Ok(url)
    }
}

impl MessageStore for RealtimeDatabase {
    async fn listen(&self) -> Result<mpsc::Receiver<ChildEvent>> {
        let url = self.node_url(MESSAGES_PATH)?;
        let resp = self
            .client
            .http
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let resp = check(resp).await?;
        log::debug!("listening on /{}", MESSAGES_PATH);

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(async move {
            let mut stream = resp.bytes_stream();
            let mut decoder = SseDecoder::default();
            let mut mapper = ChildEventMapper::default();
            loop {
                let chunk = tokio::select! {
                    _ = tx.closed() => return,
                    chunk = stream.next() => chunk,
                };
                let chunk = match chunk {
                    Some(Ok(chunk)) => chunk,
                    Some(Err(e)) => {
                        let _ = tx.send(ChildEvent::Cancelled(e.to_string())).await;
                        return;
                    }
                    None => {
                        let _ = tx.send(ChildEvent::Cancelled("stream ended".into())).await;
                        return;
                    }
                };
                for sse in decoder.push(&chunk) {
                    let events = match mapper.map(&sse) {
                        Ok(events) => events,
                        Err(e) => {
                            log::warn!("skipping malformed {} event: {}", sse.event, e);
                            continue;
                        }
                    };
                    for event in events {
                        let last = matches!(event, ChildEvent::Cancelled(_));
                        if tx.send(event).await.is_err() || last {
                            return;
                        }
                    }
                }
            }
        });
        Ok(rx)
    }

    async fn push(&self, message: &Message) -> Result<String> {
        let url = self.node_url(MESSAGES_PATH)?;
        let resp = self.client.http.post(url).json(message).send().await?;
        let PushResponse { name } = check(resp).await?.json().await?;
        Ok(name)
    }
}

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Incremental `text/event-stream` decoder; chunks may split lines anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    out.push(event);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }
            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }
        out
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if event.is_none() && self.data.is_empty() {
            return None;
        }
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".into()),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

#[derive(Deserialize)]
struct StreamPayload {
    path: String,
    data: Value,
}

/// Turns `put`/`patch` stream events on a collection into per-child events.
/// Tracks which children have been seen so a re-put reads as a change.
#[derive(Debug, Default)]
pub struct ChildEventMapper {
    known: HashSet<String>,
}

impl ChildEventMapper {
    pub fn map(&mut self, sse: &SseEvent) -> Result<Vec<ChildEvent>> {
        match sse.event.as_str() {
            "put" => {
                let payload: StreamPayload = serde_json::from_str(&sse.data)?;
                Ok(self.put(&payload.path, payload.data))
            }
            "patch" => {
                let payload: StreamPayload = serde_json::from_str(&sse.data)?;
                Ok(self.patch(&payload.path, payload.data))
            }
            "keep-alive" => Ok(Vec::new()),
            "cancel" | "auth_revoked" => Ok(vec![ChildEvent::Cancelled(format!(
                "{}: {}",
                sse.event, sse.data
            ))]),
            other => {
                log::debug!("ignoring stream event {}", other);
                Ok(Vec::new())
            }
        }
    }

    fn put(&mut self, path: &str, data: Value) -> Vec<ChildEvent> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] => {
                let incoming = children(data);
                let mut gone: Vec<String> = self
                    .known
                    .iter()
                    .filter(|k| !incoming.contains_key(*k))
                    .cloned()
                    .collect();
                gone.sort();
                let mut events = Vec::new();
                for key in gone {
                    self.known.remove(&key);
                    events.push(ChildEvent::Removed { key });
                }
                for (key, value) in incoming {
                    events.extend(self.set_child(key, value));
                }
                events
            }
            [key] => self.set_child(key.to_string(), data),
            [key, ..] if self.known.contains(*key) => vec![ChildEvent::Changed {
                key: key.to_string(),
            }],
            _ => Vec::new(),
        }
    }

    fn patch(&mut self, path: &str, data: Value) -> Vec<ChildEvent> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] => children(data)
                .into_iter()
                .flat_map(|(key, value)| self.set_child(key, value))
                .collect(),
            [key, ..] if self.known.contains(*key) => vec![ChildEvent::Changed {
                key: key.to_string(),
            }],
            _ => Vec::new(),
        }
    }

    fn set_child(&mut self, key: String, value: Value) -> Vec<ChildEvent> {
        if value.is_null() {
            if self.known.remove(&key) {
                return vec![ChildEvent::Removed { key }];
            }
            return Vec::new();
        }
        if self.known.insert(key.clone()) {
            vec![ChildEvent::Added { key, value }]
        } else {
            vec![ChildEvent::Changed { key }]
        }
    }
}

// Push keys sort chronologically, so key order is creation order.
fn children(data: Value) -> BTreeMap<String, Value> {
    match data {
        Value::Object(map) => map.into_iter().collect(),
        _ => BTreeMap::new(),
    }
}
