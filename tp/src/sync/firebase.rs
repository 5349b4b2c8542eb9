//! Firebase Realtime Database backend
//!
//! Uses the REST API: `PUT {db}/{root}/{channel}.json` replaces the channel
//! document, and a `GET` on the same URL with `Accept: text/event-stream`
//! streams `put`/`patch` events that are folded into a cached copy of the
//! document.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest::header::ACCEPT;
use reqwest_eventsource::{Event, EventSource};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::{ChannelId, RemoteStore, RemoteStream, SyncError};

/// Body of a `put` or `patch` stream event
#[derive(Debug, Deserialize)]
struct StreamPayload {
    path: String,
    data: Value,
}

/// Realtime Database REST client
pub struct FirebaseRemote {
    http: Client,
    database_url: String,
    root: String,
    request_timeout: Duration,
}

impl FirebaseRemote {
    /// Create a client for `database_url`, storing channels under `root`
    ///
    /// The timeout applies to writes and to connection setup only, never to
    /// the long-lived event stream.
    pub fn new(database_url: &str, root: &str, timeout: Duration) -> Result<Self, SyncError> {
        debug!(%database_url, %root, ?timeout, "FirebaseRemote::new: called");
        let http = Client::builder().connect_timeout(timeout).build()?;
        Ok(Self {
            http,
            database_url: database_url.trim_end_matches('/').to_string(),
            root: root.trim_matches('/').to_string(),
            request_timeout: timeout,
        })
    }

    fn channel_url(&self, channel: &ChannelId) -> String {
        if self.root.is_empty() {
            format!("{}/{}.json", self.database_url, channel)
        } else {
            format!("{}/{}/{}.json", self.database_url, self.root, channel)
        }
    }
}

#[async_trait]
impl RemoteStore for FirebaseRemote {
    async fn write(&self, channel: &ChannelId, document: Value) -> Result<(), SyncError> {
        let url = self.channel_url(channel);
        debug!(%url, "FirebaseRemote::write: called");
        let response = self
            .http
            .put(&url)
            .timeout(self.request_timeout)
            .json(&document)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            debug!(%status, %message, "FirebaseRemote::write: rejected");
            return Err(SyncError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &ChannelId) -> Result<RemoteStream, SyncError> {
        let url = self.channel_url(channel);
        debug!(%url, "FirebaseRemote::subscribe: called");
        let request = self.http.get(&url).header(ACCEPT, "text/event-stream");
        let es = EventSource::new(request).map_err(|e| SyncError::Subscribe(e.to_string()))?;

        let state = StreamState {
            es,
            cache: None,
            done: false,
        };
        Ok(futures::stream::unfold(state, next_document).boxed())
    }

    fn name(&self) -> &'static str {
        "firebase"
    }
}

struct StreamState {
    es: EventSource,
    cache: Option<Value>,
    done: bool,
}

/// Pull events until one changes the document, then emit the whole document
async fn next_document(mut state: StreamState) -> Option<(Result<Option<Value>, SyncError>, StreamState)> {
    if state.done {
        return None;
    }
    while let Some(event) = state.es.next().await {
        match event {
            Ok(Event::Open) => {
                debug!("next_document: Event::Open");
            }
            Ok(Event::Message(msg)) => match msg.event.as_str() {
                "put" | "patch" => {
                    let payload: StreamPayload = match serde_json::from_str(&msg.data) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!(error = %e, "next_document: unreadable stream event, skipping");
                            continue;
                        }
                    };
                    if msg.event == "put" {
                        apply_put(&mut state.cache, &payload.path, payload.data);
                    } else {
                        apply_patch(&mut state.cache, &payload.path, payload.data);
                    }
                    let document = state.cache.clone();
                    return Some((Ok(document), state));
                }
                "keep-alive" => {
                    debug!("next_document: keep-alive");
                }
                "cancel" | "auth_revoked" => {
                    debug!(event = %msg.event, "next_document: stream cancelled by server");
                    state.es.close();
                    state.done = true;
                    let reason = format!("{}: {}", msg.event, msg.data);
                    return Some((Err(SyncError::Cancelled(reason)), state));
                }
                other => {
                    debug!(event = %other, "next_document: ignoring unknown event");
                }
            },
            Err(reqwest_eventsource::Error::StreamEnded) => {
                debug!("next_document: stream ended");
                return None;
            }
            Err(e) => {
                debug!(%e, "next_document: Event error");
                state.es.close();
                state.done = true;
                return Some((Err(SyncError::Subscribe(e.to_string())), state));
            }
        }
    }
    None
}

fn path_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Set the value at `path` inside the cached document; `null` deletes
pub fn apply_put(cache: &mut Option<Value>, path: &str, data: Value) {
    let segments = path_segments(path);
    let Some((last, parents)) = segments.split_last() else {
        *cache = if data.is_null() { None } else { Some(data) };
        return;
    };

    if data.is_null() && cache.is_none() {
        return;
    }
    let mut node = cache.get_or_insert_with(|| Value::Object(Map::new()));
    for segment in parents {
        node = child_mut(node, segment);
    }
    set_child(node, last, data);
}

/// Merge each key of `data` into the object at `path`
pub fn apply_patch(cache: &mut Option<Value>, path: &str, data: Value) {
    let base = path.trim_end_matches('/');
    match data {
        Value::Object(fields) => {
            for (key, value) in fields {
                apply_put(cache, &format!("{}/{}", base, key), value);
            }
        }
        other => apply_put(cache, path, other),
    }
}

/// Descend into `segment`, creating an object there if needed
fn child_mut<'a>(node: &'a mut Value, segment: &str) -> &'a mut Value {
    match (node, segment.parse::<usize>().ok()) {
        (Value::Array(items), Some(index)) => {
            if index >= items.len() {
                items.resize(index + 1, Value::Null);
            }
            let child = &mut items[index];
            if !child.is_object() && !child.is_array() {
                *child = Value::Object(Map::new());
            }
            child
        }
        (node, _) => {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            match node {
                Value::Object(fields) => {
                    let child = fields
                        .entry(segment.to_string())
                        .or_insert_with(|| Value::Object(Map::new()));
                    if !child.is_object() && !child.is_array() {
                        *child = Value::Object(Map::new());
                    }
                    child
                }
                other => other,
            }
        }
    }
}

fn set_child(node: &mut Value, segment: &str, data: Value) {
    if let Value::Array(items) = node
        && let Ok(index) = segment.parse::<usize>()
    {
        if data.is_null() {
            if index + 1 == items.len() {
                items.pop();
            } else if index < items.len() {
                items[index] = Value::Null;
            }
        } else {
            if index >= items.len() {
                items.resize(index + 1, Value::Null);
            }
            items[index] = data;
        }
        return;
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(fields) = node {
        if data.is_null() {
            fields.remove(segment);
        } else {
            fields.insert(segment.to_string(), data);
        }
    }
}
