use std::sync::Arc;

use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::{sleep, Duration};
use uuid::Uuid;

use crate::error::{DonationError, Result};
use crate::models::donation_models::DonationRecord;
use crate::sync_core::SyncCore;
use crate::utils::abandon::AbandonToken;
use crate::utils::local_cache::LocalCache;

/// Remote path of the scalar total.
const TOTAL_PATH: &str = "totalDonated";
/// Remote path of the append-only donation list.
const DONATIONS_PATH: &str = "donations";
/// Fixed retry interval while waiting for the remote store to answer.
const CONNECT_RETRY: Duration = Duration::from_millis(500);

/// How a donation ended up persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Record and total landed in the remote store.
    Remote,
    /// Remote store was unreachable; amount was added to the local cache.
    LocalFallback,
    /// Both the remote write and the local fallback failed.
    Failed,
}

/// Client for the shared realtime counter, reached over the database's REST
/// and streaming interface. Unauthenticated by design: the counter is a
/// shared, unvalidated number.
pub struct FirebaseCounterClient {
    http: Client,
    base_url: String,
    core: Arc<SyncCore>,
    cache: Arc<LocalCache>,
}

#[derive(Debug, Deserialize)]
struct StreamPayload {
    #[allow(dead_code)]
    path: String,
    data: Option<Value>,
}

fn value_to_total(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Feeds one line of the change stream into the event state machine.
/// Returns a new total when the line completes a `put`/`patch` event.
fn parse_stream_line(pending_event: &mut Option<String>, line: &str) -> Option<f64> {
    let line = line.trim_end_matches('\r');
    if line.is_empty() {
        *pending_event = None;
        return None;
    }
    if let Some(name) = line.strip_prefix("event:") {
        *pending_event = Some(name.trim().to_string());
        return None;
    }
    let data = line.strip_prefix("data:")?.trim();
    match pending_event.as_deref() {
        Some("put") | Some("patch") => {
            let payload: StreamPayload = serde_json::from_str(data).ok()?;
            // A null put means the counter was deleted remotely.
            Some(payload.data.as_ref().map(value_to_total).unwrap_or(0.0))
        }
        _ => None, // keep-alive, cancel, auth_revoked
    }
}

impl FirebaseCounterClient {
    pub fn new(base_url: &str, core: Arc<SyncCore>, cache: Arc<LocalCache>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            core,
            cache,
        }
    }

    fn value_url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path)
    }

    /// Connects to the remote store. Retries reads on a fixed interval until
    /// the store answers, then resolves the readiness signal exactly once
    /// and attaches the change-stream subscription. Idempotent: a second
    /// call after readiness is a no-op.
    pub async fn connect(self: Arc<Self>) {
        if self.core.is_ready() {
            return;
        }
        loop {
            match self.fetch_total().await {
                Ok(total) => {
                    self.core.set_total(total);
                    self.core.mark_ready();
                    tracing::info!("remote counter connected, total is {}", total);
                    break;
                }
                Err(e) => {
                    tracing::warn!("remote counter not available yet: {}", e);
                    sleep(CONNECT_RETRY).await;
                }
            }
        }
        let client = self.clone();
        tokio::spawn(async move {
            client.subscribe().await;
        });
    }

    async fn fetch_total(&self) -> Result<f64> {
        let response = self
            .http
            .get(self.value_url(TOTAL_PATH))
            .send()
            .await
            .map_err(|e| DonationError::RemoteUnavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(DonationError::RemoteUnavailable(format!(
                "total read returned {}",
                response.status()
            )));
        }
        let value: Value = response
            .json()
            .await
            .map_err(|e| DonationError::RemoteUnavailable(e.to_string()))?;
        Ok(value_to_total(&value))
    }

    /// Long-lived change subscription over the store's event stream. Every
    /// `put`/`patch` on the total lands here, including this client's own
    /// writes. On any stream error the client falls back to the local cache
    /// and does not resubscribe.
    async fn subscribe(self: Arc<Self>) {
        let response = match self
            .http
            .get(self.value_url(TOTAL_PATH))
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                self.on_stream_error(&format!("change stream returned {}", r.status()));
                return;
            }
            Err(e) => {
                self.on_stream_error(&e.to_string());
                return;
            }
        };

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut pending_event: Option<String> = None;

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    while let Some(newline) = buffer.find('\n') {
                        let line: String = buffer.drain(..=newline).collect();
                        if let Some(total) = parse_stream_line(&mut pending_event, &line) {
                            self.on_change(total);
                        }
                    }
                }
                Err(e) => {
                    self.on_stream_error(&e.to_string());
                    return;
                }
            }
        }
        self.on_stream_error("change stream closed");
    }

    fn on_change(&self, total: f64) {
        tracing::debug!("remote total changed to {}", total);
        self.core.set_total(total);
    }

    fn on_stream_error(&self, err: &str) {
        tracing::warn!("change stream lost, showing cached total: {}", err);
        self.core.set_total(self.cache.load_total());
    }

    /// Appends a donation record, then bumps the scalar total. When the
    /// backend never became ready, or any remote step fails, the amount is
    /// added to the local cache instead. Never raises past the returned
    /// outcome.
    ///
    /// The total bump is a read of the current value followed by a write of
    /// the sum, not a transaction. Two concurrent donors can read the same
    /// stale total and one increment is lost.
    pub async fn record_donation(
        &self,
        amount: f64,
        name: &str,
        email: &str,
        token: AbandonToken,
    ) -> PersistOutcome {
        if !self.core.is_ready() {
            tracing::warn!("remote backend never became ready, recording locally");
            return self.persist_local(amount, &token);
        }
        match self.persist_remote(amount, name, email).await {
            Ok(new_total) => {
                if token.is_abandoned() {
                    // The bounded wait already gave up on us; leave the
                    // shared total to the change stream.
                    tracing::debug!("remote save landed after abandonment, total {}", new_total);
                } else {
                    self.core.set_total(new_total);
                }
                PersistOutcome::Remote
            }
            Err(e) => {
                tracing::warn!("remote persist failed, using local cache: {}", e);
                self.persist_local(amount, &token)
            }
        }
    }

    fn persist_local(&self, amount: f64, token: &AbandonToken) -> PersistOutcome {
        match self.cache.add_to_total(amount) {
            Ok(new_total) => {
                if !token.is_abandoned() {
                    self.core.set_total(new_total);
                }
                PersistOutcome::LocalFallback
            }
            Err(cache_err) => {
                tracing::error!("local fallback also failed: {}", cache_err);
                PersistOutcome::Failed
            }
        }
    }

    async fn persist_remote(&self, amount: f64, name: &str, email: &str) -> Result<f64> {
        let record = DonationRecord::new(amount, name, email);
        let key = Uuid::new_v4().to_string();
        let response = self
            .http
            .put(self.value_url(&format!("{}/{}", DONATIONS_PATH, key)))
            .json(&record)
            .send()
            .await
            .map_err(|e| DonationError::RemoteWrite(e.to_string()))?;
        if !response.status().is_success() {
            return Err(DonationError::RemoteWrite(format!(
                "record append returned {}",
                response.status()
            )));
        }

        let current = self.fetch_total().await?;
        let new_total = current + amount;
        let response = self
            .http
            .put(self.value_url(TOTAL_PATH))
            .json(&new_total)
            .send()
            .await
            .map_err(|e| DonationError::RemoteWrite(e.to_string()))?;
        if !response.status().is_success() {
            return Err(DonationError::RemoteWrite(format!(
                "total write returned {}",
                response.status()
            )));
        }
        Ok(new_total)
    }
}

#[async_trait::async_trait]
impl crate::donation_flow::DonationPersistence for FirebaseCounterClient {
    async fn record_donation(
        &self,
        amount: f64,
        name: &str,
        email: &str,
        token: AbandonToken,
    ) -> PersistOutcome {
        FirebaseCounterClient::record_donation(self, amount, name, email, token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_put_event_yields_new_total() {
        let mut pending = None;
        assert_eq!(parse_stream_line(&mut pending, "event: put"), None);
        assert_eq!(
            parse_stream_line(&mut pending, r#"data: {"path":"/","data":1050}"#),
            Some(1050.0)
        );
    }

    #[test]
    fn keep_alive_events_are_ignored() {
        let mut pending = None;
        assert_eq!(parse_stream_line(&mut pending, "event: keep-alive"), None);
        assert_eq!(parse_stream_line(&mut pending, "data: null"), None);
    }

    #[test]
    fn null_put_reads_as_zero() {
        let mut pending = None;
        parse_stream_line(&mut pending, "event: put");
        assert_eq!(
            parse_stream_line(&mut pending, r#"data: {"path":"/","data":null}"#),
            Some(0.0)
        );
    }

    #[test]
    fn blank_line_resets_the_event_state() {
        let mut pending = None;
        parse_stream_line(&mut pending, "event: put");
        parse_stream_line(&mut pending, "");
        assert_eq!(
            parse_stream_line(&mut pending, r#"data: {"path":"/","data":5}"#),
            None
        );
    }

    #[test]
    fn totals_parse_from_numbers_and_strings() {
        assert_eq!(value_to_total(&serde_json::json!(1050)), 1050.0);
        assert_eq!(value_to_total(&serde_json::json!("1050.5")), 1050.5);
        assert_eq!(value_to_total(&serde_json::json!(null)), 0.0);
        assert_eq!(value_to_total(&serde_json::json!({"nested": 1})), 0.0);
    }

    use axum::extract::{Path as UrlPath, State};
    use axum::routing::{get, put};
    use axum::{Json, Router};
    use std::sync::Mutex;

    /// Minimal stand-in for the realtime store's REST surface.
    #[derive(Default)]
    struct FakeStore {
        total: Mutex<f64>,
        records: Mutex<Vec<DonationRecord>>,
    }

    async fn spawn_fake_store(initial_total: f64) -> (String, Arc<FakeStore>) {
        let store = Arc::new(FakeStore {
            total: Mutex::new(initial_total),
            records: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route(
                "/totalDonated.json",
                get(|State(s): State<Arc<FakeStore>>| async move {
                    Json(serde_json::json!(*s.total.lock().unwrap()))
                })
                .put(
                    |State(s): State<Arc<FakeStore>>, Json(value): Json<f64>| async move {
                        *s.total.lock().unwrap() = value;
                        Json(serde_json::json!(value))
                    },
                ),
            )
            .route(
                "/donations/{key}",
                put(
                    |State(s): State<Arc<FakeStore>>,
                     UrlPath(_key): UrlPath<String>,
                     Json(record): Json<DonationRecord>| async move {
                        s.records.lock().unwrap().push(record);
                        Json(serde_json::json!({"ok": true}))
                    },
                ),
            )
            .with_state(store.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), store)
    }

    fn temp_cache() -> Arc<LocalCache> {
        let dir = std::env::temp_dir().join(format!("donation-remote-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        Arc::new(LocalCache::new(&dir))
    }

    #[tokio::test]
    async fn donation_appends_record_and_bumps_total() {
        let (base_url, store) = spawn_fake_store(1000.0).await;
        let core = Arc::new(SyncCore::new(2399.0, 0.0));
        core.mark_ready();
        let client = FirebaseCounterClient::new(&base_url, core.clone(), temp_cache());

        let outcome = client
            .record_donation(50.0, "Ada", "ada@example.com", AbandonToken::default())
            .await;

        assert_eq!(outcome, PersistOutcome::Remote);
        assert_eq!(*store.total.lock().unwrap(), 1050.0);
        let records = store.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amount, 50.0);
        assert_eq!(records[0].email, "ada@example.com");
        assert_eq!(core.total(), 1050.0);
    }

    #[tokio::test]
    async fn remote_failure_falls_back_to_the_local_cache() {
        let core = Arc::new(SyncCore::new(2399.0, 1000.0));
        core.mark_ready();
        let cache = temp_cache();
        cache.save_total(1000.0).unwrap();
        // Nothing listens here; every request fails.
        let client = FirebaseCounterClient::new("http://127.0.0.1:1", core.clone(), cache.clone());

        let outcome = client
            .record_donation(50.0, "Ada", "ada@example.com", AbandonToken::default())
            .await;

        assert_eq!(outcome, PersistOutcome::LocalFallback);
        assert_eq!(cache.load_total(), 1050.0);
        assert_eq!(core.total(), 1050.0);
    }

    #[tokio::test]
    async fn abandoned_save_does_not_touch_the_shared_total() {
        let (base_url, store) = spawn_fake_store(1000.0).await;
        let core = Arc::new(SyncCore::new(2399.0, 1000.0));
        core.mark_ready();
        let client = FirebaseCounterClient::new(&base_url, core.clone(), temp_cache());

        let token = AbandonToken::default();
        token.abandon();
        let outcome = client
            .record_donation(50.0, "Ada", "ada@example.com", token)
            .await;

        // The write itself still lands; only the in-memory figure is left
        // to the change stream.
        assert_eq!(outcome, PersistOutcome::Remote);
        assert_eq!(*store.total.lock().unwrap(), 1050.0);
        assert_eq!(core.total(), 1000.0);
    }

    #[tokio::test]
    async fn writes_before_readiness_go_straight_to_the_cache() {
        let (base_url, store) = spawn_fake_store(1000.0).await;
        let core = Arc::new(SyncCore::new(2399.0, 0.0));
        let cache = temp_cache();
        let client = FirebaseCounterClient::new(&base_url, core.clone(), cache.clone());

        let outcome = client
            .record_donation(50.0, "Ada", "ada@example.com", AbandonToken::default())
            .await;

        assert_eq!(outcome, PersistOutcome::LocalFallback);
        assert!(store.records.lock().unwrap().is_empty());
        assert_eq!(cache.load_total(), 50.0);
        assert_eq!(core.total(), 50.0);
    }

    #[tokio::test]
    async fn connect_seeds_the_total_and_resolves_readiness() {
        let (base_url, _store) = spawn_fake_store(777.0).await;
        let core = Arc::new(SyncCore::new(2399.0, 0.0));
        let client = Arc::new(FirebaseCounterClient::new(
            &base_url,
            core.clone(),
            temp_cache(),
        ));

        client.connect().await;

        assert!(core.is_ready());
        assert_eq!(core.total(), 777.0);
    }
}
