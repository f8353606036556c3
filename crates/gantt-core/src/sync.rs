use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, bail};
use gantt_shared::SyncPayload;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::ordering::OrderSnapshot;

impl From<&OrderSnapshot> for SyncPayload {
    fn from(snapshot: &OrderSnapshot) -> Self {
        Self {
            categories: snapshot.categories.clone(),
            subcategories: snapshot.subcategories.clone(),
            tasks: snapshot
                .tasks
                .iter()
                .map(|(key, ids)| (key.clone(), ids.iter().map(ToString::to_string).collect()))
                .collect(),
            expanded_categories: snapshot.expanded_categories.iter().cloned().collect(),
            expanded_subcategories: snapshot.expanded_subcategories.iter().cloned().collect(),
        }
    }
}

/// Destination of an explicit bulk save.
pub trait SyncSink {
    fn submit(&self, payload: &SyncPayload) -> impl Future<Output = anyhow::Result<()>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Saved { categories: usize, buckets: usize },
    /// Another save is still in flight.
    Busy,
    Failed { message: String },
}

impl SyncOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

/// User-triggered, one-shot save of the whole ordering state. At most one
/// submission runs at a time and failures are never retried.
#[derive(Debug)]
pub struct BulkSync<K> {
    sink: K,
    busy: AtomicBool,
}

impl<K: SyncSink> BulkSync<K> {
    pub fn new(sink: K) -> Self {
        Self {
            sink,
            busy: AtomicBool::new(false),
        }
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    #[tracing::instrument(skip_all)]
    pub async fn save(&self, snapshot: &OrderSnapshot) -> SyncOutcome {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("bulk save already in flight; ignoring request");
            return SyncOutcome::Busy;
        }

        let _guard = BusyGuard(&self.busy);

        let payload = SyncPayload::from(snapshot);
        let result = self.sink.submit(&payload).await;

        match result {
            Ok(()) => {
                info!(
                    categories = payload.categories.len(),
                    buckets = payload.tasks.len(),
                    "bulk save completed"
                );
                SyncOutcome::Saved {
                    categories: payload.categories.len(),
                    buckets: payload.tasks.len(),
                }
            }
            Err(err) => {
                let message = format!("{err:#}");
                error!(error = %message, "bulk save failed");
                SyncOutcome::Failed { message }
            }
        }
    }
}

/// Clears the busy flag however the save ends, including the future being
/// dropped mid-submission.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Posts the payload as JSON to the persistence endpoint.
#[derive(Debug, Clone)]
pub struct HttpSyncSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSyncSink {
    pub fn new(endpoint: impl Into<String>) -> anyhow::Result<Self> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            bail!("sync endpoint URL is empty");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed building HTTP client for bulk save")?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl SyncSink for HttpSyncSink {
    async fn submit(&self, payload: &SyncPayload) -> anyhow::Result<()> {
        let body = serde_json::to_vec(payload).context("failed serializing sync payload")?;
        let response = self
            .client
            .post(self.endpoint.as_str())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .with_context(|| format!("failed posting ordering to {}", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("bulk save returned HTTP {status}: {}", text.trim());
        }
        Ok(())
    }
}

/// In-process backing store. Each payload key overwrites its previous value,
/// so resubmitting a snapshot leaves the same state behind.
#[derive(Debug, Default)]
pub struct MemorySyncSink {
    entries: Mutex<BTreeMap<String, serde_json::Value>>,
    display_orders: Mutex<BTreeMap<String, i64>>,
    submissions: Mutex<usize>,
}

impl MemorySyncSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> BTreeMap<String, serde_json::Value> {
        self.entries.lock().clone()
    }

    pub fn display_orders(&self) -> BTreeMap<String, i64> {
        self.display_orders.lock().clone()
    }

    pub fn submissions(&self) -> usize {
        *self.submissions.lock()
    }
}

impl SyncSink for MemorySyncSink {
    async fn submit(&self, payload: &SyncPayload) -> anyhow::Result<()> {
        let value = serde_json::to_value(payload).context("failed serializing sync payload")?;
        let serde_json::Value::Object(fields) = value else {
            bail!("sync payload did not serialize to an object");
        };

        let mut entries = self.entries.lock();
        for (key, value) in fields {
            entries.insert(key, value);
        }
        *self.display_orders.lock() = payload.display_orders();
        *self.submissions.lock() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskId;

    struct FailingSink;

    impl SyncSink for FailingSink {
        async fn submit(&self, _payload: &SyncPayload) -> anyhow::Result<()> {
            bail!("backend unavailable")
        }
    }

    struct HangingSink;

    impl SyncSink for HangingSink {
        async fn submit(&self, _payload: &SyncPayload) -> anyhow::Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn snapshot() -> OrderSnapshot {
        let mut snapshot = OrderSnapshot {
            categories: vec!["Dev".to_string()],
            ..OrderSnapshot::default()
        };
        snapshot
            .subcategories
            .insert("Dev".to_string(), vec!["BE".to_string()]);
        snapshot.tasks.insert(
            "Dev::BE".to_string(),
            vec![TaskId::from("b"), TaskId::from("a")],
        );
        snapshot.expanded_categories.insert("Dev".to_string());
        snapshot
    }

    #[tokio::test]
    async fn repeated_save_is_idempotent() {
        let sync = BulkSync::new(MemorySyncSink::new());
        let snapshot = snapshot();

        assert!(sync.save(&snapshot).await.is_saved());
        let after_first = sync.sink().entries();
        assert!(sync.save(&snapshot).await.is_saved());

        assert_eq!(sync.sink().entries(), after_first);
        assert_eq!(sync.sink().entries().len(), 5);
        assert_eq!(sync.sink().submissions(), 2);
        assert_eq!(sync.sink().display_orders()["b"], 0);
        assert_eq!(
            after_first["tasks"]["Dev::BE"],
            serde_json::json!(["b", "a"])
        );
    }

    #[tokio::test]
    async fn failure_is_reported_and_flag_released() {
        let sync = BulkSync::new(FailingSink);
        let outcome = sync.save(&snapshot()).await;
        match outcome {
            SyncOutcome::Failed { message } => assert!(message.contains("backend unavailable")),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(!sync.is_busy());
    }

    #[tokio::test]
    async fn overlapping_save_reports_busy() {
        let sync = BulkSync::new(MemorySyncSink::new());
        sync.busy.store(true, Ordering::Release);
        assert_eq!(sync.save(&snapshot()).await, SyncOutcome::Busy);
        assert_eq!(sync.sink().submissions(), 0);
    }

    #[test]
    fn dropped_save_releases_the_flag() {
        use std::task::{Context as TaskContext, Poll, Waker};

        let sync = BulkSync::new(HangingSink);
        let snapshot = snapshot();
        let mut save = Box::pin(sync.save(&snapshot));
        let mut cx = TaskContext::from_waker(Waker::noop());
        assert!(matches!(save.as_mut().poll(&mut cx), Poll::Pending));
        assert!(sync.is_busy());

        drop(save);
        assert!(!sync.is_busy());
    }

    #[test]
    fn payload_mirrors_snapshot() {
        let payload = SyncPayload::from(&snapshot());
        assert_eq!(payload.expanded_categories, vec!["Dev".to_string()]);
        assert!(payload.expanded_subcategories.is_empty());
        assert_eq!(payload.tasks["Dev::BE"], vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn http_sink_requires_endpoint() {
        assert!(HttpSyncSink::new("  ").is_err());
    }
}
