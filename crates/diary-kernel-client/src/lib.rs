//! Remote-client side of the host/client pairing: a [`RecordStore`] that
//! proxies every operation to the host server over HTTP, plus the long-poll
//! loop that is this process's only path to learning about host-native
//! writes.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;

use diary_kernel_core::{
    Category, ChangeBus, ChangeEvent, OpRequest, Provenance, RecordStore,
};

/// How long the server may hold a poll open; the read timeout stays above it.
const POLL_READ_TIMEOUT: Duration = Duration::from_secs(40);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Opaque per-process client identifier, generated once at startup and sent
/// with every request so the host can suppress this client's own echoes.
#[must_use]
pub fn new_client_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Record store proxied over HTTP: each operation becomes one POST of the
/// `{kind, storeName, id?, data?}` envelope. There is no local persistence
/// and no automatic retry; a failed request is a failed operation and the
/// caller decides what to do with it.
pub struct RemoteStore {
    agent: ureq::Agent,
    base_url: String,
    client_id: String,
}

impl RemoteStore {
    #[must_use]
    pub fn new(base_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build();
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
        }
    }

    fn post(&self, request: &OpRequest) -> Result<Value> {
        let url = format!("{}/?id={}", self.base_url, self.client_id);
        let response = self
            .agent
            .post(&url)
            .send_json(request)
            .with_context(|| format!("repository request to {} failed", self.base_url))?;
        response.into_json().context("malformed repository response")
    }
}

impl RecordStore for RemoteStore {
    fn get_all(&self, category: Category) -> Result<Vec<Value>> {
        let result = self.post(&OpRequest::get_all(category))?;
        serde_json::from_value(result).context("expected a record list")
    }

    fn get(&self, category: Category, id: &str) -> Result<Option<Value>> {
        let result = self.post(&OpRequest::get(category, id))?;
        Ok(match result {
            Value::Null => None,
            found => Some(found),
        })
    }

    fn insert(&self, category: Category, record: &Value) -> Result<()> {
        self.post(&OpRequest::insert(category, record.clone()))?;
        Ok(())
    }

    fn update(&self, category: Category, id: &str, record: &Value) -> Result<()> {
        self.post(&OpRequest::update(category, id, record.clone()))?;
        Ok(())
    }

    fn remove(&self, category: Category, id: &str) -> Result<()> {
        self.post(&OpRequest::delete(category, id))?;
        Ok(())
    }

    fn import(&self, category: Category, records: &[Value]) -> Result<()> {
        self.post(&OpRequest::import(category, records.to_vec()))?;
        Ok(())
    }
}

fn parse_categories(names: &[String]) -> Vec<Category> {
    names
        .iter()
        .filter_map(|name| {
            let category = Category::parse(name);
            if category.is_none() {
                tracing::warn!(name, "ignoring change notification for unknown category");
            }
            category
        })
        .collect()
}

/// The long-poll loop: issue `GET /events?id=<clientId>`, re-publish each
/// returned category on the local bus as a host-native change, then
/// immediately re-issue; back off a fixed delay after a failure. The loop
/// runs for the lifetime of the process; there is no cancellation.
pub struct EventPoller {
    agent: ureq::Agent,
    base_url: String,
    client_id: String,
    bus: Arc<ChangeBus>,
    retry_delay: Duration,
}

impl EventPoller {
    #[must_use]
    pub fn new(base_url: impl Into<String>, client_id: impl Into<String>, bus: Arc<ChangeBus>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(POLL_READ_TIMEOUT)
            .build();
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            bus,
            retry_delay: RETRY_DELAY,
        }
    }

    /// One blocking poll round. An empty list is a normal timeout, not an
    /// error.
    ///
    /// # Errors
    /// Returns an error on transport failure or a malformed response body.
    pub fn poll_once(&self) -> Result<Vec<Category>> {
        let url = format!("{}/events?id={}", self.base_url, self.client_id);
        let names: Vec<String> = self
            .agent
            .get(&url)
            .call()
            .with_context(|| format!("event poll to {} failed", self.base_url))?
            .into_json()
            .context("malformed event poll response")?;
        Ok(parse_categories(&names))
    }

    /// Re-publish polled categories locally. The server already excluded
    /// this client's own writes, so everything arriving here is foreign and
    /// carried on behalf of the host.
    pub fn publish(&self, categories: &[Category]) {
        for category in categories {
            self.bus.publish(&ChangeEvent::new(Provenance::HostNative, *category));
        }
    }

    pub fn run(self) {
        loop {
            match self.poll_once() {
                Ok(categories) => {
                    if !categories.is_empty() {
                        tracing::debug!(count = categories.len(), "change notifications received");
                    }
                    self.publish(&categories);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "event poll failed, backing off");
                    std::thread::sleep(self.retry_delay);
                }
            }
        }
    }

    /// Run the loop on a dedicated background thread.
    ///
    /// # Errors
    /// Returns an error when the thread cannot be spawned.
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("event-poller".to_string())
            .spawn(move || self.run())
            .context("failed to spawn event poller thread")
    }
}
