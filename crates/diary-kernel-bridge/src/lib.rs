//! The process boundary between the embedded host and the view it hosts is
//! crossable only by synchronous string-in/string-out calls, so this crate
//! models it as two explicit interfaces: [`HostCalls`], the synchronous
//! request/response surface, and [`CallbackRegistry`], the token-keyed
//! callback side channel used by long-running host operations that report
//! back later (possibly several times) through the single well-known
//! [`ClientHook::call_fn`] entry point.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use serde_json::Value;

use diary_kernel_core::{
    Category, ChangeBus, ChangeEvent, ListenerId, Provenance, RecordStore, RepoError,
};
use diary_kernel_store_sqlite::SqliteStore;

/// The named functions the host exposes into the embedded view's scope.
/// Every payload crossing this surface is JSON text, encoded on the way in
/// and parsed on the way out.
pub trait HostCalls: Send + Sync {
    /// # Errors
    /// Fails when the store name is unknown or the host store read fails.
    fn repo_get_all(&self, store_name: &str) -> Result<String>;

    /// Returns `"null"` when the record does not exist.
    ///
    /// # Errors
    /// Fails when the store name is unknown or the host store read fails.
    fn repo_get(&self, store_name: &str, id: &str) -> Result<String>;

    /// # Errors
    /// Fails when the payload is malformed or the host store write fails.
    fn repo_insert(&self, store_name: &str, data: &str) -> Result<()>;

    /// # Errors
    /// Fails when the payload is malformed or the host store write fails.
    fn repo_update(&self, store_name: &str, id: &str, data: &str) -> Result<()>;

    /// # Errors
    /// Fails when the store name is unknown or the host store write fails.
    fn repo_delete(&self, store_name: &str, id: &str) -> Result<()>;

    /// # Errors
    /// Fails when the payload is malformed or the bulk replace fails.
    fn repo_import(&self, store_name: &str, data: &str) -> Result<()>;

    /// Write a text file into the host's downloads area, overwriting an
    /// existing file of the same name.
    ///
    /// # Errors
    /// Fails when the file cannot be written.
    fn export(&self, data: &str, file_name: &str) -> Result<()>;

    /// # Errors
    /// Fails when the host has no media support attached.
    fn record_video(&self, token: &str) -> Result<()>;

    /// # Errors
    /// Fails when the host has no media support attached.
    fn upload_video(&self, token: &str) -> Result<()>;

    /// # Errors
    /// Fails when the host has no media support attached.
    fn compress_video(&self, name: &str, token: &str) -> Result<()>;
}

/// The two well-known entry points the host invokes on the embedded view:
/// the change-notification push and the callback-token dispatcher.
pub trait ClientHook: Send + Sync {
    fn data_changed(&self, origin: &str, store_name: &str);
    fn call_fn(&self, token: &str, args: &[Value]);
}

/// Media capture and transcoding are external collaborators; the host shell
/// plugs its implementation in here. Only the token plumbing is modeled.
pub trait MediaHost: Send + Sync {
    /// # Errors
    /// Implementation defined.
    fn record_video(&self, token: &str) -> Result<()>;

    /// # Errors
    /// Implementation defined.
    fn upload_video(&self, token: &str) -> Result<()>;

    /// # Errors
    /// Implementation defined.
    fn compress_video(&self, name: &str, token: &str) -> Result<()>;
}

/// Placeholder for hosts without media support.
pub struct NoMediaHost;

impl MediaHost for NoMediaHost {
    fn record_video(&self, _token: &str) -> Result<()> {
        Err(anyhow::anyhow!("no media host attached"))
    }

    fn upload_video(&self, _token: &str) -> Result<()> {
        Err(anyhow::anyhow!("no media host attached"))
    }

    fn compress_video(&self, _name: &str, _token: &str) -> Result<()> {
        Err(anyhow::anyhow!("no media host attached"))
    }
}

fn category(store_name: &str) -> Result<Category, RepoError> {
    Category::parse(store_name).ok_or_else(|| RepoError::UnknownCategory(store_name.to_string()))
}

/// Host side of the bridge: serves the [`HostCalls`] surface from the
/// host-native store. Writes arriving here originate from the embedded view
/// and are tagged host-native, exactly like writes from the host's own UI.
pub struct HostBridge {
    store: Arc<SqliteStore>,
    media: Arc<dyn MediaHost>,
    downloads_dir: PathBuf,
}

impl HostBridge {
    #[must_use]
    pub fn new(store: Arc<SqliteStore>, media: Arc<dyn MediaHost>, downloads_dir: PathBuf) -> Self {
        Self { store, media, downloads_dir }
    }
}

impl HostCalls for HostBridge {
    fn repo_get_all(&self, store_name: &str) -> Result<String> {
        let records = self.store.get_all(category(store_name)?)?;
        serde_json::to_string(&records).context("failed to encode records")
    }

    fn repo_get(&self, store_name: &str, id: &str) -> Result<String> {
        let record = self.store.get(category(store_name)?, id)?;
        serde_json::to_string(&record).context("failed to encode record")
    }

    fn repo_insert(&self, store_name: &str, data: &str) -> Result<()> {
        let record: Value = serde_json::from_str(data).context("malformed record payload")?;
        self.store.insert(category(store_name)?, &record, &Provenance::HostNative)
    }

    fn repo_update(&self, store_name: &str, id: &str, data: &str) -> Result<()> {
        let record: Value = serde_json::from_str(data).context("malformed record payload")?;
        self.store.update(category(store_name)?, id, &record, &Provenance::HostNative)
    }

    fn repo_delete(&self, store_name: &str, id: &str) -> Result<()> {
        self.store.remove(category(store_name)?, id, &Provenance::HostNative)
    }

    fn repo_import(&self, store_name: &str, data: &str) -> Result<()> {
        let records: Vec<Value> = serde_json::from_str(data).context("malformed import payload")?;
        self.store.import(category(store_name)?, &records, &Provenance::HostNative)
    }

    fn export(&self, data: &str, file_name: &str) -> Result<()> {
        fs::create_dir_all(&self.downloads_dir).with_context(|| {
            format!("failed to create downloads directory {}", self.downloads_dir.display())
        })?;
        let path = self.downloads_dir.join(file_name);
        fs::write(&path, data)
            .with_context(|| format!("failed to write export file {}", path.display()))?;
        tracing::info!(path = %path.display(), "exported data file");
        Ok(())
    }

    fn record_video(&self, token: &str) -> Result<()> {
        self.media.record_video(token)
    }

    fn upload_video(&self, token: &str) -> Result<()> {
        self.media.upload_video(token)
    }

    fn compress_video(&self, name: &str, token: &str) -> Result<()> {
        self.media.compress_video(name, token)
    }
}

/// Subscribe a forwarder that pushes every bus event into the embedded
/// view's `data_changed` entry point. Echo suppression happens on the
/// receiving side (see [`republish_if_foreign`]).
pub fn forward_changes(bus: &ChangeBus, hook: Arc<dyn ClientHook>) -> ListenerId {
    bus.subscribe(None, move |event| {
        hook.data_changed(event.provenance.origin_str(), event.category.as_str());
    })
}

/// Receiving side of a forwarded change notification: re-publish on the
/// local bus only when the event did not originate from this side. Returns
/// whether the event was re-published.
///
/// # Errors
/// Fails when the origin tag or store name is unknown.
pub fn republish_if_foreign(
    bus: &ChangeBus,
    local: &Provenance,
    origin: &str,
    store_name: &str,
) -> Result<bool> {
    let category = category(store_name)?;
    let provenance = Provenance::parse_origin(origin, None)
        .ok_or_else(|| RepoError::Codec(format!("unknown change origin: {origin}")))?;

    let event = ChangeEvent::new(provenance, category);
    if event.is_foreign_to(local) {
        bus.publish(&event);
        Ok(true)
    } else {
        Ok(false)
    }
}

/// View side of the bridge: a [`RecordStore`] whose every operation is a
/// synchronous host call, JSON-text-encoded on the way in and parsed on the
/// way out. Simple operations do not suspend.
pub struct BridgeStore {
    host: Arc<dyn HostCalls>,
}

impl BridgeStore {
    #[must_use]
    pub fn new(host: Arc<dyn HostCalls>) -> Self {
        Self { host }
    }
}

impl RecordStore for BridgeStore {
    fn get_all(&self, category: Category) -> Result<Vec<Value>> {
        let raw = self.host.repo_get_all(category.as_str())?;
        serde_json::from_str(&raw).context("malformed record list from host")
    }

    fn get(&self, category: Category, id: &str) -> Result<Option<Value>> {
        let raw = self.host.repo_get(category.as_str(), id)?;
        let value: Value = serde_json::from_str(&raw).context("malformed record from host")?;
        Ok(match value {
            Value::Null => None,
            found => Some(found),
        })
    }

    fn insert(&self, category: Category, record: &Value) -> Result<()> {
        let data = serde_json::to_string(record).context("failed to encode record")?;
        self.host.repo_insert(category.as_str(), &data)
    }

    fn update(&self, category: Category, id: &str, record: &Value) -> Result<()> {
        let data = serde_json::to_string(record).context("failed to encode record")?;
        self.host.repo_update(category.as_str(), id, &data)
    }

    fn remove(&self, category: Category, id: &str) -> Result<()> {
        self.host.repo_delete(category.as_str(), id)
    }

    fn import(&self, category: Category, records: &[Value]) -> Result<()> {
        let data = serde_json::to_string(records).context("failed to encode records")?;
        self.host.repo_import(category.as_str(), &data)
    }
}

/// What a pending callback answers after each delivery: keep waiting for
/// more progress calls, or treat this delivery as terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackDisposition {
    Retain,
    Complete,
}

type PendingCallback = Box<dyn FnMut(&[Value]) -> CallbackDisposition + Send>;

/// Pending callbacks for long-running host operations, keyed by generated
/// opaque tokens. A callback stays registered across progress deliveries and
/// is removed once it reports its completion predicate satisfied.
///
/// There is no cancellation primitive: [`CallbackRegistry::forget`] stops
/// further dispatch but does not abort the in-flight host operation.
#[derive(Default)]
pub struct CallbackRegistry {
    pending: Mutex<HashMap<String, PendingCallback>>,
}

impl CallbackRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a callback and return the token to pass into the host call.
    pub fn register<F>(&self, callback: F) -> String
    where
        F: FnMut(&[Value]) -> CallbackDisposition + Send + 'static,
    {
        let token = uuid::Uuid::new_v4().to_string();
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.insert(token.clone(), Box::new(callback));
        token
    }

    /// Deliver one `call_fn` invocation to the callback registered under
    /// `token`. Returns `false` when no callback is registered (unknown
    /// token, or already completed).
    pub fn dispatch(&self, token: &str, args: &[Value]) -> bool {
        // The callback runs outside the lock so it may register follow-ups.
        let mut callback = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            match pending.remove(token) {
                Some(callback) => callback,
                None => {
                    tracing::warn!(token, "dropping callback delivery for unknown token");
                    return false;
                }
            }
        };

        if callback(args) == CallbackDisposition::Retain {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.insert(token.to_string(), callback);
        }
        true
    }

    /// Stop reacting to further deliveries for `token`.
    pub fn forget(&self, token: &str) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.remove(token);
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
