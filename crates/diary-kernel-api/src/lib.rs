//! Repository facade and the typed domain modules on top of it. The facade
//! binds to exactly one record store backend at startup; domain modules and
//! dataset sync depend only on the facade's contract, never on a backend.

pub mod dataset;
pub mod domain;

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use anyhow::Result;
use serde_json::Value;

use diary_kernel_bridge::{BridgeStore, HostCalls};
use diary_kernel_client::RemoteStore;
use diary_kernel_core::{Category, ChangeBus, ChangeEvent, Provenance, RecordStore};
use diary_kernel_store_redb::RedbStore;

pub use dataset::DataSet;
pub use domain::{ActorInput, DiaryInput, RecipeInput, TrackDataInput, TrackingInput};

/// Which backend the facade bound to at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoMode {
    /// Host-native store reached through the synchronous bridge.
    Bridge,
    /// Thin client of a remote host over HTTP.
    Remote,
    /// Local embedded store.
    Local,
}

pub struct RemoteConfig {
    pub base_url: String,
    pub client_id: String,
}

/// Startup configuration for backend selection. Candidates are evaluated in
/// a fixed order: bridge, then remote, then local.
pub struct RepoConfig {
    pub bridge: Option<Arc<dyn HostCalls>>,
    pub remote: Option<RemoteConfig>,
    pub local_path: PathBuf,
}

impl RepoConfig {
    #[must_use]
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self { bridge: None, remote: None, local_path: path.into() }
    }

    #[must_use]
    pub fn with_bridge(mut self, host: Arc<dyn HostCalls>) -> Self {
        self.bridge = Some(host);
        self
    }

    #[must_use]
    pub fn with_remote(mut self, base_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        self.remote = Some(RemoteConfig { base_url: base_url.into(), client_id: client_id.into() });
        self
    }
}

/// The uniform CRUD+import surface every domain module talks to. Mutating
/// calls publish a change notification with this side's own provenance once
/// the active store reports success.
pub struct Repository {
    store: Arc<dyn RecordStore>,
    bus: Arc<ChangeBus>,
    identity: Provenance,
    mode: RepoMode,
}

impl Repository {
    /// Bind to a backend per the configured mode. The choice is immutable
    /// for the process lifetime.
    ///
    /// # Errors
    /// Returns an error when the selected backend cannot be initialized.
    pub fn open(config: RepoConfig, bus: Arc<ChangeBus>) -> Result<Self> {
        let (store, identity, mode): (Arc<dyn RecordStore>, Provenance, RepoMode) =
            if let Some(host) = config.bridge {
                (Arc::new(BridgeStore::new(host)), Provenance::HostNative, RepoMode::Bridge)
            } else if let Some(remote) = config.remote {
                (
                    Arc::new(RemoteStore::new(remote.base_url, remote.client_id.clone())),
                    Provenance::client(remote.client_id),
                    RepoMode::Remote,
                )
            } else {
                (
                    Arc::new(RedbStore::open(&config.local_path)?),
                    Provenance::HostNative,
                    RepoMode::Local,
                )
            };

        tracing::info!(mode = ?mode, "repository bound");
        Ok(Self { store, bus, identity, mode })
    }

    /// Build a facade over an explicit store. This is the seam tests use to
    /// substitute an in-memory store.
    #[must_use]
    pub fn with_store(store: Arc<dyn RecordStore>, bus: Arc<ChangeBus>, identity: Provenance) -> Self {
        Self { store, bus, identity, mode: RepoMode::Local }
    }

    #[must_use]
    pub fn mode(&self) -> RepoMode {
        self.mode
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<ChangeBus> {
        &self.bus
    }

    #[must_use]
    pub fn identity(&self) -> &Provenance {
        &self.identity
    }

    /// # Errors
    /// Propagates the active store's failure.
    pub fn get_all(&self, category: Category) -> Result<Vec<Value>> {
        self.store.get_all(category)
    }

    /// # Errors
    /// Propagates the active store's failure.
    pub fn get(&self, category: Category, id: &str) -> Result<Option<Value>> {
        self.store.get(category, id)
    }

    /// # Errors
    /// Propagates the active store's failure; nothing is published then.
    pub fn insert(&self, category: Category, record: &Value) -> Result<()> {
        self.store.insert(category, record)?;
        self.changed(category);
        Ok(())
    }

    /// # Errors
    /// Propagates the active store's failure; nothing is published then.
    pub fn update(&self, category: Category, id: &str, record: &Value) -> Result<()> {
        self.store.update(category, id, record)?;
        self.changed(category);
        Ok(())
    }

    /// # Errors
    /// Propagates the active store's failure; nothing is published then.
    pub fn remove(&self, category: Category, id: &str) -> Result<()> {
        self.store.remove(category, id)?;
        self.changed(category);
        Ok(())
    }

    /// # Errors
    /// Propagates the active store's failure; nothing is published then.
    pub fn import(&self, category: Category, records: &[Value]) -> Result<()> {
        self.store.import(category, records)?;
        self.changed(category);
        Ok(())
    }

    fn changed(&self, category: Category) {
        self.bus.publish(&ChangeEvent::new(self.identity.clone(), category));
    }
}

static REPOSITORY: OnceLock<Repository> = OnceLock::new();

/// Initialize the process-wide repository singleton. The first successful
/// call wins; later calls return the already-bound facade.
///
/// # Errors
/// Returns an error when the backend cannot be initialized.
pub fn init_repository(config: RepoConfig, bus: Arc<ChangeBus>) -> Result<&'static Repository> {
    if let Some(existing) = REPOSITORY.get() {
        return Ok(existing);
    }
    let repository = Repository::open(config, bus)?;
    Ok(REPOSITORY.get_or_init(|| repository))
}

/// The repository singleton, if [`init_repository`] has run.
#[must_use]
pub fn repository() -> Option<&'static Repository> {
    REPOSITORY.get()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};

    use diary_kernel_core::MemoryStore;
    use serde_json::json;

    use super::*;

    fn memory_repo(identity: Provenance) -> (Repository, Arc<ChangeBus>) {
        let bus = Arc::new(ChangeBus::new());
        let repo =
            Repository::with_store(Arc::new(MemoryStore::new()), Arc::clone(&bus), identity);
        (repo, bus)
    }

    #[test]
    fn local_mode_is_selected_without_bridge_or_remote() -> Result<()> {
        let path =
            std::env::temp_dir().join(format!("diary-kernel-api-{}.redb", uuid::Uuid::new_v4()));
        let repo = Repository::open(RepoConfig::local(&path), Arc::new(ChangeBus::new()))?;
        assert_eq!(repo.mode(), RepoMode::Local);
        assert_eq!(repo.identity(), &Provenance::HostNative);

        let _ = std::fs::remove_file(&path);
        Ok(())
    }

    #[test]
    fn remote_config_beats_local() -> Result<()> {
        let config = RepoConfig::local("unused.redb")
            .with_remote("http://192.168.1.20:8888", "client-abc");
        let repo = Repository::open(config, Arc::new(ChangeBus::new()))?;
        assert_eq!(repo.mode(), RepoMode::Remote);
        assert_eq!(repo.identity(), &Provenance::client("client-abc"));
        Ok(())
    }

    #[test]
    fn mutations_publish_with_own_identity() -> Result<()> {
        let (repo, bus) = memory_repo(Provenance::client("tab-1"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(None, move |event| {
            sink.lock().unwrap_or_else(PoisonError::into_inner).push(event.clone());
        });

        repo.insert(Category::Actor, &json!({"id": "a1", "name": "Alice"}))?;
        repo.remove(Category::Actor, "a1")?;

        let events = seen.lock().unwrap_or_else(PoisonError::into_inner).clone();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|event| event.provenance == Provenance::client("tab-1")));
        Ok(())
    }

    #[test]
    fn failed_mutation_publishes_nothing() {
        let (repo, bus) = memory_repo(Provenance::HostNative);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        bus.subscribe(None, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // Missing id is rejected by the store before anything is published.
        assert!(repo.insert(Category::Actor, &json!({"name": "nameless"})).is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listeners_only_hear_their_categories() -> Result<()> {
        let (repo, bus) = memory_repo(Provenance::HostNative);
        let tracking_hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&tracking_hits);
        bus.subscribe(Some(&[Category::Tracking]), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        repo.insert(
            Category::Diary,
            &json!({"id": "d1", "actor": "a1", "date": "2024-03-09",
                "type": "text", "content": "rainy"}),
        )?;
        assert_eq!(tracking_hits.load(Ordering::SeqCst), 0);

        repo.insert(
            Category::Tracking,
            &json!({"id": "tr1", "dataId": "t1", "date": "2024-03-09", "value": "1",
                "note": null, "createdAt": "2024-03-09T08:00:00Z",
                "editedAt": "2024-03-09T08:00:00Z"}),
        )?;
        assert_eq!(tracking_hits.load(Ordering::SeqCst), 1);
        Ok(())
    }
}
