use std::path::Path;

use anyhow::{Context, Result};
use redb::{Database, ReadableTable, TableDefinition};
use serde_json::Value;

use diary_kernel_core::{record_id, Category, RecordStore};

const LATEST_SCHEMA_VERSION: u64 = 2;

const SCHEMA_META: TableDefinition<&str, u64> = TableDefinition::new("schema-meta");
const VERSION_KEY: &str = "version";

fn table_def(category: Category) -> TableDefinition<'static, &'static str, &'static str> {
    TableDefinition::new(category.as_str())
}

/// Local embedded record store: one named table per category inside a single
/// redb database file, records stored as JSON text keyed by `id`.
///
/// The database is opened once per process and the handle held for its
/// lifetime. Schema versioning is additive only: each version bump creates
/// the tables it introduced when they are absent and never drops or rewrites
/// existing ones. Every operation runs inside one short-lived transaction
/// scoped to one category.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open (or create) the database at `path` and bring the schema up to
    /// the latest version.
    ///
    /// # Errors
    /// Returns an error when the file cannot be opened or the schema tables
    /// cannot be created.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)
            .with_context(|| format!("failed to open local store at {}", path.display()))?;
        let store = Self { db };
        store.apply_schema()?;
        tracing::debug!(path = %path.display(), "local store ready");
        Ok(store)
    }

    fn apply_schema(&self) -> Result<()> {
        let txn = self.db.begin_write().context("failed to start schema transaction")?;

        let mut version = {
            let meta = txn.open_table(SCHEMA_META).context("failed to open schema meta table")?;
            let value = meta.get(VERSION_KEY)?.map_or(0, |guard| guard.value());
            value
        };

        if version < 1 {
            for category in
                [Category::Actor, Category::TrackData, Category::Diary, Category::Tracking]
            {
                txn.open_table(table_def(category))
                    .with_context(|| format!("failed to create table {category}"))?;
            }
            version = 1;
        }

        if version < 2 {
            txn.open_table(table_def(Category::Resep))
                .context("failed to create table resep")?;
            version = 2;
        }

        {
            let mut meta = txn.open_table(SCHEMA_META).context("failed to open schema meta table")?;
            meta.insert(VERSION_KEY, version).context("failed to record schema version")?;
        }

        txn.commit().context("failed to commit schema transaction")?;

        if version != LATEST_SCHEMA_VERSION {
            tracing::warn!(version, "local store schema is ahead of this build");
        }
        Ok(())
    }

    fn put(&self, category: Category, id: &str, record: &Value) -> Result<()> {
        let mut stored = record.clone();
        if let Some(fields) = stored.as_object_mut() {
            fields.insert("id".to_string(), Value::String(id.to_string()));
        }
        let encoded = serde_json::to_string(&stored).context("failed to encode record")?;

        let txn = self.db.begin_write().context("failed to start write transaction")?;
        {
            let mut table = txn
                .open_table(table_def(category))
                .with_context(|| format!("failed to open table {category}"))?;
            table.insert(id, encoded.as_str()).context("failed to put record")?;
        }
        txn.commit().context("failed to commit write transaction")?;
        Ok(())
    }
}

impl RecordStore for RedbStore {
    fn get_all(&self, category: Category) -> Result<Vec<Value>> {
        let txn = self.db.begin_read().context("failed to start read transaction")?;
        let table = txn
            .open_table(table_def(category))
            .with_context(|| format!("failed to open table {category}"))?;

        let mut records = Vec::new();
        for entry in table.iter().context("failed to scan table")? {
            let (_, value) = entry.context("failed to read record")?;
            records.push(
                serde_json::from_str(value.value()).context("failed to decode stored record")?,
            );
        }
        Ok(records)
    }

    fn get(&self, category: Category, id: &str) -> Result<Option<Value>> {
        let txn = self.db.begin_read().context("failed to start read transaction")?;
        let table = txn
            .open_table(table_def(category))
            .with_context(|| format!("failed to open table {category}"))?;

        match table.get(id).context("failed to read record")? {
            Some(value) => Ok(Some(
                serde_json::from_str(value.value()).context("failed to decode stored record")?,
            )),
            None => Ok(None),
        }
    }

    fn insert(&self, category: Category, record: &Value) -> Result<()> {
        let id = record_id(record)?.to_string();
        self.put(category, &id, record)
    }

    fn update(&self, category: Category, id: &str, record: &Value) -> Result<()> {
        self.put(category, id, record)
    }

    fn remove(&self, category: Category, id: &str) -> Result<()> {
        let txn = self.db.begin_write().context("failed to start write transaction")?;
        {
            let mut table = txn
                .open_table(table_def(category))
                .with_context(|| format!("failed to open table {category}"))?;
            table.remove(id).context("failed to delete record")?;
        }
        txn.commit().context("failed to commit delete transaction")?;
        Ok(())
    }

    fn import(&self, category: Category, records: &[Value]) -> Result<()> {
        let txn = self.db.begin_write().context("failed to start import transaction")?;
        txn.delete_table(table_def(category)).context("failed to clear table for import")?;
        {
            let mut table = txn
                .open_table(table_def(category))
                .with_context(|| format!("failed to open table {category}"))?;
            for record in records {
                let id = record_id(record)?.to_string();
                let encoded = serde_json::to_string(record).context("failed to encode record")?;
                table.insert(id.as_str(), encoded.as_str()).context("failed to put record")?;
            }
        }
        // An error anywhere above drops the transaction uncommitted, so a
        // failed import leaves the previous contents visible.
        txn.commit().context("failed to commit import transaction")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;

    struct TempDb {
        path: PathBuf,
    }

    impl TempDb {
        fn new() -> Self {
            let path = std::env::temp_dir()
                .join(format!("diary-kernel-redb-{}.redb", uuid::Uuid::new_v4()));
            Self { path }
        }
    }

    impl Drop for TempDb {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.path);
        }
    }

    #[test]
    fn insert_then_get_round_trips() -> Result<()> {
        let tmp = TempDb::new();
        let store = RedbStore::open(&tmp.path)?;
        let record = json!({"id": "a1", "name": "Alice", "emoji": "🦊", "color": "#f00"});

        store.insert(Category::Actor, &record)?;

        assert_eq!(store.get(Category::Actor, "a1")?, Some(record));
        assert_eq!(store.get(Category::Actor, "missing")?, None);
        Ok(())
    }

    #[test]
    fn repeated_update_is_idempotent() -> Result<()> {
        let tmp = TempDb::new();
        let store = RedbStore::open(&tmp.path)?;
        let record = json!({"id": "t1", "name": "Sleep", "color": "#00f"});

        store.insert(Category::TrackData, &record)?;
        let edited = json!({"id": "t1", "name": "Sleep hours", "color": "#00f"});
        store.update(Category::TrackData, "t1", &edited)?;
        store.update(Category::TrackData, "t1", &edited)?;

        assert_eq!(store.get_all(Category::TrackData)?, vec![edited]);
        Ok(())
    }

    #[test]
    fn update_pins_the_given_id() -> Result<()> {
        let tmp = TempDb::new();
        let store = RedbStore::open(&tmp.path)?;
        store.insert(Category::Actor, &json!({"id": "a1", "name": "Alice"}))?;

        store.update(Category::Actor, "a1", &json!({"id": "other", "name": "Alicia"}))?;

        assert_eq!(store.get(Category::Actor, "a1")?, Some(json!({"id": "a1", "name": "Alicia"})));
        assert_eq!(store.get_all(Category::Actor)?.len(), 1);
        Ok(())
    }

    #[test]
    fn remove_deletes_only_the_target() -> Result<()> {
        let tmp = TempDb::new();
        let store = RedbStore::open(&tmp.path)?;
        store.insert(Category::Resep, &json!({"id": "r1", "name": "Rendang"}))?;
        store.insert(Category::Resep, &json!({"id": "r2", "name": "Soto"}))?;

        store.remove(Category::Resep, "r1")?;

        assert_eq!(store.get(Category::Resep, "r1")?, None);
        assert!(store.get(Category::Resep, "r2")?.is_some());
        Ok(())
    }

    #[test]
    fn import_replaces_whole_category() -> Result<()> {
        let tmp = TempDb::new();
        let store = RedbStore::open(&tmp.path)?;
        store.insert(Category::Actor, &json!({"id": "old", "name": "Old"}))?;

        store.import(
            Category::Actor,
            &[json!({"id": "n1", "name": "New"}), json!({"id": "n2", "name": "Newer"})],
        )?;

        let all = store.get_all(Category::Actor)?;
        assert_eq!(all.len(), 2);
        assert_eq!(store.get(Category::Actor, "old")?, None);
        Ok(())
    }

    #[test]
    fn failed_import_leaves_previous_contents_intact() -> Result<()> {
        let tmp = TempDb::new();
        let store = RedbStore::open(&tmp.path)?;
        let before =
            vec![json!({"id": "a1", "name": "Alice"}), json!({"id": "a2", "name": "Bob"})];
        store.import(Category::Actor, &before)?;

        let result = store.import(
            Category::Actor,
            &[json!({"id": "n1", "name": "New"}), json!({"name": "no id, fails mid-bulk"})],
        );
        assert!(result.is_err());

        let mut after = store.get_all(Category::Actor)?;
        after.sort_by_key(|record| {
            record.get("id").and_then(Value::as_str).unwrap_or_default().to_string()
        });
        assert_eq!(after, before);
        Ok(())
    }

    #[test]
    fn reopening_keeps_data_and_schema() -> Result<()> {
        let tmp = TempDb::new();
        let record = json!({"id": "d1", "actor": "a1", "date": "2024-03-09",
            "type": "text", "content": "hello"});
        {
            let store = RedbStore::open(&tmp.path)?;
            store.insert(Category::Diary, &record)?;
        }

        let reopened = RedbStore::open(&tmp.path)?;
        assert_eq!(reopened.get(Category::Diary, "d1")?, Some(record));
        Ok(())
    }

    #[test]
    fn categories_are_isolated() -> Result<()> {
        let tmp = TempDb::new();
        let store = RedbStore::open(&tmp.path)?;
        store.insert(Category::Diary, &json!({"id": "x", "note": "diary"}))?;

        assert!(store.get_all(Category::Tracking)?.is_empty());
        assert_eq!(store.get(Category::Tracking, "x")?, None);
        Ok(())
    }
}
