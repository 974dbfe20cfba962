use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::{Map, Value};

use diary_kernel_core::{
    record_id, Category, ChangeBus, ChangeEvent, Provenance, RepoError,
};

const LATEST_SCHEMA_VERSION: i64 = 2;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS actor (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  emoji TEXT NOT NULL,
  color TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS track_data (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  color TEXT NOT NULL,
  type TEXT NOT NULL,
  shape TEXT NOT NULL,
  createdAt TEXT NOT NULL,
  editedAt TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS diary (
  id TEXT PRIMARY KEY,
  actor TEXT NOT NULL,
  date TEXT NOT NULL,
  type TEXT NOT NULL,
  content TEXT
);

CREATE TABLE IF NOT EXISTS tracking (
  id TEXT PRIMARY KEY,
  dataId TEXT NOT NULL,
  date TEXT NOT NULL,
  value TEXT NOT NULL,
  note TEXT,
  createdAt TEXT NOT NULL,
  editedAt TEXT NOT NULL
);
";

const MIGRATION_002_SQL: &str = r"
CREATE TABLE IF NOT EXISTS resep (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  bahans TEXT NOT NULL,
  tags TEXT NOT NULL,
  content TEXT
);
";

#[derive(Debug, Clone, Copy)]
enum ColumnKind {
    /// Required string field.
    Text,
    /// Optional string field, NULL when absent.
    NullableText,
    /// Arbitrary JSON subtree stored as serialized text.
    Json,
    /// List of strings stored comma-joined.
    List,
}

struct ColumnSpec {
    name: &'static str,
    kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> ColumnSpec {
    ColumnSpec { name, kind }
}

/// Per-category mapping between a JSON record and its relational row.
/// Operation paths are generic over this model, so adding a category means
/// adding one table model plus its migration.
struct TableModel {
    table: &'static str,
    columns: &'static [ColumnSpec],
}

const ACTOR_MODEL: TableModel = TableModel {
    table: "actor",
    columns: &[
        col("id", ColumnKind::Text),
        col("name", ColumnKind::Text),
        col("emoji", ColumnKind::Text),
        col("color", ColumnKind::Text),
    ],
};

const TRACK_DATA_MODEL: TableModel = TableModel {
    table: "track_data",
    columns: &[
        col("id", ColumnKind::Text),
        col("name", ColumnKind::Text),
        col("color", ColumnKind::Text),
        col("type", ColumnKind::Text),
        col("shape", ColumnKind::Text),
        col("createdAt", ColumnKind::Text),
        col("editedAt", ColumnKind::Text),
    ],
};

const DIARY_MODEL: TableModel = TableModel {
    table: "diary",
    columns: &[
        col("id", ColumnKind::Text),
        col("actor", ColumnKind::Text),
        col("date", ColumnKind::Text),
        col("type", ColumnKind::Text),
        col("content", ColumnKind::Json),
    ],
};

const TRACKING_MODEL: TableModel = TableModel {
    table: "tracking",
    columns: &[
        col("id", ColumnKind::Text),
        col("dataId", ColumnKind::Text),
        col("date", ColumnKind::Text),
        col("value", ColumnKind::Text),
        col("note", ColumnKind::NullableText),
        col("createdAt", ColumnKind::Text),
        col("editedAt", ColumnKind::Text),
    ],
};

const RESEP_MODEL: TableModel = TableModel {
    table: "resep",
    columns: &[
        col("id", ColumnKind::Text),
        col("name", ColumnKind::Text),
        col("bahans", ColumnKind::List),
        col("tags", ColumnKind::List),
        col("content", ColumnKind::Json),
    ],
};

fn model(category: Category) -> &'static TableModel {
    match category {
        Category::Actor => &ACTOR_MODEL,
        Category::TrackData => &TRACK_DATA_MODEL,
        Category::Diary => &DIARY_MODEL,
        Category::Tracking => &TRACKING_MODEL,
        Category::Resep => &RESEP_MODEL,
    }
}

fn encode_column(record: &Value, spec: &ColumnSpec) -> Result<Option<String>, RepoError> {
    let field = record.get(spec.name);
    match spec.kind {
        ColumnKind::Text => match field.and_then(Value::as_str) {
            Some(text) => Ok(Some(text.to_string())),
            None => Err(RepoError::Codec(format!("field `{}` must be a string", spec.name))),
        },
        ColumnKind::NullableText => match field {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(RepoError::Codec(format!("field `{}` must be a string", spec.name))),
        },
        ColumnKind::Json => match field {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::to_string(value)
                .map(Some)
                .map_err(|err| RepoError::Codec(format!("field `{}`: {err}", spec.name))),
        },
        ColumnKind::List => {
            let items = field.and_then(Value::as_array).ok_or_else(|| {
                RepoError::Codec(format!("field `{}` must be a string list", spec.name))
            })?;
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                let part = item.as_str().ok_or_else(|| {
                    RepoError::Codec(format!("field `{}` must be a string list", spec.name))
                })?;
                parts.push(part);
            }
            Ok(Some(parts.join(", ")))
        }
    }
}

fn encode_row(record: &Value, table: &TableModel) -> Result<Vec<Option<String>>, RepoError> {
    table.columns.iter().map(|spec| encode_column(record, spec)).collect()
}

fn decode_row(row: &rusqlite::Row<'_>, table: &TableModel) -> Result<Value> {
    let mut fields = Map::new();
    for (index, spec) in table.columns.iter().enumerate() {
        let value = match spec.kind {
            ColumnKind::Text => Value::String(row.get::<_, String>(index)?),
            ColumnKind::NullableText => {
                row.get::<_, Option<String>>(index)?.map_or(Value::Null, Value::String)
            }
            ColumnKind::Json => match row.get::<_, Option<String>>(index)? {
                Some(raw) => serde_json::from_str(&raw)
                    .with_context(|| format!("stored field `{}` is not valid JSON", spec.name))?,
                None => Value::Null,
            },
            ColumnKind::List => Value::Array(
                row.get::<_, String>(index)?
                    .split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(|part| Value::String(part.to_string()))
                    .collect(),
            ),
        };
        fields.insert(spec.name.to_string(), value);
    }
    Ok(Value::Object(fields))
}

/// Host-native record store: one relational table per category. Writes are
/// tagged with their provenance and fire the change notification bus after
/// the transaction commits.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    bus: Arc<ChangeBus>,
}

impl SqliteStore {
    /// Open the database, configure runtime pragmas, and apply pending
    /// migrations. The handle is meant to be created once per process.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or migrated.
    pub fn open(path: &Path, bus: Arc<ChangeBus>) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        let store = Self { conn: Mutex::new(conn), bus };
        store.migrate()?;
        tracing::debug!(path = %path.display(), "host store ready");
        Ok(store)
    }

    /// Apply all forward migrations. Migrations only ever create missing
    /// tables; nothing is dropped or altered on upgrade.
    fn migrate(&self) -> Result<()> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let mut version: i64 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .context("failed to read current schema version")?;

        let tx = conn.transaction().context("failed to start migration transaction")?;
        if version < 1 {
            tx.execute_batch(MIGRATION_001_SQL).context("failed to apply migration v1")?;
            tx.execute("INSERT INTO schema_migrations(version) VALUES (1)", [])
                .context("failed to record migration version 1")?;
            version = 1;
        }
        if version < 2 {
            tx.execute_batch(MIGRATION_002_SQL).context("failed to apply migration v2")?;
            tx.execute("INSERT INTO schema_migrations(version) VALUES (2)", [])
                .context("failed to record migration version 2")?;
            version = 2;
        }
        tx.commit().context("failed to commit migrations")?;

        if version != LATEST_SCHEMA_VERSION {
            tracing::warn!(version, "host store schema is ahead of this build");
        }
        Ok(())
    }

    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn get_all(&self, category: Category) -> Result<Vec<Value>> {
        let table = model(category);
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);

        let column_list = table.columns.iter().map(|c| c.name).collect::<Vec<_>>().join(", ");
        let mut stmt =
            conn.prepare(&format!("SELECT {column_list} FROM {}", table.table))?;
        let mut rows = stmt.query([])?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(decode_row(row, table)?);
        }
        Ok(records)
    }

    /// # Errors
    /// Returns an error when the row cannot be read or decoded. A missing
    /// record is `Ok(None)`.
    pub fn get(&self, category: Category, id: &str) -> Result<Option<Value>> {
        let table = model(category);
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);

        let column_list = table.columns.iter().map(|c| c.name).collect::<Vec<_>>().join(", ");
        let mut stmt = conn
            .prepare(&format!("SELECT {column_list} FROM {} WHERE id = ?1", table.table))?;
        let record = stmt
            .query_row(params![id], |row| {
                // Defer JSON decoding until outside rusqlite's row closure.
                Ok(decode_row(row, table))
            })
            .optional()?
            .transpose()?;
        Ok(record)
    }

    /// # Errors
    /// Returns an error when the record does not match the category's table
    /// model or the write fails.
    pub fn insert(
        &self,
        category: Category,
        record: &Value,
        provenance: &Provenance,
    ) -> Result<()> {
        let id = record_id(record)?.to_string();
        self.put(category, &id, record)?;
        self.publish(category, provenance);
        Ok(())
    }

    /// # Errors
    /// Returns an error when the record does not match the category's table
    /// model or the write fails.
    pub fn update(
        &self,
        category: Category,
        id: &str,
        record: &Value,
        provenance: &Provenance,
    ) -> Result<()> {
        self.put(category, id, record)?;
        self.publish(category, provenance);
        Ok(())
    }

    /// # Errors
    /// Returns an error when the delete statement fails.
    pub fn remove(&self, category: Category, id: &str, provenance: &Provenance) -> Result<()> {
        let table = model(category);
        {
            let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
            conn.execute(&format!("DELETE FROM {} WHERE id = ?1", table.table), params![id])
                .context("failed to delete record")?;
        }
        self.publish(category, provenance);
        Ok(())
    }

    /// Replace the whole category in one transaction. Any mid-bulk failure
    /// rolls back to the pre-import contents.
    ///
    /// # Errors
    /// Returns an error when any record fails to encode or insert.
    pub fn import(
        &self,
        category: Category,
        records: &[Value],
        provenance: &Provenance,
    ) -> Result<()> {
        let table = model(category);
        {
            let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
            let tx = conn.transaction().context("failed to start import transaction")?;

            tx.execute(&format!("DELETE FROM {}", table.table), [])
                .context("failed to clear table for import")?;

            let placeholders = (1..=table.columns.len())
                .map(|index| format!("?{index}"))
                .collect::<Vec<_>>()
                .join(", ");
            let column_list =
                table.columns.iter().map(|c| c.name).collect::<Vec<_>>().join(", ");
            let insert_sql =
                format!("INSERT INTO {} ({column_list}) VALUES ({placeholders})", table.table);

            for record in records {
                record_id(record)?;
                let row = encode_row(record, table)?;
                tx.execute(&insert_sql, params_from_iter(row.iter()))
                    .context("failed to insert imported record")?;
            }

            tx.commit().context("failed to commit import transaction")?;
        }
        self.publish(category, provenance);
        Ok(())
    }

    fn put(&self, category: Category, id: &str, record: &Value) -> Result<()> {
        let table = model(category);
        let mut stored = record.clone();
        if let Some(fields) = stored.as_object_mut() {
            fields.insert("id".to_string(), Value::String(id.to_string()));
        }
        let row = encode_row(&stored, table)?;

        let placeholders = (1..=table.columns.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let column_list = table.columns.iter().map(|c| c.name).collect::<Vec<_>>().join(", ");

        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} ({column_list}) VALUES ({placeholders})",
                table.table
            ),
            params_from_iter(row.iter()),
        )
        .context("failed to write record")?;
        Ok(())
    }

    fn publish(&self, category: Category, provenance: &Provenance) {
        // The connection lock is released before fan-out so listeners can
        // read back through this store.
        self.bus.publish(&ChangeEvent::new(provenance.clone(), category));
    }
}
