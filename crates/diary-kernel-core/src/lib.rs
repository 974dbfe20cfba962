use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{Date, OffsetDateTime};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum RepoError {
    #[error("unknown store name: {0}")]
    UnknownCategory(String),
    #[error("record is missing a string `id` field")]
    MissingId,
    #[error("codec error: {0}")]
    Codec(String),
}

/// The fixed set of logical tables. Each category has an independent
/// keyspace; the wire name doubles as the store name on every boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Actor,
    TrackData,
    Diary,
    Tracking,
    Resep,
}

impl Category {
    pub const ALL: [Category; 5] =
        [Self::Actor, Self::TrackData, Self::Diary, Self::Tracking, Self::Resep];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Actor => "actor",
            Self::TrackData => "track-data",
            Self::Diary => "diary",
            Self::Tracking => "tracking",
            Self::Resep => "resep",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "actor" => Some(Self::Actor),
            "track-data" => Some(Self::TrackData),
            "diary" => Some(Self::Diary),
            "tracking" => Some(Self::Tracking),
            "resep" => Some(Self::Resep),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a write originated. Host-native writes come from the embedded
/// host's own store; client writes carry the opaque per-process client id
/// used for echo suppression (absent when the writer did not identify
/// itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    HostNative,
    Client { client_id: Option<String> },
}

impl Provenance {
    #[must_use]
    pub fn client(client_id: impl Into<String>) -> Self {
        Self::Client { client_id: Some(client_id.into()) }
    }

    /// The origin tag used on the bridge call surface.
    #[must_use]
    pub fn origin_str(&self) -> &'static str {
        match self {
            Self::HostNative => "android",
            Self::Client { .. } => "client",
        }
    }

    #[must_use]
    pub fn parse_origin(origin: &str, client_id: Option<String>) -> Option<Self> {
        match origin {
            "android" => Some(Self::HostNative),
            "client" => Some(Self::Client { client_id }),
            _ => None,
        }
    }

    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        match self {
            Self::HostNative => None,
            Self::Client { client_id } => client_id.as_deref(),
        }
    }
}

/// A change notification: exactly one category, tagged with the write's
/// provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub provenance: Provenance,
    pub category: Category,
}

impl ChangeEvent {
    #[must_use]
    pub fn new(provenance: Provenance, category: Category) -> Self {
        Self { provenance, category }
    }

    /// Whether a side with the given local identity should re-publish this
    /// event after receiving it across a context boundary. A side never
    /// re-publishes its own writes reflected back to it; client-vs-client
    /// events without a provable id match are treated as foreign.
    #[must_use]
    pub fn is_foreign_to(&self, local: &Provenance) -> bool {
        match (&self.provenance, local) {
            (Provenance::HostNative, Provenance::HostNative) => false,
            (Provenance::Client { client_id: event_id }, Provenance::Client { client_id: own_id }) => {
                match (event_id, own_id) {
                    (Some(event_id), Some(own_id)) => event_id != own_id,
                    _ => true,
                }
            }
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type ListenerCallback = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

struct ListenerEntry {
    id: ListenerId,
    categories: Option<Vec<Category>>,
    callback: ListenerCallback,
}

/// In-process publish/subscribe fan-out for change notifications.
///
/// Fan-out is synchronous and in registration order; there is no queuing and
/// no coalescing of duplicate notifications, so listeners must be idempotent
/// against redundant re-fetches. Callbacks run with the listener table
/// locked and must not subscribe or unsubscribe from inside a callback.
#[derive(Default)]
pub struct ChangeBus {
    next_id: AtomicU64,
    listeners: Mutex<Vec<ListenerEntry>>,
}

impl ChangeBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. `categories: None` subscribes to every category;
    /// otherwise only events for the listed categories are delivered.
    pub fn subscribe<F>(&self, categories: Option<&[Category]>, callback: F) -> ListenerId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.push(ListenerEntry {
            id,
            categories: categories.map(<[Category]>::to_vec),
            callback: Box::new(callback),
        });
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|entry| entry.id != id);
    }

    pub fn publish(&self, event: &ChangeEvent) {
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        for entry in listeners.iter() {
            let interested = match &entry.categories {
                None => true,
                Some(categories) => categories.contains(&event.category),
            };
            if interested {
                (entry.callback)(event);
            }
        }
    }
}

/// Extract the mandatory string identity field from a record payload.
///
/// # Errors
/// Returns [`RepoError::MissingId`] when the payload has no string `id`.
pub fn record_id(record: &Value) -> Result<&str, RepoError> {
    record.get("id").and_then(Value::as_str).ok_or(RepoError::MissingId)
}

/// Fresh random record identity, as synthesized by every domain `add`.
#[must_use]
pub fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// The keyed persistent table contract every storage backend implements.
///
/// The repository layer is category-agnostic: records are opaque JSON
/// payloads keyed by their `id` field. `insert` and `update` are both
/// replace-by-id; `import` atomically replaces the whole category.
pub trait RecordStore: Send + Sync {
    /// # Errors
    /// Returns an error when the backend cannot be read.
    fn get_all(&self, category: Category) -> Result<Vec<Value>>;

    /// # Errors
    /// Returns an error when the backend cannot be read. A missing record is
    /// `Ok(None)`, not an error.
    fn get(&self, category: Category, id: &str) -> Result<Option<Value>>;

    /// # Errors
    /// Returns an error when the record has no `id` or the write fails.
    fn insert(&self, category: Category, record: &Value) -> Result<()>;

    /// # Errors
    /// Returns an error when the write fails.
    fn update(&self, category: Category, id: &str, record: &Value) -> Result<()>;

    /// # Errors
    /// Returns an error when the write fails.
    fn remove(&self, category: Category, id: &str) -> Result<()>;

    /// # Errors
    /// Returns an error when any constituent write fails; the category is
    /// left untouched in that case.
    fn import(&self, category: Category, records: &[Value]) -> Result<()>;
}

/// Non-persistent [`RecordStore`] used as the injectable test double for the
/// repository facade.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<BTreeMap<Category, Vec<Value>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn upsert(&self, category: Category, id: &str, record: Value) {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let rows = tables.entry(category).or_default();
        match rows.iter_mut().find(|row| row.get("id").and_then(Value::as_str) == Some(id)) {
            Some(row) => *row = record,
            None => rows.push(record),
        }
    }
}

impl RecordStore for MemoryStore {
    fn get_all(&self, category: Category) -> Result<Vec<Value>> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.get(&category).cloned().unwrap_or_default())
    }

    fn get(&self, category: Category, id: &str) -> Result<Option<Value>> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.get(&category).and_then(|rows| {
            rows.iter().find(|row| row.get("id").and_then(Value::as_str) == Some(id)).cloned()
        }))
    }

    fn insert(&self, category: Category, record: &Value) -> Result<()> {
        let id = record_id(record)?.to_string();
        self.upsert(category, &id, record.clone());
        Ok(())
    }

    fn update(&self, category: Category, id: &str, record: &Value) -> Result<()> {
        let mut record = record.clone();
        if let Some(fields) = record.as_object_mut() {
            fields.insert("id".to_string(), Value::String(id.to_string()));
        }
        self.upsert(category, id, record);
        Ok(())
    }

    fn remove(&self, category: Category, id: &str) -> Result<()> {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(rows) = tables.get_mut(&category) {
            rows.retain(|row| row.get("id").and_then(Value::as_str) != Some(id));
        }
        Ok(())
    }

    fn import(&self, category: Category, records: &[Value]) -> Result<()> {
        for record in records {
            record_id(record)?;
        }
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables.insert(category, records.to_vec());
        Ok(())
    }
}

/// Operation discriminator of the JSON envelope shared by the remote store
/// and the host server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum OpKind {
    GetAll,
    Get,
    Insert,
    Update,
    Delete,
    Import,
}

/// One repository operation on the wire: `{kind, storeName, id?, data?}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpRequest {
    pub kind: OpKind,
    #[serde(rename = "storeName")]
    pub store_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl OpRequest {
    #[must_use]
    pub fn get_all(category: Category) -> Self {
        Self { kind: OpKind::GetAll, store_name: category.as_str().to_string(), id: None, data: None }
    }

    #[must_use]
    pub fn get(category: Category, id: &str) -> Self {
        Self {
            kind: OpKind::Get,
            store_name: category.as_str().to_string(),
            id: Some(id.to_string()),
            data: None,
        }
    }

    #[must_use]
    pub fn insert(category: Category, record: Value) -> Self {
        Self {
            kind: OpKind::Insert,
            store_name: category.as_str().to_string(),
            id: None,
            data: Some(record),
        }
    }

    #[must_use]
    pub fn update(category: Category, id: &str, record: Value) -> Self {
        Self {
            kind: OpKind::Update,
            store_name: category.as_str().to_string(),
            id: Some(id.to_string()),
            data: Some(record),
        }
    }

    #[must_use]
    pub fn delete(category: Category, id: &str) -> Self {
        Self {
            kind: OpKind::Delete,
            store_name: category.as_str().to_string(),
            id: Some(id.to_string()),
            data: None,
        }
    }

    #[must_use]
    pub fn import(category: Category, records: Vec<Value>) -> Self {
        Self {
            kind: OpKind::Import,
            store_name: category.as_str().to_string(),
            id: None,
            data: Some(Value::Array(records)),
        }
    }

    /// # Errors
    /// Returns [`RepoError::UnknownCategory`] when `storeName` names no
    /// known category.
    pub fn category(&self) -> Result<Category, RepoError> {
        Category::parse(&self.store_name)
            .ok_or_else(|| RepoError::UnknownCategory(self.store_name.clone()))
    }
}

/// Serde adapter for calendar-day fields persisted as `YYYY-MM-DD`.
pub mod serde_day {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::format_description::FormatItem;
    use time::macros::format_description;
    use time::Date;

    const FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

    /// # Errors
    /// Fails when the date cannot be formatted.
    pub fn serialize<S: Serializer>(date: &Date, serializer: S) -> Result<S::Ok, S::Error> {
        let formatted = date.format(FORMAT).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&formatted)
    }

    /// # Errors
    /// Fails when the input is not a `YYYY-MM-DD` string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Date, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Date::parse(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ActorRecord {
    pub id: String,
    pub name: String,
    pub emoji: String,
    pub color: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    None,
    String,
    Number,
}

fn default_track_shape() -> String {
    "icon-[mdi--circle]".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackDataRecord {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(rename = "type")]
    pub kind: TrackKind,
    /// Older records predate the shape picker; they fall back to the
    /// default marker shape.
    #[serde(default = "default_track_shape")]
    pub shape: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub edited_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoContent {
    pub name: String,
    pub length: f64,
    pub size: u64,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct PhotoContent {
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioContent {
    pub name: String,
    pub length: f64,
    pub size: u64,
}

/// Diary entry payload, shaped by the entry's `type` tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum DiaryContent {
    Text(String),
    Video(VideoContent),
    Photo(PhotoContent),
    Audio(AudioContent),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiaryRecord {
    pub id: String,
    pub actor: String,
    #[serde(with = "serde_day")]
    pub date: Date,
    #[serde(flatten)]
    pub content: DiaryContent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackingRecord {
    pub id: String,
    pub data_id: String,
    #[serde(with = "serde_day")]
    pub date: Date,
    pub value: String,
    pub note: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub edited_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecipeRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "bahans")]
    pub ingredients: Vec<String>,
    pub tags: Vec<String>,
    pub content: Value,
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use serde_json::json;
    use time::macros::{date, datetime};

    use super::*;

    #[test]
    fn category_wire_names_round_trip() {
        for category in Category::ALL {
            assert_eq!(Category::parse(category.as_str()), Some(category));
        }
        assert_eq!(Category::parse("track-data"), Some(Category::TrackData));
        assert_eq!(Category::parse("recipes"), None);
    }

    #[test]
    fn category_serde_uses_wire_names() {
        let encoded = match serde_json::to_string(&Category::TrackData) {
            Ok(encoded) => encoded,
            Err(err) => panic!("category should serialize: {err}"),
        };
        assert_eq!(encoded, "\"track-data\"");
    }

    #[test]
    fn own_echo_is_not_foreign() {
        let own = Provenance::client("client-1");
        let event = ChangeEvent::new(Provenance::client("client-1"), Category::Actor);
        assert!(!event.is_foreign_to(&own));
    }

    #[test]
    fn other_client_and_host_events_are_foreign() {
        let own = Provenance::client("client-1");

        let other = ChangeEvent::new(Provenance::client("client-2"), Category::Actor);
        assert!(other.is_foreign_to(&own));

        let host = ChangeEvent::new(Provenance::HostNative, Category::Actor);
        assert!(host.is_foreign_to(&own));
    }

    #[test]
    fn host_side_suppresses_host_events_only() {
        let host = Provenance::HostNative;

        let own = ChangeEvent::new(Provenance::HostNative, Category::Diary);
        assert!(!own.is_foreign_to(&host));

        let client = ChangeEvent::new(Provenance::client("client-1"), Category::Diary);
        assert!(client.is_foreign_to(&host));
    }

    #[test]
    fn unidentified_client_events_stay_foreign() {
        let own = Provenance::client("client-1");
        let anonymous = ChangeEvent::new(Provenance::Client { client_id: None }, Category::Actor);
        assert!(anonymous.is_foreign_to(&own));
    }

    #[test]
    fn origin_tags_round_trip() {
        assert_eq!(Provenance::HostNative.origin_str(), "android");
        assert_eq!(Provenance::client("c").origin_str(), "client");
        assert_eq!(
            Provenance::parse_origin("client", Some("c".to_string())),
            Some(Provenance::client("c"))
        );
        assert_eq!(Provenance::parse_origin("android", None), Some(Provenance::HostNative));
        assert_eq!(Provenance::parse_origin("server", None), None);
    }

    #[test]
    fn bus_respects_category_allow_list() {
        let bus = ChangeBus::new();
        let tracking_hits = Arc::new(AtomicUsize::new(0));
        let all_hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&tracking_hits);
        bus.subscribe(Some(&[Category::Tracking]), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&all_hits);
        bus.subscribe(None, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&ChangeEvent::new(Provenance::HostNative, Category::Diary));

        assert_eq!(tracking_hits.load(Ordering::SeqCst), 0);
        assert_eq!(all_hits.load(Ordering::SeqCst), 1);

        bus.publish(&ChangeEvent::new(Provenance::HostNative, Category::Tracking));
        assert_eq!(tracking_hits.load(Ordering::SeqCst), 1);
        assert_eq!(all_hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn bus_delivers_in_registration_order_and_unsubscribes() {
        let bus = ChangeBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&order);
        let first = bus.subscribe(None, move |_| {
            sink.lock().unwrap_or_else(PoisonError::into_inner).push("first");
        });
        let sink = Arc::clone(&order);
        bus.subscribe(None, move |_| {
            sink.lock().unwrap_or_else(PoisonError::into_inner).push("second");
        });

        bus.publish(&ChangeEvent::new(Provenance::HostNative, Category::Actor));
        bus.unsubscribe(first);
        bus.publish(&ChangeEvent::new(Provenance::HostNative, Category::Actor));

        let seen = order.lock().unwrap_or_else(PoisonError::into_inner).clone();
        assert_eq!(seen, vec!["first", "second", "second"]);
    }

    #[test]
    fn memory_store_round_trips_and_upserts() -> Result<()> {
        let store = MemoryStore::new();
        let record = json!({"id": "a1", "name": "Alice", "emoji": "🦊", "color": "#f00"});

        store.insert(Category::Actor, &record)?;
        assert_eq!(store.get(Category::Actor, "a1")?, Some(record.clone()));

        let edited = json!({"id": "a1", "name": "Alicia", "emoji": "🦊", "color": "#f00"});
        store.update(Category::Actor, "a1", &edited)?;
        store.update(Category::Actor, "a1", &edited)?;

        assert_eq!(store.get_all(Category::Actor)?.len(), 1);
        assert_eq!(store.get(Category::Actor, "a1")?, Some(edited));
        Ok(())
    }

    #[test]
    fn memory_store_update_pins_the_given_id() -> Result<()> {
        let store = MemoryStore::new();
        store.insert(Category::Actor, &json!({"id": "a1", "name": "Alice"}))?;

        store.update(Category::Actor, "a1", &json!({"id": "mismatch", "name": "Alicia"}))?;

        let stored = store.get(Category::Actor, "a1")?;
        assert_eq!(stored, Some(json!({"id": "a1", "name": "Alicia"})));
        Ok(())
    }

    #[test]
    fn memory_store_import_replaces_category() -> Result<()> {
        let store = MemoryStore::new();
        store.insert(Category::Actor, &json!({"id": "old", "name": "Old"}))?;

        store.import(
            Category::Actor,
            &[json!({"id": "n1", "name": "New"}), json!({"id": "n2", "name": "Newer"})],
        )?;

        let all = store.get_all(Category::Actor)?;
        assert_eq!(all.len(), 2);
        assert!(store.get(Category::Actor, "old")?.is_none());
        Ok(())
    }

    #[test]
    fn records_without_id_are_rejected() {
        let store = MemoryStore::new();
        let result = store.insert(Category::Actor, &json!({"name": "nameless"}));
        let err = match result {
            Ok(()) => panic!("insert without id should fail"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("`id`"));
    }

    #[test]
    fn op_request_wire_shape_matches_protocol() {
        let request = OpRequest::insert(Category::Actor, json!({"id": "a2", "name": "Bob"}));
        let encoded = match serde_json::to_value(&request) {
            Ok(encoded) => encoded,
            Err(err) => panic!("request should serialize: {err}"),
        };
        assert_eq!(
            encoded,
            json!({"kind": "insert", "storeName": "actor", "data": {"id": "a2", "name": "Bob"}})
        );

        let decoded: OpRequest = match serde_json::from_value(
            json!({"kind": "getAll", "storeName": "track-data"}),
        ) {
            Ok(decoded) => decoded,
            Err(err) => panic!("request should deserialize: {err}"),
        };
        assert_eq!(decoded.kind, OpKind::GetAll);
        assert_eq!(decoded.category(), Ok(Category::TrackData));
    }

    #[test]
    fn op_request_rejects_unknown_store_name() {
        let request = OpRequest {
            kind: OpKind::GetAll,
            store_name: "passwords".to_string(),
            id: None,
            data: None,
        };
        assert_eq!(request.category(), Err(RepoError::UnknownCategory("passwords".to_string())));
    }

    #[test]
    fn diary_record_serializes_with_type_tag() {
        let record = DiaryRecord {
            id: "d1".to_string(),
            actor: "a1".to_string(),
            date: date!(2024 - 03 - 09),
            content: DiaryContent::Video(VideoContent {
                name: "diary_1.mp4".to_string(),
                length: 12.5,
                size: 1024,
                thumbnail: Some("diary_1_thumb.png".to_string()),
            }),
        };

        let encoded = match serde_json::to_value(&record) {
            Ok(encoded) => encoded,
            Err(err) => panic!("diary record should serialize: {err}"),
        };
        assert_eq!(encoded.get("type"), Some(&json!("video")));
        assert_eq!(encoded.get("date"), Some(&json!("2024-03-09")));
        assert_eq!(
            encoded.get("content").and_then(|content| content.get("thumbnail")),
            Some(&json!("diary_1_thumb.png"))
        );

        let text: DiaryRecord = match serde_json::from_value(json!({
            "id": "d2",
            "actor": "a1",
            "date": "2024-03-10",
            "type": "text",
            "content": "slow morning",
        })) {
            Ok(decoded) => decoded,
            Err(err) => panic!("text diary should deserialize: {err}"),
        };
        assert_eq!(text.content, DiaryContent::Text("slow morning".to_string()));
    }

    #[test]
    fn track_data_defaults_missing_shape() {
        let decoded: TrackDataRecord = match serde_json::from_value(json!({
            "id": "t1",
            "name": "Sleep",
            "color": "#00f",
            "type": "number",
            "createdAt": "2024-01-02T03:04:05Z",
            "editedAt": "2024-01-02T03:04:05Z",
        })) {
            Ok(decoded) => decoded,
            Err(err) => panic!("track data should deserialize: {err}"),
        };
        assert_eq!(decoded.shape, "icon-[mdi--circle]");
        assert_eq!(decoded.created_at, datetime!(2024-01-02 03:04:05 UTC));
    }

    #[test]
    fn tracking_record_uses_camel_case_wire_fields() {
        let record = TrackingRecord {
            id: "tr1".to_string(),
            data_id: "t1".to_string(),
            date: date!(2024 - 03 - 09),
            value: "7.5".to_string(),
            note: None,
            created_at: datetime!(2024-03-09 08:00:00 UTC),
            edited_at: datetime!(2024-03-09 08:00:00 UTC),
        };

        let encoded = match serde_json::to_value(&record) {
            Ok(encoded) => encoded,
            Err(err) => panic!("tracking record should serialize: {err}"),
        };
        assert!(encoded.get("dataId").is_some());
        assert!(encoded.get("createdAt").is_some());
        assert!(encoded.get("data_id").is_none());
    }

    #[test]
    fn recipe_record_keeps_persisted_field_names() {
        let record = RecipeRecord {
            id: "r1".to_string(),
            name: "Rendang".to_string(),
            ingredients: vec!["santan".to_string(), "daging".to_string()],
            tags: vec!["pedas".to_string()],
            content: json!({"steps": ["masak"]}),
        };

        let encoded = match serde_json::to_value(&record) {
            Ok(encoded) => encoded,
            Err(err) => panic!("recipe record should serialize: {err}"),
        };
        assert_eq!(encoded.get("bahans"), Some(&json!(["santan", "daging"])));
    }

    #[test]
    fn new_record_ids_are_unique() {
        assert_ne!(new_record_id(), new_record_id());
    }
}
