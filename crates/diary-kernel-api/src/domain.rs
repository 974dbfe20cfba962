//! Typed wrappers over the repository facade: identity synthesis on add,
//! `createdAt` preservation on edit, and (de)serialization of dates. These
//! stay thin on purpose; anything heavier belongs below the facade.

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use time::{Date, OffsetDateTime};

use diary_kernel_core::{
    new_record_id, ActorRecord, Category, DiaryContent, DiaryRecord, RecipeRecord,
    TrackDataRecord, TrackKind, TrackingRecord,
};

use crate::Repository;

fn encode<T: Serialize>(record: &T) -> Result<Value> {
    serde_json::to_value(record).context("failed to encode record")
}

fn decode<T: DeserializeOwned>(row: Value, what: &str) -> Result<T> {
    serde_json::from_value(row).with_context(|| format!("malformed {what} record"))
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>, what: &str) -> Result<Vec<T>> {
    rows.into_iter().map(|row| decode(row, what)).collect()
}

impl Repository {
    #[must_use]
    pub fn actors(&self) -> Actors<'_> {
        Actors { repo: self }
    }

    #[must_use]
    pub fn track_data(&self) -> TrackDataModule<'_> {
        TrackDataModule { repo: self }
    }

    #[must_use]
    pub fn diary(&self) -> Diary<'_> {
        Diary { repo: self }
    }

    #[must_use]
    pub fn tracking(&self) -> TrackingModule<'_> {
        TrackingModule { repo: self }
    }

    #[must_use]
    pub fn recipes(&self) -> Recipes<'_> {
        Recipes { repo: self }
    }
}

pub struct ActorInput {
    pub name: String,
    pub emoji: String,
    pub color: String,
}

pub struct Actors<'a> {
    repo: &'a Repository,
}

impl Actors<'_> {
    /// # Errors
    /// Propagates store failures and malformed stored records.
    pub fn get_all(&self) -> Result<Vec<ActorRecord>> {
        decode_rows(self.repo.get_all(Category::Actor)?, "actor")
    }

    /// # Errors
    /// Propagates store failures.
    pub fn add(&self, input: ActorInput) -> Result<ActorRecord> {
        let record = ActorRecord {
            id: new_record_id(),
            name: input.name,
            emoji: input.emoji,
            color: input.color,
        };
        self.repo.insert(Category::Actor, &encode(&record)?)?;
        Ok(record)
    }

    /// # Errors
    /// Propagates store failures.
    pub fn edit(&self, id: &str, input: ActorInput) -> Result<ActorRecord> {
        let record = ActorRecord {
            id: id.to_string(),
            name: input.name,
            emoji: input.emoji,
            color: input.color,
        };
        self.repo.update(Category::Actor, id, &encode(&record)?)?;
        Ok(record)
    }

    /// # Errors
    /// Propagates store failures.
    pub fn delete(&self, id: &str) -> Result<()> {
        self.repo.remove(Category::Actor, id)
    }

    /// # Errors
    /// Propagates store failures.
    pub fn import(&self, records: &[ActorRecord]) -> Result<()> {
        let rows = records.iter().map(encode).collect::<Result<Vec<_>>>()?;
        self.repo.import(Category::Actor, &rows)
    }
}

pub struct TrackDataInput {
    pub name: String,
    pub color: String,
    pub kind: TrackKind,
    pub shape: String,
}

pub struct TrackDataModule<'a> {
    repo: &'a Repository,
}

impl TrackDataModule<'_> {
    /// # Errors
    /// Propagates store failures and malformed stored records.
    pub fn get_all(&self) -> Result<Vec<TrackDataRecord>> {
        decode_rows(self.repo.get_all(Category::TrackData)?, "track data")
    }

    /// # Errors
    /// Propagates store failures.
    pub fn add(&self, input: TrackDataInput) -> Result<TrackDataRecord> {
        let now = OffsetDateTime::now_utc();
        let record = TrackDataRecord {
            id: new_record_id(),
            name: input.name,
            color: input.color,
            kind: input.kind,
            shape: input.shape,
            created_at: now,
            edited_at: now,
        };
        self.repo.insert(Category::TrackData, &encode(&record)?)?;
        Ok(record)
    }

    /// Edits keep the original creation time and refresh the edit time.
    ///
    /// # Errors
    /// Fails when no record exists under `id`.
    pub fn edit(&self, id: &str, input: TrackDataInput) -> Result<TrackDataRecord> {
        let old: TrackDataRecord = self
            .repo
            .get(Category::TrackData, id)?
            .map(|row| decode(row, "track data"))
            .transpose()?
            .ok_or_else(|| anyhow!("track data not found: {id}"))?;

        let record = TrackDataRecord {
            id: id.to_string(),
            name: input.name,
            color: input.color,
            kind: input.kind,
            shape: input.shape,
            created_at: old.created_at,
            edited_at: OffsetDateTime::now_utc(),
        };
        self.repo.update(Category::TrackData, id, &encode(&record)?)?;
        Ok(record)
    }

    /// # Errors
    /// Propagates store failures.
    pub fn delete(&self, id: &str) -> Result<()> {
        self.repo.remove(Category::TrackData, id)
    }

    /// # Errors
    /// Propagates store failures.
    pub fn import(&self, records: &[TrackDataRecord]) -> Result<()> {
        let rows = records.iter().map(encode).collect::<Result<Vec<_>>>()?;
        self.repo.import(Category::TrackData, &rows)
    }
}

pub struct DiaryInput {
    pub actor: String,
    pub date: Date,
    pub content: DiaryContent,
}

pub struct Diary<'a> {
    repo: &'a Repository,
}

impl Diary<'_> {
    /// # Errors
    /// Propagates store failures and malformed stored records.
    pub fn get_all(&self) -> Result<Vec<DiaryRecord>> {
        decode_rows(self.repo.get_all(Category::Diary)?, "diary")
    }

    /// # Errors
    /// Propagates store failures.
    pub fn add(&self, input: DiaryInput) -> Result<DiaryRecord> {
        let record = DiaryRecord {
            id: new_record_id(),
            actor: input.actor,
            date: input.date,
            content: input.content,
        };
        self.repo.insert(Category::Diary, &encode(&record)?)?;
        Ok(record)
    }

    /// # Errors
    /// Propagates store failures.
    pub fn edit(&self, id: &str, input: DiaryInput) -> Result<DiaryRecord> {
        let record = DiaryRecord {
            id: id.to_string(),
            actor: input.actor,
            date: input.date,
            content: input.content,
        };
        self.repo.update(Category::Diary, id, &encode(&record)?)?;
        Ok(record)
    }

    /// # Errors
    /// Propagates store failures.
    pub fn delete(&self, id: &str) -> Result<()> {
        self.repo.remove(Category::Diary, id)
    }

    /// # Errors
    /// Propagates store failures.
    pub fn import(&self, records: &[DiaryRecord]) -> Result<()> {
        let rows = records.iter().map(encode).collect::<Result<Vec<_>>>()?;
        self.repo.import(Category::Diary, &rows)
    }
}

pub struct TrackingInput {
    pub data_id: String,
    pub date: Date,
    pub value: String,
    pub note: Option<String>,
}

pub struct TrackingModule<'a> {
    repo: &'a Repository,
}

impl TrackingModule<'_> {
    /// # Errors
    /// Propagates store failures and malformed stored records.
    pub fn get_all(&self) -> Result<Vec<TrackingRecord>> {
        decode_rows(self.repo.get_all(Category::Tracking)?, "tracking")
    }

    /// # Errors
    /// Propagates store failures.
    pub fn add(&self, input: TrackingInput) -> Result<TrackingRecord> {
        let now = OffsetDateTime::now_utc();
        let record = TrackingRecord {
            id: new_record_id(),
            data_id: input.data_id,
            date: input.date,
            value: input.value,
            note: input.note,
            created_at: now,
            edited_at: now,
        };
        self.repo.insert(Category::Tracking, &encode(&record)?)?;
        Ok(record)
    }

    /// Edits keep the original creation time and refresh the edit time.
    ///
    /// # Errors
    /// Fails when no record exists under `id`.
    pub fn edit(&self, id: &str, input: TrackingInput) -> Result<TrackingRecord> {
        let old: TrackingRecord = self
            .repo
            .get(Category::Tracking, id)?
            .map(|row| decode(row, "tracking"))
            .transpose()?
            .ok_or_else(|| anyhow!("tracking entry not found: {id}"))?;

        let record = TrackingRecord {
            id: id.to_string(),
            data_id: input.data_id,
            date: input.date,
            value: input.value,
            note: input.note,
            created_at: old.created_at,
            edited_at: OffsetDateTime::now_utc(),
        };
        self.repo.update(Category::Tracking, id, &encode(&record)?)?;
        Ok(record)
    }

    /// # Errors
    /// Propagates store failures.
    pub fn delete(&self, id: &str) -> Result<()> {
        self.repo.remove(Category::Tracking, id)
    }

    /// # Errors
    /// Propagates store failures.
    pub fn import(&self, records: &[TrackingRecord]) -> Result<()> {
        let rows = records.iter().map(encode).collect::<Result<Vec<_>>>()?;
        self.repo.import(Category::Tracking, &rows)
    }
}

pub struct RecipeInput {
    pub name: String,
    pub ingredients: Vec<String>,
    pub tags: Vec<String>,
    pub content: Value,
}

pub struct Recipes<'a> {
    repo: &'a Repository,
}

impl Recipes<'_> {
    /// # Errors
    /// Propagates store failures and malformed stored records.
    pub fn get_all(&self) -> Result<Vec<RecipeRecord>> {
        decode_rows(self.repo.get_all(Category::Resep)?, "recipe")
    }

    /// # Errors
    /// Propagates store failures.
    pub fn add(&self, input: RecipeInput) -> Result<RecipeRecord> {
        let record = RecipeRecord {
            id: new_record_id(),
            name: input.name,
            ingredients: input.ingredients,
            tags: input.tags,
            content: input.content,
        };
        self.repo.insert(Category::Resep, &encode(&record)?)?;
        Ok(record)
    }

    /// # Errors
    /// Propagates store failures.
    pub fn edit(&self, id: &str, input: RecipeInput) -> Result<RecipeRecord> {
        let record = RecipeRecord {
            id: id.to_string(),
            name: input.name,
            ingredients: input.ingredients,
            tags: input.tags,
            content: input.content,
        };
        self.repo.update(Category::Resep, id, &encode(&record)?)?;
        Ok(record)
    }

    /// # Errors
    /// Propagates store failures.
    pub fn delete(&self, id: &str) -> Result<()> {
        self.repo.remove(Category::Resep, id)
    }

    /// # Errors
    /// Propagates store failures.
    pub fn import(&self, records: &[RecipeRecord]) -> Result<()> {
        let rows = records.iter().map(encode).collect::<Result<Vec<_>>>()?;
        self.repo.import(Category::Resep, &rows)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use diary_kernel_core::{ChangeBus, MemoryStore, Provenance};
    use serde_json::json;
    use time::macros::date;

    use super::*;

    fn repo() -> Repository {
        Repository::with_store(
            Arc::new(MemoryStore::new()),
            Arc::new(ChangeBus::new()),
            Provenance::HostNative,
        )
    }

    #[test]
    fn add_synthesizes_distinct_ids() -> Result<()> {
        let repo = repo();
        let first = repo.actors().add(ActorInput {
            name: "Alice".to_string(),
            emoji: "🦊".to_string(),
            color: "#f00".to_string(),
        })?;
        let second = repo.actors().add(ActorInput {
            name: "Bob".to_string(),
            emoji: "🐻".to_string(),
            color: "#00f".to_string(),
        })?;

        assert_ne!(first.id, second.id);
        assert_eq!(repo.actors().get_all()?.len(), 2);
        Ok(())
    }

    #[test]
    fn tracking_edit_preserves_creation_time() -> Result<()> {
        let repo = repo();
        let added = repo.tracking().add(TrackingInput {
            data_id: "t1".to_string(),
            date: date!(2024 - 03 - 09),
            value: "7.5".to_string(),
            note: None,
        })?;

        let edited = repo.tracking().edit(
            &added.id,
            TrackingInput {
                data_id: "t1".to_string(),
                date: date!(2024 - 03 - 09),
                value: "8".to_string(),
                note: Some("slept in".to_string()),
            },
        )?;

        assert_eq!(edited.created_at, added.created_at);
        assert!(edited.edited_at >= added.edited_at);
        assert_eq!(edited.value, "8");

        let stored = repo.tracking().get_all()?;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].created_at, added.created_at);
        Ok(())
    }

    #[test]
    fn editing_missing_tracking_entry_fails() {
        let repo = repo();
        let result = repo.tracking().edit(
            "ghost",
            TrackingInput {
                data_id: "t1".to_string(),
                date: date!(2024 - 03 - 09),
                value: "1".to_string(),
                note: None,
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn diary_entries_round_trip_typed() -> Result<()> {
        let repo = repo();
        let added = repo.diary().add(DiaryInput {
            actor: "a1".to_string(),
            date: date!(2024 - 03 - 09),
            content: DiaryContent::Text("slow morning".to_string()),
        })?;

        let all = repo.diary().get_all()?;
        assert_eq!(all, vec![added]);
        Ok(())
    }

    #[test]
    fn track_data_without_shape_gets_the_default() -> Result<()> {
        let repo = repo();
        // Simulate a record persisted before the shape field existed.
        repo.insert(
            Category::TrackData,
            &json!({"id": "t1", "name": "Mood", "color": "#0f0", "type": "string",
                "createdAt": "2023-01-01T00:00:00Z", "editedAt": "2023-01-01T00:00:00Z"}),
        )?;

        let all = repo.track_data().get_all()?;
        assert_eq!(all[0].shape, "icon-[mdi--circle]");
        Ok(())
    }

    #[test]
    fn recipe_import_replaces_previous_records() -> Result<()> {
        let repo = repo();
        repo.recipes().add(RecipeInput {
            name: "Old".to_string(),
            ingredients: vec![],
            tags: vec![],
            content: Value::Null,
        })?;

        repo.recipes().import(&[RecipeRecord {
            id: "r9".to_string(),
            name: "Rendang".to_string(),
            ingredients: vec!["santan".to_string()],
            tags: vec!["pedas".to_string()],
            content: json!({"steps": []}),
        }])?;

        let all = repo.recipes().get_all()?;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "r9");
        Ok(())
    }
}
