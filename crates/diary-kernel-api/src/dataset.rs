//! Whole-dataset export/import: one JSON document carrying every category,
//! written to a text file named after the current date. Import applies only
//! the keys present, each as an atomic per-category replace.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::Date;

use diary_kernel_core::{
    ActorRecord, DiaryRecord, RecipeRecord, TrackDataRecord, TrackingRecord,
};

use crate::Repository;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DataSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Vec<ActorRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_data: Option<Vec<TrackDataRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diary: Option<Vec<DiaryRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking: Option<Vec<TrackingRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resep: Option<Vec<RecipeRecord>>,
}

/// Snapshot every category through the facade.
///
/// # Errors
/// Propagates store failures.
pub fn export(repo: &Repository) -> Result<DataSet> {
    Ok(DataSet {
        actor: Some(repo.actors().get_all()?),
        track_data: Some(repo.track_data().get_all()?),
        diary: Some(repo.diary().get_all()?),
        tracking: Some(repo.tracking().get_all()?),
        resep: Some(repo.recipes().get_all()?),
    })
}

/// # Errors
/// Propagates store failures and serialization errors.
pub fn export_json(repo: &Repository) -> Result<String> {
    serde_json::to_string(&export(repo)?).context("failed to encode dataset")
}

/// Apply the categories present in the dataset, each as a replace-all.
///
/// # Errors
/// Propagates store failures; an error leaves already-applied categories in
/// place (per-category atomicity, not cross-category).
pub fn import(repo: &Repository, data: &DataSet) -> Result<()> {
    if let Some(actors) = &data.actor {
        repo.actors().import(actors)?;
    }
    if let Some(track_data) = &data.track_data {
        repo.track_data().import(track_data)?;
    }
    if let Some(diary) = &data.diary {
        repo.diary().import(diary)?;
    }
    if let Some(tracking) = &data.tracking {
        repo.tracking().import(tracking)?;
    }
    if let Some(recipes) = &data.resep {
        repo.recipes().import(recipes)?;
    }
    Ok(())
}

/// # Errors
/// Fails on malformed JSON, then propagates store failures.
pub fn import_json(repo: &Repository, raw: &str) -> Result<()> {
    let data: DataSet = serde_json::from_str(raw).context("malformed dataset file")?;
    import(repo, &data)
}

/// File name for an exported dataset, e.g. `diary-tracking-data-2026-08-05.txt`.
#[must_use]
pub fn export_file_name(date: Date) -> String {
    format!(
        "diary-tracking-data-{:04}-{:02}-{:02}.txt",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}
