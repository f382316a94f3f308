//! Bulk loader for the CSV export of the school dataset.

use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::db::{insert_batch, truncate_all, Record};
use crate::models::{Assignment, Class, Grade, School, Student, Teacher};

#[derive(Debug, Clone, PartialEq)]
pub struct LoadSummary {
    pub file: &'static str,
    /// `None` when the file was not present in the directory.
    pub rows: Option<usize>,
    pub inserted: u64,
}

pub fn read_rows<R: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<R>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut rows = Vec::new();
    for (index, result) in reader.deserialize::<R>().enumerate() {
        // header is line 1
        let row = result.with_context(|| {
            format!("{}: malformed row at line {}", path.display(), index + 2)
        })?;
        rows.push(row);
    }
    Ok(rows)
}

async fn load_file<R>(pool: &PgPool, dir: &Path, file: &'static str) -> anyhow::Result<LoadSummary>
where
    R: Record + DeserializeOwned,
{
    let path = dir.join(file);
    if !path.exists() {
        warn!("{file} not found in {}, skipping", dir.display());
        return Ok(LoadSummary {
            file,
            rows: None,
            inserted: 0,
        });
    }

    let rows: Vec<R> = read_rows(&path)?;
    let mut tx = pool.begin().await?;
    let inserted = insert_batch(&mut *tx, &rows).await?;
    tx.commit().await?;

    info!("{file}: {inserted} of {} rows inserted", rows.len());
    Ok(LoadSummary {
        file,
        rows: Some(rows.len()),
        inserted,
    })
}

pub async fn import_dir(
    pool: &PgPool,
    dir: &Path,
    replace: bool,
) -> anyhow::Result<Vec<LoadSummary>> {
    anyhow::ensure!(dir.is_dir(), "{} is not a directory", dir.display());

    if replace {
        let mut conn = pool.acquire().await?;
        truncate_all(&mut conn).await?;
        info!("emptied all gradebook tables");
    }

    Ok(vec![
        load_file::<School>(pool, dir, "anagrafica_scuole_pulita.csv").await?,
        load_file::<Class>(pool, dir, "classi.csv").await?,
        load_file::<Student>(pool, dir, "studenti.csv").await?,
        load_file::<Teacher>(pool, dir, "docenti.csv").await?,
        load_file::<Assignment>(pool, dir, "assegnazioni_docenti.csv").await?,
        load_file::<Grade>(pool, dir, "voti.csv").await?,
    ])
}
