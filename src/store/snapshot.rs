//! Atomic CSV snapshot persistence, reused from the original CSV-exporter's
//! write-to-tempfile-then-rename pattern (`ohlc.rs::update_csv_for_coin`).
//! The in-memory stores in this module use this purely as an optional
//! durability hook (load-on-start, snapshot-on-demand); it is not a
//! substitute for the real database this crate's DDL is out of scope for.

use csv::{ReaderBuilder, WriterBuilder};
use fs2::FileExt;
use serde::{de::DeserializeOwned, Serialize};
use std::fs::OpenOptions;
use std::path::Path;
use tempfile::NamedTempFile;

/// Writes `rows` to `path` atomically: serialize into a temp file in the
/// same directory, then rename over the target.
pub fn write_snapshot<T: Serialize>(path: &Path, rows: &[T]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let tmp = NamedTempFile::new_in(dir)?;
    {
        let mut wtr = WriterBuilder::new().from_writer(tmp.as_file());
        for row in rows {
            wtr.serialize(row).map_err(std::io::Error::other)?;
        }
        wtr.flush()?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

pub fn read_snapshot<T: DeserializeOwned>(path: &Path) -> std::io::Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut rdr = ReaderBuilder::new().from_path(path)?;
    let mut out = Vec::new();
    for rec in rdr.deserialize::<T>() {
        out.push(rec.map_err(std::io::Error::other)?);
    }
    Ok(out)
}

/// Acquires an exclusive advisory lock on `lock_path`, held for as long as
/// the returned file handle is alive. Mirrors the single-instance lock used
/// by the original daemon mode.
pub fn acquire_lock(lock_path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .read(true)
        .write(true)
        .open(lock_path)?;
    file.lock_exclusive()?;
    Ok(file)
}
