//! Model artifact store (C6): discovers AR(p) artifacts on disk, validates
//! them, and caches the parsed models in memory.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::domain::{ArModel, Instrument};
use crate::error::ModelError;

const FILENAME_RE_HINT: &str = "<instrument>_arima_model[_yyyymmdd].json";

#[derive(Debug, Deserialize)]
struct ArtifactFile {
    mean_diff_oc: f64,
    sigma2: f64,
    p: usize,
    #[serde(flatten)]
    rest: HashMap<String, serde_json::Value>,
}

impl ArtifactFile {
    fn coefficients(&self) -> Result<Vec<f64>, String> {
        let mut coeffs = vec![None; self.p];
        let mut seen = 0usize;
        for (key, value) in &self.rest {
            let Some(idx_str) = key.strip_prefix("ar.L") else {
                continue;
            };
            let idx: usize = idx_str
                .parse()
                .map_err(|_| format!("malformed coefficient key {key}"))?;
            if idx < 1 || idx > self.p {
                return Err(format!("coefficient index {idx} out of range 1..{}", self.p));
            }
            let v = value
                .as_f64()
                .ok_or_else(|| format!("coefficient {key} is not numeric"))?;
            coeffs[idx - 1] = Some(v);
            seen += 1;
        }
        if seen != self.p {
            return Err(format!("p={} but {seen} ar.L* keys present", self.p));
        }
        coeffs
            .into_iter()
            .enumerate()
            .map(|(i, c)| c.ok_or_else(|| format!("missing ar.L{}", i + 1)))
            .collect()
    }
}

/// Parses `<instrumentCodeLower>_arima_model[_yyyymmdd].json` into
/// `(instrument, version)`. Version is the date suffix, or `"legacy"` when
/// absent.
fn parse_filename(stem: &str) -> Option<(Instrument, String)> {
    let (code, rest) = stem.split_once('_')?;
    let instrument = Instrument::parse(code)?;
    let rest = rest.strip_prefix("arima_model")?;
    let version = if let Some(date) = rest.strip_prefix('_') {
        date.to_string()
    } else if rest.is_empty() {
        "legacy".to_string()
    } else {
        return None;
    };
    Some((instrument, version))
}

fn load_artifact(path: &Path) -> Result<(Instrument, String, ArModel), ModelError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ModelError::InvalidArtifact {
            path: path.display().to_string(),
            message: "non-utf8 filename".into(),
        })?;
    let (instrument, version) = parse_filename(stem).ok_or_else(|| ModelError::InvalidArtifact {
        path: path.display().to_string(),
        message: format!("filename does not match {FILENAME_RE_HINT}"),
    })?;

    let bytes = std::fs::read(path).map_err(|e| ModelError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let artifact: ArtifactFile = serde_json::from_slice(&bytes).map_err(|e| ModelError::InvalidArtifact {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    if !(1..=50).contains(&artifact.p) {
        return Err(ModelError::InvalidArtifact {
            path: path.display().to_string(),
            message: format!("p={} outside [1, 50]", artifact.p),
        });
    }
    let coefficients = artifact.coefficients().map_err(|message| ModelError::InvalidArtifact {
        path: path.display().to_string(),
        message,
    })?;

    let model = ArModel::new(
        instrument,
        artifact.p,
        coefficients,
        artifact.mean_diff_oc,
        artifact.sigma2,
        version.clone(),
        chrono::Utc::now(),
    );
    Ok((instrument, version, model))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Caches parsed AR(p) models keyed by `(instrument, version)`. Writers
/// (reload) take an exclusive swap; readers are otherwise lock-free against
/// each other through the `RwLock`'s shared-read path.
pub struct ModelArtifactStore {
    artifacts_dir: PathBuf,
    cache: RwLock<HashMap<(Instrument, String), Arc<ArModel>>>,
    stats: RwLock<CacheStats>,
}

impl ModelArtifactStore {
    pub fn new(artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifacts_dir: artifacts_dir.into(),
            cache: RwLock::new(HashMap::new()),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    /// Clears and re-scans the artifacts directory atomically (readers see
    /// either the old or the new cache, never a partial one).
    pub async fn reload(&self) -> Result<usize, ModelError> {
        let mut fresh = HashMap::new();
        let entries = std::fs::read_dir(&self.artifacts_dir).map_err(|e| ModelError::Io {
            path: self.artifacts_dir.display().to_string(),
            source: e,
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| ModelError::Io {
                path: self.artifacts_dir.display().to_string(),
                source: e,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match load_artifact(&path) {
                Ok((instrument, version, model)) => {
                    fresh.insert((instrument, version), Arc::new(model));
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping invalid artifact"),
            }
        }
        let count = fresh.len();
        *self.cache.write().await = fresh;
        let mut stats = self.stats.write().await;
        stats.entries = count;
        info!(count, "reloaded model artifacts");
        Ok(count)
    }

    pub async fn find_by_instrument_and_version(
        &self,
        instrument: Instrument,
        version: &str,
    ) -> Result<Arc<ArModel>, ModelError> {
        let cache = self.cache.read().await;
        let key = (instrument, version.to_string());
        let found = cache.get(&key).cloned();
        drop(cache);
        let mut stats = self.stats.write().await;
        match found {
            Some(m) => {
                stats.hits += 1;
                Ok(m)
            }
            None => {
                stats.misses += 1;
                Err(ModelError::NotFound {
                    instrument,
                    version: Some(version.to_string()),
                })
            }
        }
    }

    /// "Active" version semantics: lexicographically greatest version
    /// string wins (date suffixes sort correctly as `YYYYMMDD`; `"legacy"`
    /// sorts after any numeric date and is treated as the newest only when
    /// no dated artifact exists, which the lexicographic comparison does
    /// not guarantee in general — see DESIGN.md for the deployment note
    /// this deliberately documents per spec.md Open Question 4).
    pub async fn find_active_by_instrument(&self, instrument: Instrument) -> Result<Arc<ArModel>, ModelError> {
        let cache = self.cache.read().await;
        let best = cache
            .iter()
            .filter(|((i, _), _)| *i == instrument)
            .max_by_key(|((_, version), _)| version.clone())
            .map(|(_, m)| m.clone());
        drop(cache);
        let mut stats = self.stats.write().await;
        match best {
            Some(m) => {
                stats.hits += 1;
                Ok(m)
            }
            None => {
                stats.misses += 1;
                Err(ModelError::NotFound {
                    instrument,
                    version: None,
                })
            }
        }
    }

    pub async fn stats(&self) -> CacheStats {
        *self.stats.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_with_date_suffix_parses_version() {
        let (instrument, version) = parse_filename("btc_arima_model_20240115").unwrap();
        assert_eq!(instrument, Instrument::Btc);
        assert_eq!(version, "20240115");
    }

    #[test]
    fn filename_without_suffix_is_legacy() {
        let (instrument, version) = parse_filename("eth_arima_model").unwrap();
        assert_eq!(instrument, Instrument::Eth);
        assert_eq!(version, "legacy");
    }

    #[test]
    fn coefficient_count_mismatch_is_rejected() {
        let artifact = ArtifactFile {
            mean_diff_oc: 0.0,
            sigma2: 1.0,
            p: 3,
            rest: [("ar.L1".to_string(), serde_json::json!(0.1))].into_iter().collect(),
        };
        assert!(artifact.coefficients().is_err());
    }
}
