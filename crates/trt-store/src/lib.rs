// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Stores (§4.10): the `BaselineStore` and `ArtifactStore` interfaces and
//! their filesystem implementations, rooted at a state directory with the
//! `baselines/`, `fixtures/`, `current/`, `reports/`, `repros/`, `tmp/`
//! layout described in §6.3.
//!
//! Writes to final locations always go through a temp file in `tmp/`
//! followed by `fs::rename`, the same swap `trt_fixtures::FixtureBundle`
//! uses for its own bundle file, so a crash never leaves a half-written
//! baseline or artifact at its final path.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use trt_core::event::NormalizedEvent;
use trt_fixtures::FixtureBundle;

/// A recorded baseline: the canonicalized trace, its fixture bundle, and the
/// normalizer version that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub normalizer_version: String,
    pub events: Vec<NormalizedEvent>,
    pub fixtures: FixtureBundle,
}

/// Persists and resolves baselines keyed by spec name.
pub trait BaselineStore {
    /// Look up the baseline recorded for `spec_name`, if any.
    ///
    /// # Errors
    /// Returns an error if a baseline exists but cannot be read or parsed.
    fn resolve(&self, spec_name: &str) -> Result<Option<BaselineRecord>>;

    /// Atomically persist (or replace) the baseline for `spec_name`.
    ///
    /// # Errors
    /// Returns an error if the write cannot be completed.
    fn write(&self, spec_name: &str, record: &BaselineRecord) -> Result<()>;

    /// List every spec name with a recorded baseline, sorted.
    ///
    /// # Errors
    /// Returns an error if the backing directory cannot be read.
    fn list(&self) -> Result<Vec<String>>;
}

/// Content-addressed (by caller-supplied key) byte/file persistence for
/// reports, counterexample prefixes, and other run artifacts.
pub trait ArtifactStore {
    /// Atomically write `bytes` under `key`.
    ///
    /// # Errors
    /// Returns an error if the write cannot be completed.
    fn put_bytes(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Atomically copy the file at `path` to `key`.
    ///
    /// # Errors
    /// Returns an error if the source cannot be read or the copy fails.
    fn put_file(&self, key: &str, path: &Path) -> Result<()>;

    /// Read back the bytes stored under `key`.
    ///
    /// # Errors
    /// Returns an error if `key` does not exist or cannot be read.
    fn get_bytes(&self, key: &str) -> Result<Vec<u8>>;

    /// List every stored key whose path starts with `prefix`, sorted.
    ///
    /// # Errors
    /// Returns an error if the backing directory cannot be read.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Write `body` to `path` via a temp file in `tmp_dir` followed by
/// `fs::rename`, creating parent directories as needed.
fn write_atomic(tmp_dir: &Path, path: &Path, body: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::create_dir_all(tmp_dir).with_context(|| format!("create tmp dir {}", tmp_dir.display()))?;
    let tmp_path = tmp_dir.join(format!("{:x}.tmp", tmp_name_for(path)));
    fs::write(&tmp_path, body).with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("rename {} to {}", tmp_path.display(), path.display()))?;
    Ok(())
}

/// A short, unique name for a temp file derived from its final path, so
/// concurrent writes to distinct keys never collide in `tmp/`.
fn tmp_name_for(path: &Path) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    path.hash(&mut hasher);
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
        .hash(&mut hasher);
    hasher.finish()
}

/// Filesystem-backed [`BaselineStore`] rooted at `<state_dir>/baselines` and
/// `<state_dir>/fixtures`, with scratch space at `<state_dir>/tmp`.
#[derive(Debug, Clone)]
pub struct FsBaselineStore {
    baselines_dir: PathBuf,
    fixtures_dir: PathBuf,
    tmp_dir: PathBuf,
}

impl FsBaselineStore {
    /// Create a store from the three directories the caller resolved from
    /// configuration (typically `TrtConfig::{baselines,fixtures,tmp}_dir`).
    pub fn new(baselines_dir: impl Into<PathBuf>, fixtures_dir: impl Into<PathBuf>, tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            baselines_dir: baselines_dir.into(),
            fixtures_dir: fixtures_dir.into(),
            tmp_dir: tmp_dir.into(),
        }
    }

    fn trace_path(&self, spec_name: &str) -> PathBuf {
        self.baselines_dir.join(format!("{spec_name}.json"))
    }

    fn fixtures_path(&self, spec_name: &str) -> PathBuf {
        self.fixtures_dir.join(format!("{spec_name}.json"))
    }
}

/// The on-disk shape of a baseline trace file: just the events and
/// normalizer version. The fixture bundle is stored separately under
/// `fixtures/`, in its own file format owned by `trt_fixtures`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TraceFile {
    normalizer_version: String,
    events: Vec<NormalizedEvent>,
}

impl BaselineStore for FsBaselineStore {
    fn resolve(&self, spec_name: &str) -> Result<Option<BaselineRecord>> {
        let trace_path = self.trace_path(spec_name);
        if !trace_path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&trace_path)
            .with_context(|| format!("read baseline trace {}", trace_path.display()))?;
        let trace_file: TraceFile = serde_json::from_str(&content)
            .with_context(|| format!("parse baseline trace {}", trace_path.display()))?;
        let fixtures_path = self.fixtures_path(spec_name);
        let fixtures = FixtureBundle::load(&fixtures_path)
            .with_context(|| format!("load fixture bundle {}", fixtures_path.display()))?;
        Ok(Some(BaselineRecord {
            normalizer_version: trace_file.normalizer_version,
            events: trace_file.events,
            fixtures,
        }))
    }

    fn write(&self, spec_name: &str, record: &BaselineRecord) -> Result<()> {
        let trace_file = TraceFile {
            normalizer_version: record.normalizer_version.clone(),
            events: record.events.clone(),
        };
        let body = serde_json::to_vec_pretty(&trace_file).context("serialize baseline trace")?;
        write_atomic(&self.tmp_dir, &self.trace_path(spec_name), &body)?;
        record
            .fixtures
            .save_atomic(&self.fixtures_path(spec_name))
            .context("persist fixture bundle")?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        list_stems(&self.baselines_dir, "json")
    }
}

/// Filesystem-backed [`ArtifactStore`] rooted at an arbitrary directory
/// (typically `TrtConfig::{reports,repros,current}_dir`), with scratch
/// space at `<state_dir>/tmp`.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
    tmp_dir: PathBuf,
}

impl FsArtifactStore {
    /// Create a store rooted at `root`, using `tmp_dir` as atomic-write
    /// scratch space.
    pub fn new(root: impl Into<PathBuf>, tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tmp_dir: tmp_dir.into(),
        }
    }

    fn resolve_key(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        write_atomic(&self.tmp_dir, &self.resolve_key(key), bytes)
    }

    fn put_file(&self, key: &str, path: &Path) -> Result<()> {
        let bytes = fs::read(path).with_context(|| format!("read source file {}", path.display()))?;
        self.put_bytes(key, &bytes)
    }

    fn get_bytes(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve_key(key);
        fs::read(&path).with_context(|| format!("read artifact {}", path.display()))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        walk(&self.root, &self.root, &mut keys).context("list artifact store")?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("read directory {}", dir.display())),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk(root, &path, out)?;
        } else if let Ok(rel) = path.strip_prefix(root) {
            out.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(())
}

fn list_stems(dir: &Path, extension: &str) -> Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("read directory {}", dir.display())),
    };
    let mut stems = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some(extension) {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.push(stem.to_string());
            }
        }
    }
    stems.sort();
    Ok(stems)
}
