//! File-backed persistence for successful extractions.
//!
//! Two sinks live under the data directory:
//! - `text_input/`: one file per request holding the raw job description,
//!   named `<Company>_<unix epoch>.txt`.
//! - `llm_output/`: one JSON array per model tier; each success is appended.
//!
//! The accumulation file is rewritten in full on each append. Writers are
//! serialised by an in-process lock and the new array lands via temp file +
//! rename, so readers never see a half-written file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

use crate::extraction::models::ModelKind;

const INPUT_DIR: &str = "text_input";
const OUTPUT_DIR: &str = "llm_output";
const UNKNOWN_COMPANY: &str = "Unknown";
const MAX_STEM_BYTES: usize = 100;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Accumulation file {0} does not contain a JSON array")]
    NotAnArray(PathBuf),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Sink for successful extractions.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Writes the raw input text; returns the path written.
    async fn save_raw_input(&self, company: &str, text: &str) -> Result<PathBuf, StorageError>;

    /// Appends `fields` to the model's accumulation file; returns the new array length.
    async fn append_result(
        &self,
        model: ModelKind,
        fields: &Map<String, Value>,
    ) -> Result<usize, StorageError>;

    /// Every accumulated extraction for `model`, oldest first.
    async fn load_results(&self, model: ModelKind) -> Result<Vec<Value>, StorageError>;
}

#[derive(Clone)]
pub struct FileStorage {
    input_dir: PathBuf,
    output_dir: PathBuf,
    append_lock: Arc<Mutex<()>>,
}

impl FileStorage {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            input_dir: data_dir.join(INPUT_DIR),
            output_dir: data_dir.join(OUTPUT_DIR),
            append_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn accumulation_path(&self, model: ModelKind) -> PathBuf {
        self.output_dir.join(format!("{}.json", model.display_name()))
    }
}

/// `"Acme Corp"` → `"Acme_Corp"`.
///
/// The name comes from model output, so anything outside `[A-Za-z0-9._-]`
/// becomes `_` and the result is capped at `MAX_STEM_BYTES`.
pub fn sanitize_company(company: &str) -> String {
    let mut stem: String = company
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if stem.len() > MAX_STEM_BYTES {
        let mut cut = MAX_STEM_BYTES;
        while !stem.is_char_boundary(cut) {
            cut -= 1;
        }
        stem.truncate(cut);
    }

    if stem.chars().all(|c| matches!(c, '_' | '.')) {
        return UNKNOWN_COMPANY.to_string();
    }
    stem
}

fn write_raw_input(dir: &Path, stem: &str, epoch: i64, text: &str) -> Result<PathBuf, StorageError> {
    fs::create_dir_all(dir)?;

    let mut candidate = dir.join(format!("{stem}_{epoch}.txt"));
    let mut counter = 1;
    loop {
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(mut file) => {
                file.write_all(text.as_bytes())?;
                return Ok(candidate);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                candidate = dir.join(format!("{stem}_{epoch}_{counter}.txt"));
                counter += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn read_array(path: &Path) -> Result<Vec<Value>, StorageError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(&raw)? {
        Value::Array(items) => Ok(items),
        _ => Err(StorageError::NotAnArray(path.to_path_buf())),
    }
}

fn append_to_array(path: &Path, entry: Value) -> Result<usize, StorageError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut items = read_array(path)?;
    items.push(entry);

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, &items)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| StorageError::Io(e.error))?;

    Ok(items.len())
}

#[async_trait]
impl Storage for FileStorage {
    async fn save_raw_input(&self, company: &str, text: &str) -> Result<PathBuf, StorageError> {
        let dir = self.input_dir.clone();
        let stem = sanitize_company(company);
        let text = text.to_string();
        let epoch = chrono::Utc::now().timestamp();

        let path =
            tokio::task::spawn_blocking(move || write_raw_input(&dir, &stem, epoch, &text))
                .await??;
        info!("Raw input written to {}", path.display());
        Ok(path)
    }

    async fn append_result(
        &self,
        model: ModelKind,
        fields: &Map<String, Value>,
    ) -> Result<usize, StorageError> {
        let path = self.accumulation_path(model);
        let entry = Value::Object(fields.clone());
        let lock = Arc::clone(&self.append_lock);

        let len = tokio::task::spawn_blocking(move || {
            let _guard = lock.lock().map_err(|_| StorageError::LockPoisoned)?;
            append_to_array(&path, entry)
        })
        .await??;
        info!("Appended extraction to {} accumulation ({} entries)", model, len);
        Ok(len)
    }

    async fn load_results(&self, model: ModelKind) -> Result<Vec<Value>, StorageError> {
        let path = self.accumulation_path(model);
        let lock = Arc::clone(&self.append_lock);
        tokio::task::spawn_blocking(move || {
            let _guard = lock.lock().map_err(|_| StorageError::LockPoisoned)?;
            read_array(&path)
        })
        .await?
    }
}
