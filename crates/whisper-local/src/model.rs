//! Model artifact management: know which ggml files exist, keep a local
//! copy valid, and fetch missing ones from blob storage.

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use vox_stt_interface::{
    BlobStore, PermanentError, PipelineError, PipelineResult, TransientError,
};

/// Blob path prefix the artifacts live under, e.g.
/// `whisper-models/ggml-medium.bin`.
pub const MODEL_BLOB_PREFIX: &str = "whisper-models";

/// Downloads below this fraction of the expected size are rejected.
const SIZE_TOLERANCE: f64 = 0.9;

#[derive(Debug, Clone, Copy)]
pub struct ModelSpec {
    pub name: &'static str,
    pub filename: &'static str,
    pub expected_mb: u64,
    /// Filled in per deployment when checksum validation is wanted.
    pub sha256: Option<&'static str>,
}

pub const MODEL_CATALOG: &[ModelSpec] = &[
    ModelSpec { name: "tiny", filename: "ggml-tiny.bin", expected_mb: 75, sha256: None },
    ModelSpec { name: "base", filename: "ggml-base.bin", expected_mb: 142, sha256: None },
    ModelSpec { name: "small", filename: "ggml-small.bin", expected_mb: 466, sha256: None },
    ModelSpec { name: "medium", filename: "ggml-medium.bin", expected_mb: 1500, sha256: None },
    ModelSpec { name: "large", filename: "ggml-large.bin", expected_mb: 2900, sha256: None },
];

pub fn model_spec(name: &str) -> Option<&'static ModelSpec> {
    MODEL_CATALOG.iter().find(|m| m.name == name)
}

pub fn known_model_names() -> Vec<&'static str> {
    MODEL_CATALOG.iter().map(|m| m.name).collect()
}

fn size_valid(len_bytes: u64, expected_mb: u64) -> bool {
    len_bytes as f64 >= expected_mb as f64 * 1024.0 * 1024.0 * SIZE_TOLERANCE
}

/// Ensures model artifacts are present and plausible before the engine
/// loads them. Validation is size-based with a 10% tolerance; checksum
/// validation is opt-in. Successfully validated models are remembered so
/// the hot path is a set lookup.
pub struct ModelFetcher {
    models_dir: PathBuf,
    verify_checksums: bool,
    validated: Mutex<HashSet<&'static str>>,
}

impl ModelFetcher {
    pub fn new(models_dir: impl Into<PathBuf>, verify_checksums: bool) -> Self {
        Self {
            models_dir: models_dir.into(),
            verify_checksums,
            validated: Mutex::new(HashSet::new()),
        }
    }

    pub fn local_path(&self, spec: &ModelSpec) -> PathBuf {
        self.models_dir.join(spec.filename)
    }

    /// Return a local path to a valid model artifact, downloading from the
    /// blob store when it is absent or fails validation.
    pub async fn ensure(&self, model: &str, blob: &dyn BlobStore) -> PipelineResult<PathBuf> {
        let spec = model_spec(model).ok_or_else(|| {
            PermanentError::MissingDependency(format!(
                "unknown model {model:?}, known models: {:?}",
                known_model_names()
            ))
        })?;
        let path = self.local_path(spec);

        if self.validated.lock().expect("fetcher lock poisoned").contains(spec.name) {
            return Ok(path);
        }

        if self.is_valid(spec, &path) {
            tracing::debug!(model, "model_already_present");
        } else {
            self.fetch(spec, &path, blob).await?;
        }

        self.validated
            .lock()
            .expect("fetcher lock poisoned")
            .insert(spec.name);
        Ok(path)
    }

    /// Pre-warm every catalog entry. Individual failures are logged and
    /// skipped so one missing artifact does not block the rest.
    pub async fn ensure_all(&self, blob: &dyn BlobStore) -> Vec<(&'static str, PipelineResult<PathBuf>)> {
        let mut results = Vec::with_capacity(MODEL_CATALOG.len());
        for spec in MODEL_CATALOG {
            let result = self.ensure(spec.name, blob).await;
            if let Err(err) = &result {
                tracing::warn!(model = spec.name, error = %err, "model_fetch_failed");
            }
            results.push((spec.name, result));
        }
        results
    }

    fn is_valid(&self, spec: &ModelSpec, path: &Path) -> bool {
        let Ok(meta) = std::fs::metadata(path) else {
            return false;
        };
        if !size_valid(meta.len(), spec.expected_mb) {
            tracing::warn!(
                model = spec.name,
                size_bytes = meta.len(),
                expected_mb = spec.expected_mb,
                "model_file_too_small"
            );
            return false;
        }
        if self.verify_checksums
            && let Some(expected) = spec.sha256
        {
            match sha256_of(path) {
                Ok(actual) if actual == expected => {}
                Ok(actual) => {
                    tracing::warn!(model = spec.name, %actual, expected, "model_checksum_mismatch");
                    return false;
                }
                Err(err) => {
                    tracing::warn!(model = spec.name, error = %err, "model_checksum_failed");
                    return false;
                }
            }
        }
        true
    }

    async fn fetch(&self, spec: &ModelSpec, path: &Path, blob: &dyn BlobStore) -> PipelineResult<()> {
        std::fs::create_dir_all(&self.models_dir).map_err(PipelineError::other)?;

        let key = format!("{MODEL_BLOB_PREFIX}/{}", spec.filename);
        if !blob.exists(&key).await? {
            return Err(PermanentError::MissingDependency(format!(
                "model artifact {key} not found in blob store"
            ))
            .into());
        }

        // Download to a partial name and rename, so a crash mid-transfer
        // never leaves a plausible-looking artifact behind.
        let part = path.with_extension("part");
        tracing::info!(model = spec.name, %key, "downloading_model");

        let result = self.download_and_validate(spec, &key, &part, blob).await;
        if result.is_err() {
            if let Err(err) = std::fs::remove_file(&part)
                && err.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!(error = %err, "partial_model_cleanup_failed");
            }
            return result;
        }

        std::fs::rename(&part, path).map_err(PipelineError::other)?;
        tracing::info!(model = spec.name, path = %path.display(), "model_ready");
        Ok(())
    }

    async fn download_and_validate(
        &self,
        spec: &ModelSpec,
        key: &str,
        part: &Path,
        blob: &dyn BlobStore,
    ) -> PipelineResult<()> {
        blob.download(key, part).await?;

        let meta = std::fs::metadata(part).map_err(PipelineError::other)?;
        if !size_valid(meta.len(), spec.expected_mb) {
            return Err(TransientError::BlobIo(format!(
                "downloaded model {key} is {} bytes, expected about {}MB",
                meta.len(),
                spec.expected_mb
            ))
            .into());
        }

        if self.verify_checksums
            && let Some(expected) = spec.sha256
        {
            let actual = sha256_of(part).map_err(PipelineError::other)?;
            if actual != expected {
                return Err(PermanentError::MissingDependency(format!(
                    "model artifact {key} failed checksum validation"
                ))
                .into());
            }
        }

        Ok(())
    }
}

fn sha256_of(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
