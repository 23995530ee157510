//! Blob store backed by a directory on the local filesystem.

use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use finvoice_core::error::{FinvoiceError, FinvoiceResult};
use finvoice_core::external::{BlobStore, StoredBlob};
use rand::Rng;
use tracing::debug;

const MAX_STEM_LEN: usize = 50;

#[derive(Debug, Clone)]
pub struct BlobConfig {
    /// Directory every stored path is relative to.
    pub root: PathBuf,
    /// Largest accepted payload (default: 10 MiB).
    pub max_file_size_bytes: u64,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./uploads"),
            max_file_size_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    config: BlobConfig,
}

impl LocalBlobStore {
    pub fn new(config: BlobConfig) -> Self {
        Self { config }
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }
}

/// Build `<unix-nanos>-<8 hex>-<stem><ext>` from a client-supplied name.
///
/// Directory parts are dropped, spaces become underscores and anything
/// outside `[A-Za-z0-9_-]` is removed from the stem, which is then cut
/// to 50 characters.
pub fn generate_file_name(original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let (stem, ext) = match base.rfind('.') {
        Some(idx) if idx > 0 => (&base[..idx], &base[idx..]),
        _ => (base, ""),
    };

    let stem: String = stem
        .chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(MAX_STEM_LEN)
        .collect();
    let ext: String = ext
        .chars()
        .filter(|c| *c == '.' || c.is_ascii_alphanumeric())
        .collect();

    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let tag: u32 = rand::rng().random();
    format!("{nanos}-{tag:08x}-{stem}{ext}")
}

/// Reject anything that could escape the store root.
fn checked_relative(path: &str) -> FinvoiceResult<&Path> {
    let p = Path::new(path);
    if path.is_empty() || !p.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(FinvoiceError::Validation {
            message: format!("invalid storage path: {path}"),
        });
    }
    Ok(p)
}

impl BlobStore for LocalBlobStore {
    fn max_file_size(&self) -> u64 {
        self.config.max_file_size_bytes
    }

    async fn save(
        &self,
        content: &[u8],
        original_name: &str,
        folder: &str,
    ) -> FinvoiceResult<StoredBlob> {
        let size = content.len() as u64;
        if size > self.config.max_file_size_bytes {
            return Err(FinvoiceError::Validation {
                message: format!(
                    "file size {size} bytes exceeds maximum allowed {} bytes",
                    self.config.max_file_size_bytes
                ),
            });
        }

        let folder = checked_relative(folder)?;
        let dir = self.config.root.join(folder);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| FinvoiceError::Collaborator(format!("create {}: {e}", dir.display())))?;

        let generated_name = generate_file_name(original_name);
        let absolute = dir.join(&generated_name);
        tokio::fs::write(&absolute, content)
            .await
            .map_err(|e| FinvoiceError::Collaborator(format!("write {}: {e}", absolute.display())))?;

        let relative_path = folder.join(&generated_name).to_string_lossy().into_owned();
        debug!(%relative_path, size, "Blob stored");
        Ok(StoredBlob {
            relative_path,
            generated_name,
        })
    }

    async fn resolve(&self, relative_path: &str) -> FinvoiceResult<PathBuf> {
        let absolute = self.config.root.join(checked_relative(relative_path)?);
        match tokio::fs::try_exists(&absolute).await {
            Ok(true) => Ok(absolute),
            Ok(false) => Err(FinvoiceError::NotFound {
                entity: "blob".into(),
                id: relative_path.to_owned(),
            }),
            Err(e) => Err(FinvoiceError::Collaborator(format!(
                "stat {}: {e}",
                absolute.display()
            ))),
        }
    }

    async fn delete(&self, relative_path: &str) -> FinvoiceResult<()> {
        let absolute = self.config.root.join(checked_relative(relative_path)?);
        match tokio::fs::remove_file(&absolute).await {
            Ok(()) => {
                debug!(%relative_path, "Blob removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FinvoiceError::Collaborator(format!(
                "remove {}: {e}",
                absolute.display()
            ))),
        }
    }
}
