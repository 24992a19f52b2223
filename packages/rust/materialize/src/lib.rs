//! Bundle materialization: fetch a served bundle and persist it to disk.
//!
//! Each call is an independent unit of work. Nothing touches the target path
//! until the fetch has succeeded, and the write goes through a sibling temp
//! file that is renamed into place, so readers see either the old bundle or
//! the new one.

use std::path::{Path, PathBuf};

use rnws_fetch::ArtifactFetcher;
use rnws_shared::{BundleEndpoint, Result, RnwsError};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

/// A bundle written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedBundle {
    pub target_path: PathBuf,
    pub size_bytes: usize,
    /// Hex SHA-256 of the written content.
    pub sha256: String,
}

/// Pulls bundles from a [`BundleEndpoint`] and writes them to target paths.
#[derive(Debug, Clone)]
pub struct BundleMaterializer {
    fetcher: ArtifactFetcher,
}

impl BundleMaterializer {
    pub fn new(fetcher: ArtifactFetcher) -> Self {
        Self { fetcher }
    }

    /// Fetch `http://{hostname}:{port}{bundle_path}` and write it to `target_path`.
    ///
    /// `bundle_path` is used verbatim and must start with `/`. Missing parent
    /// directories of `target_path` are created. An existing file is replaced.
    #[instrument(skip_all, fields(bundle_path = %bundle_path, target = %target_path.display()))]
    pub async fn materialize<E>(
        &self,
        endpoint: &E,
        bundle_path: &str,
        target_path: &Path,
    ) -> Result<MaterializedBundle>
    where
        E: BundleEndpoint + ?Sized,
    {
        let url = format!("{}{bundle_path}", endpoint.base_url());
        let content = self.fetcher.fetch(&url).await?;

        if let Some(parent) = target_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| RnwsError::io(parent, e))?;
            }
        }

        write_replacing(target_path, &content).await?;

        let materialized = MaterializedBundle {
            target_path: target_path.to_path_buf(),
            size_bytes: content.len(),
            sha256: content_hash(&content),
        };

        info!(
            %url,
            size_bytes = materialized.size_bytes,
            sha256 = %materialized.sha256,
            "bundle written"
        );
        Ok(materialized)
    }
}

/// Write to `.<name>.tmp` next to `target`, then rename over it.
async fn write_replacing(target: &Path, content: &[u8]) -> Result<()> {
    let file_name = target
        .file_name()
        .ok_or_else(|| {
            RnwsError::io(
                target,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "target has no file name"),
            )
        })?
        .to_string_lossy();
    let temp = target.with_file_name(format!(".{file_name}.tmp"));

    tokio::fs::write(&temp, content)
        .await
        .map_err(|e| RnwsError::io(&temp, e))?;

    if let Err(e) = tokio::fs::rename(&temp, target).await {
        if let Err(cleanup) = tokio::fs::remove_file(&temp).await {
            debug!(temp = %temp.display(), error = %cleanup, "could not remove temp file");
        }
        return Err(RnwsError::io(target, e));
    }

    Ok(())
}

fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}
