// src/fetch/mod.rs

use futures::future::BoxFuture;
use std::path::Path;
use tracing::{info, instrument};

use crate::error::{Error, Result};
use crate::registry::Descriptor;

pub mod kaggle;
pub mod zips;

pub use kaggle::{Credentials, KaggleClient};

/// Raw payload returned by a provider, before anything touches the disk.
#[derive(Debug, Clone)]
pub struct Download {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// A source of datasets addressed by the provider's own identifier.
pub trait DatasetProvider: Send + Sync {
    fn download<'a>(&'a self, dataset_id: &'a str) -> BoxFuture<'a, Result<Download>>;
}

#[derive(Debug, Clone)]
pub struct FetchReport {
    pub dataset_id: String,
    /// Paths of the stored files, relative to the destination directory.
    pub files: Vec<String>,
}

/// Download `descriptor` from `provider` and store it, unpacked, under `dest_dir`.
#[instrument(level = "info", skip(provider, dest_dir), fields(dataset = %descriptor.name, dataset_id = %descriptor.dataset_id))]
pub async fn fetch_dataset(
    provider: &dyn DatasetProvider,
    descriptor: &Descriptor,
    dest_dir: &Path,
) -> Result<FetchReport> {
    tokio::fs::create_dir_all(dest_dir)
        .await
        .map_err(|e| Error::Fetch(format!("creating {}: {e}", dest_dir.display())))?;

    let download = provider.download(&descriptor.dataset_id).await?;
    info!(file = %download.file_name, bytes = download.bytes.len(), "downloaded");

    // archive extraction is blocking I/O
    let dest = dest_dir.to_path_buf();
    let files = tokio::task::spawn_blocking(move || zips::store(&download, &dest)).await??;
    info!(files = files.len(), dest = %dest_dir.display(), "stored");

    Ok(FetchReport {
        dataset_id: descriptor.dataset_id.clone(),
        files,
    })
}
