// src/fetch/kaggle.rs

use futures::future::BoxFuture;
use reqwest::{header::CONTENT_DISPOSITION, Client};
use serde::Deserialize;
use std::{env, fs::File, io::BufReader, path::PathBuf};
use tracing::{debug, warn};
use url::Url;

use super::{DatasetProvider, Download};
use crate::error::{Error, Result};

pub const DEFAULT_API_URL: &str = "https://www.kaggle.com/api/v1";

/// API credentials, as found in `kaggle.json`.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("key", &"***")
            .finish()
    }
}

impl Credentials {
    /// `KAGGLE_USERNAME`/`KAGGLE_KEY`, else `kaggle.json` in `KAGGLE_CONFIG_DIR` or `~/.kaggle`.
    pub fn discover() -> Option<Self> {
        if let (Ok(username), Ok(key)) = (env::var("KAGGLE_USERNAME"), env::var("KAGGLE_KEY")) {
            return Some(Self { username, key });
        }

        let dir = env::var_os("KAGGLE_CONFIG_DIR")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|h| PathBuf::from(h).join(".kaggle")))?;
        let path = dir.join("kaggle.json");
        let file = File::open(&path).ok()?;
        match serde_json::from_reader(BufReader::new(file)) {
            Ok(creds) => Some(creds),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring malformed kaggle.json");
                None
            }
        }
    }
}

/// Body of a Kaggle API error response.
#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Downloads whole datasets through the Kaggle public API.
#[derive(Debug, Clone)]
pub struct KaggleClient {
    http: Client,
    base: Url,
    credentials: Option<Credentials>,
}

impl KaggleClient {
    pub fn new(api_url: &str, credentials: Option<Credentials>) -> Result<Self> {
        let mut base = Url::parse(api_url)
            .map_err(|e| Error::InvalidInput(format!("invalid Kaggle API URL {api_url}: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http: Client::new(),
            base,
            credentials,
        })
    }

    fn download_url(&self, dataset_id: &str) -> Result<Url> {
        let (owner, slug) = split_reference(dataset_id)?;
        self.base
            .join(&format!("datasets/download/{owner}/{slug}"))
            .map_err(|e| Error::Provider(format!("building download URL for {dataset_id}: {e}")))
    }

    async fn fetch(&self, dataset_id: &str) -> Result<Download> {
        let url = self.download_url(dataset_id)?;
        let creds = self.credentials.as_ref().ok_or_else(|| {
            Error::Provider(
                "Kaggle API error: credentials not configured \
                 (set KAGGLE_USERNAME and KAGGLE_KEY or provide kaggle.json)"
                    .into(),
            )
        })?;

        debug!(%url, "requesting dataset");
        let resp = self
            .http
            .get(url.clone())
            .basic_auth(&creds.username, Some(&creds.key))
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("GET {url} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "Kaggle API error ({status}): {}",
                provider_message(&body, status.canonical_reason())
            )));
        }

        let file_name = resp
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition)
            .unwrap_or_else(|| {
                let (_, slug) = dataset_id.split_once('/').unwrap_or(("", dataset_id));
                format!("{slug}.zip")
            });

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::Fetch(format!("reading body from {url}: {e}")))?;

        Ok(Download {
            file_name,
            bytes: bytes.to_vec(),
        })
    }
}

impl DatasetProvider for KaggleClient {
    fn download<'a>(&'a self, dataset_id: &'a str) -> BoxFuture<'a, Result<Download>> {
        Box::pin(self.fetch(dataset_id))
    }
}

fn split_reference(dataset_id: &str) -> Result<(&str, &str)> {
    match dataset_id.split_once('/') {
        Some((owner, slug))
            if !owner.is_empty() && !slug.is_empty() && !slug.contains('/') =>
        {
            Ok((owner, slug))
        }
        _ => Err(Error::Provider(format!(
            "Kaggle API error: invalid dataset reference '{dataset_id}' (expected owner/slug)"
        ))),
    }
}

/// The `message` of a JSON error body, else the trimmed body, else the status reason.
fn provider_message(body: &str, reason: Option<&str>) -> String {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) {
        return parsed.message;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        reason.unwrap_or("no response body").to_string()
    } else {
        trimmed.to_string()
    }
}

fn filename_from_disposition(value: &str) -> Option<String> {
    value
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}
