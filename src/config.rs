// src/config.rs

use clap::Parser;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use crate::fetch::kaggle::DEFAULT_API_URL;

/// Command-line args, each with an environment fallback.
#[derive(Parser, Debug, Clone)]
#[command(name = "datashelf", version, about = "Download catalogued datasets and serve cleaned previews")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "DATASHELF_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// JSON document listing the known datasets
    #[arg(long, env = "DATASHELF_REGISTRY", default_value = "config/datasets.json")]
    pub registry: PathBuf,

    /// Where downloads are stored and files are read from
    #[arg(long, env = "DATASHELF_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Base URL of the Kaggle API
    #[arg(long, env = "KAGGLE_API_URL", default_value = DEFAULT_API_URL)]
    pub kaggle_api: String,

    /// Rows returned by read/clean when no `limit` is given
    #[arg(long, env = "DATASHELF_PREVIEW_ROWS", default_value_t = 10)]
    pub preview_rows: usize,

    /// Upper bound on `limit`
    #[arg(long, env = "DATASHELF_MAX_PREVIEW_ROWS", default_value_t = 1000)]
    pub max_preview_rows: usize,

    /// Default tracing directive; `RUST_LOG` takes precedence
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Rows to preview for a request asking for `requested`.
    pub fn preview_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.preview_rows)
            .min(self.max_preview_rows)
    }
}
