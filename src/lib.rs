// src/lib.rs

pub mod config;
pub mod error;
pub mod fetch;
pub mod registry;
pub mod server;
pub mod table;

pub use error::{Error, Result};
