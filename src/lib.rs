// ABOUTME: Public library API for exporting Airtable bases
// ABOUTME: Re-exports core modules for the CLI and integration tests

pub mod api;
pub mod auth;
pub mod cli;
pub mod convert;
pub mod db;
pub mod encode;
pub mod error;
pub mod export;
pub mod model;
pub mod sink;
pub mod storage;

pub use error::{Error, Result};
pub use model::{RawRecord, Record};
