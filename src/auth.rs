// ABOUTME: API key discovery with precedence chain
// ABOUTME: CLI flag → AIRTABLE_KEY env var

use crate::{Error, Result};
use std::env;

pub const KEY_ENV_VAR: &str = "AIRTABLE_KEY";

pub fn resolve_key(cli_key: Option<String>) -> Result<String> {
    if let Some(key) = cli_key.filter(|k| !k.trim().is_empty()) {
        return Ok(key);
    }

    match env::var(KEY_ENV_VAR) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(Error::Auth(format!(
            "No Airtable API key found. Provide via --key or {} env var",
            KEY_ENV_VAR
        ))),
    }
}
