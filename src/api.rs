// ABOUTME: Blocking HTTP client for the Airtable REST API
// ABOUTME: Handles auth headers, cursor pagination, page pacing, and fail-fast errors

use crate::model::{RawRecord, RecordPage};
use crate::{Error, Result};
use reqwest::blocking::Client;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.airtable.com";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const PAGE_DELAY: Duration = Duration::from_millis(200);

fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.len() <= max_chars {
        return s.to_string();
    }

    // Find a valid UTF-8 boundary at or before max_chars
    let mut boundary = max_chars;
    while boundary > 0 && !s.is_char_boundary(boundary) {
        boundary -= 1;
    }

    if boundary == 0 {
        return String::new();
    }

    format!("{}...", &s[..boundary])
}

fn default_user_agent() -> String {
    format!("airtable-export/{} (Rust)", env!("CARGO_PKG_VERSION"))
}

pub struct ApiClient {
    client: Client,
    base_url: String,
    key: String,
    user_agent: String,
    page_delay: Duration,
}

impl ApiClient {
    /// Builds a client. `read_timeout` pairs with a fixed connect timeout;
    /// `None` keeps reqwest's defaults. The blocking client has no read-only
    /// timeout, so the value bounds each whole request (connect, headers and
    /// body), which is at least as strict as a read timeout.
    pub fn new(key: String, base_url: Option<String>, read_timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = read_timeout {
            builder = builder.connect_timeout(CONNECT_TIMEOUT).timeout(timeout);
        }
        let client = builder.build()?;

        let base_url = base_url.unwrap_or_else(|| DEFAULT_API_BASE.into());

        Ok(ApiClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            key,
            user_agent: default_user_agent(),
            page_delay: PAGE_DELAY,
        })
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn disable_throttle(self) -> Self {
        self.with_page_delay(Duration::ZERO)
    }

    fn get<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        offset: Option<&str>,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, endpoint);
        tracing::debug!(url = %url, offset = ?offset, "GET");

        let mut request = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.key))
            .header("Accept", "application/json")
            .header("User-Agent", &self.user_agent);
        if let Some(offset) = offset {
            request = request.query(&[("offset", offset)]);
        }

        let response = request.send()?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            let preview = truncate_str(&message, 100);
            tracing::error!(status = status.as_u16(), endpoint, "Airtable API error");
            return Err(Error::Api {
                endpoint: endpoint.into(),
                status: status.as_u16(),
                message: preview,
            });
        }

        let body = response.text()?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                endpoint,
                body = %truncate_str(&body, 500),
                "Failed to parse response: {}",
                e
            );
            Error::Parse(e)
        })
    }

    /// Fetches the schema document for every table in the base.
    pub fn list_tables(&self, base_id: &str) -> Result<Value> {
        self.get(&format!("/v0/meta/bases/{}/tables", base_id), None)
    }

    /// Lazily pages through every record of `table`. No request is sent
    /// until the first item is pulled.
    pub fn records(&self, base_id: &str, table: &str) -> RecordPages<'_> {
        RecordPages {
            client: self,
            endpoint: format!("/v0/{}/{}", base_id, urlencoding::encode(table)),
            offset: None,
            buffer: VecDeque::new(),
            started: false,
            done: false,
            pauses: 0,
        }
    }

    fn fetch_page(&self, endpoint: &str, offset: Option<&str>) -> Result<RecordPage> {
        let page: RecordPage = self.get(endpoint, offset)?;
        tracing::debug!(
            endpoint,
            records = page.records.len(),
            more = page.offset.is_some(),
            "fetched page"
        );
        Ok(page)
    }
}

/// Finite, non-restartable sequence of raw records for one table. Ends
/// after the first error.
pub struct RecordPages<'a> {
    client: &'a ApiClient,
    endpoint: String,
    offset: Option<String>,
    buffer: VecDeque<RawRecord>,
    started: bool,
    done: bool,
    pauses: usize,
}

impl RecordPages<'_> {
    /// Number of inter-page delays slept so far.
    pub fn pauses(&self) -> usize {
        self.pauses
    }
}

impl Iterator for RecordPages<'_> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Some(Ok(record));
            }
            if self.done {
                return None;
            }

            if self.started && !self.client.page_delay.is_zero() {
                std::thread::sleep(self.client.page_delay);
                self.pauses += 1;
            }
            self.started = true;

            match self.client.fetch_page(&self.endpoint, self.offset.as_deref()) {
                Ok(page) => {
                    self.offset = page.offset;
                    self.done = self.offset.is_none();
                    self.buffer.extend(page.records);
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
