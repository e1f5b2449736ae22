//! HTTP client for upstream policy engines.
//!
//! Each call is exactly one `GET` against the upstream.  Anything other than
//! a `200 application/json` response with the expected document shape comes
//! back as an [`UpstreamError`].

use std::collections::BTreeMap;
use std::time::Duration;

use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::UpstreamError;
use crate::types::UpstreamAddress;

/// Key every tables document must contain.
pub const TABLE_NAMES_KEY: &str = "table_names";

/// Document returned by an upstream's `/tables` endpoint.
pub type TablesDocument = BTreeMap<String, Vec<String>>;

/// Document returned by an upstream's `/tables/{name}` endpoint.
pub type RowsDocument = Map<String, Value>;

#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
}

impl UpstreamClient {
    /// Creates a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    pub fn tables_url(addr: &UpstreamAddress) -> String {
        format!("http://{}/tables", addr)
    }

    /// URL of `table` on `addr`. The table name is always one path segment.
    pub fn table_rows_url(addr: &UpstreamAddress, table: &str) -> Result<Url, UpstreamError> {
        let mut url = Url::parse(&Self::tables_url(addr))
            .map_err(|e| UpstreamError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| UpstreamError::InvalidUrl(format!("http://{}", addr)))?
            .push(table);
        Ok(url)
    }

    /// Fetches the list of tables available on `addr`.
    pub async fn tables(&self, addr: &UpstreamAddress) -> Result<TablesDocument, UpstreamError> {
        let document: TablesDocument = self.get_json(&Self::tables_url(addr)).await?;
        if !document.contains_key(TABLE_NAMES_KEY) {
            return Err(UpstreamError::UnexpectedDocument("missing table_names"));
        }
        Ok(document)
    }

    /// Fetches the rows of `table` from `addr`.
    pub async fn table_rows(
        &self,
        addr: &UpstreamAddress,
        table: &str,
    ) -> Result<RowsDocument, UpstreamError> {
        let url = Self::table_rows_url(addr, table)?;
        let document: Value = self.get_json(url.as_str()).await?;
        match document {
            Value::Object(rows) => Ok(rows),
            _ => Err(UpstreamError::UnexpectedDocument("expected a json object")),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, UpstreamError> {
        debug!("making request to upstream server {}", url);
        let response = self.http.get(url).send().await?;
        let response = check_response(response)?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn check_response(response: Response) -> Result<Response, UpstreamError> {
    if response.status() != StatusCode::OK {
        return Err(UpstreamError::UnexpectedStatus(response.status()));
    }
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !is_json(content_type) {
        return Err(UpstreamError::UnexpectedContentType(content_type.to_string()));
    }
    Ok(response)
}

/// Matches `application/json`, with or without parameters.
fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}
