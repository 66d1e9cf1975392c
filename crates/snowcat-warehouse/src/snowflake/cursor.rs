//! Row cursor over a Snowflake JSON result.
//!
//! The first rows arrive inline with the query response; larger results
//! list additional chunks on cloud storage that are fetched one at a time
//! as the caller reads past the rows already buffered.

use std::collections::VecDeque;
use std::io::Read;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::connection::{ColumnMeta, RowCursor};
use crate::error::WarehouseError;
use crate::value::CellValue;

use super::decode::{column_meta, decode_cell};
use super::wire::{ChunkRef, QueryResponseData, RowType};

type RawRow = Vec<Option<String>>;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub(crate) struct SnowflakeCursor {
    client: reqwest::Client,
    row_types: Option<Vec<RowType>>,
    buffered: VecDeque<RawRow>,
    chunks: VecDeque<ChunkRef>,
    chunk_headers: HeaderMap,
}

impl SnowflakeCursor {
    pub(crate) fn new(
        client: reqwest::Client,
        data: QueryResponseData,
    ) -> Result<Self, WarehouseError> {
        if let Some(format) = &data.query_result_format {
            if !format.eq_ignore_ascii_case("json") {
                return Err(WarehouseError::Protocol(format!(
                    "unsupported result format: {format}"
                )));
            }
        }

        let chunk_headers = chunk_headers(&data)?;
        Ok(Self {
            client,
            row_types: data.rowtype,
            buffered: data.rowset.unwrap_or_default().into(),
            chunks: data.chunks.unwrap_or_default().into(),
            chunk_headers,
        })
    }

    fn decode_row(&self, raw: RawRow) -> Result<Vec<CellValue>, WarehouseError> {
        let row_types = self
            .row_types
            .as_ref()
            .ok_or_else(|| WarehouseError::Metadata("response has no rowtype".to_string()))?;
        if raw.len() != row_types.len() {
            return Err(WarehouseError::Protocol(format!(
                "row has {} values but the result has {} columns",
                raw.len(),
                row_types.len()
            )));
        }
        raw.iter()
            .zip(row_types)
            .map(|(value, row_type)| decode_cell(value.as_deref(), row_type))
            .collect()
    }

    async fn download(&self, chunk: &ChunkRef) -> Result<Vec<RawRow>, WarehouseError> {
        tracing::debug!(rows = ?chunk.row_count, "Downloading result chunk");
        let response = self
            .client
            .get(&chunk.url)
            .headers(self.chunk_headers.clone())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WarehouseError::Protocol(format!(
                "result chunk download failed with HTTP {status}"
            )));
        }
        let body = response.bytes().await?;
        parse_chunk(&chunk_text(&body)?)
    }
}

#[async_trait]
impl RowCursor for SnowflakeCursor {
    fn columns(&self) -> Result<Vec<ColumnMeta>, WarehouseError> {
        self.row_types
            .as_ref()
            .map(|types| types.iter().map(column_meta).collect())
            .ok_or_else(|| WarehouseError::Metadata("response has no rowtype".to_string()))
    }

    async fn next_row(&mut self) -> Result<Option<Vec<CellValue>>, WarehouseError> {
        loop {
            if let Some(raw) = self.buffered.pop_front() {
                return self.decode_row(raw).map(Some);
            }
            let Some(chunk) = self.chunks.pop_front() else {
                return Ok(None);
            };
            self.buffered = self.download(&chunk).await?.into();
        }
    }
}

/// Chunk objects may be stored gzip-compressed without a `Content-Encoding`
/// header, so the body itself is checked.
fn chunk_text(body: &[u8]) -> Result<String, WarehouseError> {
    let bytes = if body.starts_with(&GZIP_MAGIC) {
        let mut inflated = Vec::new();
        GzDecoder::new(body)
            .read_to_end(&mut inflated)
            .map_err(|e| WarehouseError::Protocol(format!("corrupt compressed result chunk: {e}")))?;
        inflated
    } else {
        body.to_vec()
    };
    String::from_utf8(bytes)
        .map_err(|e| WarehouseError::Protocol(format!("result chunk is not UTF-8: {e}")))
}

/// Chunk bodies are a comma-separated run of row arrays with no enclosing
/// brackets.
fn parse_chunk(body: &str) -> Result<Vec<RawRow>, WarehouseError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&format!("[{trimmed}]"))
        .map_err(|e| WarehouseError::Protocol(format!("malformed result chunk: {e}")))
}

fn chunk_headers(data: &QueryResponseData) -> Result<HeaderMap, WarehouseError> {
    let mut headers = HeaderMap::new();
    let invalid = |e: String| WarehouseError::Protocol(format!("invalid chunk header: {e}"));

    if let Some(given) = &data.chunk_headers {
        for (name, value) in given {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
            let value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
            headers.insert(name, value);
        }
    } else if let Some(qrmk) = &data.qrmk {
        headers.insert(
            "x-amz-server-side-encryption-customer-algorithm",
            HeaderValue::from_static("AES256"),
        );
        headers.insert(
            "x-amz-server-side-encryption-customer-key",
            HeaderValue::from_str(qrmk).map_err(|e| invalid(e.to_string()))?,
        );
    }
    Ok(headers)
}
