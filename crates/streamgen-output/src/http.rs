//! Stream client speaking the Kinesis JSON 1.1 protocol over HTTP.
//!
//! Requests are SigV4-signed when [`HttpClientConfig::credentials`] is set.
//! Without credentials they go out unsigned, which local emulators accept.

use crate::client::{
    PutRecordResult, PutRecordsOutput, StreamClient, StreamDescription, StreamStatus,
    THROUGHPUT_EXCEEDED,
};
use crate::error::{Result, StreamError};
use crate::sigv4::{Credentials, SignableRequest, Signer};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use streamgen_core::Record;
use tracing::trace;

const SIGNING_SERVICE: &str = "kinesis";

const CONTENT_TYPE_JSON_11: &str = "application/x-amz-json-1.1";
const TARGET_HEADER: &str = "X-Amz-Target";
const TARGET_PREFIX: &str = "Kinesis_20131202";

/// HTTP client settings.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL requests are POSTed to
    pub endpoint: String,
    /// Extra headers added to every request
    pub headers: BTreeMap<String, String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Region used in the signing scope
    pub region: String,
    /// Signing credentials; requests are unsigned when absent
    pub credentials: Option<Credentials>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4566".to_string(),
            headers: BTreeMap::new(),
            timeout: Duration::from_secs(30),
            region: "us-east-1".to_string(),
            credentials: None,
        }
    }
}

/// [`StreamClient`] backed by `reqwest`.
#[derive(Clone)]
pub struct HttpStreamClient {
    client: reqwest::Client,
    endpoint: String,
    host: String,
    path: String,
    signer: Option<Signer>,
}

impl HttpStreamClient {
    pub fn new(config: &HttpClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| StreamError::InvalidArgument(format!("header {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| StreamError::InvalidArgument(format!("header {}: {}", name, e)))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        let endpoint = format!("{}/", config.endpoint.trim_end_matches('/'));
        let url = reqwest::Url::parse(&endpoint)
            .map_err(|e| StreamError::InvalidArgument(format!("endpoint {}: {}", endpoint, e)))?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(StreamError::InvalidArgument(format!(
                    "endpoint {} has no host",
                    endpoint
                )))
            }
        };

        let signer = config
            .credentials
            .clone()
            .map(|credentials| Signer::new(credentials, &config.region, SIGNING_SERVICE));

        Ok(Self {
            client,
            path: url.path().to_string(),
            endpoint,
            host,
            signer,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// `Host` header value covered by request signatures.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_signing(&self) -> bool {
        self.signer.is_some()
    }

    async fn call<Req, Resp>(&self, operation: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_vec(request)?;
        let target = format!("{}.{}", TARGET_PREFIX, operation);
        trace!(operation, bytes = body.len(), "Sending request");

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, CONTENT_TYPE_JSON_11)
            .header(TARGET_HEADER, target.as_str());

        if let Some(signer) = &self.signer {
            let signed_headers = [("content-type", CONTENT_TYPE_JSON_11), ("x-amz-target", target.as_str())];
            let signable = SignableRequest {
                method: "POST",
                host: &self.host,
                path: &self.path,
                headers: &signed_headers,
                body: &body,
            };
            for (name, value) in signer.sign(&signable, chrono::Utc::now()) {
                builder = builder.header(name, value);
            }
        }

        let response = builder.body(body).send().await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &bytes));
        }

        if bytes.is_empty() {
            Ok(serde_json::from_slice(b"{}")?)
        } else {
            Ok(serde_json::from_slice(&bytes)?)
        }
    }
}

/// Maps an error response body onto a [`StreamError`].
pub fn classify_error(status: u16, body: &[u8]) -> StreamError {
    let parsed: Option<ErrorBody> = serde_json::from_slice(body).ok();

    let Some(ErrorBody {
        kind: Some(kind),
        message,
    }) = parsed
    else {
        return StreamError::Service {
            code: format!("HTTP {}", status),
            message: String::from_utf8_lossy(body).into_owned(),
        };
    };

    let code = kind.rsplit('#').next().unwrap_or(&kind).to_string();
    let message = message.unwrap_or_default();

    match code.as_str() {
        "ResourceNotFoundException" => StreamError::NotFound(message),
        "ResourceInUseException" => StreamError::InUse(message),
        "LimitExceededException" | THROUGHPUT_EXCEEDED => StreamError::Throttled(message),
        "InvalidArgumentException" => StreamError::InvalidArgument(message),
        _ => StreamError::Service { code, message },
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type")]
    kind: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Empty {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StreamNameRequest<'a> {
    stream_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateStreamRequest<'a> {
    stream_name: &'a str,
    shard_count: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AddTagsRequest<'a> {
    stream_name: &'a str,
    tags: &'a BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteStreamRequest<'a> {
    stream_name: &'a str,
    enforce_consumer_deletion: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PutRecordsRequest<'a> {
    stream_name: &'a str,
    records: Vec<PutRecordsEntry<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PutRecordsEntry<'a> {
    data: String,
    partition_key: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStreamSummaryResponse {
    stream_description_summary: StreamSummary,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StreamSummary {
    stream_name: String,
    stream_status: StreamStatus,
    #[serde(default)]
    open_shard_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PutRecordsResponse {
    #[serde(default)]
    failed_record_count: u32,
    records: Vec<PutRecordsResultEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PutRecordsResultEntry {
    shard_id: Option<String>,
    sequence_number: Option<String>,
    error_code: Option<String>,
    error_message: Option<String>,
}

impl From<PutRecordsResultEntry> for PutRecordResult {
    fn from(entry: PutRecordsResultEntry) -> Self {
        match entry.shard_id {
            Some(shard_id) => PutRecordResult::Delivered {
                shard_id,
                sequence_number: entry.sequence_number.unwrap_or_default(),
            },
            None => PutRecordResult::Failed {
                error_code: entry.error_code.unwrap_or_default(),
                error_message: entry.error_message.unwrap_or_default(),
            },
        }
    }
}

fn put_records_request<'a>(stream: &'a str, records: &'a [Record]) -> PutRecordsRequest<'a> {
    PutRecordsRequest {
        stream_name: stream,
        records: records
            .iter()
            .map(|r| PutRecordsEntry {
                data: STANDARD.encode(&r.data),
                partition_key: &r.partition_key,
            })
            .collect(),
    }
}

#[async_trait]
impl StreamClient for HttpStreamClient {
    async fn describe_stream(&self, stream: &str) -> Result<StreamDescription> {
        let response: DescribeStreamSummaryResponse = self
            .call("DescribeStreamSummary", &StreamNameRequest { stream_name: stream })
            .await?;
        let summary = response.stream_description_summary;
        Ok(StreamDescription {
            name: summary.stream_name,
            status: summary.stream_status,
            open_shard_count: summary.open_shard_count,
        })
    }

    async fn create_stream(&self, stream: &str, shard_count: u32) -> Result<()> {
        let _: Empty = self
            .call(
                "CreateStream",
                &CreateStreamRequest {
                    stream_name: stream,
                    shard_count,
                },
            )
            .await?;
        Ok(())
    }

    async fn add_tags(&self, stream: &str, tags: &BTreeMap<String, String>) -> Result<()> {
        let _: Empty = self
            .call(
                "AddTagsToStream",
                &AddTagsRequest {
                    stream_name: stream,
                    tags,
                },
            )
            .await?;
        Ok(())
    }

    async fn delete_stream(&self, stream: &str, enforce_consumer_deletion: bool) -> Result<()> {
        let _: Empty = self
            .call(
                "DeleteStream",
                &DeleteStreamRequest {
                    stream_name: stream,
                    enforce_consumer_deletion,
                },
            )
            .await?;
        Ok(())
    }

    async fn put_records(&self, stream: &str, records: &[Record]) -> Result<PutRecordsOutput> {
        let response: PutRecordsResponse = self
            .call("PutRecords", &put_records_request(stream, records))
            .await?;
        Ok(PutRecordsOutput {
            failed_record_count: response.failed_record_count,
            records: response.records.into_iter().map(PutRecordResult::from).collect(),
        })
    }
}
