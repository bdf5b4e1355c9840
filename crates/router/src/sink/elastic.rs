//! Elastic: document writes against an Elasticsearch-compatible HTTP API.

use std::time::Duration;

use tracing::debug;

use super::{Delivery, RecordSink, SinkError, SinkFuture};
use crate::conf::SinkConfig;
use crate::record::LogRecord;
use crate::route::RoutedRecord;

/// Longest response body kept in a [`SinkError::Rejected`].
const MAX_ERROR_BODY: usize = 512;

/// Writes each record with `POST {url}/{index}/_doc`.
///
/// Retries transport errors, 429 and 5xx up to `max_retries` times with
/// exponential backoff; other failures are returned immediately.
pub struct ElasticSink {
    http: reqwest::Client,
    base_url: String,
    default_index: String,
    username: String,
    password: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl ElasticSink {
    pub fn new(config: &SinkConfig) -> Result<Self, SinkError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| SinkError::Setup(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            default_index: config.default_index.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    pub fn document_url(&self, index: &str) -> String {
        format!("{}/{}/_doc", self.base_url, index)
    }

    /// Delay before retry number `attempt + 1`.
    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff.saturating_mul(1u32 << attempt.min(16))
    }

    async fn send_once(&self, index: &str, record: &LogRecord) -> Result<(), SinkError> {
        let mut request = self.http.post(self.document_url(index)).json(record);
        if !self.username.is_empty() {
            request = request.basic_auth(&self.username, Some(&self.password));
        }

        let resp = request.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let mut body = resp.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Err(SinkError::Rejected {
            index: index.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

impl RecordSink for ElasticSink {
    fn write<'a>(&'a self, routed: &'a RoutedRecord) -> SinkFuture<'a> {
        Box::pin(async move {
            let index = routed.index.as_deref().unwrap_or(&self.default_index);
            let mut attempt = 0;
            loop {
                match self.send_once(index, &routed.record).await {
                    Ok(()) => {
                        return Ok(Delivery {
                            index: index.to_string(),
                            retries: attempt,
                        })
                    }
                    Err(e) if e.is_retryable() && attempt < self.max_retries => {
                        let delay = self.backoff(attempt);
                        debug!(
                            index,
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Retrying sink write"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(e) if attempt > 0 => {
                        return Err(SinkError::Exhausted {
                            retries: attempt,
                            source: Box::new(e),
                        })
                    }
                    Err(e) => return Err(e),
                }
            }
        })
    }

    fn name(&self) -> &'static str {
        "elasticsearch"
    }

    fn destination(&self) -> String {
        self.base_url.clone()
    }
}
