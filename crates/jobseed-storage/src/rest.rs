use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    classify_reqwest_error, classify_status, BackoffPolicy, Filter, RemoteStore, Resolution,
    RetryDisposition, Returning, StoreError,
};

#[derive(Debug, Clone)]
pub struct RestConfig {
    pub base_url: String,
    pub service_key: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub backoff: BackoffPolicy,
}

impl RestConfig {
    pub fn new(base_url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            service_key: service_key.into(),
            timeout: Duration::from_secs(30),
            user_agent: Some(format!("jobseed/{}", env!("CARGO_PKG_VERSION"))),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// PostgREST client authenticated with a service-role key.
#[derive(Debug)]
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    backoff: BackoffPolicy,
}

impl RestStore {
    pub fn new(config: RestConfig) -> anyhow::Result<Self> {
        let key = HeaderValue::from_str(&config.service_key)
            .context("service key is not a valid header value")?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.service_key))
            .context("service key is not a valid header value")?;
        let mut headers = HeaderMap::new();
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .default_headers(headers);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().context("building reqwest client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            backoff: config.backoff,
        })
    }

    pub fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Sends the request built for each attempt (0 for the first), retrying
    /// retryable statuses and transport errors.
    async fn execute<F>(&self, table: &str, build: F) -> Result<reqwest::Response, StoreError>
    where
        F: Fn(usize) -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut attempt = 0usize;
        loop {
            match build(attempt).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    if classify_status(status) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        warn!(table, status = status.as_u16(), attempt, "retrying request");
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    let body = resp.text().await.unwrap_or_default();
                    return Err(StoreError::Status {
                        table: table.to_string(),
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        warn!(table, error = %err, attempt, "retrying request");
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(StoreError::Request {
                        table: table.to_string(),
                        source: err,
                    });
                }
            }
        }
    }

    /// A retried insert may follow an attempt that committed before the response was
    /// lost, so retries skip rows whose primary key already exists.
    pub fn insert_prefer(returning: Returning, attempt: usize) -> String {
        if attempt == 0 {
            returning.prefer().to_string()
        } else {
            format!(
                "{},{}",
                Resolution::IgnoreDuplicates.prefer(),
                returning.prefer()
            )
        }
    }

    async fn returned_rows(
        table: &str,
        resp: reqwest::Response,
        returning: Returning,
    ) -> Result<Vec<Value>, StoreError> {
        match returning {
            Returning::Minimal => Ok(Vec::new()),
            Returning::Representation => {
                resp.json::<Vec<Value>>()
                    .await
                    .map_err(|source| StoreError::Request {
                        table: table.to_string(),
                        source,
                    })
            }
        }
    }
}

#[async_trait]
impl RemoteStore for RestStore {
    async fn insert(
        &self,
        table: &str,
        rows: &[Value],
        returning: Returning,
    ) -> Result<Vec<Value>, StoreError> {
        let url = self.table_url(table);
        debug!(table, rows = rows.len(), "insert");
        let resp = self
            .execute(table, |attempt| {
                self.client
                    .post(&url)
                    .header("Prefer", Self::insert_prefer(returning, attempt))
                    .json(rows)
            })
            .await?;
        Self::returned_rows(table, resp, returning).await
    }

    async fn upsert(
        &self,
        table: &str,
        rows: &[Value],
        on_conflict: &str,
        resolution: Resolution,
        returning: Returning,
    ) -> Result<Vec<Value>, StoreError> {
        let url = self.table_url(table);
        let prefer = format!("{},{}", resolution.prefer(), returning.prefer());
        debug!(table, rows = rows.len(), on_conflict, "upsert");
        let resp = self
            .execute(table, |_| {
                self.client
                    .post(&url)
                    .query(&[("on_conflict", on_conflict)])
                    .header("Prefer", prefer.as_str())
                    .json(rows)
            })
            .await?;
        Self::returned_rows(table, resp, returning).await
    }

    async fn delete_where(&self, table: &str, filter: &Filter) -> Result<(), StoreError> {
        let url = self.table_url(table);
        let pair = filter.query_pair();
        debug!(table, filter = %pair.1, "delete");
        self.execute(table, |_| {
            self.client
                .delete(&url)
                .query(&[(&pair.0, &pair.1)])
                .header("Prefer", Returning::Minimal.prefer())
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_url_strips_trailing_slash() {
        let store = RestStore::new(RestConfig::new("https://demo.supabase.co/", "key")).expect("rest store");
        assert_eq!(
            store.table_url("job_skills"),
            "https://demo.supabase.co/rest/v1/job_skills"
        );
    }

    #[test]
    fn retried_inserts_ignore_rows_already_committed() {
        assert_eq!(
            RestStore::insert_prefer(Returning::Minimal, 0),
            "return=minimal"
        );
        assert_eq!(
            RestStore::insert_prefer(Returning::Minimal, 1),
            "resolution=ignore-duplicates,return=minimal"
        );
        assert_eq!(
            RestStore::insert_prefer(Returning::Representation, 3),
            "resolution=ignore-duplicates,return=representation"
        );
    }

    #[test]
    fn rejects_key_with_control_characters() {
        let err = RestStore::new(RestConfig::new("https://demo.supabase.co", "bad\nkey")).expect_err("control characters");
        assert!(err.to_string().contains("service key"));
    }
}
