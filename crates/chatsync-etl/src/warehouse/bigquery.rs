//! BigQuery load jobs
//!
//! Rows are uploaded as newline-delimited JSON in a single multipart load job that
//! targets the `table$YYYYMMDD` partition decorator with `WRITE_TRUNCATE`, so the
//! warehouse swaps the partition atomically once the job succeeds.

use super::{LoadOutcome, PartitionSink, TableRef};
use crate::config::WarehouseConfig;
use crate::credentials::SharedTokenSource;
use crate::error::{EtlError, Result};
use crate::models::{NormalizedRecord, RecordType};
use crate::window::TimeWindow;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

const MULTIPART_BOUNDARY: &str = "chatsync_load_boundary";
const REQUEST_TIMEOUT_SECS: u64 = 300;
const STATE_DONE: &str = "DONE";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    status: JobStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    state: String,
    #[serde(default)]
    error_result: Option<JobError>,
    #[serde(default)]
    errors: Vec<JobError>,
}

#[derive(Debug, Deserialize)]
struct JobError {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason.as_deref().unwrap_or("error"))?;
        if let Some(location) = &self.location {
            write!(f, " at {}", location)?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

impl JobStatus {
    /// Diagnostics when the job failed, `None` when it succeeded
    fn diagnostics(&self) -> Option<String> {
        if self.error_result.is_none() && self.errors.is_empty() {
            return None;
        }

        let mut lines: Vec<String> = Vec::new();
        if let Some(err) = &self.error_result {
            lines.push(err.to_string());
        }
        lines.extend(self.errors.iter().map(ToString::to_string));
        lines.dedup();
        Some(lines.join("; "))
    }
}

/// [`PartitionSink`] backed by the BigQuery jobs API
pub struct BigQueryLoader {
    client: Client,
    config: WarehouseConfig,
    tokens: SharedTokenSource,
}

impl BigQueryLoader {
    pub fn new(config: WarehouseConfig, tokens: SharedTokenSource) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            config,
            tokens,
        })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn job_id(table: &TableRef) -> String {
        format!("chatsync_{}_{}_{}", table.table, table.partition, Uuid::new_v4().simple())
    }

    /// Load-job resource for one partition replacement
    fn job_config(&self, table: &TableRef, job_id: &str) -> Value {
        let mut job_reference = json!({
            "projectId": table.project,
            "jobId": job_id,
        });
        if let Some(location) = &self.config.location {
            job_reference["location"] = json!(location);
        }

        json!({
            "jobReference": job_reference,
            "configuration": {
                "load": {
                    "destinationTable": {
                        "projectId": table.project,
                        "datasetId": table.dataset,
                        "tableId": table.table_id(),
                    },
                    "sourceFormat": "NEWLINE_DELIMITED_JSON",
                    "writeDisposition": "WRITE_TRUNCATE",
                    "createDisposition": "CREATE_NEVER",
                }
            }
        })
    }

    fn multipart_body(metadata: &Value, rows: &str) -> Result<Vec<u8>> {
        let mut body = Vec::with_capacity(rows.len() + 1024);
        body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
        body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.extend_from_slice(&serde_json::to_vec(metadata)?);
        body.extend_from_slice(format!("\r\n--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(rows.as_bytes());
        body.extend_from_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
        Ok(body)
    }

    async fn insert_job(&self, table: &TableRef, metadata: &Value, rows: &str) -> Result<Job> {
        let url = format!(
            "{}/upload/bigquery/v2/projects/{}/jobs?uploadType=multipart",
            self.base_url(),
            table.project
        );

        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .post(&url)
            .bearer_auth(token.secret())
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
            )
            .body(Self::multipart_body(metadata, rows)?)
            .send()
            .await?;

        Self::read_job(table, response).await
    }

    async fn get_job(&self, table: &TableRef, job_id: &str, location: Option<&str>) -> Result<Job> {
        let url = format!(
            "{}/bigquery/v2/projects/{}/jobs/{}",
            self.base_url(),
            table.project,
            job_id
        );

        let token = self.tokens.access_token().await?;
        let mut request = self.client.get(&url).bearer_auth(token.secret());
        if let Some(location) = location {
            request = request.query(&[("location", location)]);
        }

        Self::read_job(table, request.send().await?).await
    }

    async fn read_job(table: &TableRef, response: reqwest::Response) -> Result<Job> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(EtlError::LoadRejected {
                table: table.to_string(),
                diagnostics: format!("jobs API returned {}: {}", status, body),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }

    /// Submit the load job and wait for it. Returns the job id the service assigned.
    async fn replace_partition(&self, table: &TableRef, job_id: String, rows: &str) -> Result<String> {
        let metadata = self.job_config(table, &job_id);
        let job = self.insert_job(table, &metadata, rows).await?;
        let job_id = job
            .job_reference
            .as_ref()
            .map(|r| r.job_id.clone())
            .unwrap_or(job_id);

        let status = self.wait_for_job(table, job, &job_id).await?;
        match status.diagnostics() {
            Some(diagnostics) => Err(EtlError::LoadRejected {
                table: table.to_string(),
                diagnostics: format!("job {}: {}", job_id, diagnostics),
            }),
            None => Ok(job_id),
        }
    }

    /// Poll until the job is done or the job timeout elapses.
    async fn wait_for_job(&self, table: &TableRef, mut job: Job, job_id: &str) -> Result<JobStatus> {
        let started = Instant::now();
        let location = job
            .job_reference
            .as_ref()
            .and_then(|r| r.location.clone())
            .or_else(|| self.config.location.clone());

        while job.status.state != STATE_DONE {
            if started.elapsed() >= self.config.job_timeout {
                return Err(EtlError::LoadRejected {
                    table: table.to_string(),
                    diagnostics: format!(
                        "job {} still {} after {:?}",
                        job_id,
                        job.status.state,
                        self.config.job_timeout
                    ),
                });
            }

            tokio::time::sleep(self.config.poll_interval).await;
            job = self.get_job(table, job_id, location.as_deref()).await?;
            debug!(job_id = %job_id, state = %job.status.state, "Polled load job");
        }

        Ok(job.status)
    }
}

/// Newline-delimited JSON, one row per record
fn to_ndjson(records: &[NormalizedRecord]) -> Result<String> {
    let mut rows = String::new();
    for record in records {
        rows.push_str(&serde_json::to_string(record)?);
        rows.push('\n');
    }
    Ok(rows)
}

#[async_trait]
impl PartitionSink for BigQueryLoader {
    #[instrument(skip(self, records), fields(rows = records.len()))]
    async fn load(
        &self,
        records: &[NormalizedRecord],
        record_type: RecordType,
        window: &TimeWindow,
    ) -> Result<LoadOutcome> {
        let table = TableRef::new(&self.config.project, &self.config.dataset, record_type, window);
        let job_id = Self::job_id(&table);
        let rows = to_ndjson(records)?;

        info!(table = %table, job_id = %job_id, rows = records.len(), "Submitting load job");

        let result = self.replace_partition(&table, job_id, &rows).await;
        if let Err(EtlError::LoadRejected { diagnostics, .. }) = &result {
            error!(table = %table, diagnostics = %diagnostics, "Load job failed");
            debug!(batch = %rows, "Rejected batch");
        }
        let job_id = result?;

        info!(table = %table, job_id = %job_id, rows = records.len(), "Partition replaced");
        Ok(LoadOutcome {
            table,
            rows: records.len(),
            job_id: Some(job_id),
        })
    }
}
