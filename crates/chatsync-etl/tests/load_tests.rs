//! BigQuery partition load tests against a mock jobs API
//!
//! - The load job replaces `table$YYYYMMDD` with `WRITE_TRUNCATE`
//! - Running jobs are polled until done
//! - Job errors surface as `LoadRejected` with the warehouse diagnostics
//! - Every rejection logs the batch that was refused
//! - Upload and polls each ask the token source for a fresh token

mod common;

use chatsync_etl::credentials::{AccessToken, SharedTokenSource};
use chatsync_etl::normalize::normalize;
use chatsync_etl::warehouse::{BigQueryLoader, PartitionSink};
use chatsync_etl::{EtlError, NormalizedRecord, RecordType, TimeWindow};
use common::{RotatingTokens, StubRedactor};
use serde_json::json;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::Level;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JOBS_UPLOAD_PATH: &str = "/upload/bigquery/v2/projects/analytics-prod/jobs";

fn window() -> TimeWindow {
    TimeWindow::for_execution("2024-05-02T06:00:00+00:00").unwrap()
}

fn loader(server: &MockServer) -> BigQueryLoader {
    BigQueryLoader::new(
        common::warehouse_config(&server.uri()),
        Arc::new(AccessToken::new("ya29.test")),
    )
    .unwrap()
}

fn loader_with(server: &MockServer, tokens: SharedTokenSource) -> BigQueryLoader {
    BigQueryLoader::new(common::warehouse_config(&server.uri()), tokens).unwrap()
}

/// In-memory log sink for a scoped `fmt` subscriber
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        let logs = self.clone();
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || logs.clone())
            .finish()
    }

    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

async fn message_rows() -> Vec<NormalizedRecord> {
    let stub = StubRedactor::default();
    normalize(&common::messages_response(), RecordType::Message, &stub.redactor())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_load_replaces_partition() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(JOBS_UPLOAD_PATH))
        .and(query_param("uploadType", "multipart"))
        .and(header("authorization", "Bearer ya29.test"))
        .and(body_string_contains("\"writeDisposition\":\"WRITE_TRUNCATE\""))
        .and(body_string_contains("\"tableId\":\"messages$20240501\""))
        .and(body_string_contains("\"datasetId\":\"chatbot\""))
        .and(body_string_contains("6a0000000000000000000008"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobReference": {"projectId": "analytics-prod", "jobId": "job-1", "location": "US"},
            "status": {"state": "RUNNING"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/bigquery/v2/projects/analytics-prod/jobs/job-1"))
        .and(query_param("location", "US"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobReference": {"projectId": "analytics-prod", "jobId": "job-1", "location": "US"},
            "status": {"state": "DONE"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let rows = message_rows().await;
    let outcome = loader(&server)
        .load(&rows, RecordType::Message, &window())
        .await
        .unwrap();

    assert_eq!(outcome.rows, 8);
    assert_eq!(outcome.job_id.as_deref(), Some("job-1"));
    assert_eq!(outcome.table.to_string(), "analytics-prod.chatbot.messages$20240501");
}

#[tokio::test]
async fn test_load_rejected_with_diagnostics() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(JOBS_UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobReference": {"projectId": "analytics-prod", "jobId": "job-2"},
            "status": {
                "state": "DONE",
                "errorResult": {
                    "reason": "invalid",
                    "message": "JSON table encountered too many errors"
                },
                "errors": [
                    {"reason": "invalid", "location": "line 3", "message": "No such field: extra"}
                ]
            }
        })))
        .mount(&server)
        .await;

    let rows = message_rows().await;
    let err = loader(&server)
        .load(&rows, RecordType::Message, &window())
        .await
        .unwrap_err();

    match err {
        EtlError::LoadRejected { table, diagnostics } => {
            assert_eq!(table, "analytics-prod.chatbot.messages$20240501");
            assert!(diagnostics.contains("No such field: extra"));
        },
        other => panic!("expected LoadRejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_load_http_error_is_rejection() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(JOBS_UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not found: Table analytics-prod:chatbot.conversations"))
        .mount(&server)
        .await;

    let err = loader(&server)
        .load(&[], RecordType::Conversation, &window())
        .await
        .unwrap_err();

    assert!(matches!(err, EtlError::LoadRejected { ref diagnostics, .. } if diagnostics.contains("404")));
}

#[tokio::test]
async fn test_load_asks_for_token_per_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(JOBS_UPLOAD_PATH))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobReference": {"projectId": "analytics-prod", "jobId": "job-3", "location": "US"},
            "status": {"state": "RUNNING"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/bigquery/v2/projects/analytics-prod/jobs/job-3"))
        .and(header("authorization", "Bearer tok-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobReference": {"projectId": "analytics-prod", "jobId": "job-3", "location": "US"},
            "status": {"state": "DONE"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = loader_with(&server, Arc::new(RotatingTokens::default()))
        .load(&[], RecordType::Message, &window())
        .await
        .unwrap();

    assert_eq!(outcome.job_id.as_deref(), Some("job-3"));
}

#[tokio::test]
async fn test_http_rejection_logs_batch() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(JOBS_UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("Invalid schema update"))
        .mount(&server)
        .await;

    let logs = CapturedLogs::default();
    let _guard = tracing::subscriber::set_default(logs.subscriber());

    let rows = message_rows().await;
    let err = loader(&server)
        .load(&rows, RecordType::Message, &window())
        .await
        .unwrap_err();

    assert!(matches!(err, EtlError::LoadRejected { .. }));
    let output = logs.contents();
    assert_eq!(output.matches("Rejected batch").count(), 1);
    assert!(output.contains("6a0000000000000000000008"));
}

#[tokio::test]
async fn test_job_timeout_logs_batch() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(JOBS_UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobReference": {"projectId": "analytics-prod", "jobId": "job-4"},
            "status": {"state": "RUNNING"}
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/bigquery/v2/projects/analytics-prod/jobs/job-4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobReference": {"projectId": "analytics-prod", "jobId": "job-4"},
            "status": {"state": "RUNNING"}
        })))
        .mount(&server)
        .await;

    let mut config = common::warehouse_config(&server.uri());
    config.job_timeout = Duration::from_millis(50);
    let loader = BigQueryLoader::new(config, Arc::new(AccessToken::new("ya29.test"))).unwrap();

    let logs = CapturedLogs::default();
    let _guard = tracing::subscriber::set_default(logs.subscriber());

    let rows = message_rows().await;
    let err = loader
        .load(&rows, RecordType::Message, &window())
        .await
        .unwrap_err();

    match err {
        EtlError::LoadRejected { diagnostics, .. } => assert!(diagnostics.contains("still RUNNING")),
        other => panic!("expected LoadRejected, got {:?}", other),
    }
    let output = logs.contents();
    assert_eq!(output.matches("Rejected batch").count(), 1);
    assert!(output.contains("6a0000000000000000000008"));
}
