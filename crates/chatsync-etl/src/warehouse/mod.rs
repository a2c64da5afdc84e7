//! Partition loads into the analytics warehouse
//!
//! A load replaces one day's partition of one table in a single operation. Rerunning a
//! day therefore converges on the same partition contents.

pub mod bigquery;

pub use bigquery::BigQueryLoader;

use crate::error::Result;
use crate::models::{NormalizedRecord, RecordType};
use crate::window::TimeWindow;
use async_trait::async_trait;

/// Fully qualified address of one table partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
    /// `YYYYMMDD`
    pub partition: String,
}

impl TableRef {
    pub fn new(
        project: impl Into<String>,
        dataset: impl Into<String>,
        record_type: RecordType,
        window: &TimeWindow,
    ) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            table: record_type.collection().to_string(),
            partition: window.partition_suffix(),
        }
    }

    /// Partition decorator form, `table$YYYYMMDD`
    pub fn table_id(&self) -> String {
        format!("{}${}", self.table, self.partition)
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table_id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub table: TableRef,
    pub rows: usize,
    pub job_id: Option<String>,
}

/// Destination that overwrites a whole partition per call
#[async_trait]
pub trait PartitionSink: Send + Sync {
    async fn load(
        &self,
        records: &[NormalizedRecord],
        record_type: RecordType,
        window: &TimeWindow,
    ) -> Result<LoadOutcome>;
}
