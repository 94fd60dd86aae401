//! Pipeline job entity
//!
//! One row per logical step invocation; ids are minted fresh so re-running
//! a step inserts a new row instead of mutating a prior one.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Job status enum
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Done,
    Failed,
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "done" => JobStatus::Done,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Running,
        }
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Running => "running".to_string(),
            JobStatus::Done => "done".to_string(),
            JobStatus::Failed => "failed".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pipeline_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Step kind, e.g. "summarize" or "generate_cover"
    #[sea_orm(column_type = "Text")]
    pub kind: String,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    #[sea_orm(column_type = "JsonBinary")]
    pub input: Json,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub output: Option<Json>,

    #[sea_orm(column_type = "Text", nullable)]
    pub error: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Get the job status as an enum
    pub fn job_status(&self) -> JobStatus {
        JobStatus::from(self.status.clone())
    }

    /// Check if the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self.job_status(), JobStatus::Done | JobStatus::Failed)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        assert_eq!(JobStatus::from("running".to_string()), JobStatus::Running);
        assert_eq!(JobStatus::from("done".to_string()), JobStatus::Done);
        assert_eq!(JobStatus::from("failed".to_string()), JobStatus::Failed);
        assert_eq!(String::from(JobStatus::Failed), "failed");
    }
}
