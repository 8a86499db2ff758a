//! Persistence contract for reports and their artifact links.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::builder::{normalize, prepare_fields};
use super::domain::{
    MilestoneId, NewReport, PhotoId, ProjectId, ProjectSnapshot, Report, ReportId, ReportPatch,
    UserId,
};
use super::schema::{self, FieldErrors, SchemaError};

/// Row shape written by a store: base columns plus content as structured JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub id: ReportId,
    pub project_id: ProjectId,
    pub report_type: String,
    pub content: Value,
    pub generated_at: DateTime<Utc>,
    pub generated_by: UserId,
    pub updated_at: DateTime<Utc>,
    pub is_archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_snapshot: Option<ProjectSnapshot>,
}

/// Join rows for one report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportLinks {
    pub photo_ids: Vec<PhotoId>,
    pub milestone_ids: Vec<MilestoneId>,
}

impl ReportLinks {
    pub fn of(report: &Report) -> Self {
        Self {
            photo_ids: report.content.photo_ids(),
            milestone_ids: report.content.milestone_ids(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.photo_ids.is_empty() && self.milestone_ids.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("report {0} not found")]
    NotFound(ReportId),
    #[error("invalid report variant: {0}")]
    InvalidVariant(String),
    #[error("invalid report content: {0}")]
    Validation(FieldErrors),
    #[error("report {0} already exists")]
    Conflict(ReportId),
    #[error("report {id} content is unreadable: {reason}")]
    Unreadable { id: ReportId, reason: String },
    #[error("report store failed during {operation}: {message}")]
    Persistence {
        operation: &'static str,
        message: String,
    },
}

impl StoreError {
    pub fn persistence(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Persistence {
            operation,
            message: message.into(),
        }
    }
}

impl From<SchemaError> for StoreError {
    fn from(value: SchemaError) -> Self {
        match value {
            SchemaError::InvalidVariant(tag) => {
                Self::InvalidVariant(format!("unknown report type '{tag}'"))
            }
            SchemaError::Validation(errors) => Self::Validation(errors),
        }
    }
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Persist content and join rows together. Missing id and timestamp are assigned here.
    async fn create(&self, report: NewReport) -> Result<Report, StoreError>;
    async fn get_by_id(&self, id: &ReportId) -> Result<Report, StoreError>;
    /// Reports for a project, newest first. Unknown or blank ids yield an empty list.
    async fn list_by_project(&self, project_id: &ProjectId) -> Result<Vec<Report>, StoreError>;
    async fn update(&self, id: &ReportId, patch: ReportPatch) -> Result<Report, StoreError>;
    /// Removes the report row and its join rows. Artifacts are untouched.
    async fn delete(&self, id: &ReportId) -> Result<(), StoreError>;
    async fn links(&self, id: &ReportId) -> Result<ReportLinks, StoreError>;
}

/// Assign the id and timestamps a new report is missing.
pub fn materialize(report: NewReport) -> Report {
    let generated_at = report.generated_at.unwrap_or_else(Utc::now);
    Report {
        id: report.id.unwrap_or_else(ReportId::generate),
        project_id: report.project_id,
        generated_at,
        generated_by: report.generated_by,
        updated_at: generated_at,
        is_archived: false,
        project_snapshot: report.project_snapshot,
        content: report.content,
    }
}

pub fn encode(report: &Report) -> ReportRecord {
    ReportRecord {
        id: report.id.clone(),
        project_id: report.project_id.clone(),
        report_type: report.report_type().tag().to_string(),
        content: report.content.to_value(),
        generated_at: report.generated_at,
        generated_by: report.generated_by.clone(),
        updated_at: report.updated_at,
        is_archived: report.is_archived,
        project_snapshot: report.project_snapshot.clone(),
    }
}

/// Decode a stored row back into a typed report through the registry.
pub fn decode(record: &ReportRecord) -> Result<Report, StoreError> {
    let unreadable = |reason: String| StoreError::Unreadable {
        id: record.id.clone(),
        reason,
    };
    let content = schema::validate(&record.report_type, &record.content)
        .map_err(|err| unreadable(err.to_string()))?;

    Ok(Report {
        id: record.id.clone(),
        project_id: record.project_id.clone(),
        generated_at: record.generated_at,
        generated_by: record.generated_by.clone(),
        updated_at: record.updated_at,
        is_archived: record.is_archived,
        project_snapshot: record.project_snapshot.clone(),
        content,
    })
}

/// Merge a patch into an existing report.
///
/// Content keys are merged shallowly; a `null` value clears an optional key.
/// The merged content is coerced, validated and normalized the same way the
/// builder treats a fresh draft. Any attempt to change the report type
/// rejects the whole patch.
pub fn apply_patch(report: &Report, patch: &ReportPatch) -> Result<Report, StoreError> {
    let current = report.report_type();
    if let Some(requested) = patch.report_type.as_deref() {
        let requested = schema::parse_report_type(requested)?;
        if requested != current {
            return Err(StoreError::InvalidVariant(format!(
                "report type is fixed at creation and cannot change from {current} to {requested}"
            )));
        }
    }

    let mut updated = report.clone();
    if let Some(changes) = &patch.content {
        let mut merged = match report.content.to_value() {
            Value::Object(object) => object,
            _ => serde_json::Map::new(),
        };
        for (key, value) in changes {
            if value.is_null() {
                merged.remove(key);
            } else {
                merged.insert(key.clone(), value.clone());
            }
        }

        let variant = schema::schema(current);
        let mut warnings = Vec::new();
        prepare_fields(variant.fields, &mut merged, "", &mut warnings);
        let mut content = schema::validate_variant(current, &Value::Object(merged))?;
        normalize(&mut content);
        updated.content = content;
    }

    if let Some(archived) = patch.is_archived {
        updated.is_archived = archived;
    }
    updated.updated_at = Utc::now().max(report.updated_at);
    Ok(updated)
}
