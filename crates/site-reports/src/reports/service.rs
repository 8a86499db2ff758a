use std::sync::Arc;

use tracing::{info, info_span, Span};

use super::artifacts::{ArtifactError, SessionProvider};
use super::builder::{BuildError, BuildWarning, ReportBuilder, ReportDraft};
use super::domain::{ProjectId, Report, ReportId, ReportPatch};
use super::schema::FieldErrors;
use super::store::{apply_patch, ReportLinks, ReportStore, StoreError};

/// Outcome of a successful create: the persisted report plus builder notes.
#[derive(Debug, Clone)]
pub struct CreatedReport {
    pub report: Report,
    pub warnings: Vec<BuildWarning>,
}

/// Error raised by the report service, flattened into the kinds callers map
/// onto responses.
#[derive(Debug, thiserror::Error)]
pub enum ReportServiceError {
    #[error("invalid report content: {0}")]
    Validation(FieldErrors),
    #[error("invalid report variant: {0}")]
    InvalidVariant(String),
    #[error("report {0} not found")]
    NotFound(ReportId),
    #[error("report {0} already exists")]
    Conflict(ReportId),
    #[error("report {operation} failed: {message}")]
    Persistence {
        operation: &'static str,
        message: String,
    },
    #[error("no authenticated user is available to record as report author")]
    Unauthenticated,
    #[error(transparent)]
    Artifacts(#[from] ArtifactError),
}

impl From<StoreError> for ReportServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::InvalidVariant(reason) => Self::InvalidVariant(reason),
            StoreError::Validation(errors) => Self::Validation(errors),
            StoreError::Conflict(id) => Self::Conflict(id),
            StoreError::Unreadable { id, reason } => Self::Persistence {
                operation: "decode",
                message: format!("report {id}: {reason}"),
            },
            StoreError::Persistence { operation, message } => {
                Self::Persistence { operation, message }
            }
        }
    }
}

impl From<BuildError> for ReportServiceError {
    fn from(value: BuildError) -> Self {
        match value {
            BuildError::InvalidVariant(tag) => {
                Self::InvalidVariant(format!("unknown report type '{tag}'"))
            }
            BuildError::Validation(errors) => Self::Validation(errors),
            BuildError::Artifacts(err) => Self::Artifacts(err),
        }
    }
}

/// Entry point for report lifecycle operations: builds drafts, records the
/// session user as author, and delegates persistence to the store.
pub struct ReportService<S> {
    store: Arc<S>,
    builder: ReportBuilder,
    session: Arc<dyn SessionProvider>,
    span: Span,
}

impl<S> ReportService<S>
where
    S: ReportStore + 'static,
{
    pub fn new(store: Arc<S>, builder: ReportBuilder, session: Arc<dyn SessionProvider>) -> Self {
        Self {
            store,
            builder,
            session,
            span: info_span!("report_service"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn create(&self, draft: ReportDraft) -> Result<CreatedReport, ReportServiceError> {
        let author = self
            .session
            .current_user()
            .ok_or(ReportServiceError::Unauthenticated)?;
        let built = self.builder.build(draft, author).await?;
        let report = self.store.create(built.report).await?;
        info!(
            parent: &self.span,
            report_id = %report.id,
            report_type = %report.report_type(),
            project_id = %report.project_id,
            warnings = built.warnings.len(),
            "report created"
        );
        Ok(CreatedReport {
            report,
            warnings: built.warnings,
        })
    }

    pub async fn get(&self, id: &ReportId) -> Result<Report, ReportServiceError> {
        Ok(self.store.get_by_id(id).await?)
    }

    pub async fn list_by_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<Report>, ReportServiceError> {
        Ok(self.store.list_by_project(project_id).await?)
    }

    /// Apply a patch after checking that whatever photos, photo pairs, or
    /// milestone snapshot it introduces still belong to the report's project.
    pub async fn update(
        &self,
        id: &ReportId,
        patch: ReportPatch,
    ) -> Result<Report, ReportServiceError> {
        let current = self.store.get_by_id(id).await?;
        let revised = apply_patch(&current, &patch)?;
        self.builder
            .verify_revision(&current, &revised.content)
            .await?;

        let report = self.store.update(id, patch).await?;
        info!(parent: &self.span, report_id = %id, "report updated");
        Ok(report)
    }

    pub async fn delete(&self, id: &ReportId) -> Result<(), ReportServiceError> {
        self.store.delete(id).await?;
        info!(parent: &self.span, report_id = %id, "report deleted");
        Ok(())
    }

    pub async fn links(&self, id: &ReportId) -> Result<ReportLinks, ReportServiceError> {
        Ok(self.store.links(id).await?)
    }
}
