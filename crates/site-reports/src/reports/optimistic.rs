//! Local report list for UI-facing callers that show edits before the store
//! confirms them.

use std::sync::Arc;

use super::domain::{ProjectId, Report, ReportId, ReportPatch};
use super::store::{apply_patch, ReportStore, StoreError};

/// Holds a project's reports locally. Updates and deletes change local state
/// first; when the store call fails the previous state is restored.
pub struct OptimisticReportList<S> {
    store: Arc<S>,
    project_id: ProjectId,
    reports: Vec<Report>,
}

impl<S> OptimisticReportList<S>
where
    S: ReportStore + 'static,
{
    pub async fn load(store: Arc<S>, project_id: ProjectId) -> Result<Self, StoreError> {
        let reports = store.list_by_project(&project_id).await?;
        Ok(Self {
            store,
            project_id,
            reports,
        })
    }

    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    pub fn get(&self, id: &ReportId) -> Option<&Report> {
        self.reports.iter().find(|report| &report.id == id)
    }

    pub async fn refresh(&mut self) -> Result<(), StoreError> {
        self.reports = self.store.list_by_project(&self.project_id).await?;
        Ok(())
    }

    pub async fn update(
        &mut self,
        id: &ReportId,
        patch: ReportPatch,
    ) -> Result<Report, StoreError> {
        let index = self.position(id)?;
        let previous = self.reports[index].clone();
        self.reports[index] = apply_patch(&previous, &patch)?;

        match self.store.update(id, patch).await {
            Ok(saved) => {
                self.reports[index] = saved.clone();
                Ok(saved)
            }
            Err(err) => {
                self.reports[index] = previous;
                Err(err)
            }
        }
    }

    pub async fn delete(&mut self, id: &ReportId) -> Result<(), StoreError> {
        let index = self.position(id)?;
        let removed = self.reports.remove(index);

        match self.store.delete(id).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.reports.insert(index, removed);
                Err(err)
            }
        }
    }

    fn position(&self, id: &ReportId) -> Result<usize, StoreError> {
        self.reports
            .iter()
            .position(|report| &report.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}
