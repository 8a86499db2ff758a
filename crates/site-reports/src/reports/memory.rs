//! In-process implementations of the store and artifact providers, used by
//! the API service, the demo command, and tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, info_span, warn, Span};

use super::artifacts::{ArtifactError, Milestone, MilestoneProvider, Photo, PhotoProvider};
use super::domain::{MilestoneId, NewReport, PhotoId, ProjectId, Report, ReportId, ReportPatch};
use super::store::{
    apply_patch, decode, encode, materialize, ReportLinks, ReportRecord, ReportStore, StoreError,
};

#[derive(Default)]
struct Tables {
    reports: HashMap<ReportId, ReportRecord>,
    report_photos: BTreeSet<(ReportId, PhotoId)>,
    report_milestones: BTreeSet<(ReportId, MilestoneId)>,
}

impl Tables {
    fn unlink(&mut self, id: &ReportId) {
        self.report_photos.retain(|(report_id, _)| report_id != id);
        self.report_milestones.retain(|(report_id, _)| report_id != id);
    }

    fn link(&mut self, report: &Report) {
        self.unlink(&report.id);
        let links = ReportLinks::of(report);
        for photo_id in links.photo_ids {
            self.report_photos.insert((report.id.clone(), photo_id));
        }
        for milestone_id in links.milestone_ids {
            self.report_milestones.insert((report.id.clone(), milestone_id));
        }
    }
}

/// Report rows and join rows behind one lock, so content and links always
/// change together.
pub struct InMemoryReportStore {
    tables: Mutex<Tables>,
    span: Span,
}

impl Default for InMemoryReportStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            span: info_span!("report_store"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Insert a raw row as-is, bypassing validation. Lets callers load rows
    /// written by older releases.
    pub fn insert_record(&self, record: ReportRecord) -> Result<(), StoreError> {
        let mut tables = self.lock("insert_record")?;
        tables.reports.insert(record.id.clone(), record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tables
            .lock()
            .map(|tables| tables.reports.len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::persistence(operation, "report table lock poisoned"))
    }

    fn load(tables: &Tables, id: &ReportId) -> Result<Report, StoreError> {
        let record = tables
            .reports
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        decode(record)
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn create(&self, report: NewReport) -> Result<Report, StoreError> {
        let report = materialize(report);
        let mut tables = self.lock("create")?;
        if tables.reports.contains_key(&report.id) {
            return Err(StoreError::Conflict(report.id));
        }
        tables.reports.insert(report.id.clone(), encode(&report));
        tables.link(&report);
        debug!(
            parent: &self.span,
            report_id = %report.id,
            report_type = %report.report_type(),
            "report created"
        );
        Ok(report)
    }

    async fn get_by_id(&self, id: &ReportId) -> Result<Report, StoreError> {
        let tables = self.lock("get_by_id")?;
        Self::load(&tables, id)
    }

    async fn list_by_project(&self, project_id: &ProjectId) -> Result<Vec<Report>, StoreError> {
        if project_id.as_str().trim().is_empty() {
            return Ok(Vec::new());
        }

        let tables = self.lock("list_by_project")?;
        let mut reports: Vec<Report> = tables
            .reports
            .values()
            .filter(|record| &record.project_id == project_id)
            .filter_map(|record| match decode(record) {
                Ok(report) => Some(report),
                Err(err) => {
                    warn!(parent: &self.span, report_id = %record.id, "skipping report: {err}");
                    None
                }
            })
            .collect();
        reports.sort_by(|a, b| {
            b.generated_at
                .cmp(&a.generated_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(reports)
    }

    async fn update(&self, id: &ReportId, patch: ReportPatch) -> Result<Report, StoreError> {
        let mut tables = self.lock("update")?;
        let current = Self::load(&tables, id)?;
        let updated = apply_patch(&current, &patch)?;
        tables.reports.insert(updated.id.clone(), encode(&updated));
        tables.link(&updated);
        debug!(parent: &self.span, report_id = %id, "report updated");
        Ok(updated)
    }

    async fn delete(&self, id: &ReportId) -> Result<(), StoreError> {
        let mut tables = self.lock("delete")?;
        if tables.reports.remove(id).is_none() {
            return Err(StoreError::NotFound(id.clone()));
        }
        tables.unlink(id);
        debug!(parent: &self.span, report_id = %id, "report deleted");
        Ok(())
    }

    async fn links(&self, id: &ReportId) -> Result<ReportLinks, StoreError> {
        let tables = self.lock("links")?;
        if !tables.reports.contains_key(id) {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(ReportLinks {
            photo_ids: tables
                .report_photos
                .iter()
                .filter(|(report_id, _)| report_id == id)
                .map(|(_, photo_id)| photo_id.clone())
                .collect(),
            milestone_ids: tables
                .report_milestones
                .iter()
                .filter(|(report_id, _)| report_id == id)
                .map(|(_, milestone_id)| milestone_id.clone())
                .collect(),
        })
    }
}

/// Photos and milestones held in memory, keyed by id.
#[derive(Default)]
pub struct InMemoryArtifactCatalog {
    photos: Mutex<Vec<Photo>>,
    milestones: Mutex<Vec<Milestone>>,
}

impl InMemoryArtifactCatalog {
    pub fn new(photos: Vec<Photo>, milestones: Vec<Milestone>) -> Self {
        Self {
            photos: Mutex::new(photos),
            milestones: Mutex::new(milestones),
        }
    }

    pub fn add_photo(&self, photo: Photo) -> Result<(), ArtifactError> {
        self.photos
            .lock()
            .map_err(|_| poisoned("photo"))?
            .push(photo);
        Ok(())
    }

    /// Drops a photo from the catalog; reports referencing it keep the id.
    pub fn remove_photo(&self, id: &PhotoId) -> Result<(), ArtifactError> {
        self.photos
            .lock()
            .map_err(|_| poisoned("photo"))?
            .retain(|photo| &photo.id != id);
        Ok(())
    }

    pub fn add_milestone(&self, milestone: Milestone) -> Result<(), ArtifactError> {
        self.milestones
            .lock()
            .map_err(|_| poisoned("milestone"))?
            .push(milestone);
        Ok(())
    }

    pub fn set_milestone(&self, milestone: Milestone) -> Result<(), ArtifactError> {
        let mut milestones = self.milestones.lock().map_err(|_| poisoned("milestone"))?;
        match milestones.iter_mut().find(|existing| existing.id == milestone.id) {
            Some(existing) => *existing = milestone,
            None => milestones.push(milestone),
        }
        Ok(())
    }
}

fn poisoned(catalog: &str) -> ArtifactError {
    ArtifactError::Unavailable(format!("{catalog} catalog lock poisoned"))
}

#[async_trait]
impl PhotoProvider for InMemoryArtifactCatalog {
    async fn list_by_project(&self, project_id: &ProjectId) -> Result<Vec<Photo>, ArtifactError> {
        let photos = self.photos.lock().map_err(|_| poisoned("photo"))?;
        Ok(photos
            .iter()
            .filter(|photo| &photo.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn get(&self, id: &PhotoId) -> Result<Option<Photo>, ArtifactError> {
        let photos = self.photos.lock().map_err(|_| poisoned("photo"))?;
        Ok(photos.iter().find(|photo| &photo.id == id).cloned())
    }
}

#[async_trait]
impl MilestoneProvider for InMemoryArtifactCatalog {
    async fn list_by_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<Milestone>, ArtifactError> {
        let milestones = self.milestones.lock().map_err(|_| poisoned("milestone"))?;
        Ok(milestones
            .iter()
            .filter(|milestone| &milestone.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn get(&self, id: &MilestoneId) -> Result<Option<Milestone>, ArtifactError> {
        let milestones = self.milestones.lock().map_err(|_| poisoned("milestone"))?;
        Ok(milestones.iter().find(|milestone| &milestone.id == id).cloned())
    }
}
