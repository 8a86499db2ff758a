use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::to_bytes;
use axum::response::Response;
use axum::Router;
use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::{json, Map, Value};
use tempfile::TempDir;

use crate::config::ExportConfig;
use crate::reports::artifacts::{
    ArtifactError, FixedSession, Milestone, MilestoneProvider, MilestoneStatus, Photo,
    PhotoProvider,
};
use crate::reports::builder::{ArtifactSelection, ReportBuilder, ReportDraft};
use crate::reports::domain::{
    MilestoneId, NewReport, PhotoId, ProjectId, ProjectSnapshot, Report, ReportId, ReportPatch,
    ReportType, UserId,
};
use crate::reports::export::{
    EmailMessage, MailTransport, PrintJob, PrintSpooler, ReportExporter, TransportError,
};
use crate::reports::memory::{InMemoryArtifactCatalog, InMemoryReportStore};
use crate::reports::resolver::TemplateResolver;
use crate::reports::router::report_router;
use crate::reports::schema;
use crate::reports::service::ReportService;
use crate::reports::store::{ReportLinks, ReportStore, StoreError};

pub(super) const PROJECT: &str = "proj-001";
pub(super) const OTHER_PROJECT: &str = "proj-002";

pub(super) fn project() -> ProjectId {
    ProjectId::new(PROJECT)
}

pub(super) fn author() -> UserId {
    UserId::new("user-7")
}

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn photo_ids(ids: &[&str]) -> Vec<PhotoId> {
    ids.iter().map(|id| PhotoId::new(*id)).collect()
}

pub(super) fn milestone_ids(ids: &[&str]) -> Vec<MilestoneId> {
    ids.iter().map(|id| MilestoneId::new(*id)).collect()
}

pub(super) fn photo(id: &str, project_id: &str) -> Photo {
    Photo {
        id: PhotoId::new(id),
        project_id: ProjectId::new(project_id),
        url: format!("https://photos.example.com/{id}.jpg"),
        title: Some(format!("Photo {id}")),
        date: Some(date(2024, 3, 2)),
        tags: vec!["site".to_string()],
    }
}

pub(super) fn milestone(id: &str, title: &str, status: MilestoneStatus) -> Milestone {
    Milestone {
        id: MilestoneId::new(id),
        project_id: project(),
        title: title.to_string(),
        status,
        due_date: Some(date(2024, 4, 1)),
    }
}

/// Six photos on the main project, one elsewhere, three milestones.
pub(super) fn catalog() -> Arc<InMemoryArtifactCatalog> {
    let mut photos: Vec<Photo> = ["p1", "p2", "p3", "p4", "p5", "p6"]
        .into_iter()
        .map(|id| photo(id, PROJECT))
        .collect();
    photos.push(photo("x1", OTHER_PROJECT));
    let milestones = vec![
        milestone("m1", "Foundation", MilestoneStatus::Completed),
        milestone("m2", "Framing", MilestoneStatus::InProgress),
        milestone("m3", "Finishes", MilestoneStatus::Pending),
    ];
    Arc::new(InMemoryArtifactCatalog::new(photos, milestones))
}

pub(super) fn builder_for(catalog: Arc<InMemoryArtifactCatalog>) -> ReportBuilder {
    ReportBuilder::new(catalog.clone(), catalog)
}

pub(super) fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(object) => object,
        other => panic!("expected an object, got {other}"),
    }
}

pub(super) fn draft(
    report_type: &str,
    fields_value: Value,
    photos: &[&str],
    milestones: &[&str],
) -> ReportDraft {
    ReportDraft {
        project_id: project(),
        report_type: report_type.to_string(),
        selection: ArtifactSelection {
            photo_ids: photo_ids(photos),
            milestone_ids: milestone_ids(milestones),
        },
        fields: fields(fields_value),
        project_snapshot: Some(ProjectSnapshot {
            name: "Maple Street Remodel".to_string(),
            address: Some("12 Maple St".to_string()),
            client_name: Some("Jordan Lee".to_string()),
            status: Some("active".to_string()),
        }),
    }
}

/// A draft per report type that builds cleanly against [`catalog`].
pub(super) fn valid_draft(report_type: ReportType) -> ReportDraft {
    match report_type {
        ReportType::SiteAssessment => draft(
            "site_assessment",
            json!({
                "site_conditions": "Dry lot with mature trees",
                "key_measurements": { "Lot width": 50, "Slope": "2%" },
                "issues": [{ "description": "Cracked slab", "photo_ids": ["p3"] }]
            }),
            &["p1", "p2"],
            &[],
        ),
        ReportType::ProjectProgress => draft(
            "project_progress",
            json!({
                "accomplishments": "Framing completed on schedule",
                "completion_percentage": "57%",
                "timeline_notes": "No delays",
                "timeline": [
                    { "date": "2024-03-09", "description": "Roof sheathing", "photo_ids": ["p2"] },
                    { "date": "2024-03-02", "description": "Walls raised", "photo_ids": ["p1"] }
                ]
            }),
            &[],
            &["m1", "m2"],
        ),
        ReportType::BeforeAfter => draft(
            "before_after",
            json!({
                "comparisons": [
                    {
                        "area": "Kitchen",
                        "description": "New cabinets",
                        "materials": "Oak, Quartz"
                    },
                    { "area": "Bathroom" }
                ],
                "value_added": "Modernized wet areas"
            }),
            &["p1", "p2", "p3", "p4"],
            &[],
        ),
        ReportType::DamageDocumentation => draft(
            "damage_documentation",
            json!({
                "issues": [{
                    "description": "Water damage under sink",
                    "measurements": "30cm x 40cm",
                    "cause_assessment": "Leaking supply line",
                    "recommended_repairs": "Replace subfloor",
                    "photo_ids": ["p1"]
                }]
            }),
            &[],
            &[],
        ),
        ReportType::ClientApproval => draft(
            "client_approval",
            json!({
                "work_summary": "Upgrade to tile flooring",
                "cost_breakdown": "Labor $500, Materials $750",
                "timeline_impact": "Adds two days"
            }),
            &["p1"],
            &[],
        ),
        ReportType::PeriodicProgress => draft(
            "periodic_progress",
            json!({
                "period": { "start": "2024-03-01", "end": "2024-03-07" },
                "work_completed": "Drywall hung on level one",
                "hours_worked": "38.5",
                "next_period_plan": "Tape and mud"
            }),
            &["p2"],
            &[],
        ),
        ReportType::ContractorPerformance => draft(
            "contractor_performance",
            json!({
                "contractor": "Acme Plumbing",
                "quality_notes": "Clean work",
                "rating": "4"
            }),
            &["p3"],
            &[],
        ),
        ReportType::FinalCompletion => draft(
            "final_completion",
            json!({
                "before_photo_ids": ["p1"],
                "after_photo_ids": ["p2"],
                "milestone_summary": "All milestones delivered",
                "costs": [
                    { "label": "Labor", "amount": 10 },
                    { "label": "Materials", "amount": "15" }
                ],
                "warranty_info": "One year workmanship"
            }),
            &[],
            &["m1", "m3"],
        ),
    }
}

/// Complete content per report type, already in registry shape.
pub(super) fn valid_content(report_type: ReportType) -> Value {
    match report_type {
        ReportType::SiteAssessment => json!({
            "site_conditions": "Dry lot",
            "site_photo_ids": ["p1"]
        }),
        ReportType::ProjectProgress => json!({
            "accomplishments": "Framing",
            "completion_percentage": 57
        }),
        ReportType::BeforeAfter => json!({
            "comparisons": [{ "area": "Kitchen", "before_photo_id": "p1", "after_photo_id": "p2" }]
        }),
        ReportType::DamageDocumentation => json!({
            "issues": [{ "description": "Water damage" }]
        }),
        ReportType::ClientApproval => json!({
            "work_summary": "Tile upgrade",
            "cost_breakdown": "Labor $500"
        }),
        ReportType::PeriodicProgress => json!({
            "period": { "start": "2024-03-01", "end": "2024-03-07" },
            "work_completed": "Drywall"
        }),
        ReportType::ContractorPerformance => json!({
            "contractor": "Acme",
            "rating": 4
        }),
        ReportType::FinalCompletion => json!({
            "before_photo_ids": ["p1"],
            "after_photo_ids": ["p2"],
            "milestone_summary": "Done"
        }),
    }
}

pub(super) fn new_report(report_type: ReportType) -> NewReport {
    let content = schema::validate_variant(report_type, &valid_content(report_type))
        .expect("fixture content is valid");
    NewReport {
        id: None,
        project_id: project(),
        generated_at: None,
        generated_by: author(),
        project_snapshot: None,
        content,
    }
}

pub(super) fn new_report_at(report_type: ReportType, day: u32) -> NewReport {
    NewReport {
        generated_at: Some(
            Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0)
                .single()
                .expect("valid timestamp"),
        ),
        ..new_report(report_type)
    }
}

pub(super) fn content_patch(value: Value) -> ReportPatch {
    ReportPatch {
        content: Some(fields(value)),
        ..ReportPatch::default()
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}

#[derive(Default)]
pub(super) struct RecordingMail {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingMail {
    pub(super) fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().expect("mail mutex poisoned").clone()
    }
}

#[async_trait]
impl MailTransport for RecordingMail {
    async fn send(&self, message: EmailMessage) -> Result<(), TransportError> {
        self.sent.lock().expect("mail mutex poisoned").push(message);
        Ok(())
    }
}

pub(super) struct RejectingMail;

#[async_trait]
impl MailTransport for RejectingMail {
    async fn send(&self, _message: EmailMessage) -> Result<(), TransportError> {
        Err(TransportError("smtp relay refused connection".to_string()))
    }
}

#[derive(Default)]
pub(super) struct RecordingSpooler {
    jobs: Mutex<Vec<PrintJob>>,
    delay: Option<Duration>,
}

impl RecordingSpooler {
    pub(super) fn slow(delay: Duration) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            delay: Some(delay),
        }
    }

    pub(super) fn jobs(&self) -> Vec<PrintJob> {
        self.jobs.lock().expect("spooler mutex poisoned").clone()
    }
}

#[async_trait]
impl PrintSpooler for RecordingSpooler {
    async fn submit(&self, job: PrintJob) -> Result<String, TransportError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut jobs = self.jobs.lock().expect("spooler mutex poisoned");
        jobs.push(job);
        Ok(format!("job-{}", jobs.len()))
    }
}

/// Store wrapper whose writes can be switched to fail.
#[derive(Default)]
pub(super) struct FlakyStore {
    pub(super) inner: InMemoryReportStore,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub(super) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self, operation: &'static str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::persistence(operation, "database is read only"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ReportStore for FlakyStore {
    async fn create(&self, report: NewReport) -> Result<Report, StoreError> {
        self.check("create")?;
        self.inner.create(report).await
    }

    async fn get_by_id(&self, id: &ReportId) -> Result<Report, StoreError> {
        self.inner.get_by_id(id).await
    }

    async fn list_by_project(&self, project_id: &ProjectId) -> Result<Vec<Report>, StoreError> {
        self.inner.list_by_project(project_id).await
    }

    async fn update(&self, id: &ReportId, patch: ReportPatch) -> Result<Report, StoreError> {
        self.check("update")?;
        self.inner.update(id, patch).await
    }

    async fn delete(&self, id: &ReportId) -> Result<(), StoreError> {
        self.check("delete")?;
        self.inner.delete(id).await
    }

    async fn links(&self, id: &ReportId) -> Result<ReportLinks, StoreError> {
        self.inner.links(id).await
    }
}

/// Provider that counts lookups, for asserting validation happens before I/O.
#[derive(Default)]
pub(super) struct CountingProvider {
    pub(super) calls: AtomicUsize,
    fail: bool,
}

impl CountingProvider {
    pub(super) fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self) -> Result<(), ArtifactError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(ArtifactError::Unavailable("photo service timed out".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PhotoProvider for CountingProvider {
    async fn list_by_project(&self, _project_id: &ProjectId) -> Result<Vec<Photo>, ArtifactError> {
        self.record()?;
        Ok(Vec::new())
    }

    async fn get(&self, _id: &PhotoId) -> Result<Option<Photo>, ArtifactError> {
        self.record()?;
        Ok(None)
    }
}

#[async_trait]
impl MilestoneProvider for CountingProvider {
    async fn list_by_project(
        &self,
        _project_id: &ProjectId,
    ) -> Result<Vec<Milestone>, ArtifactError> {
        self.record()?;
        Ok(Vec::new())
    }

    async fn get(&self, _id: &MilestoneId) -> Result<Option<Milestone>, ArtifactError> {
        self.record()?;
        Ok(None)
    }
}

/// Fully wired service, exporter, and router over in-memory backends.
pub(super) struct Harness<S> {
    pub(super) store: Arc<S>,
    pub(super) catalog: Arc<InMemoryArtifactCatalog>,
    pub(super) service: Arc<ReportService<S>>,
    pub(super) exporter: Arc<ReportExporter<S>>,
    pub(super) mail: Arc<RecordingMail>,
    pub(super) printer: Arc<RecordingSpooler>,
    pub(super) export_dir: TempDir,
}

impl<S> Harness<S>
where
    S: ReportStore + 'static,
{
    pub(super) fn with_store(store: Arc<S>) -> Self {
        let catalog = catalog();
        let export_dir = tempfile::tempdir().expect("temp dir");
        let mail = Arc::new(RecordingMail::default());
        let printer = Arc::new(RecordingSpooler::default());
        let service = Arc::new(ReportService::new(
            store.clone(),
            builder_for(catalog.clone()),
            Arc::new(FixedSession(author())),
        ));
        let config = ExportConfig {
            output_dir: export_dir.path().to_path_buf(),
            ..ExportConfig::default()
        };
        let exporter = Arc::new(ReportExporter::new(
            store.clone(),
            TemplateResolver::new(catalog.clone(), catalog.clone()),
            mail.clone(),
            printer.clone(),
            &config,
        ));
        Self {
            store,
            catalog,
            service,
            exporter,
            mail,
            printer,
            export_dir,
        }
    }

    pub(super) fn router(&self) -> Router {
        report_router(self.service.clone(), self.exporter.clone())
    }
}

pub(super) fn harness() -> Harness<InMemoryReportStore> {
    Harness::with_store(Arc::new(InMemoryReportStore::new()))
}
