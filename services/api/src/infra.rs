use async_trait::async_trait;
use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use site_reports::config::AppConfig;
use site_reports::reports::{
    EmailMessage, FixedSession, InMemoryArtifactCatalog, InMemoryReportStore, MailTransport,
    Milestone, MilestoneId, MilestoneStatus, Photo, PhotoId, PrintJob, PrintSpooler, ProjectId,
    ReportBuilder, ReportExporter, ReportService, TemplateResolver, TransportError, UserId,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, info_span, Span};

/// Project every seeded photo and milestone belongs to.
pub(crate) const DEMO_PROJECT: &str = "proj-maple-street";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) export_dir: PathBuf,
}

/// Mail transport that records delivery in the log instead of relaying it.
pub(crate) struct LoggingMailTransport {
    span: Span,
}

impl LoggingMailTransport {
    pub(crate) fn new(span: Span) -> Self {
        Self { span }
    }
}

#[async_trait]
impl MailTransport for LoggingMailTransport {
    async fn send(&self, message: EmailMessage) -> Result<(), TransportError> {
        info!(
            parent: &self.span,
            to = %message.to,
            subject = %message.subject,
            attachment = %message.attachment.filename,
            bytes = message.attachment.bytes.len(),
            "email queued"
        );
        Ok(())
    }
}

/// Print spooler that numbers jobs and logs them.
pub(crate) struct LoggingPrintSpooler {
    next_job: AtomicUsize,
    span: Span,
}

impl LoggingPrintSpooler {
    pub(crate) fn new(span: Span) -> Self {
        Self {
            next_job: AtomicUsize::new(1),
            span,
        }
    }
}

#[async_trait]
impl PrintSpooler for LoggingPrintSpooler {
    async fn submit(&self, job: PrintJob) -> Result<String, TransportError> {
        let job_id = format!("print-{:04}", self.next_job.fetch_add(1, Ordering::Relaxed));
        info!(
            parent: &self.span,
            %job_id,
            title = %job.title,
            bytes = job.document.bytes.len(),
            "print job submitted"
        );
        Ok(job_id)
    }
}

/// Report components wired over in-memory storage and the seeded catalog.
pub(crate) struct ReportStack {
    pub(crate) service: Arc<ReportService<InMemoryReportStore>>,
    pub(crate) exporter: Arc<ReportExporter<InMemoryReportStore>>,
}

impl ReportStack {
    pub(crate) fn in_memory(config: &AppConfig) -> Self {
        let span = info_span!("site_reports", environment = ?config.environment);
        let catalog = Arc::new(seeded_catalog());
        let store = Arc::new(InMemoryReportStore::new().with_span(span.clone()));

        let builder = ReportBuilder::new(catalog.clone(), catalog.clone()).with_span(span.clone());
        let session = Arc::new(FixedSession(UserId::new(config.session.user_id.clone())));
        let service = ReportService::new(store.clone(), builder, session).with_span(span.clone());

        let resolver = TemplateResolver::new(catalog.clone(), catalog).with_span(span.clone());
        let exporter = ReportExporter::new(
            store,
            resolver,
            Arc::new(LoggingMailTransport::new(span.clone())),
            Arc::new(LoggingPrintSpooler::new(span.clone())),
            &config.export,
        )
        .with_span(span);

        Self {
            service: Arc::new(service),
            exporter: Arc::new(exporter),
        }
    }
}

fn seeded_photo(id: &str, title: &str, day: u32, tags: &[&str]) -> Photo {
    Photo {
        id: PhotoId::new(id),
        project_id: ProjectId::new(DEMO_PROJECT),
        url: format!("https://photos.example.com/{DEMO_PROJECT}/{id}.jpg"),
        title: Some(title.to_string()),
        date: NaiveDate::from_ymd_opt(2024, 3, day),
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
    }
}

fn seeded_milestone(id: &str, title: &str, status: MilestoneStatus, due_day: u32) -> Milestone {
    Milestone {
        id: MilestoneId::new(id),
        project_id: ProjectId::new(DEMO_PROJECT),
        title: title.to_string(),
        status,
        due_date: NaiveDate::from_ymd_opt(2024, 4, due_day),
    }
}

/// Photos and milestones for one remodel project.
pub(crate) fn seeded_catalog() -> InMemoryArtifactCatalog {
    let photos = vec![
        seeded_photo("ph-lot", "Lot from street", 1, &["site"]),
        seeded_photo("ph-slab", "Cracked slab", 1, &["site", "issue"]),
        seeded_photo("ph-kitchen-before", "Kitchen before", 2, &["before"]),
        seeded_photo("ph-kitchen-after", "Kitchen after", 20, &["after"]),
        seeded_photo("ph-bath-before", "Bathroom before", 2, &["before"]),
        seeded_photo("ph-bath-after", "Bathroom after", 21, &["after"]),
        seeded_photo("ph-framing", "Framing complete", 9, &["progress"]),
        seeded_photo("ph-leak", "Leak under sink", 12, &["damage"]),
    ];
    let milestones = vec![
        seeded_milestone("ms-demolition", "Demolition", MilestoneStatus::Completed, 1),
        seeded_milestone("ms-framing", "Framing", MilestoneStatus::InProgress, 8),
        seeded_milestone("ms-finishes", "Finishes", MilestoneStatus::Pending, 22),
    ];
    InMemoryArtifactCatalog::new(photos, milestones)
}
