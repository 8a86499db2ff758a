//! Site report subsystem: eight closed report variants built from project
//! photos and milestones, persisted as one entity type, resolved into a
//! presentation tree, and exported through file, email, and print channels.
//!
//! Data flows one way: draft -> [`ReportBuilder`] -> [`ReportStore`] ->
//! [`TemplateResolver`] -> [`ReportExporter`].

pub mod artifacts;
pub mod builder;
pub mod domain;
pub mod export;
pub mod memory;
pub mod optimistic;
pub mod resolver;
pub mod router;
pub mod schema;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use artifacts::{
    ArtifactError, FixedSession, Milestone, MilestoneProvider, MilestoneStatus, Photo,
    PhotoProvider, SessionProvider,
};
pub use builder::{
    clamp_percentage, normalize, pair_photos, ArtifactSelection, BuildError, BuildWarning,
    BuiltReport, PhotoPairs, ReportBuilder, ReportDraft,
};
pub use domain::{
    CostBreakdown, CostItem, MilestoneId, NewReport, PhotoId, ProjectId, ProjectSnapshot, Report,
    ReportContent, ReportId, ReportPatch, ReportType, ReportView, Severity, UserId,
};
pub use export::{
    sanitize_filename, Attachment, DocumentRenderer, EmailMessage, EmailOptions, ExportChannel,
    ExportChannelError, ExportError, ExportReceipt, HtmlRenderer, MailTransport, PrintJob,
    PrintSpooler, RenderError, RenderedBinary, ReportExporter, TransportError,
};
pub use memory::{InMemoryArtifactCatalog, InMemoryReportStore};
pub use optimistic::OptimisticReportList;
pub use resolver::{Block, Media, RenderedDocument, Section, TemplateResolver};
pub use router::report_router;
pub use schema::{FieldError, FieldErrors, SchemaError, VariantSchema};
pub use service::{CreatedReport, ReportService, ReportServiceError};
pub use store::{ReportLinks, ReportRecord, ReportStore, StoreError};
