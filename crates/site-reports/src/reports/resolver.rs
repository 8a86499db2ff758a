//! Turns a persisted report into a render-agnostic document tree.
//!
//! Resolution is split in two: [`TemplateResolver`] re-fetches the linked
//! photos and milestones, then the pure [`resolve`] walks the content with
//! one resolver per report type. A missing or failing artifact becomes a
//! placeholder; it never fails the document.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info_span, warn, Span};

use super::artifacts::{Milestone, MilestoneProvider, Photo, PhotoProvider};
use super::domain::{
    BeforeAfter, ClientApproval, ContractorPerformance, DamageDocumentation, FinalCompletion,
    MilestoneId, PeriodicProgress, PhotoId, ProjectProgress, Report, ReportContent, ReportType,
    Signature, SiteAssessment,
};
use super::schema::{self, MilestoneSelection};

pub const DATE_FORMAT: &str = "%B %d, %Y";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedDocument {
    pub report_id: String,
    pub report_type: ReportType,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    pub generated_on: String,
    pub generated_by: String,
    pub summary: Vec<Fact>,
    pub sections: Vec<Section>,
}

impl RenderedDocument {
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.sections.iter().flat_map(|section| section.blocks.iter())
    }

    pub fn placeholder_count(&self) -> usize {
        self.blocks()
            .map(|block| match block {
                Block::Media { media, .. } => usize::from(media.is_missing()),
                Block::MediaPair { before, after, .. } => {
                    usize::from(before.is_missing()) + usize::from(after.is_missing())
                }
                Block::Placeholder { .. } => 1,
                _ => 0,
            })
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fact {
    pub label: String,
    pub value: String,
}

impl Fact {
    fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub heading: String,
    pub blocks: Vec<Block>,
}

impl Section {
    fn new(heading: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            blocks: Vec::new(),
        }
    }

    fn push(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    fn extend(mut self, blocks: impl IntoIterator<Item = Block>) -> Self {
        self.blocks.extend(blocks);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
    Paragraph {
        text: String,
    },
    Facts {
        rows: Vec<Fact>,
    },
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Media {
        media: Media,
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    MediaPair {
        before: Media,
        after: Media,
        caption: String,
    },
    Progress {
        percent: u8,
        label: String,
    },
    Status {
        label: String,
        status_label: &'static str,
        color: &'static str,
    },
    Rating {
        value: u8,
        max: u8,
    },
    Placeholder {
        artifact_id: String,
        message: String,
    },
}

impl Block {
    fn paragraph(text: impl Into<String>) -> Self {
        Self::Paragraph { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Media {
    Photo {
        photo_id: PhotoId,
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        taken_on: Option<String>,
    },
    Missing {
        photo_id: PhotoId,
        message: String,
    },
}

impl Media {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing { .. })
    }

    pub fn photo_id(&self) -> &PhotoId {
        match self {
            Self::Photo { photo_id, .. } | Self::Missing { photo_id, .. } => photo_id,
        }
    }
}

/// Artifacts fetched for one resolution pass.
#[derive(Debug, Clone, Default)]
pub struct ArtifactIndex {
    photos: HashMap<PhotoId, Photo>,
    milestones: HashMap<MilestoneId, Milestone>,
}

impl ArtifactIndex {
    pub fn new(photos: Vec<Photo>, milestones: Vec<Milestone>) -> Self {
        Self {
            photos: photos.into_iter().map(|p| (p.id.clone(), p)).collect(),
            milestones: milestones.into_iter().map(|m| (m.id.clone(), m)).collect(),
        }
    }

    pub fn media(&self, id: &PhotoId) -> Media {
        match self.photos.get(id) {
            Some(photo) => Media::Photo {
                photo_id: photo.id.clone(),
                url: photo.url.clone(),
                title: photo.title.clone(),
                taken_on: photo.date.map(format_date),
            },
            None => Media::Missing {
                photo_id: id.clone(),
                message: "Photo unavailable".to_string(),
            },
        }
    }

    fn gallery(&self, ids: &[PhotoId]) -> Vec<Block> {
        ids.iter()
            .map(|id| Block::Media {
                media: self.media(id),
                caption: None,
            })
            .collect()
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format(DATE_FORMAT).to_string()
}

/// Formats an amount as dollars with thousands separators, e.g. `$1,250.00`.
pub fn format_currency(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", cents % 100)
}

/// Build the document tree for a report from already fetched artifacts.
pub fn resolve(report: &Report, artifacts: &ArtifactIndex) -> RenderedDocument {
    let (summary, sections) = match &report.content {
        ReportContent::SiteAssessment(content) => site_assessment(content, artifacts),
        ReportContent::ProjectProgress(content) => project_progress(content, artifacts),
        ReportContent::BeforeAfter(content) => before_after(content, artifacts),
        ReportContent::DamageDocumentation(content) => damage_documentation(content, artifacts),
        ReportContent::ClientApproval(content) => client_approval(content, artifacts),
        ReportContent::PeriodicProgress(content) => periodic_progress(content, artifacts),
        ReportContent::ContractorPerformance(content) => {
            contractor_performance(content, artifacts)
        }
        ReportContent::FinalCompletion(content) => final_completion(content, artifacts),
    };

    let report_type = report.report_type();
    let subtitle = report.project_snapshot.as_ref().map(|project| {
        match project.address.as_deref().filter(|address| !address.is_empty()) {
            Some(address) => format!("{} | {}", project.name, address),
            None => project.name.clone(),
        }
    });

    RenderedDocument {
        report_id: report.id.to_string(),
        report_type,
        title: report_type.label().to_string(),
        subtitle,
        generated_on: format_timestamp(report.generated_at),
        generated_by: report.generated_by.to_string(),
        summary,
        sections,
    }
}

type Resolved = (Vec<Fact>, Vec<Section>);

fn site_assessment(content: &SiteAssessment, artifacts: &ArtifactIndex) -> Resolved {
    let summary = vec![
        Fact::new("Site photos", content.site_photo_ids.len().to_string()),
        Fact::new("Issues identified", content.issues.len().to_string()),
    ];

    let mut sections = vec![Section::new("Site Conditions").push(Block::paragraph(
        content.site_conditions.as_str(),
    ))];
    if !content.key_measurements.is_empty() {
        let rows = content
            .key_measurements
            .iter()
            .map(|(name, value)| Fact::new(name.as_str(), value.as_str()))
            .collect();
        sections.push(Section::new("Key Measurements").push(Block::Facts { rows }));
    }
    sections.push(Section::new("Site Photos").extend(artifacts.gallery(&content.site_photo_ids)));

    for (index, issue) in content.issues.iter().enumerate() {
        sections.push(
            Section::new(format!("Issue {}", index + 1))
                .push(Block::Status {
                    label: "Severity".to_string(),
                    status_label: issue.severity.label(),
                    color: issue.severity.color(),
                })
                .push(Block::paragraph(issue.description.as_str()))
                .extend(artifacts.gallery(&issue.photo_ids)),
        );
    }
    (summary, sections)
}

fn project_progress(content: &ProjectProgress, artifacts: &ArtifactIndex) -> Resolved {
    let summary = vec![
        Fact::new("Completion", format!("{}%", content.completion_percentage)),
        Fact::new("Milestones", content.milestone_statuses.len().to_string()),
    ];

    let mut sections = vec![
        Section::new("Overall Progress").push(Block::Progress {
            percent: content.completion_percentage.min(100),
            label: format!("{}% complete", content.completion_percentage.min(100)),
        }),
        Section::new("Accomplishments").push(Block::paragraph(content.accomplishments.as_str())),
    ];

    if !content.milestone_statuses.is_empty() {
        // snapshot taken at build time; live milestone state is not consulted
        let blocks = content.milestone_statuses.iter().map(|entry| Block::Status {
            label: match entry.due_date {
                Some(due) => format!("{} (due {})", entry.title, format_date(due)),
                None => entry.title.clone(),
            },
            status_label: entry.status.label(),
            color: entry.status.color(),
        });
        sections.push(Section::new("Milestones").extend(blocks));
    }

    if content.timeline_notes.is_some() || !content.timeline.is_empty() {
        let mut timeline = Section::new("Timeline");
        if let Some(notes) = &content.timeline_notes {
            timeline = timeline.push(Block::paragraph(notes.as_str()));
        }
        for entry in &content.timeline {
            timeline = timeline
                .push(Block::Facts {
                    rows: vec![Fact::new(format_date(entry.date), entry.description.as_str())],
                })
                .extend(artifacts.gallery(&entry.photo_ids));
        }
        sections.push(timeline);
    }
    (summary, sections)
}

fn before_after(content: &BeforeAfter, artifacts: &ArtifactIndex) -> Resolved {
    let summary = vec![Fact::new(
        "Areas transformed",
        content.comparisons.len().to_string(),
    )];

    let mut sections: Vec<Section> = content
        .comparisons
        .iter()
        .map(|comparison| {
            let mut section = Section::new(comparison.area.as_str()).push(Block::MediaPair {
                before: artifacts.media(&comparison.before_photo_id),
                after: artifacts.media(&comparison.after_photo_id),
                caption: comparison.description.clone(),
            });
            if !comparison.materials.is_empty() {
                section = section.push(Block::Facts {
                    rows: vec![Fact::new("Materials", comparison.materials.join(", "))],
                });
            }
            section
        })
        .collect();

    if let Some(value_added) = &content.value_added {
        sections.push(Section::new("Value Added").push(Block::paragraph(value_added.as_str())));
    }
    (summary, sections)
}

fn damage_documentation(content: &DamageDocumentation, artifacts: &ArtifactIndex) -> Resolved {
    let summary = vec![Fact::new("Issues documented", content.issues.len().to_string())];

    let sections = content
        .issues
        .iter()
        .enumerate()
        .map(|(index, issue)| {
            let mut rows = Vec::new();
            if let Some(measurements) = &issue.measurements {
                rows.push(Fact::new("Measurements", measurements.as_str()));
            }
            if let Some(cause) = &issue.cause_assessment {
                rows.push(Fact::new("Cause", cause.as_str()));
            }
            if let Some(repairs) = &issue.recommended_repairs {
                rows.push(Fact::new("Recommended repairs", repairs.as_str()));
            }

            let mut section = Section::new(format!("Issue {}", index + 1))
                .push(Block::paragraph(issue.description.as_str()));
            if !rows.is_empty() {
                section = section.push(Block::Facts { rows });
            }
            section.extend(artifacts.gallery(&issue.photo_ids))
        })
        .collect();
    (summary, sections)
}

fn signature_block(signature: Option<&Signature>) -> Block {
    match signature {
        Some(signature) => Block::Facts {
            rows: vec![
                Fact::new("Signed by", signature.name.as_str()),
                Fact::new("Date", format_date(signature.date)),
            ],
        },
        None => Block::paragraph("Awaiting signature"),
    }
}

fn client_approval(content: &ClientApproval, artifacts: &ArtifactIndex) -> Resolved {
    let summary = vec![Fact::new(
        "Status",
        if content.signature.is_some() {
            "Approved"
        } else {
            "Pending approval"
        },
    )];

    let mut sections = vec![
        Section::new("Work Summary").push(Block::paragraph(content.work_summary.as_str())),
        Section::new("Cost Breakdown").push(Block::paragraph(content.cost_breakdown.as_str())),
    ];
    if let Some(impact) = &content.timeline_impact {
        sections.push(Section::new("Timeline Impact").push(Block::paragraph(impact.as_str())));
    }
    if !content.photo_ids.is_empty() {
        sections.push(Section::new("Photos").extend(artifacts.gallery(&content.photo_ids)));
    }
    sections.push(
        Section::new("Client Signature").push(signature_block(content.signature.as_ref())),
    );
    (summary, sections)
}

fn periodic_progress(content: &PeriodicProgress, artifacts: &ArtifactIndex) -> Resolved {
    let mut summary = vec![Fact::new(
        "Period",
        format!(
            "{} - {}",
            format_date(content.period.start),
            format_date(content.period.end)
        ),
    )];
    if let Some(hours) = content.hours_worked {
        summary.push(Fact::new("Hours worked", format!("{hours:.1}")));
    }

    let mut sections = vec![
        Section::new("Work Completed").push(Block::paragraph(content.work_completed.as_str())),
    ];
    let optional = [
        ("Resources Used", &content.resources_used),
        ("Issues and Solutions", &content.issues_solutions),
        ("Plan for Next Period", &content.next_period_plan),
    ];
    for (heading, text) in optional {
        if let Some(text) = text {
            sections.push(Section::new(heading).push(Block::paragraph(text.as_str())));
        }
    }
    if !content.photo_ids.is_empty() {
        sections.push(Section::new("Photos").extend(artifacts.gallery(&content.photo_ids)));
    }
    (summary, sections)
}

fn contractor_performance(
    content: &ContractorPerformance,
    artifacts: &ArtifactIndex,
) -> Resolved {
    let summary = vec![
        Fact::new("Contractor", content.contractor.as_str()),
        Fact::new("Rating", format!("{} / 5", content.rating)),
    ];

    let mut sections = vec![Section::new("Overall Rating").push(Block::Rating {
        value: content.rating,
        max: 5,
    })];
    let rows: Vec<Fact> = [
        ("Schedule adherence", &content.adherence_notes),
        ("Quality of work", &content.quality_notes),
        ("Communication", &content.communication_notes),
        ("Issue resolution", &content.issue_resolution_notes),
    ]
    .into_iter()
    .filter_map(|(label, notes)| notes.as_ref().map(|notes| Fact::new(label, notes.as_str())))
    .collect();
    if !rows.is_empty() {
        sections.push(Section::new("Assessment").push(Block::Facts { rows }));
    }
    if let Some(comments) = &content.comments {
        sections.push(Section::new("Comments").push(Block::paragraph(comments.as_str())));
    }
    if !content.photo_ids.is_empty() {
        sections.push(Section::new("Photos").extend(artifacts.gallery(&content.photo_ids)));
    }
    (summary, sections)
}

fn final_completion(content: &FinalCompletion, artifacts: &ArtifactIndex) -> Resolved {
    let summary = vec![
        Fact::new("Total cost", format_currency(content.costs.total())),
        Fact::new("Milestones", content.milestone_ids.len().to_string()),
    ];

    let mut sections = vec![
        Section::new("Before").extend(artifacts.gallery(&content.before_photo_ids)),
        Section::new("After").extend(artifacts.gallery(&content.after_photo_ids)),
        Section::new("Milestone Summary")
            .push(Block::paragraph(content.milestone_summary.as_str())),
    ];

    if !content.milestone_ids.is_empty() {
        let blocks = content.milestone_ids.iter().map(|id| match artifacts.milestones.get(id) {
            Some(milestone) => Block::Status {
                label: milestone.title.clone(),
                status_label: milestone.status.label(),
                color: milestone.status.color(),
            },
            None => Block::Placeholder {
                artifact_id: id.to_string(),
                message: "Milestone unavailable".to_string(),
            },
        });
        sections.push(Section::new("Milestones").extend(blocks));
    }

    if !content.costs.is_empty() {
        let mut rows: Vec<Vec<String>> = content
            .costs
            .items()
            .iter()
            .map(|item| vec![item.label.clone(), format_currency(item.amount)])
            .collect();
        rows.push(vec!["Total".to_string(), format_currency(content.costs.total())]);
        sections.push(Section::new("Costs").push(Block::Table {
            columns: vec!["Item".to_string(), "Amount".to_string()],
            rows,
        }));
    }

    let care = [
        ("Warranty", &content.warranty_info),
        ("Maintenance", &content.maintenance_info),
    ];
    for (heading, text) in care {
        if let Some(text) = text {
            sections.push(Section::new(heading).push(Block::paragraph(text.as_str())));
        }
    }
    sections.push(
        Section::new("Client Sign-off").push(signature_block(content.client_signoff.as_ref())),
    );
    (summary, sections)
}

/// Fetches linked artifacts and resolves the report.
pub struct TemplateResolver {
    photos: Arc<dyn PhotoProvider>,
    milestones: Arc<dyn MilestoneProvider>,
    span: Span,
}

impl TemplateResolver {
    pub fn new(photos: Arc<dyn PhotoProvider>, milestones: Arc<dyn MilestoneProvider>) -> Self {
        Self {
            photos,
            milestones,
            span: info_span!("template_resolver"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub async fn resolve(&self, report: &Report) -> RenderedDocument {
        let artifacts = self.fetch(report).await;
        let document = resolve(report, &artifacts);
        debug!(
            parent: &self.span,
            report_id = %report.id,
            sections = document.sections.len(),
            placeholders = document.placeholder_count(),
            "report resolved"
        );
        document
    }

    async fn fetch(&self, report: &Report) -> ArtifactIndex {
        let mut photos = Vec::new();
        for id in report.content.photo_ids() {
            match self.photos.get(&id).await {
                Ok(Some(photo)) => photos.push(photo),
                Ok(None) => warn!(
                    parent: &self.span,
                    report_id = %report.id,
                    photo_id = %id,
                    "photo missing, rendering placeholder"
                ),
                Err(err) => warn!(
                    parent: &self.span,
                    report_id = %report.id,
                    photo_id = %id,
                    "photo fetch failed, rendering placeholder: {err}"
                ),
            }
        }

        let mut milestones = Vec::new();
        let variant = schema::schema(report.report_type());
        if matches!(variant.milestone_selection, MilestoneSelection::Ids(_)) {
            for id in report.content.milestone_ids() {
                match self.milestones.get(&id).await {
                    Ok(Some(milestone)) => milestones.push(milestone),
                    Ok(None) => warn!(
                        parent: &self.span,
                        report_id = %report.id,
                        milestone_id = %id,
                        "milestone missing, rendering placeholder"
                    ),
                    Err(err) => warn!(
                        parent: &self.span,
                        report_id = %report.id,
                        milestone_id = %id,
                        "milestone fetch failed, rendering placeholder: {err}"
                    ),
                }
            }
        }

        ArtifactIndex::new(photos, milestones)
    }
}
