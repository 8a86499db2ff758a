use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::artifacts::MilestoneStatus;

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

identifier!(
    /// Opaque identifier for a persisted report.
    ReportId
);
identifier!(
    /// Reference to a project owned by the project subsystem.
    ProjectId
);
identifier!(
    /// Reference to a photo owned by the photo store.
    PhotoId
);
identifier!(
    /// Reference to a milestone owned by the milestone store.
    MilestoneId
);
identifier!(UserId);

impl ReportId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// The closed set of report variants. The tag is chosen once at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    SiteAssessment,
    ProjectProgress,
    BeforeAfter,
    DamageDocumentation,
    ClientApproval,
    PeriodicProgress,
    ContractorPerformance,
    FinalCompletion,
}

impl ReportType {
    pub const fn ordered() -> [Self; 8] {
        [
            Self::SiteAssessment,
            Self::ProjectProgress,
            Self::BeforeAfter,
            Self::DamageDocumentation,
            Self::ClientApproval,
            Self::PeriodicProgress,
            Self::ContractorPerformance,
            Self::FinalCompletion,
        ]
    }

    pub const fn tag(self) -> &'static str {
        match self {
            Self::SiteAssessment => "site_assessment",
            Self::ProjectProgress => "project_progress",
            Self::BeforeAfter => "before_after",
            Self::DamageDocumentation => "damage_documentation",
            Self::ClientApproval => "client_approval",
            Self::PeriodicProgress => "periodic_progress",
            Self::ContractorPerformance => "contractor_performance",
            Self::FinalCompletion => "final_completion",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::SiteAssessment => "Initial Site Assessment",
            Self::ProjectProgress => "Project Progress",
            Self::BeforeAfter => "Before/After Transformation",
            Self::DamageDocumentation => "Damage/Issue Documentation",
            Self::ClientApproval => "Client Approval",
            Self::PeriodicProgress => "Daily/Weekly Progress",
            Self::ContractorPerformance => "Contractor Performance",
            Self::FinalCompletion => "Final Project Completion",
        }
    }

    /// Accepts the wire tag with either `_` or `-` separators, case-insensitively.
    pub fn from_tag(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        Self::ordered()
            .into_iter()
            .find(|candidate| candidate.tag() == normalized)
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
}

impl Severity {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }

    pub const fn color(self) -> &'static str {
        match self {
            Self::Low => "#2E7D32",
            Self::Medium => "#F5A623",
            Self::High => "#C62828",
        }
    }
}

/// Project details copied into the report when it is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteIssue {
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub photo_ids: Vec<PhotoId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteAssessment {
    pub site_conditions: String,
    #[serde(default)]
    pub key_measurements: BTreeMap<String, String>,
    pub site_photo_ids: Vec<PhotoId>,
    #[serde(default)]
    pub issues: Vec<SiteIssue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub date: NaiveDate,
    pub description: String,
    #[serde(default)]
    pub photo_ids: Vec<PhotoId>,
}

/// Milestone state captured when the report was built, not re-joined later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneStatusEntry {
    pub milestone_id: MilestoneId,
    pub title: String,
    pub status: MilestoneStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectProgress {
    pub accomplishments: String,
    pub completion_percentage: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline_notes: Option<String>,
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,
    #[serde(default)]
    pub milestone_statuses: Vec<MilestoneStatusEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    pub area: String,
    pub before_photo_id: PhotoId,
    pub after_photo_id: PhotoId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub materials: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeforeAfter {
    pub comparisons: Vec<Comparison>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_added: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageIssue {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurements: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause_assessment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_repairs: Option<String>,
    #[serde(default)]
    pub photo_ids: Vec<PhotoId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageDocumentation {
    pub issues: Vec<DamageIssue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientApproval {
    pub work_summary: String,
    #[serde(default)]
    pub photo_ids: Vec<PhotoId>,
    pub cost_breakdown: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline_impact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicProgress {
    pub period: ReportingPeriod,
    pub work_completed: String,
    #[serde(default)]
    pub photo_ids: Vec<PhotoId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours_worked: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issues_solutions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_period_plan: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractorPerformance {
    pub contractor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adherence_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub communication_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_resolution_notes: Option<String>,
    #[serde(default)]
    pub photo_ids: Vec<PhotoId>,
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostItem {
    pub label: String,
    pub amount: f64,
}

/// Ordered cost line items whose total always equals the sum of the items.
///
/// The total is recomputed on every mutation and on deserialization, so a
/// stale persisted total can never leak back out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "CostBreakdownRepr")]
pub struct CostBreakdown {
    items: Vec<CostItem>,
    total: f64,
}

impl CostBreakdown {
    pub fn new(items: Vec<CostItem>) -> Self {
        let mut breakdown = Self { items, total: 0.0 };
        breakdown.recompute();
        breakdown
    }

    pub fn items(&self) -> &[CostItem] {
        &self.items
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn add(&mut self, label: impl Into<String>, amount: f64) {
        self.items.push(CostItem {
            label: label.into(),
            amount,
        });
        self.recompute();
    }

    /// Removes the line at `index`, returning it when present.
    pub fn remove(&mut self, index: usize) -> Option<CostItem> {
        if index >= self.items.len() {
            return None;
        }
        let removed = self.items.remove(index);
        self.recompute();
        Some(removed)
    }

    /// Removes the first line carrying `label`.
    pub fn remove_label(&mut self, label: &str) -> Option<CostItem> {
        let index = self.items.iter().position(|item| item.label == label)?;
        self.remove(index)
    }

    /// Replaces the amount of the line at `index`. Returns false when out of range.
    pub fn edit(&mut self, index: usize, amount: f64) -> bool {
        match self.items.get_mut(index) {
            Some(item) => {
                item.amount = amount;
                self.recompute();
                true
            }
            None => false,
        }
    }

    fn recompute(&mut self) {
        self.total = self.items.iter().map(|item| item.amount).sum();
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CostBreakdownRepr {
    Items(Vec<CostItem>),
    Full {
        items: Vec<CostItem>,
        #[serde(default)]
        #[allow(dead_code)]
        total: Option<f64>,
    },
}

impl From<CostBreakdownRepr> for CostBreakdown {
    fn from(value: CostBreakdownRepr) -> Self {
        match value {
            CostBreakdownRepr::Items(items) | CostBreakdownRepr::Full { items, .. } => {
                CostBreakdown::new(items)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalCompletion {
    pub before_photo_ids: Vec<PhotoId>,
    pub after_photo_ids: Vec<PhotoId>,
    pub milestone_summary: String,
    #[serde(default)]
    pub milestone_ids: Vec<MilestoneId>,
    #[serde(default)]
    pub costs: CostBreakdown,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warranty_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_signoff: Option<Signature>,
}

/// Variant-specific report body. The discriminant is the variant itself, so
/// every component dispatches with a `match` on this enum.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReportContent {
    SiteAssessment(SiteAssessment),
    ProjectProgress(ProjectProgress),
    BeforeAfter(BeforeAfter),
    DamageDocumentation(DamageDocumentation),
    ClientApproval(ClientApproval),
    PeriodicProgress(PeriodicProgress),
    ContractorPerformance(ContractorPerformance),
    FinalCompletion(FinalCompletion),
}

impl ReportContent {
    pub fn report_type(&self) -> ReportType {
        match self {
            Self::SiteAssessment(_) => ReportType::SiteAssessment,
            Self::ProjectProgress(_) => ReportType::ProjectProgress,
            Self::BeforeAfter(_) => ReportType::BeforeAfter,
            Self::DamageDocumentation(_) => ReportType::DamageDocumentation,
            Self::ClientApproval(_) => ReportType::ClientApproval,
            Self::PeriodicProgress(_) => ReportType::PeriodicProgress,
            Self::ContractorPerformance(_) => ReportType::ContractorPerformance,
            Self::FinalCompletion(_) => ReportType::FinalCompletion,
        }
    }

    /// Every photo the content references, in first-seen order without duplicates.
    pub fn photo_ids(&self) -> Vec<PhotoId> {
        let mut ids: Vec<&PhotoId> = Vec::new();
        match self {
            Self::SiteAssessment(content) => {
                ids.extend(&content.site_photo_ids);
                for issue in &content.issues {
                    ids.extend(&issue.photo_ids);
                }
            }
            Self::ProjectProgress(content) => {
                for entry in &content.timeline {
                    ids.extend(&entry.photo_ids);
                }
            }
            Self::BeforeAfter(content) => {
                for comparison in &content.comparisons {
                    ids.push(&comparison.before_photo_id);
                    ids.push(&comparison.after_photo_id);
                }
            }
            Self::DamageDocumentation(content) => {
                for issue in &content.issues {
                    ids.extend(&issue.photo_ids);
                }
            }
            Self::ClientApproval(content) => ids.extend(&content.photo_ids),
            Self::PeriodicProgress(content) => ids.extend(&content.photo_ids),
            Self::ContractorPerformance(content) => ids.extend(&content.photo_ids),
            Self::FinalCompletion(content) => {
                ids.extend(&content.before_photo_ids);
                ids.extend(&content.after_photo_ids);
            }
        }
        dedup_in_order(ids)
    }

    pub fn milestone_ids(&self) -> Vec<MilestoneId> {
        let ids: Vec<&MilestoneId> = match self {
            Self::ProjectProgress(content) => content
                .milestone_statuses
                .iter()
                .map(|entry| &entry.milestone_id)
                .collect(),
            Self::FinalCompletion(content) => content.milestone_ids.iter().collect(),
            _ => Vec::new(),
        };
        dedup_in_order(ids)
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn dedup_in_order<T: Clone + PartialEq>(items: Vec<&T>) -> Vec<T> {
    let mut unique: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !unique.contains(item) {
            unique.push(item.clone());
        }
    }
    unique
}

/// A persisted report: shared base fields plus the variant body.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub id: ReportId,
    pub project_id: ProjectId,
    pub generated_at: DateTime<Utc>,
    pub generated_by: UserId,
    pub updated_at: DateTime<Utc>,
    pub is_archived: bool,
    pub project_snapshot: Option<ProjectSnapshot>,
    pub content: ReportContent,
}

impl Report {
    pub fn report_type(&self) -> ReportType {
        self.content.report_type()
    }

    pub fn view(&self) -> ReportView {
        let report_type = self.report_type();
        ReportView {
            id: self.id.clone(),
            project_id: self.project_id.clone(),
            report_type,
            report_type_label: report_type.label(),
            generated_at: self.generated_at,
            generated_by: self.generated_by.clone(),
            updated_at: self.updated_at,
            is_archived: self.is_archived,
            project_snapshot: self.project_snapshot.clone(),
            content: self.content.clone(),
        }
    }
}

/// Serializable representation returned to API callers.
#[derive(Debug, Clone, Serialize)]
pub struct ReportView {
    pub id: ReportId,
    pub project_id: ProjectId,
    pub report_type: ReportType,
    pub report_type_label: &'static str,
    pub generated_at: DateTime<Utc>,
    pub generated_by: UserId,
    pub updated_at: DateTime<Utc>,
    pub is_archived: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_snapshot: Option<ProjectSnapshot>,
    pub content: ReportContent,
}

/// Builder output handed to the store. Id and timestamp are assigned by the
/// store when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    pub id: Option<ReportId>,
    pub project_id: ProjectId,
    pub generated_at: Option<DateTime<Utc>>,
    pub generated_by: UserId,
    pub project_snapshot: Option<ProjectSnapshot>,
    pub content: ReportContent,
}

/// Partial update. `report_type` exists only so that attempts to change it
/// can be detected and rejected.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReportPatch {
    #[serde(default)]
    pub report_type: Option<String>,
    #[serde(default)]
    pub content: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub is_archived: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_breakdown_total_tracks_items() {
        let mut costs = CostBreakdown::default();
        assert_eq!(costs.total(), 0.0);

        costs.add("A", 10.0);
        costs.add("B", 15.0);
        assert_eq!(costs.total(), 25.0);

        costs.remove_label("A").expect("line A present");
        assert_eq!(costs.total(), 15.0);

        assert!(costs.edit(0, 20.0));
        assert_eq!(costs.total(), 20.0);

        costs.remove(0);
        assert!(costs.is_empty());
        assert_eq!(costs.total(), 0.0);
    }

    #[test]
    fn cost_breakdown_ignores_persisted_total() {
        let costs: CostBreakdown = serde_json::from_value(serde_json::json!({
            "items": [{ "label": "Tile", "amount": 40.0 }],
            "total": 9999.0
        }))
        .expect("breakdown parses");
        assert_eq!(costs.total(), 40.0);

        let from_list: CostBreakdown = serde_json::from_value(serde_json::json!([
            { "label": "Tile", "amount": 40.0 },
            { "label": "Grout", "amount": 2.5 }
        ]))
        .expect("list parses");
        assert_eq!(from_list.total(), 42.5);
    }

    #[test]
    fn report_type_tags_round_trip() {
        for report_type in ReportType::ordered() {
            assert_eq!(ReportType::from_tag(report_type.tag()), Some(report_type));
        }
        assert_eq!(
            ReportType::from_tag("Before-After"),
            Some(ReportType::BeforeAfter)
        );
        assert_eq!(ReportType::from_tag("inspection"), None);
    }

    #[test]
    fn photo_ids_are_deduplicated_in_order() {
        let content = ReportContent::FinalCompletion(FinalCompletion {
            before_photo_ids: vec![PhotoId::new("p1"), PhotoId::new("p2")],
            after_photo_ids: vec![PhotoId::new("p2"), PhotoId::new("p3")],
            milestone_summary: "All done".to_string(),
            milestone_ids: vec![MilestoneId::new("m1"), MilestoneId::new("m1")],
            costs: CostBreakdown::default(),
            warranty_info: None,
            maintenance_info: None,
            client_signoff: None,
        });

        assert_eq!(
            content.photo_ids(),
            vec![PhotoId::new("p1"), PhotoId::new("p2"), PhotoId::new("p3")]
        );
        assert_eq!(content.milestone_ids(), vec![MilestoneId::new("m1")]);
    }
}
