use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, info_span, warn, Span};

use super::artifacts::{ArtifactError, MilestoneProvider, PhotoProvider};
use super::domain::{
    Comparison, MilestoneId, MilestoneStatusEntry, NewReport, PhotoId, ProjectId,
    ProjectSnapshot, Report, ReportContent, UserId,
};
use super::schema::{
    self, field_path, FieldErrors, FieldKind, FieldSpec, MilestoneSelection, PhotoSelection,
    SchemaError, VariantSchema,
};

/// Artifacts picked by the user, in selection order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSelection {
    #[serde(default)]
    pub photo_ids: Vec<PhotoId>,
    #[serde(default)]
    pub milestone_ids: Vec<MilestoneId>,
}

/// Raw user input for a new report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDraft {
    pub project_id: ProjectId,
    pub report_type: String,
    #[serde(default)]
    pub selection: ArtifactSelection,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub project_snapshot: Option<ProjectSnapshot>,
}

/// Non-fatal observations made while building; surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildWarning {
    UnpairedPhoto { photo_id: PhotoId },
    UnusedComparisonDetails { count: usize },
    DefaultedSeverity { field: String },
    IgnoredSelection { artifact: &'static str, count: usize },
}

impl BuildWarning {
    pub fn message(&self) -> String {
        match self {
            Self::UnpairedPhoto { photo_id } => format!(
                "photo {photo_id} has no partner and was left out of the before/after comparisons"
            ),
            Self::UnusedComparisonDetails { count } => {
                format!("{count} comparison detail entries had no matching photo pair")
            }
            Self::DefaultedSeverity { field } => {
                format!("{field} had no severity selected and defaults to low")
            }
            Self::IgnoredSelection { artifact, count } => {
                format!("{count} selected {artifact} are not used by this report type")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltReport {
    pub report: NewReport,
    pub warnings: Vec<BuildWarning>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("unknown report variant '{0}'")]
    InvalidVariant(String),
    #[error("invalid report content: {0}")]
    Validation(FieldErrors),
    #[error(transparent)]
    Artifacts(#[from] ArtifactError),
}

impl From<SchemaError> for BuildError {
    fn from(value: SchemaError) -> Self {
        match value {
            SchemaError::InvalidVariant(tag) => Self::InvalidVariant(tag),
            SchemaError::Validation(errors) => Self::Validation(errors),
        }
    }
}

/// Consecutive photo pairs in selection order plus the trailing odd photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoPairs {
    pub pairs: Vec<(PhotoId, PhotoId)>,
    pub unpaired: Option<PhotoId>,
}

pub fn pair_photos(photos: &[PhotoId]) -> PhotoPairs {
    let mut chunks = photos.chunks_exact(2);
    let pairs = chunks
        .by_ref()
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect();
    let unpaired = chunks.remainder().first().cloned();
    PhotoPairs { pairs, unpaired }
}

/// Clamp numeric or numeric-like input into 0..=100. Anything that does not
/// read as a number becomes 0.
pub fn clamp_percentage(input: &Value) -> u8 {
    let raw = match input {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(value) if value.is_finite() => value.clamp(0.0, 100.0).round() as u8,
        _ => 0,
    }
}

/// Re-establish content invariants after any mutation.
pub fn normalize(content: &mut ReportContent) {
    match content {
        ReportContent::ProjectProgress(progress) => {
            progress.completion_percentage = progress.completion_percentage.min(100);
            progress.timeline.sort_by_key(|entry| entry.date);
        }
        ReportContent::ContractorPerformance(review) => {
            review.rating = review.rating.clamp(1, 5);
        }
        ReportContent::SiteAssessment(_)
        | ReportContent::BeforeAfter(_)
        | ReportContent::DamageDocumentation(_)
        | ReportContent::ClientApproval(_)
        | ReportContent::PeriodicProgress(_)
        | ReportContent::FinalCompletion(_) => {}
    }
}

/// Coerce loosely typed draft values into the shapes the registry expects:
/// percentages are clamped, numeric text becomes numbers, missing severities
/// default to low, and comma separated text lists are split.
pub fn prepare_fields(
    fields: &'static [FieldSpec],
    object: &mut Map<String, Value>,
    prefix: &str,
    warnings: &mut Vec<BuildWarning>,
) {
    for spec in fields {
        let path = field_path(prefix, spec.name);
        let present = object.get(spec.name).is_some_and(|value| !value.is_null());

        if spec.kind == FieldKind::Severity {
            let blank = object
                .get(spec.name)
                .map_or(true, |value| value.is_null() || value.as_str() == Some(""));
            if blank {
                object.insert(spec.name.to_string(), Value::from("low"));
                warnings.push(BuildWarning::DefaultedSeverity { field: path });
                continue;
            }
        }

        if !present {
            continue;
        }

        if let Some(value) = object.get_mut(spec.name) {
            coerce_value(spec, value, &path, warnings);
        }
    }
}

fn coerce_value(
    spec: &'static FieldSpec,
    value: &mut Value,
    path: &str,
    warnings: &mut Vec<BuildWarning>,
) {
    match spec.kind {
        FieldKind::Percentage => *value = Value::from(clamp_percentage(value)),
        FieldKind::Number => {
            if let Some(number) = numeric_text(value) {
                *value = Value::from(number);
            }
        }
        FieldKind::Rating => {
            let number = value.as_f64().or_else(|| numeric_text(value));
            if let Some(number) = number.filter(|n| n.fract() == 0.0 && *n >= 0.0) {
                *value = Value::from(number as u64);
            }
        }
        FieldKind::Severity | FieldKind::MilestoneStatus => {
            if let Some(text) = value.as_str() {
                *value = Value::from(text.trim().to_ascii_lowercase().replace([' ', '-'], "_"));
            }
        }
        FieldKind::KeyValues => {
            if let Some(entries) = value.as_object_mut() {
                for entry in entries.values_mut() {
                    if entry.is_number() || entry.is_boolean() {
                        *entry = Value::from(entry.to_string());
                    }
                }
            }
        }
        FieldKind::TextList => {
            if let Some(text) = value.as_str() {
                let items: Vec<Value> = text
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(Value::from)
                    .collect();
                *value = Value::Array(items);
            }
        }
        FieldKind::Object => {
            if let Some(object) = value.as_object_mut() {
                prepare_fields(spec.fields, object, path, warnings);
            }
        }
        FieldKind::ObjectList => {
            if let Some(items) = value.as_array_mut() {
                prepare_items(spec, items, path, warnings);
            }
        }
        FieldKind::CostItems => {
            if let Some(items) = value.get("items").and_then(Value::as_array).cloned() {
                *value = Value::Array(items);
            }
            if let Some(items) = value.as_array_mut() {
                prepare_items(spec, items, path, warnings);
            }
        }
        FieldKind::Text
        | FieldKind::Date
        | FieldKind::PhotoId
        | FieldKind::PhotoIds
        | FieldKind::MilestoneIds => {}
    }
}

fn prepare_items(
    spec: &'static FieldSpec,
    items: &mut [Value],
    path: &str,
    warnings: &mut Vec<BuildWarning>,
) {
    for (index, item) in items.iter_mut().enumerate() {
        if let Some(object) = item.as_object_mut() {
            prepare_fields(spec.fields, object, &format!("{path}[{index}]"), warnings);
        }
    }
}

fn numeric_text(value: &Value) -> Option<f64> {
    value
        .as_str()
        .and_then(|text| text.trim().parse::<f64>().ok())
        .filter(|number| number.is_finite())
}

fn ids_value<T: ToString>(ids: &[T]) -> Value {
    Value::Array(ids.iter().map(|id| Value::from(id.to_string())).collect())
}

fn has_value(object: &Map<String, Value>, name: &str) -> bool {
    match object.get(name) {
        None | Some(Value::Null) => false,
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

/// Turns drafts into typed, registry-validated content.
pub struct ReportBuilder {
    photos: Arc<dyn PhotoProvider>,
    milestones: Arc<dyn MilestoneProvider>,
    span: Span,
}

impl ReportBuilder {
    pub fn new(photos: Arc<dyn PhotoProvider>, milestones: Arc<dyn MilestoneProvider>) -> Self {
        Self {
            photos,
            milestones,
            span: info_span!("report_builder"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Build a report from a draft. Variant and field validation run before
    /// any provider is called; nothing is persisted on either path.
    pub async fn build(
        &self,
        draft: ReportDraft,
        generated_by: UserId,
    ) -> Result<BuiltReport, BuildError> {
        let ReportDraft {
            project_id,
            report_type,
            selection,
            mut fields,
            project_snapshot,
        } = draft;

        let report_type = schema::parse_report_type(&report_type)?;
        if project_id.as_str().trim().is_empty() {
            return Err(BuildError::Validation(FieldErrors::single(
                "project_id",
                "is required",
            )));
        }

        let variant = schema::schema(report_type);
        let mut warnings = Vec::new();
        apply_photo_selection(variant, &selection.photo_ids, &mut fields, &mut warnings);
        apply_milestone_selection(variant, &selection.milestone_ids, &mut fields, &mut warnings);
        prepare_fields(variant.fields, &mut fields, "", &mut warnings);

        let mut content = schema::validate_variant(report_type, &Value::Object(fields))?;

        self.verify_photos(&project_id, &content).await?;
        self.attach_milestones(variant, &project_id, &selection.milestone_ids, &mut content)
            .await?;
        normalize(&mut content);

        for warning in &warnings {
            warn!(parent: &self.span, report_type = %report_type, "{}", warning.message());
        }
        info!(
            parent: &self.span,
            report_type = %report_type,
            project_id = %project_id,
            photos = content.photo_ids().len(),
            milestones = content.milestone_ids().len(),
            "report draft built"
        );

        Ok(BuiltReport {
            report: NewReport {
                id: None,
                project_id,
                generated_at: None,
                generated_by,
                project_snapshot,
                content,
            },
            warnings,
        })
    }

    /// Check an edited report against the project's artifacts before it is
    /// stored. Only what the edit introduces is checked, so a report whose
    /// photos were later removed from the project stays editable.
    ///
    /// Before/after pairs may be reordered or dropped but every pair must be
    /// one built from the original selection. A milestone snapshot that the
    /// edit changes must match the project's current milestones exactly.
    pub async fn verify_revision(
        &self,
        current: &Report,
        revised: &ReportContent,
    ) -> Result<(), BuildError> {
        let project_id = &current.project_id;
        let mut errors = FieldErrors::default();

        if let (ReportContent::BeforeAfter(before), ReportContent::BeforeAfter(after)) =
            (&current.content, revised)
        {
            let built: Vec<(&PhotoId, &PhotoId)> =
                before.comparisons.iter().map(comparison_pair).collect();
            for (index, comparison) in after.comparisons.iter().enumerate() {
                if !built.contains(&comparison_pair(comparison)) {
                    errors.push(
                        format!("comparisons[{index}]"),
                        "photo pairs come from the original selection and cannot be replaced",
                    );
                }
            }
        }

        let known_photos = current.content.photo_ids();
        let added_photos: Vec<PhotoId> = revised
            .photo_ids()
            .into_iter()
            .filter(|id| !known_photos.contains(id))
            .collect();
        if !added_photos.is_empty() {
            let available = self.photos.list_by_project(project_id).await?;
            let unknown: Vec<String> = added_photos
                .iter()
                .filter(|id| !available.iter().any(|photo| &photo.id == *id))
                .map(ToString::to_string)
                .collect();
            if !unknown.is_empty() {
                errors.push(
                    "selection.photo_ids",
                    format!(
                        "references photos not found in project {project_id}: {}",
                        unknown.join(", ")
                    ),
                );
            }
        }

        self.verify_revised_milestones(current, revised, &mut errors)
            .await?;

        if errors.is_empty() {
            Ok(())
        } else {
            Err(BuildError::Validation(errors))
        }
    }

    async fn verify_revised_milestones(
        &self,
        current: &Report,
        revised: &ReportContent,
        errors: &mut FieldErrors,
    ) -> Result<(), BuildError> {
        let project_id = &current.project_id;
        let (snapshot, referenced) = match (&current.content, revised) {
            (ReportContent::ProjectProgress(before), ReportContent::ProjectProgress(after)) => {
                if before.milestone_statuses == after.milestone_statuses {
                    return Ok(());
                }
                (Some(&after.milestone_statuses), revised.milestone_ids())
            }
            (ReportContent::FinalCompletion(_), ReportContent::FinalCompletion(_)) => {
                let known = current.content.milestone_ids();
                let added: Vec<MilestoneId> = revised
                    .milestone_ids()
                    .into_iter()
                    .filter(|id| !known.contains(id))
                    .collect();
                (None, added)
            }
            _ => return Ok(()),
        };
        if referenced.is_empty() {
            return Ok(());
        }

        let available: HashMap<MilestoneId, _> = self
            .milestones
            .list_by_project(project_id)
            .await?
            .into_iter()
            .map(|milestone| (milestone.id.clone(), milestone))
            .collect();
        let unknown: Vec<String> = referenced
            .iter()
            .filter(|id| !available.contains_key(*id))
            .map(ToString::to_string)
            .collect();
        if !unknown.is_empty() {
            errors.push(
                "selection.milestone_ids",
                format!(
                    "references milestones not found in project {project_id}: {}",
                    unknown.join(", ")
                ),
            );
            return Ok(());
        }

        for (index, entry) in snapshot.into_iter().flatten().enumerate() {
            let Some(milestone) = available.get(&entry.milestone_id) else {
                continue;
            };
            if entry.status != milestone.status {
                errors.push(
                    format!("milestone_statuses[{index}].status"),
                    format!(
                        "milestone {} is currently {}",
                        milestone.id,
                        milestone.status.tag()
                    ),
                );
            }
            if entry.title != milestone.title || entry.due_date != milestone.due_date {
                errors.push(
                    format!("milestone_statuses[{index}]"),
                    format!("does not match milestone {} in project {project_id}", milestone.id),
                );
            }
        }
        Ok(())
    }

    async fn verify_photos(
        &self,
        project_id: &ProjectId,
        content: &ReportContent,
    ) -> Result<(), BuildError> {
        let referenced = content.photo_ids();
        if referenced.is_empty() {
            return Ok(());
        }

        let available = self.photos.list_by_project(project_id).await?;
        let unknown: Vec<String> = referenced
            .iter()
            .filter(|id| !available.iter().any(|photo| &photo.id == *id))
            .map(ToString::to_string)
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(BuildError::Validation(FieldErrors::single(
                "selection.photo_ids",
                format!(
                    "references photos not found in project {project_id}: {}",
                    unknown.join(", ")
                ),
            )))
        }
    }

    async fn attach_milestones(
        &self,
        variant: &'static VariantSchema,
        project_id: &ProjectId,
        selected: &[MilestoneId],
        content: &mut ReportContent,
    ) -> Result<(), BuildError> {
        let referenced = match variant.milestone_selection {
            MilestoneSelection::StatusSnapshot(_) => selected.to_vec(),
            MilestoneSelection::Ids(_) => content.milestone_ids(),
            MilestoneSelection::Unused => return Ok(()),
        };
        if referenced.is_empty() {
            return Ok(());
        }

        let available: HashMap<MilestoneId, _> = self
            .milestones
            .list_by_project(project_id)
            .await?
            .into_iter()
            .map(|milestone| (milestone.id.clone(), milestone))
            .collect();

        let unknown: Vec<String> = referenced
            .iter()
            .filter(|id| !available.contains_key(*id))
            .map(ToString::to_string)
            .collect();
        if !unknown.is_empty() {
            return Err(BuildError::Validation(FieldErrors::single(
                "selection.milestone_ids",
                format!(
                    "references milestones not found in project {project_id}: {}",
                    unknown.join(", ")
                ),
            )));
        }

        if let ReportContent::ProjectProgress(progress) = content {
            progress.milestone_statuses = referenced
                .iter()
                .filter_map(|id| available.get(id))
                .map(|milestone| MilestoneStatusEntry {
                    milestone_id: milestone.id.clone(),
                    title: milestone.title.clone(),
                    status: milestone.status,
                    due_date: milestone.due_date,
                })
                .collect();
        }
        Ok(())
    }
}

fn comparison_pair(comparison: &Comparison) -> (&PhotoId, &PhotoId) {
    (&comparison.before_photo_id, &comparison.after_photo_id)
}

fn apply_photo_selection(
    variant: &'static VariantSchema,
    photos: &[PhotoId],
    fields: &mut Map<String, Value>,
    warnings: &mut Vec<BuildWarning>,
) {
    match variant.photo_selection {
        PhotoSelection::Field(name) => {
            if photos.is_empty() {
                return;
            }
            if has_value(fields, name) {
                warnings.push(BuildWarning::IgnoredSelection {
                    artifact: "photos",
                    count: photos.len(),
                });
            } else {
                fields.insert(name.to_string(), ids_value(photos));
            }
        }
        PhotoSelection::Pairs => apply_pairs(photos, fields, warnings),
        PhotoSelection::Unused => {
            if !photos.is_empty() {
                warnings.push(BuildWarning::IgnoredSelection {
                    artifact: "photos",
                    count: photos.len(),
                });
            }
        }
    }
}

/// Comparisons are always rebuilt from the selection: pair `i` takes its
/// area/description/materials from `comparisons[i]` in the draft.
fn apply_pairs(
    photos: &[PhotoId],
    fields: &mut Map<String, Value>,
    warnings: &mut Vec<BuildWarning>,
) {
    let details = match fields.get("comparisons") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            if items.iter().any(|item| !item.is_object()) {
                // leave malformed detail lists for the registry to report
                return;
            }
            items.clone()
        }
        Some(_) => return,
    };

    let PhotoPairs { pairs, unpaired } = pair_photos(photos);
    if let Some(photo_id) = unpaired {
        warnings.push(BuildWarning::UnpairedPhoto { photo_id });
    }
    if details.len() > pairs.len() {
        warnings.push(BuildWarning::UnusedComparisonDetails {
            count: details.len() - pairs.len(),
        });
    }

    let comparisons = pairs
        .into_iter()
        .enumerate()
        .map(|(index, (before, after))| {
            let mut item = details
                .get(index)
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            item.insert("before_photo_id".to_string(), Value::from(before.0));
            item.insert("after_photo_id".to_string(), Value::from(after.0));
            Value::Object(item)
        })
        .collect();
    fields.insert("comparisons".to_string(), Value::Array(comparisons));
}

fn apply_milestone_selection(
    variant: &'static VariantSchema,
    milestones: &[MilestoneId],
    fields: &mut Map<String, Value>,
    warnings: &mut Vec<BuildWarning>,
) {
    if milestones.is_empty() {
        return;
    }
    match variant.milestone_selection {
        MilestoneSelection::Ids(name) => {
            if !has_value(fields, name) {
                fields.insert(name.to_string(), ids_value(milestones));
            }
        }
        // filled after validation, once current states are fetched
        MilestoneSelection::StatusSnapshot(_) => {}
        MilestoneSelection::Unused => warnings.push(BuildWarning::IgnoredSelection {
            artifact: "milestones",
            count: milestones.len(),
        }),
    }
}
