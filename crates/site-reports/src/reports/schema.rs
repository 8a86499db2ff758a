//! Per-variant field requirements.
//!
//! Every other component (builder coercion, store patch validation, the HTTP
//! schema endpoints) reads these tables instead of keeping its own list of
//! which fields a variant carries.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};

use super::domain::{ReportContent, ReportType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Percentage,
    Rating,
    Date,
    Severity,
    MilestoneStatus,
    PhotoId,
    PhotoIds,
    MilestoneIds,
    TextList,
    KeyValues,
    Object,
    ObjectList,
    CostItems,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    #[serde(skip_serializing_if = "has_no_fields")]
    pub fields: &'static [FieldSpec],
}

fn has_no_fields(fields: &&'static [FieldSpec]) -> bool {
    fields.is_empty()
}

impl FieldSpec {
    const fn required(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            required: true,
            fields: &[],
        }
    }

    const fn optional(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            required: false,
            fields: &[],
        }
    }

    const fn with_fields(self, fields: &'static [FieldSpec]) -> Self {
        Self { fields, ..self }
    }
}

/// How a variant consumes the draft's photo selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "field")]
pub enum PhotoSelection {
    /// Selected photos fill this list field unless the draft already sets it.
    Field(&'static str),
    /// Selected photos are grouped into consecutive before/after pairs.
    Pairs,
    Unused,
}

/// How a variant consumes the draft's milestone selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "field")]
pub enum MilestoneSelection {
    /// Current milestone states are copied into this field at build time.
    StatusSnapshot(&'static str),
    /// Selected milestone ids are stored in this field.
    Ids(&'static str),
    Unused,
}

#[derive(Debug, Serialize)]
pub struct VariantSchema {
    pub report_type: ReportType,
    pub label: &'static str,
    pub fields: &'static [FieldSpec],
    pub photo_selection: PhotoSelection,
    pub milestone_selection: MilestoneSelection,
}

impl VariantSchema {
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &'static FieldSpec> {
        self.fields.iter().filter(|spec| spec.required)
    }

    pub fn optional_fields(&self) -> impl Iterator<Item = &'static FieldSpec> {
        self.fields.iter().filter(|spec| !spec.required)
    }
}

use FieldKind as K;

const SITE_ISSUE_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("description", "Description", K::Text),
    FieldSpec::optional("severity", "Severity", K::Severity),
    FieldSpec::optional("photo_ids", "Photos", K::PhotoIds),
];

const TIMELINE_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("date", "Date", K::Date),
    FieldSpec::required("description", "Description", K::Text),
    FieldSpec::optional("photo_ids", "Photos", K::PhotoIds),
];

const MILESTONE_STATUS_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("milestone_id", "Milestone", K::Text),
    FieldSpec::required("title", "Title", K::Text),
    FieldSpec::required("status", "Status", K::MilestoneStatus),
    FieldSpec::optional("due_date", "Due date", K::Date),
];

const COMPARISON_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("area", "Area", K::Text),
    FieldSpec::required("before_photo_id", "Before photo", K::PhotoId),
    FieldSpec::required("after_photo_id", "After photo", K::PhotoId),
    FieldSpec::optional("description", "Description", K::Text),
    FieldSpec::optional("materials", "Materials", K::TextList),
];

const DAMAGE_ISSUE_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("description", "Description", K::Text),
    FieldSpec::optional("measurements", "Measurements", K::Text),
    FieldSpec::optional("cause_assessment", "Cause assessment", K::Text),
    FieldSpec::optional("recommended_repairs", "Recommended repairs", K::Text),
    FieldSpec::optional("photo_ids", "Photos", K::PhotoIds),
];

const SIGNATURE_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("name", "Name", K::Text),
    FieldSpec::required("date", "Date", K::Date),
];

const PERIOD_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("start", "Start", K::Date),
    FieldSpec::required("end", "End", K::Date),
];

const COST_ITEM_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("label", "Label", K::Text),
    FieldSpec::required("amount", "Amount", K::Number),
];

static SITE_ASSESSMENT: VariantSchema = VariantSchema {
    report_type: ReportType::SiteAssessment,
    label: ReportType::SiteAssessment.label(),
    fields: &[
        FieldSpec::required("site_conditions", "Site conditions", K::Text),
        FieldSpec::optional("key_measurements", "Key measurements", K::KeyValues),
        FieldSpec::required("site_photo_ids", "Site photos", K::PhotoIds),
        FieldSpec::optional("issues", "Identified issues", K::ObjectList)
            .with_fields(SITE_ISSUE_FIELDS),
    ],
    photo_selection: PhotoSelection::Field("site_photo_ids"),
    milestone_selection: MilestoneSelection::Unused,
};

static PROJECT_PROGRESS: VariantSchema = VariantSchema {
    report_type: ReportType::ProjectProgress,
    label: ReportType::ProjectProgress.label(),
    fields: &[
        FieldSpec::required("accomplishments", "Accomplishments", K::Text),
        FieldSpec::required("completion_percentage", "Completion", K::Percentage),
        FieldSpec::optional("timeline_notes", "Timeline notes", K::Text),
        FieldSpec::optional("timeline", "Timeline", K::ObjectList).with_fields(TIMELINE_FIELDS),
        FieldSpec::optional("milestone_statuses", "Milestone status", K::ObjectList)
            .with_fields(MILESTONE_STATUS_FIELDS),
    ],
    photo_selection: PhotoSelection::Unused,
    milestone_selection: MilestoneSelection::StatusSnapshot("milestone_statuses"),
};

static BEFORE_AFTER: VariantSchema = VariantSchema {
    report_type: ReportType::BeforeAfter,
    label: ReportType::BeforeAfter.label(),
    fields: &[
        FieldSpec::required("comparisons", "Comparisons", K::ObjectList)
            .with_fields(COMPARISON_FIELDS),
        FieldSpec::optional("value_added", "Value added", K::Text),
    ],
    photo_selection: PhotoSelection::Pairs,
    milestone_selection: MilestoneSelection::Unused,
};

static DAMAGE_DOCUMENTATION: VariantSchema = VariantSchema {
    report_type: ReportType::DamageDocumentation,
    label: ReportType::DamageDocumentation.label(),
    fields: &[FieldSpec::required("issues", "Issues", K::ObjectList)
        .with_fields(DAMAGE_ISSUE_FIELDS)],
    photo_selection: PhotoSelection::Unused,
    milestone_selection: MilestoneSelection::Unused,
};

static CLIENT_APPROVAL: VariantSchema = VariantSchema {
    report_type: ReportType::ClientApproval,
    label: ReportType::ClientApproval.label(),
    fields: &[
        FieldSpec::required("work_summary", "Work summary", K::Text),
        FieldSpec::optional("photo_ids", "Photos", K::PhotoIds),
        FieldSpec::required("cost_breakdown", "Cost breakdown", K::Text),
        FieldSpec::optional("timeline_impact", "Timeline impact", K::Text),
        FieldSpec::optional("signature", "Signature", K::Object).with_fields(SIGNATURE_FIELDS),
    ],
    photo_selection: PhotoSelection::Field("photo_ids"),
    milestone_selection: MilestoneSelection::Unused,
};

static PERIODIC_PROGRESS: VariantSchema = VariantSchema {
    report_type: ReportType::PeriodicProgress,
    label: ReportType::PeriodicProgress.label(),
    fields: &[
        FieldSpec::required("period", "Reporting period", K::Object).with_fields(PERIOD_FIELDS),
        FieldSpec::required("work_completed", "Work completed", K::Text),
        FieldSpec::optional("photo_ids", "Photos", K::PhotoIds),
        FieldSpec::optional("hours_worked", "Hours worked", K::Number),
        FieldSpec::optional("resources_used", "Resources used", K::Text),
        FieldSpec::optional("issues_solutions", "Issues and solutions", K::Text),
        FieldSpec::optional("next_period_plan", "Plan for next period", K::Text),
    ],
    photo_selection: PhotoSelection::Field("photo_ids"),
    milestone_selection: MilestoneSelection::Unused,
};

static CONTRACTOR_PERFORMANCE: VariantSchema = VariantSchema {
    report_type: ReportType::ContractorPerformance,
    label: ReportType::ContractorPerformance.label(),
    fields: &[
        FieldSpec::required("contractor", "Contractor", K::Text),
        FieldSpec::optional("adherence_notes", "Schedule adherence", K::Text),
        FieldSpec::optional("quality_notes", "Quality of work", K::Text),
        FieldSpec::optional("communication_notes", "Communication", K::Text),
        FieldSpec::optional("issue_resolution_notes", "Issue resolution", K::Text),
        FieldSpec::optional("photo_ids", "Photos", K::PhotoIds),
        FieldSpec::required("rating", "Rating", K::Rating),
        FieldSpec::optional("comments", "Comments", K::Text),
    ],
    photo_selection: PhotoSelection::Field("photo_ids"),
    milestone_selection: MilestoneSelection::Unused,
};

static FINAL_COMPLETION: VariantSchema = VariantSchema {
    report_type: ReportType::FinalCompletion,
    label: ReportType::FinalCompletion.label(),
    fields: &[
        FieldSpec::required("before_photo_ids", "Before photos", K::PhotoIds),
        FieldSpec::required("after_photo_ids", "After photos", K::PhotoIds),
        FieldSpec::required("milestone_summary", "Milestone summary", K::Text),
        FieldSpec::optional("milestone_ids", "Milestones", K::MilestoneIds),
        FieldSpec::optional("costs", "Cost items", K::CostItems).with_fields(COST_ITEM_FIELDS),
        FieldSpec::optional("warranty_info", "Warranty", K::Text),
        FieldSpec::optional("maintenance_info", "Maintenance", K::Text),
        FieldSpec::optional("client_signoff", "Client sign-off", K::Object)
            .with_fields(SIGNATURE_FIELDS),
    ],
    photo_selection: PhotoSelection::Unused,
    milestone_selection: MilestoneSelection::Ids("milestone_ids"),
};

pub fn schema(report_type: ReportType) -> &'static VariantSchema {
    match report_type {
        ReportType::SiteAssessment => &SITE_ASSESSMENT,
        ReportType::ProjectProgress => &PROJECT_PROGRESS,
        ReportType::BeforeAfter => &BEFORE_AFTER,
        ReportType::DamageDocumentation => &DAMAGE_DOCUMENTATION,
        ReportType::ClientApproval => &CLIENT_APPROVAL,
        ReportType::PeriodicProgress => &PERIODIC_PROGRESS,
        ReportType::ContractorPerformance => &CONTRACTOR_PERFORMANCE,
        ReportType::FinalCompletion => &FINAL_COMPLETION,
    }
}

pub fn schemas() -> [&'static VariantSchema; 8] {
    ReportType::ordered().map(schema)
}

pub fn parse_report_type(tag: &str) -> Result<ReportType, SchemaError> {
    ReportType::from_tag(tag).ok_or_else(|| SchemaError::InvalidVariant(tag.to_string()))
}

pub fn schema_for_tag(tag: &str) -> Result<&'static VariantSchema, SchemaError> {
    parse_report_type(tag).map(schema)
}

/// A single field-level validation failure, addressed by a dotted path such
/// as `comparisons[1].area`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.iter().any(|error| error.field == field)
    }

    pub fn fields(&self) -> Vec<&str> {
        self.0.iter().map(|error| error.field.as_str()).collect()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, error) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{} {}", error.field, error.message)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("unknown report variant '{0}'")]
    InvalidVariant(String),
    #[error("invalid report content: {0}")]
    Validation(FieldErrors),
}

/// Validate draft content against the variant named by `report_type`.
pub fn validate(report_type: &str, draft: &Value) -> Result<ReportContent, SchemaError> {
    let report_type = parse_report_type(report_type)?;
    validate_variant(report_type, draft)
}

pub fn validate_variant(
    report_type: ReportType,
    draft: &Value,
) -> Result<ReportContent, SchemaError> {
    let schema = schema(report_type);
    let Some(object) = draft.as_object() else {
        return Err(SchemaError::Validation(FieldErrors::single(
            "content",
            "must be an object",
        )));
    };

    let mut errors = FieldErrors::default();
    check_object(schema.fields, object, "", &mut errors);
    if errors.is_empty() {
        check_constraints(report_type, object, &mut errors);
    }
    if !errors.is_empty() {
        return Err(SchemaError::Validation(errors));
    }

    decode(report_type, draft.clone())
        .map_err(|err| SchemaError::Validation(FieldErrors::single("content", err.to_string())))
}

fn decode(report_type: ReportType, value: Value) -> Result<ReportContent, serde_json::Error> {
    Ok(match report_type {
        ReportType::SiteAssessment => ReportContent::SiteAssessment(serde_json::from_value(value)?),
        ReportType::ProjectProgress => {
            ReportContent::ProjectProgress(serde_json::from_value(value)?)
        }
        ReportType::BeforeAfter => ReportContent::BeforeAfter(serde_json::from_value(value)?),
        ReportType::DamageDocumentation => {
            ReportContent::DamageDocumentation(serde_json::from_value(value)?)
        }
        ReportType::ClientApproval => ReportContent::ClientApproval(serde_json::from_value(value)?),
        ReportType::PeriodicProgress => {
            ReportContent::PeriodicProgress(serde_json::from_value(value)?)
        }
        ReportType::ContractorPerformance => {
            ReportContent::ContractorPerformance(serde_json::from_value(value)?)
        }
        ReportType::FinalCompletion => {
            ReportContent::FinalCompletion(serde_json::from_value(value)?)
        }
    })
}

pub(crate) fn field_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

fn check_object(
    fields: &'static [FieldSpec],
    object: &Map<String, Value>,
    prefix: &str,
    errors: &mut FieldErrors,
) {
    for spec in fields {
        let path = field_path(prefix, spec.name);
        match object.get(spec.name) {
            None | Some(Value::Null) => {
                if spec.required {
                    errors.push(path, "is required");
                }
            }
            Some(value) => check_value(spec, value, &path, errors),
        }
    }
    for key in object.keys() {
        if !fields.iter().any(|spec| spec.name == key) {
            errors.push(field_path(prefix, key), "is not a field of this report type");
        }
    }
}

fn check_value(spec: &'static FieldSpec, value: &Value, path: &str, errors: &mut FieldErrors) {
    match spec.kind {
        FieldKind::Text | FieldKind::PhotoId => match value.as_str() {
            Some(text) if spec.required && text.trim().is_empty() => {
                errors.push(path, "must not be blank")
            }
            Some(_) => {}
            None => errors.push(path, "must be text"),
        },
        FieldKind::Number => {
            if !value.as_f64().is_some_and(f64::is_finite) {
                errors.push(path, "must be a number");
            }
        }
        FieldKind::Percentage => match value.as_u64() {
            Some(percent) if percent <= 100 => {}
            _ => errors.push(path, "must be a whole number between 0 and 100"),
        },
        FieldKind::Rating => match value.as_u64() {
            Some(rating) if (1..=5).contains(&rating) => {}
            _ => errors.push(path, "must be a whole number between 1 and 5"),
        },
        FieldKind::Date => {
            if value.as_str().and_then(parse_date).is_none() {
                errors.push(path, "must be a date formatted YYYY-MM-DD");
            }
        }
        FieldKind::Severity => match value.as_str() {
            Some("low" | "medium" | "high") => {}
            _ => errors.push(path, "must be one of low, medium, high"),
        },
        FieldKind::MilestoneStatus => match value.as_str() {
            Some("pending" | "in_progress" | "completed") => {}
            _ => errors.push(path, "must be one of pending, in_progress, completed"),
        },
        FieldKind::PhotoIds | FieldKind::MilestoneIds | FieldKind::TextList => {
            match value.as_array() {
                Some(items) if items.iter().all(Value::is_string) => {
                    if spec.required && items.is_empty() {
                        errors.push(path, "must contain at least one entry");
                    }
                }
                _ => errors.push(path, "must be a list of text values"),
            }
        }
        FieldKind::KeyValues => match value.as_object() {
            Some(entries) if entries.values().all(Value::is_string) => {}
            _ => errors.push(path, "must map names to text values"),
        },
        FieldKind::Object => match value.as_object() {
            Some(object) => check_object(spec.fields, object, path, errors),
            None => errors.push(path, "must be an object"),
        },
        FieldKind::ObjectList => match value.as_array() {
            Some(items) => check_object_list(spec, items, path, errors),
            None => errors.push(path, "must be a list of objects"),
        },
        FieldKind::CostItems => {
            let items = match value {
                Value::Array(items) => Some(items),
                Value::Object(object) => object.get("items").and_then(Value::as_array),
                _ => None,
            };
            match items {
                Some(items) => check_object_list(spec, items, path, errors),
                None => errors.push(path, "must be a list of cost items"),
            }
        }
    }
}

fn check_object_list(
    spec: &'static FieldSpec,
    items: &[Value],
    path: &str,
    errors: &mut FieldErrors,
) {
    if spec.required && items.is_empty() {
        errors.push(path, "must contain at least one entry");
    }
    for (index, item) in items.iter().enumerate() {
        let item_path = format!("{path}[{index}]");
        match item.as_object() {
            Some(object) => check_object(spec.fields, object, &item_path, errors),
            None => errors.push(item_path, "must be an object"),
        }
    }
}

fn check_constraints(
    report_type: ReportType,
    object: &Map<String, Value>,
    errors: &mut FieldErrors,
) {
    if report_type != ReportType::PeriodicProgress {
        return;
    }

    let period = object.get("period").and_then(Value::as_object);
    let start = period
        .and_then(|period| period.get("start"))
        .and_then(Value::as_str)
        .and_then(parse_date);
    let end = period
        .and_then(|period| period.get("end"))
        .and_then(Value::as_str)
        .and_then(parse_date);
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            errors.push("period.end", "must not be before period.start");
        }
    }

    if let Some(hours) = object.get("hours_worked").and_then(Value::as_f64) {
        if hours < 0.0 {
            errors.push("hours_worked", "must not be negative");
        }
    }
}
