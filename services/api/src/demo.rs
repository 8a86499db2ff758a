use crate::infra::{ReportStack, DEMO_PROJECT};
use clap::Args;
use serde_json::{json, Value};
use site_reports::config::AppConfig;
use site_reports::error::AppError;
use site_reports::reports::schema::{self, VariantSchema};
use site_reports::reports::{
    ArtifactSelection, EmailOptions, MilestoneId, PhotoId, ProjectId, ProjectSnapshot,
    ReportDraft, ReportPatch, ReportServiceError, ReportType,
};
use std::path::PathBuf;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Directory for exported documents (defaults to APP_EXPORT_DIR).
    #[arg(long)]
    pub(crate) output_dir: Option<PathBuf>,
    /// Only build this report type (e.g. before_after).
    #[arg(long)]
    pub(crate) report_type: Option<String>,
    /// Also email every report to this address through the logging transport.
    #[arg(long)]
    pub(crate) email: Option<String>,
    /// Print each stored report as JSON.
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct SchemaArgs {
    /// Report type tag; omit to list every type.
    pub(crate) tag: Option<String>,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        output_dir,
        report_type,
        email,
        json,
    } = args;

    let mut config = AppConfig::load()?;
    if let Some(output_dir) = output_dir {
        config.export.output_dir = output_dir;
    }

    let only = match report_type.as_deref() {
        Some(tag) => Some(ReportType::from_tag(tag).ok_or_else(|| unknown_type(tag))?),
        None => None,
    };
    let drafts: Vec<ReportDraft> = demo_drafts()
        .into_iter()
        .filter(|draft| only.map_or(true, |wanted| draft.report_type == wanted.tag()))
        .collect();

    let stack = ReportStack::in_memory(&config);
    println!("Site report demo");
    println!(
        "Project: {DEMO_PROJECT} | exports: {}",
        config.export.output_dir.display()
    );

    for draft in drafts {
        let created = stack.service.create(draft).await?;
        let mut report = created.report;
        println!("\n{} ({})", report.report_type().label(), report.id);
        for warning in &created.warnings {
            println!("  warning: {}", warning.message());
        }

        if report.report_type() == ReportType::ProjectProgress {
            let patch = ReportPatch {
                content: Some(json_object(json!({ "completion_percentage": 140 }))),
                ..ReportPatch::default()
            };
            report = stack.service.update(&report.id, patch).await?;
            println!("  completion raised past 100%, stored as clamped value");
        }

        let links = stack.service.links(&report.id).await?;
        println!(
            "  linked photos: {} | linked milestones: {}",
            links.photo_ids.len(),
            links.milestone_ids.len()
        );

        let receipt = stack.exporter.export_to_file(&report.id, None).await?;
        println!("  file: {} ({} bytes)", receipt.destination, receipt.bytes);

        if let Some(address) = &email {
            match stack
                .exporter
                .export_to_email(&report.id, address, EmailOptions::default())
                .await
            {
                Ok(receipt) => println!("  emailed to {}", receipt.destination),
                Err(err) => println!("  email not sent: {err}"),
            }
        }

        if json {
            match serde_json::to_string_pretty(&report.view()) {
                Ok(body) => println!("{body}"),
                Err(err) => println!("  report payload unavailable: {err}"),
            }
        }
    }

    let stored = stack
        .service
        .list_by_project(&ProjectId::new(DEMO_PROJECT))
        .await?;
    println!("\n{} report(s) stored for {DEMO_PROJECT}", stored.len());
    Ok(())
}

pub(crate) fn run_schema(args: SchemaArgs) -> Result<(), AppError> {
    match args.tag {
        Some(tag) => {
            let variant = schema::schema_for_tag(&tag).map_err(|_| unknown_type(&tag))?;
            match serde_json::to_string_pretty(variant) {
                Ok(body) => println!("{body}"),
                Err(err) => println!("schema unavailable: {err}"),
            }
        }
        None => {
            for variant in schema::schemas() {
                print_variant(variant);
            }
        }
    }
    Ok(())
}

fn print_variant(variant: &VariantSchema) {
    let required: Vec<&str> = variant.required_fields().map(|spec| spec.name).collect();
    println!(
        "{:<24} {:<30} required: {}",
        variant.report_type.tag(),
        variant.label,
        required.join(", ")
    );
}

fn unknown_type(tag: &str) -> AppError {
    AppError::from(ReportServiceError::InvalidVariant(format!(
        "unknown report type '{tag}'"
    )))
}

fn json_object(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(object) => object,
        _ => serde_json::Map::new(),
    }
}

fn demo_draft(
    report_type: ReportType,
    fields: Value,
    photos: &[&str],
    milestones: &[&str],
) -> ReportDraft {
    ReportDraft {
        project_id: ProjectId::new(DEMO_PROJECT),
        report_type: report_type.tag().to_string(),
        selection: ArtifactSelection {
            photo_ids: photos.iter().map(|id| PhotoId::new(*id)).collect(),
            milestone_ids: milestones.iter().map(|id| MilestoneId::new(*id)).collect(),
        },
        fields: json_object(fields),
        project_snapshot: Some(ProjectSnapshot {
            name: "Maple Street Remodel".to_string(),
            address: Some("412 Maple Street".to_string()),
            client_name: Some("Dana Whitfield".to_string()),
            status: Some("active".to_string()),
        }),
    }
}

/// One draft per report type, written the way a site manager would fill
/// the forms in: loose numbers, comma lists, and a missing severity.
fn demo_drafts() -> Vec<ReportDraft> {
    vec![
        demo_draft(
            ReportType::SiteAssessment,
            json!({
                "site_conditions": "Level lot, mature oak at the rear boundary",
                "key_measurements": { "Frontage (ft)": 48, "Setback (ft)": "25" },
                "issues": [
                    { "description": "Cracked garage slab", "photo_ids": ["ph-slab"] }
                ]
            }),
            &["ph-lot", "ph-slab"],
            &[],
        ),
        demo_draft(
            ReportType::ProjectProgress,
            json!({
                "accomplishments": "Framing inspected and signed off",
                "completion_percentage": "45%",
                "timeline": [
                    { "date": "2024-03-09", "description": "Framing complete",
                      "photo_ids": ["ph-framing"] }
                ]
            }),
            &[],
            &["ms-demolition", "ms-framing", "ms-finishes"],
        ),
        demo_draft(
            ReportType::BeforeAfter,
            json!({
                "comparisons": [
                    { "area": "Kitchen", "materials": "Walnut, Quartz, Brass" },
                    { "area": "Bathroom", "description": "Curbless shower" }
                ],
                "value_added": "Two wet rooms brought up to code"
            }),
            &["ph-kitchen-before", "ph-kitchen-after", "ph-bath-before", "ph-bath-after"],
            &[],
        ),
        demo_draft(
            ReportType::DamageDocumentation,
            json!({
                "issues": [{
                    "description": "Supply line leak under kitchen sink",
                    "measurements": "60cm x 40cm",
                    "cause_assessment": "Loose compression fitting",
                    "recommended_repairs": "Replace fitting and cabinet floor",
                    "photo_ids": ["ph-leak"]
                }]
            }),
            &[],
            &[],
        ),
        demo_draft(
            ReportType::ClientApproval,
            json!({
                "work_summary": "Upgrade bathroom floor to heated tile",
                "cost_breakdown": "Labor $800, Materials $1,150",
                "timeline_impact": "Adds three working days"
            }),
            &["ph-bath-before"],
            &[],
        ),
        demo_draft(
            ReportType::PeriodicProgress,
            json!({
                "period": { "start": "2024-03-04", "end": "2024-03-08" },
                "work_completed": "Exterior walls sheathed, windows set",
                "hours_worked": "112",
                "next_period_plan": "Roofing and rough-in plumbing"
            }),
            &["ph-framing"],
            &[],
        ),
        demo_draft(
            ReportType::ContractorPerformance,
            json!({
                "contractor": "Northside Framing Co.",
                "adherence_notes": "Finished two days early",
                "quality_notes": "Passed inspection first time",
                "rating": "5"
            }),
            &["ph-framing"],
            &[],
        ),
        demo_draft(
            ReportType::FinalCompletion,
            json!({
                "before_photo_ids": ["ph-kitchen-before", "ph-bath-before"],
                "after_photo_ids": ["ph-kitchen-after", "ph-bath-after"],
                "milestone_summary": "All scheduled milestones closed out",
                "costs": [
                    { "label": "Labor", "amount": 18250 },
                    { "label": "Materials", "amount": "9420.50" },
                    { "label": "Permits", "amount": 640 }
                ],
                "warranty_info": "One year workmanship, ten years structural"
            }),
            &[],
            &["ms-demolition", "ms-framing", "ms-finishes"],
        ),
    ]
}
