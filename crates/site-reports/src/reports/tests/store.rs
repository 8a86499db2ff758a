use std::sync::Arc;

use serde_json::json;

use super::common::*;
use crate::reports::artifacts::PhotoProvider;
use crate::reports::domain::{
    ProjectId, Report, ReportContent, ReportId, ReportPatch, ReportType,
};
use crate::reports::memory::InMemoryReportStore;
use crate::reports::optimistic::OptimisticReportList;
use crate::reports::service::ReportServiceError;
use crate::reports::store::{encode, ReportStore, StoreError};

#[tokio::test]
async fn create_then_get_round_trips() {
    let store = InMemoryReportStore::new();
    let created = store
        .create(new_report(ReportType::BeforeAfter))
        .await
        .expect("create succeeds");

    assert!(!created.id.as_str().is_empty());
    assert_eq!(created.generated_at, created.updated_at);
    assert!(!created.is_archived);

    let fetched = store.get_by_id(&created.id).await.expect("report exists");
    assert_eq!(fetched, created);
    assert_eq!(fetched.report_type(), ReportType::BeforeAfter);
}

#[tokio::test]
async fn create_writes_join_rows_with_the_report() {
    let store = InMemoryReportStore::new();
    let builder = builder_for(catalog());
    let built = builder
        .build(valid_draft(ReportType::FinalCompletion), author())
        .await
        .expect("draft builds");

    let created = store.create(built.report).await.expect("create succeeds");
    let links = store.links(&created.id).await.expect("links exist");
    assert_eq!(links.photo_ids, photo_ids(&["p1", "p2"]));
    assert_eq!(links.milestone_ids, milestone_ids(&["m1", "m3"]));
}

#[tokio::test]
async fn duplicate_ids_conflict() {
    let store = InMemoryReportStore::new();
    let mut report = new_report(ReportType::DamageDocumentation);
    report.id = Some(ReportId::new("rpt-1"));

    store.create(report.clone()).await.expect("first create");
    match store.create(report).await {
        Err(StoreError::Conflict(id)) => assert_eq!(id.as_str(), "rpt-1"),
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn delete_removes_report_and_links_but_not_artifacts() {
    let catalog = catalog();
    let store = InMemoryReportStore::new();
    let built = builder_for(catalog.clone())
        .build(valid_draft(ReportType::ClientApproval), author())
        .await
        .expect("draft builds");
    let created = store.create(built.report).await.expect("create succeeds");

    store.delete(&created.id).await.expect("delete succeeds");

    assert!(matches!(
        store.get_by_id(&created.id).await,
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        store.links(&created.id).await,
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        store.delete(&created.id).await,
        Err(StoreError::NotFound(_))
    ));
    let photo = PhotoProvider::get(catalog.as_ref(), &photo_ids(&["p1"])[0])
        .await
        .expect("catalog readable");
    assert!(photo.is_some(), "photos outlive the report");
}

#[tokio::test]
async fn list_by_project_is_newest_first() {
    let store = InMemoryReportStore::new();
    let oldest = store
        .create(new_report_at(ReportType::SiteAssessment, 1))
        .await
        .expect("create");
    let newest = store
        .create(new_report_at(ReportType::FinalCompletion, 20))
        .await
        .expect("create");
    let middle = store
        .create(new_report_at(ReportType::ProjectProgress, 10))
        .await
        .expect("create");
    let mut elsewhere = new_report(ReportType::ClientApproval);
    elsewhere.project_id = ProjectId::new(OTHER_PROJECT);
    store.create(elsewhere).await.expect("create");

    let ids: Vec<ReportId> = store
        .list_by_project(&project())
        .await
        .expect("list succeeds")
        .into_iter()
        .map(|report| report.id)
        .collect();
    assert_eq!(ids, vec![newest.id, middle.id, oldest.id]);
}

#[tokio::test]
async fn unknown_or_blank_project_lists_nothing() {
    let store = InMemoryReportStore::new();
    store
        .create(new_report(ReportType::SiteAssessment))
        .await
        .expect("create");

    for project_id in ["not-a-valid-id", "", "   "] {
        let reports = store
            .list_by_project(&ProjectId::new(project_id))
            .await
            .expect("list never errors for unknown ids");
        assert!(reports.is_empty(), "'{project_id}' should list nothing");
    }
}

#[tokio::test]
async fn update_merges_content_and_touches_updated_at() {
    let store = InMemoryReportStore::new();
    let created = store
        .create(new_report_at(ReportType::ClientApproval, 1))
        .await
        .expect("create");

    let patch = ReportPatch {
        content: Some(fields(json!({
            "timeline_impact": "Adds one day",
            "signature": { "name": "Jordan Lee", "date": "2024-03-05" }
        }))),
        is_archived: Some(true),
        ..ReportPatch::default()
    };
    let updated = store.update(&created.id, patch).await.expect("update succeeds");

    let ReportContent::ClientApproval(content) = &updated.content else {
        panic!("expected client approval content");
    };
    assert_eq!(content.work_summary, "Tile upgrade");
    assert_eq!(content.timeline_impact.as_deref(), Some("Adds one day"));
    assert_eq!(
        content.signature.as_ref().map(|s| s.name.as_str()),
        Some("Jordan Lee")
    );
    assert!(updated.is_archived);
    assert!(updated.updated_at > created.updated_at);
    assert_eq!(updated.generated_at, created.generated_at);

    let cleared = store
        .update(&created.id, content_patch(json!({ "timeline_impact": null })))
        .await
        .expect("clearing an optional field succeeds");
    let ReportContent::ClientApproval(content) = cleared.content else {
        panic!("expected client approval content");
    };
    assert_eq!(content.timeline_impact, None);
}

#[tokio::test]
async fn report_type_change_rejects_the_whole_update() {
    let store = InMemoryReportStore::new();
    let created = store
        .create(new_report(ReportType::ClientApproval))
        .await
        .expect("create");

    let patch = ReportPatch {
        report_type: Some("before_after".to_string()),
        content: Some(fields(json!({ "work_summary": "Changed" }))),
        is_archived: Some(true),
    };
    match store.update(&created.id, patch).await {
        Err(StoreError::InvalidVariant(reason)) => assert!(reason.contains("cannot change")),
        other => panic!("expected invalid variant, got {other:?}"),
    }

    let unchanged = store.get_by_id(&created.id).await.expect("report exists");
    assert_eq!(unchanged, created);
    assert_eq!(unchanged.report_type(), ReportType::ClientApproval);

    let same_type = ReportPatch {
        report_type: Some("client-approval".to_string()),
        ..ReportPatch::default()
    };
    store
        .update(&created.id, same_type)
        .await
        .expect("restating the current type is allowed");

    let unknown = ReportPatch {
        report_type: Some("inspection".to_string()),
        ..ReportPatch::default()
    };
    assert!(matches!(
        store.update(&created.id, unknown).await,
        Err(StoreError::InvalidVariant(_))
    ));
}

#[tokio::test]
async fn invalid_patch_leaves_the_report_untouched() {
    let store = InMemoryReportStore::new();
    let created = store
        .create(new_report(ReportType::ContractorPerformance))
        .await
        .expect("create");

    match store
        .update(&created.id, content_patch(json!({ "rating": 9 })))
        .await
    {
        Err(StoreError::Validation(errors)) => assert_eq!(errors.fields(), vec!["rating"]),
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(
        store.get_by_id(&created.id).await.expect("exists"),
        created
    );
}

#[tokio::test]
async fn misspelled_patch_key_is_rejected_not_dropped() {
    let store = InMemoryReportStore::new();
    let created = store
        .create(new_report(ReportType::ProjectProgress))
        .await
        .expect("create");

    match store
        .update(&created.id, content_patch(json!({ "acomplishments": "typo" })))
        .await
    {
        Err(StoreError::Validation(errors)) => {
            assert_eq!(errors.fields(), vec!["acomplishments"])
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(
        store.get_by_id(&created.id).await.expect("exists"),
        created
    );
}

#[tokio::test]
async fn updates_keep_percentages_and_cost_totals_consistent() {
    let store = InMemoryReportStore::new();
    let progress = store
        .create(new_report(ReportType::ProjectProgress))
        .await
        .expect("create");
    let updated = store
        .update(
            &progress.id,
            content_patch(json!({ "completion_percentage": 150 })),
        )
        .await
        .expect("update succeeds");
    let ReportContent::ProjectProgress(content) = updated.content else {
        panic!("expected progress content");
    };
    assert_eq!(content.completion_percentage, 100);

    let completion = store
        .create(new_report(ReportType::FinalCompletion))
        .await
        .expect("create");
    let steps = [
        (
            json!([{ "label": "A", "amount": 10 }, { "label": "B", "amount": 15 }]),
            25.0,
        ),
        (json!([{ "label": "B", "amount": 15 }]), 15.0),
        (json!([]), 0.0),
    ];
    for (costs, expected) in steps {
        let updated = store
            .update(&completion.id, content_patch(json!({ "costs": costs })))
            .await
            .expect("update succeeds");
        let ReportContent::FinalCompletion(content) = updated.content else {
            panic!("expected final completion content");
        };
        assert_eq!(content.costs.total(), expected);
    }
}

#[tokio::test]
async fn update_resynchronizes_links() {
    let store = InMemoryReportStore::new();
    let created = store
        .create(new_report(ReportType::SiteAssessment))
        .await
        .expect("create");
    assert_eq!(
        store.links(&created.id).await.expect("links").photo_ids,
        photo_ids(&["p1"])
    );

    store
        .update(
            &created.id,
            content_patch(json!({ "site_photo_ids": ["p4", "p5"] })),
        )
        .await
        .expect("update succeeds");
    assert_eq!(
        store.links(&created.id).await.expect("links").photo_ids,
        photo_ids(&["p4", "p5"])
    );
}

#[tokio::test]
async fn last_write_wins_for_the_same_report() {
    let store = Arc::new(InMemoryReportStore::new());
    let created = store
        .create(new_report(ReportType::DamageDocumentation))
        .await
        .expect("create");

    let first = content_patch(json!({ "issues": [{ "description": "First edit" }] }));
    let second = content_patch(json!({ "issues": [{ "description": "Second edit" }] }));
    store.update(&created.id, first).await.expect("first update");
    store.update(&created.id, second).await.expect("second update");

    let ReportContent::DamageDocumentation(content) =
        store.get_by_id(&created.id).await.expect("exists").content
    else {
        panic!("expected damage content");
    };
    assert_eq!(content.issues[0].description, "Second edit");
}

#[tokio::test]
async fn concurrent_creates_on_different_reports_all_land() {
    let store = Arc::new(InMemoryReportStore::new());
    let mut handles = Vec::new();
    for report_type in ReportType::ordered() {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.create(new_report(report_type)).await
        }));
    }
    for handle in handles {
        handle.await.expect("task joins").expect("create succeeds");
    }

    let reports = store.list_by_project(&project()).await.expect("list");
    assert_eq!(reports.len(), 8);
}

#[tokio::test]
async fn unreadable_rows_fail_reads_and_are_skipped_in_lists() {
    let store = InMemoryReportStore::new();
    let good = store
        .create(new_report(ReportType::SiteAssessment))
        .await
        .expect("create");

    let mut corrupt = encode(&good);
    corrupt.id = ReportId::new("rpt-corrupt");
    corrupt.content = json!({ "site_conditions": 42 });
    store.insert_record(corrupt).expect("raw insert");

    match store.get_by_id(&ReportId::new("rpt-corrupt")).await {
        Err(StoreError::Unreadable { id, reason }) => {
            assert_eq!(id.as_str(), "rpt-corrupt");
            assert!(reason.contains("site_conditions"), "{reason}");
        }
        other => panic!("expected unreadable row, got {other:?}"),
    }

    let listed = store.list_by_project(&project()).await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, good.id);
}

#[tokio::test]
async fn optimistic_update_rolls_back_when_the_store_fails() {
    let store = Arc::new(FlakyStore::default());
    let created = store
        .create(new_report(ReportType::ClientApproval))
        .await
        .expect("create");
    let mut list = OptimisticReportList::load(store.clone(), project())
        .await
        .expect("list loads");

    store.fail_writes(true);
    let result = list
        .update(&created.id, content_patch(json!({ "work_summary": "Changed" })))
        .await;
    assert!(matches!(result, Err(StoreError::Persistence { .. })));
    assert_eq!(list.get(&created.id), Some(&created));

    store.fail_writes(false);
    let saved = list
        .update(&created.id, content_patch(json!({ "work_summary": "Changed" })))
        .await
        .expect("update succeeds");
    assert_eq!(list.get(&created.id), Some(&saved));
}

#[tokio::test]
async fn optimistic_delete_restores_the_entry_on_failure() {
    let store = Arc::new(FlakyStore::default());
    let first = store
        .create(new_report_at(ReportType::ClientApproval, 2))
        .await
        .expect("create");
    let second = store
        .create(new_report_at(ReportType::DamageDocumentation, 1))
        .await
        .expect("create");
    let mut list = OptimisticReportList::load(store.clone(), project())
        .await
        .expect("list loads");

    store.fail_writes(true);
    assert!(list.delete(&first.id).await.is_err());
    let ids: Vec<_> = list.reports().iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids, vec![first.id.clone(), second.id.clone()]);

    store.fail_writes(false);
    list.delete(&first.id).await.expect("delete succeeds");
    assert_eq!(list.reports().len(), 1);
    assert!(matches!(
        store.inner.get_by_id(&first.id).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn optimistic_changes_reject_type_changes_locally() {
    let store = Arc::new(FlakyStore::default());
    let created = store
        .create(new_report(ReportType::ClientApproval))
        .await
        .expect("create");
    let mut list = OptimisticReportList::load(store.clone(), project())
        .await
        .expect("list loads");

    let patch = ReportPatch {
        report_type: Some("site_assessment".to_string()),
        ..ReportPatch::default()
    };
    assert!(matches!(
        list.update(&created.id, patch).await,
        Err(StoreError::InvalidVariant(_))
    ));
    assert_eq!(list.get(&created.id), Some(&created));
}

fn rejected_fields(result: Result<Report, ReportServiceError>) -> Vec<String> {
    match result {
        Err(ReportServiceError::Validation(errors)) => {
            errors.fields().into_iter().map(str::to_string).collect()
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn edits_cannot_attach_photos_from_outside_the_project() {
    let harness = harness();
    let created = harness
        .service
        .create(valid_draft(ReportType::SiteAssessment))
        .await
        .expect("create")
        .report;

    let foreign = content_patch(json!({ "site_photo_ids": ["p1", "x1", "ghost"] }));
    let fields = rejected_fields(harness.service.update(&created.id, foreign).await);
    assert_eq!(fields, vec!["selection.photo_ids"]);
    let stored = harness.service.get(&created.id).await.expect("exists");
    assert_eq!(stored, created);

    let added = content_patch(json!({ "site_photo_ids": ["p1", "p6"] }));
    let updated = harness
        .service
        .update(&created.id, added)
        .await
        .expect("project photo accepted");
    assert_eq!(updated.content.photo_ids(), photo_ids(&["p1", "p6", "p3"]));
}

#[tokio::test]
async fn before_after_pairs_cannot_be_swapped_by_an_edit() {
    let harness = harness();
    let created = harness
        .service
        .create(valid_draft(ReportType::BeforeAfter))
        .await
        .expect("create")
        .report;

    let forged = content_patch(json!({
        "comparisons": [{ "area": "Forged", "before_photo_id": "x1", "after_photo_id": "ghost" }]
    }));
    let fields = rejected_fields(harness.service.update(&created.id, forged).await);
    assert!(fields.contains(&"comparisons[0]".to_string()), "{fields:?}");
    assert!(fields.contains(&"selection.photo_ids".to_string()), "{fields:?}");

    let crossed = content_patch(json!({
        "comparisons": [{ "area": "Kitchen", "before_photo_id": "p1", "after_photo_id": "p4" }]
    }));
    let fields = rejected_fields(harness.service.update(&created.id, crossed).await);
    assert_eq!(fields, vec!["comparisons[0]"]);

    let trimmed = content_patch(json!({
        "comparisons": [{
            "area": "Bathroom",
            "before_photo_id": "p3",
            "after_photo_id": "p4",
            "description": "Retiled"
        }]
    }));
    let updated = harness
        .service
        .update(&created.id, trimmed)
        .await
        .expect("dropping a built pair is allowed");
    assert_eq!(updated.content.photo_ids(), photo_ids(&["p3", "p4"]));
}

#[tokio::test]
async fn edited_milestone_snapshot_must_match_the_project() {
    let harness = harness();
    let created = harness
        .service
        .create(valid_draft(ReportType::ProjectProgress))
        .await
        .expect("create")
        .report;

    let unknown = content_patch(json!({
        "milestone_statuses": [
            { "milestone_id": "m-forged", "title": "Forged", "status": "completed" }
        ]
    }));
    let fields = rejected_fields(harness.service.update(&created.id, unknown).await);
    assert_eq!(fields, vec!["selection.milestone_ids"]);

    let promoted = content_patch(json!({
        "milestone_statuses": [
            {
                "milestone_id": "m2",
                "title": "Framing",
                "status": "completed",
                "due_date": "2024-04-01"
            }
        ]
    }));
    let fields = rejected_fields(harness.service.update(&created.id, promoted).await);
    assert_eq!(fields, vec!["milestone_statuses[0].status"]);

    let stored = harness.service.get(&created.id).await.expect("exists");
    assert_eq!(stored, created);

    // edits that leave the snapshot alone still go through
    let updated = harness
        .service
        .update(
            &created.id,
            content_patch(json!({ "accomplishments": "Roof dried in" })),
        )
        .await
        .expect("update succeeds");
    assert_eq!(updated.content.milestone_ids(), milestone_ids(&["m1", "m2"]));
}
