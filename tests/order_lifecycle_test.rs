//! End-to-end tests of the order lifecycle against a migrated SQLite store:
//! intake, scheduling, stage toggles, completion and the documents produced
//! on the way.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use chhapai_orders::{
    documents::DocumentKind,
    errors::ServiceError,
    models::{OrderStatus, StageStatus, MAX_STAGE_HOURS},
    services::order_lifecycle::{
        OrderFilter, ScheduleOrderRequest, UpdateStageRequest, WooCommerceBilling,
        WooCommerceLineItem, WooCommerceOrder, WooCommerceShipping, MAX_PRICE_PER_UNIT,
        STAGES_INCOMPLETE_MESSAGE,
    },
};
use chrono::NaiveDate;
use common::{order_request, TestApp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ConnectionTrait, Statement};
use uuid::Uuid;

fn feb_first() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
}

fn schedule_request(stages: &[&str]) -> ScheduleOrderRequest {
    ScheduleOrderRequest {
        delivery_date: Some(feb_first()),
        stage_names: stages.iter().map(|s| s.to_string()).collect(),
    }
}

fn woo_order(id: i64) -> WooCommerceOrder {
    WooCommerceOrder {
        id,
        billing: WooCommerceBilling {
            first_name: "Ravi".to_string(),
            last_name: "Kumar".to_string(),
            email: Some("ravi@example.com".to_string()),
            phone: None,
        },
        shipping: Some(WooCommerceShipping {
            address_1: "4 Lake View".to_string(),
            city: "Bengaluru".to_string(),
        }),
        line_items: vec![WooCommerceLineItem {
            name: "Letterheads".to_string(),
            sku: Some("LH-A4".to_string()),
            quantity: 200,
            price: Some(dec!(4.25)),
        }],
        total: Some(dec!(850.00)),
        customer_note: Some("Use the blue logo".to_string()),
    }
}

#[tokio::test]
async fn schedule_moves_order_into_production_with_pending_stages() {
    let app = TestApp::new().await;
    let order = app.seed_order("CH-ORD-010").await;
    assert_eq!(order.status, OrderStatus::Pending);

    let outcome = app
        .state
        .lifecycle
        .schedule_order(order.id, schedule_request(&["Printing", "Packaging"]))
        .await
        .unwrap();

    let scheduled = outcome.order;
    assert_eq!(scheduled.order.status, OrderStatus::InProgress);
    assert_eq!(scheduled.order.delivery_date, Some(feb_first()));
    assert_eq!(scheduled.stages.len(), 2);
    assert!(scheduled
        .stages
        .iter()
        .all(|stage| stage.status == StageStatus::Pending && stage.order_id == order.id));
    let names: Vec<&str> = scheduled.stages.iter().map(|s| s.stage_name.as_str()).collect();
    assert_eq!(names, vec!["Printing", "Packaging"]);
    assert_eq!(scheduled.progress.percentage, 0);

    // estimated hours come from the catalog
    assert_eq!(scheduled.stages[0].estimated_time_hours, Some(dec!(4)));
    assert_eq!(scheduled.stages[1].estimated_time_hours, Some(dec!(1)));

    let job_cards = app.documents.calls_of(&DocumentKind::JobCard);
    assert_eq!(job_cards.len(), 1);
    assert_eq!(job_cards[0].id(), Some("JC-CH-ORD-010"));
    assert_eq!(job_cards[0].get("deliveryDate"), Some("2024-02-01"));
    assert_eq!(job_cards[0].checklist_items(), ["Printing", "Packaging"]);
    assert_eq!(
        outcome.job_card.map(|doc| doc.document_id),
        Some("JC-CH-ORD-010".to_string())
    );

    let reread = app.state.lifecycle.get_order(order.id).await.unwrap();
    assert_eq!(reread.order.status, OrderStatus::InProgress);
    assert_eq!(reread.stages.len(), 2);
}

#[tokio::test]
async fn schedule_without_delivery_date_leaves_order_untouched() {
    let app = TestApp::new().await;
    let order = app.seed_order("CH-ORD-011").await;

    let err = app
        .state
        .lifecycle
        .schedule_order(
            order.id,
            ScheduleOrderRequest {
                delivery_date: None,
                stage_names: vec!["Printing".to_string()],
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let reread = app.state.lifecycle.get_order(order.id).await.unwrap();
    assert_eq!(reread.order, order);
    assert!(reread.stages.is_empty());
    assert!(app.documents.calls().is_empty());
}

#[tokio::test]
async fn scheduling_twice_is_rejected() {
    let app = TestApp::new().await;
    let order = app.seed_order("CH-ORD-012").await;
    app.state
        .lifecycle
        .schedule_order(order.id, schedule_request(&["Printing"]))
        .await
        .unwrap();

    let err = app
        .state
        .lifecycle
        .schedule_order(order.id, schedule_request(&["Printing"]))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
    assert_eq!(
        app.state.lifecycle.stages_for_order(order.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn failed_stage_insert_rolls_back_the_status_change() {
    let app = TestApp::new().await;
    let order = app.seed_order("CH-ORD-013").await;

    let db = &app.state.db;
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "DROP TABLE order_stages".to_string(),
    ))
    .await
    .unwrap();

    let err = app
        .state
        .lifecycle
        .schedule_order(order.id, schedule_request(&["Printing", "Packaging"]))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::DatabaseError(_));

    let pending = app.state.lifecycle.list_pending_orders().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].status, OrderStatus::Pending);
    assert_eq!(pending[0].delivery_date, None);
    assert!(app.documents.calls().is_empty());
}

#[tokio::test]
async fn toggle_stamps_and_clears_timestamps() {
    let app = TestApp::new().await;
    let order = app.seed_order("CH-ORD-014").await;
    let outcome = app
        .state
        .lifecycle
        .schedule_order(order.id, schedule_request(&["Printing"]))
        .await
        .unwrap();
    let stage = &outcome.order.stages[0];

    // give the stage a start time first
    let started = app
        .state
        .lifecycle
        .update_stage(
            stage.id,
            UpdateStageRequest {
                status: Some(StageStatus::InProgress),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(started.start_time.is_some());

    let completed = app
        .state
        .lifecycle
        .toggle_stage(stage.id, StageStatus::InProgress)
        .await
        .unwrap();
    assert_eq!(completed.status, StageStatus::Completed);
    assert!(completed.end_time.is_some());

    let reopened = app
        .state
        .lifecycle
        .toggle_stage(stage.id, StageStatus::Completed)
        .await
        .unwrap();
    assert_eq!(reopened.status, StageStatus::Pending);
    assert_eq!(reopened.start_time, None);
    assert_eq!(reopened.end_time, None);
}

#[tokio::test]
async fn toggle_unknown_stage_is_not_found() {
    let app = TestApp::new().await;
    let err = app
        .state
        .lifecycle
        .toggle_stage(Uuid::new_v4(), StageStatus::Pending)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn completing_after_all_stages_done_issues_one_challan() {
    let app = TestApp::new().await;
    let order = app.seed_order("CH-ORD-010").await;
    let outcome = app
        .state
        .lifecycle
        .schedule_order(order.id, schedule_request(&["Printing", "Packaging"]))
        .await
        .unwrap();
    for stage in &outcome.order.stages {
        app.state
            .lifecycle
            .toggle_stage(stage.id, StageStatus::Pending)
            .await
            .unwrap();
    }

    let stages = app.state.lifecycle.stages_for_order(order.id).await.unwrap();
    let completion = app
        .state
        .lifecycle
        .complete_order(order.id, &stages)
        .await
        .unwrap();
    assert_eq!(completion.order.status, OrderStatus::Completed);
    assert!(completion.delivery_challan.is_some());

    let challans = app.documents.calls_of(&DocumentKind::DeliveryChallan);
    assert_eq!(challans.len(), 1);
    let challan = &challans[0];
    assert_eq!(challan.id(), Some("CH/DC/CH-ORD-010"));
    assert_eq!(challan.get("customerName"), Some("Asha Traders"));
    assert_eq!(challan.get("productName"), Some("Visiting Cards"));
    assert_eq!(challan.get("quantity"), Some("500"));
    let total: Decimal = challan.get("totalAmount").unwrap().parse().unwrap();
    assert_eq!(total, dec!(750));
    assert!(challan.get("deliveryDate").is_some());

    let completed = app.state.lifecycle.list_completed_orders().await.unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, order.id);
}

#[tokio::test]
async fn completing_with_an_open_stage_is_blocked() {
    let app = TestApp::new().await;
    let order = app.seed_order("CH-ORD-015").await;
    let outcome = app
        .state
        .lifecycle
        .schedule_order(order.id, schedule_request(&["Printing", "Packaging"]))
        .await
        .unwrap();
    app.state
        .lifecycle
        .toggle_stage(outcome.order.stages[0].id, StageStatus::Pending)
        .await
        .unwrap();

    let err = app
        .state
        .lifecycle
        .complete_order_by_id(order.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(ref msg) if msg == STAGES_INCOMPLETE_MESSAGE);
    assert!(err.is_user_facing());

    let reread = app.state.lifecycle.get_order(order.id).await.unwrap();
    assert_eq!(reread.order.status, OrderStatus::InProgress);
    assert_eq!(reread.progress.percentage, 50);
    assert!(app
        .documents
        .calls_of(&DocumentKind::DeliveryChallan)
        .is_empty());
}

#[tokio::test]
async fn stale_stage_view_is_rechecked_against_the_store() {
    let app = TestApp::new().await;
    let order = app.seed_order("CH-ORD-016").await;
    let outcome = app
        .state
        .lifecycle
        .schedule_order(order.id, schedule_request(&["Printing"]))
        .await
        .unwrap();
    let stage_id = outcome.order.stages[0].id;

    app.state
        .lifecycle
        .toggle_stage(stage_id, StageStatus::Pending)
        .await
        .unwrap();
    let seen = app.state.lifecycle.stages_for_order(order.id).await.unwrap();
    // someone reopens the stage after the caller looked
    app.state
        .lifecycle
        .toggle_stage(stage_id, StageStatus::Completed)
        .await
        .unwrap();

    let err = app
        .state
        .lifecycle
        .complete_order(order.id, &seen)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
    let reread = app.state.lifecycle.get_order(order.id).await.unwrap();
    assert_eq!(reread.order.status, OrderStatus::InProgress);
}

#[tokio::test]
async fn order_without_stages_can_never_complete() {
    let app = TestApp::new().await;
    let order = app.seed_order("CH-ORD-017").await;
    let outcome = app
        .state
        .lifecycle
        .schedule_order(order.id, schedule_request(&[]))
        .await
        .unwrap();
    assert!(outcome.order.stages.is_empty());
    assert_eq!(outcome.order.progress.percentage, 0);

    let err = app
        .state
        .lifecycle
        .complete_order_by_id(order.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn document_failure_does_not_undo_the_transition() {
    let app = TestApp::with_failing_documents().await;
    let order = app.seed_order("CH-ORD-018").await;

    let outcome = app
        .state
        .lifecycle
        .schedule_order(order.id, schedule_request(&["Printing"]))
        .await
        .unwrap();
    assert!(outcome.job_card.is_none());
    assert_eq!(outcome.order.order.status, OrderStatus::InProgress);
    assert_eq!(app.documents.calls().len(), 1);
}

#[tokio::test]
async fn challan_can_be_regenerated_for_completed_orders_only() {
    let app = TestApp::new().await;
    let order = app.seed_order("CH-ORD-019").await;

    let err = app
        .state
        .lifecycle
        .regenerate_delivery_challan(order.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));

    let outcome = app
        .state
        .lifecycle
        .schedule_order(order.id, schedule_request(&["Printing"]))
        .await
        .unwrap();
    app.state
        .lifecycle
        .toggle_stage(outcome.order.stages[0].id, StageStatus::Pending)
        .await
        .unwrap();
    app.state
        .lifecycle
        .complete_order_by_id(order.id)
        .await
        .unwrap();

    let document = app
        .state
        .lifecycle
        .regenerate_delivery_challan(order.id)
        .await
        .unwrap();
    assert_eq!(document.kind, DocumentKind::DeliveryChallan);
    assert_eq!(app.documents.calls_of(&DocumentKind::DeliveryChallan).len(), 2);
}

#[tokio::test]
async fn lists_are_newest_first_and_searchable() {
    let app = TestApp::new().await;
    let first = app.seed_order("CH-ORD-101").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let mut request = order_request("CH-ORD-102");
    request.customer_name = "Meera Prints".to_string();
    let second = app.state.lifecycle.create_order(request).await.unwrap();

    let pending = app.state.lifecycle.list_pending_orders().await.unwrap();
    let ids: Vec<Uuid> = pending.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);

    let found = app
        .state
        .lifecycle
        .list_orders(OrderFilter {
            status: Some(OrderStatus::Pending),
            search: Some("meera".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].order_no, "CH-ORD-102");

    let by_number = app
        .state
        .lifecycle
        .list_orders(OrderFilter {
            status: None,
            search: Some("ord-101".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(by_number.len(), 1);
    assert_eq!(by_number[0].id, first.id);
}

#[tokio::test]
async fn in_progress_list_carries_stages_and_progress() {
    let app = TestApp::new().await;
    let order = app.seed_order("CH-ORD-020").await;
    let outcome = app
        .state
        .lifecycle
        .schedule_order(
            order.id,
            schedule_request(&["Design Approval", "Printing", "Lamination", "Packaging"]),
        )
        .await
        .unwrap();
    app.state
        .lifecycle
        .toggle_stage(outcome.order.stages[0].id, StageStatus::Pending)
        .await
        .unwrap();
    app.seed_order("CH-ORD-021").await;

    let in_progress = app.state.lifecycle.list_in_progress_orders().await.unwrap();
    assert_eq!(in_progress.len(), 1);
    assert_eq!(in_progress[0].order.id, order.id);
    assert_eq!(in_progress[0].stages.len(), 4);
    assert_eq!(in_progress[0].stages[0].stage_name, "Design Approval");
    assert_eq!(in_progress[0].progress.completed, 1);
    assert_eq!(in_progress[0].progress.percentage, 25);
}

#[tokio::test]
async fn manual_orders_get_totals_and_generated_numbers() {
    let app = TestApp::new().await;
    let mut request = order_request("");
    request.order_no = None;
    request.quantity = 4;
    request.price_per_unit = Some(dec!(12.50));

    let order = app.state.lifecycle.create_order(request).await.unwrap();
    assert!(order.order_no.starts_with("CH-ORD-"));
    assert_eq!(order.order_no.len(), "CH-ORD-".len() + 6);
    assert_eq!(order.order_total, Some(dec!(50.00)));
    assert_eq!(order.source, "manual");

    let err = app
        .state
        .lifecycle
        .create_order(order_request(&order.order_no))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));

    let mut invalid = order_request("CH-ORD-900");
    invalid.quantity = 0;
    assert_matches!(
        app.state.lifecycle.create_order(invalid).await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn oversized_prices_are_rejected_instead_of_overflowing() {
    let app = TestApp::new().await;

    let mut request = order_request("CH-ORD-901");
    request.quantity = 2;
    request.price_per_unit = Some(Decimal::MAX);
    assert_matches!(
        app.state.lifecycle.create_order(request).await,
        Err(ServiceError::ValidationError(_))
    );

    let mut request = order_request("CH-ORD-902");
    request.quantity = i32::MAX;
    request.price_per_unit = Some(MAX_PRICE_PER_UNIT);
    let order = app.state.lifecycle.create_order(request).await.unwrap();
    assert!(order.order_total.is_some());
    assert_eq!(app.state.lifecycle.list_pending_orders().await.unwrap().len(), 1);
}

#[tokio::test]
async fn woocommerce_ingest_is_idempotent() {
    let app = TestApp::new().await;

    let (order, created) = app
        .state
        .lifecycle
        .ingest_woocommerce_order(woo_order(5120))
        .await
        .unwrap();
    assert!(created);
    assert_eq!(order.order_no, "WC-5120");
    assert_eq!(order.customer_name, "Ravi Kumar");
    assert_eq!(order.customer_contact.as_deref(), Some("ravi@example.com"));
    assert_eq!(order.product_name, "Letterheads");
    assert_eq!(order.quantity, 200);
    assert_eq!(order.order_total, Some(dec!(850.00)));
    assert_eq!(
        order.shipping_address.as_deref(),
        Some("4 Lake View, Bengaluru")
    );
    assert_eq!(order.source, "woocommerce");
    assert_eq!(order.status, OrderStatus::Pending);

    let (again, created) = app
        .state
        .lifecycle
        .ingest_woocommerce_order(woo_order(5120))
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(again.id, order.id);
    assert_eq!(app.state.lifecycle.list_pending_orders().await.unwrap().len(), 1);

    let mut empty = woo_order(5121);
    empty.line_items.clear();
    assert_matches!(
        app.state.lifecycle.ingest_woocommerce_order(empty).await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn concurrent_woocommerce_deliveries_create_one_order() {
    let app = TestApp::new().await;
    let lifecycle = &app.state.lifecycle;

    let (first, second) = tokio::join!(
        lifecycle.ingest_woocommerce_order(woo_order(5200)),
        lifecycle.ingest_woocommerce_order(woo_order(5200)),
    );
    let (first, first_created) = first.unwrap();
    let (second, second_created) = second.unwrap();

    assert_eq!(first.id, second.id);
    assert!(first_created ^ second_created);
    assert_eq!(lifecycle.list_pending_orders().await.unwrap().len(), 1);
}

#[tokio::test]
async fn stage_update_validates_and_records_progress_details() {
    let app = TestApp::new().await;
    let order = app.seed_order("CH-ORD-022").await;
    let outcome = app
        .state
        .lifecycle
        .schedule_order(order.id, schedule_request(&["Quality Check"]))
        .await
        .unwrap();
    let stage_id = outcome.order.stages[0].id;

    let err = app
        .state
        .lifecycle
        .update_stage(
            stage_id,
            UpdateStageRequest {
                wastage_percentage: Some(dec!(120)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let updated = app
        .state
        .lifecycle
        .update_stage(
            stage_id,
            UpdateStageRequest {
                status: Some(StageStatus::Completed),
                assigned_to: Some("Sunil".to_string()),
                quality_remarks: Some("Colour match OK".to_string()),
                wastage_percentage: Some(dec!(2.5)),
                time_taken_hours: Some(dec!(1.25)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.status, StageStatus::Completed);
    assert!(updated.end_time.is_some());
    assert_eq!(updated.assigned_to.as_deref(), Some("Sunil"));
    assert_eq!(updated.wastage_percentage, Some(dec!(2.5)));
    assert_eq!(updated.time_taken_hours, Some(dec!(1.25)));
}

#[tokio::test]
async fn stage_hours_are_capped_so_the_estimate_stays_in_range() {
    let app = TestApp::new().await;
    let order = app.seed_order("CH-ORD-025").await;
    let outcome = app
        .state
        .lifecycle
        .schedule_order(order.id, schedule_request(&["Printing"]))
        .await
        .unwrap();
    let stage_id = outcome.order.stages[0].id;

    let err = app
        .state
        .lifecycle
        .update_stage(
            stage_id,
            UpdateStageRequest {
                estimated_time_hours: Some(dec!(10000000000)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    app.state
        .lifecycle
        .update_stage(
            stage_id,
            UpdateStageRequest {
                estimated_time_hours: Some(MAX_STAGE_HOURS),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let estimate = app
        .state
        .lifecycle
        .estimated_completion(order.id)
        .await
        .unwrap();
    assert_eq!(estimate.remaining_hours, MAX_STAGE_HOURS);
}

#[tokio::test]
async fn estimate_and_stats_reflect_open_work() {
    let app = TestApp::new().await;
    let order = app.seed_order("CH-ORD-023").await;
    app.seed_order("CH-ORD-024").await;
    let outcome = app
        .state
        .lifecycle
        .schedule_order(order.id, schedule_request(&["Printing", "Lamination"]))
        .await
        .unwrap();
    app.state
        .lifecycle
        .toggle_stage(outcome.order.stages[0].id, StageStatus::Pending)
        .await
        .unwrap();

    let estimate = app
        .state
        .lifecycle
        .estimated_completion(order.id)
        .await
        .unwrap();
    assert_eq!(estimate.open_stages, 1);
    assert_eq!(estimate.remaining_hours, dec!(2));

    let stats = app.state.lifecycle.order_stats().await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.by_status.get("pending"), Some(&1));
    assert_eq!(stats.by_status.get("in_progress"), Some(&1));
    assert_eq!(stats.by_priority.get("normal"), Some(&2));
}
