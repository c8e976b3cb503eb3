//! Listing audit log entries with filters and pagination.

mod common;

use audit_chain_service::services::AuditLogService;
use audit_chain_service::ServiceError;
use chrono::{Duration, Utc};
use common::{event, TestDb};
use domain::models::{AuditStatus, ListAuditLogsQuery};
use uuid::Uuid;

async fn seeded() -> (TestDb, Uuid) {
    let db = TestDb::chained().await;
    let actor = Uuid::new_v4();

    for i in 0..7 {
        let mut e = event(&format!("phi.read{}", i));
        e.actor_id = Some(actor);
        db.store.append_chained(&e).await.unwrap();
    }

    let mut failed = event("auth.login");
    failed.status = AuditStatus::Failure;
    failed.resource_type = Some("session".to_string());
    db.store.append_chained(&failed).await.unwrap();

    let mut literal = event("report_100%.export");
    literal.status = AuditStatus::Error;
    db.store.append_chained(&literal).await.unwrap();

    (db, actor)
}

#[tokio::test]
async fn test_default_page_is_newest_first() {
    let (db, _) = seeded().await;
    let service = AuditLogService::new(db.store.clone());

    let page = service.list(&ListAuditLogsQuery::default()).await.unwrap();
    assert_eq!(page.pagination.page, 1);
    assert_eq!(page.pagination.limit, 50);
    assert_eq!(page.pagination.total, 9);
    assert_eq!(page.pagination.total_pages, 1);

    let ids: Vec<_> = page.entries.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![9, 8, 7, 6, 5, 4, 3, 2, 1]);
}

#[tokio::test]
async fn test_pagination_splits_results() {
    let (db, _) = seeded().await;
    let service = AuditLogService::new(db.store.clone());

    let query = ListAuditLogsQuery {
        page: Some(3),
        limit: Some(4),
        ..Default::default()
    };
    let page = service.list(&query).await.unwrap();
    assert_eq!(page.pagination.total, 9);
    assert_eq!(page.pagination.total_pages, 3);
    assert_eq!(page.entries.len(), 1);
    assert_eq!(page.entries[0].id, 1);
}

#[tokio::test]
async fn test_oversized_limit_is_clamped() {
    let (db, _) = seeded().await;
    let service = AuditLogService::new(db.store.clone());

    let query = ListAuditLogsQuery {
        limit: Some(5_000),
        ..Default::default()
    };
    let page = service.list(&query).await.unwrap();
    assert_eq!(page.pagination.limit, 100);
    assert_eq!(page.entries.len(), 9);
}

#[tokio::test]
async fn test_filters_combine() {
    let (db, actor) = seeded().await;
    let service = AuditLogService::new(db.store.clone());

    let by_actor = ListAuditLogsQuery {
        actor_id: Some(actor),
        limit: Some(3),
        ..Default::default()
    };
    let page = service.list(&by_actor).await.unwrap();
    assert_eq!(page.pagination.total, 7);
    assert_eq!(page.entries.len(), 3);
    assert!(page.entries.iter().all(|e| e.actor_id == Some(actor)));

    let by_status = ListAuditLogsQuery {
        status: Some(AuditStatus::Failure),
        resource_type: Some("session".to_string()),
        ..Default::default()
    };
    let page = service.list(&by_status).await.unwrap();
    assert_eq!(page.pagination.total, 1);
    assert_eq!(page.entries[0].action, "auth.login");
}

#[tokio::test]
async fn test_action_filter_is_a_literal_substring() {
    let (db, _) = seeded().await;
    let service = AuditLogService::new(db.store.clone());

    let query = ListAuditLogsQuery {
        action: Some("read".to_string()),
        ..Default::default()
    };
    assert_eq!(service.list(&query).await.unwrap().pagination.total, 7);

    // '%' must not act as a wildcard.
    let query = ListAuditLogsQuery {
        action: Some("100%".to_string()),
        ..Default::default()
    };
    let page = service.list(&query).await.unwrap();
    assert_eq!(page.pagination.total, 1);
    assert_eq!(page.entries[0].status, AuditStatus::Error);

    let query = ListAuditLogsQuery {
        action: Some("1%0".to_string()),
        ..Default::default()
    };
    assert_eq!(service.list(&query).await.unwrap().pagination.total, 0);
}

#[tokio::test]
async fn test_time_range_filter() {
    let (db, _) = seeded().await;
    let service = AuditLogService::new(db.store.clone());
    let now = Utc::now();

    let everything = ListAuditLogsQuery {
        from: Some(now - Duration::hours(1)),
        to: Some(now + Duration::hours(1)),
        ..Default::default()
    };
    assert_eq!(service.list(&everything).await.unwrap().pagination.total, 9);

    let future = ListAuditLogsQuery {
        from: Some(now + Duration::hours(1)),
        ..Default::default()
    };
    let page = service.list(&future).await.unwrap();
    assert_eq!(page.pagination.total, 0);
    assert!(page.entries.is_empty());
    assert_eq!(page.pagination.total_pages, 0);
}

#[tokio::test]
async fn test_invalid_query_is_rejected() {
    let (db, _) = seeded().await;
    let service = AuditLogService::new(db.store.clone());
    let now = Utc::now();

    let query = ListAuditLogsQuery {
        from: Some(now),
        to: Some(now - Duration::minutes(5)),
        ..Default::default()
    };
    match service.list(&query).await {
        Err(ServiceError::Validation(message)) => {
            assert_eq!(message, "'from' must not be after 'to'")
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_count_matches_list_total() {
    let (db, _) = seeded().await;
    let service = AuditLogService::new(db.store.clone());
    assert_eq!(service.count().await.unwrap(), 9);
}
