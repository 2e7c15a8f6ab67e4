//! Integration tests for gateway-worker-db
//!
//! Runs against a real SQLite in-memory database

use chrono::{Duration, Utc};
use gateway_worker_cert::{Certificate, CertificateStore, CertificateType};
use gateway_worker_db::{
    connect, migrate, DatabaseCleanupHandler, SeaOrmCertificateStore, SeaOrmJobHistory,
};
use gateway_worker_queue::{Job, JobHandler, JobHistory, JobOutcome, JobRecord, JobType};
use serde_json::Map;
use std::sync::Arc;

async fn setup_test_db() -> sea_orm::DatabaseConnection {
    let db = connect("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory database");

    migrate(&db).await.expect("Failed to run migrations");

    db
}

fn cert(domain: &str, days: i64, certificate_type: CertificateType) -> Certificate {
    Certificate::new(
        domain,
        format!("cert-for-{}", domain),
        format!("key-for-{}", domain),
        Utc::now() + Duration::days(days),
        certificate_type,
    )
}

fn record(job_type: JobType, outcome: JobOutcome, age: Duration) -> JobRecord {
    let job = Job::new(job_type, Map::new());
    let mut record = JobRecord::new(&job, outcome, None);
    record.finished_at = Utc::now() - age;
    record
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let db = setup_test_db().await;
    migrate(&db).await.expect("Second migration run failed");
}

#[tokio::test]
async fn test_store_and_retrieve_certificate() {
    let store = SeaOrmCertificateStore::new(setup_test_db().await);
    let original = cert("api.example.com", 60, CertificateType::Staging);

    store.store(&original).await.unwrap();
    let retrieved = store.retrieve("api.example.com").await.unwrap();

    assert_eq!(retrieved.domain, "api.example.com");
    assert_eq!(retrieved.certificate_pem, original.certificate_pem);
    assert_eq!(retrieved.private_key_pem, original.private_key_pem);
    assert_eq!(retrieved.certificate_type, CertificateType::Staging);
    assert_eq!(retrieved.expires_at.timestamp(), original.expires_at.timestamp());
}

#[tokio::test]
async fn test_store_replaces_record_and_keeps_created_at() {
    let store = SeaOrmCertificateStore::new(setup_test_db().await);

    let mut first = cert("api.example.com", 5, CertificateType::Production);
    first.created_at = Utc::now() - Duration::days(85);
    first.updated_at = first.created_at;
    store.store(&first).await.unwrap();

    let renewed = cert("api.example.com", 90, CertificateType::Production);
    store.store(&renewed).await.unwrap();

    let retrieved = store.retrieve("api.example.com").await.unwrap();
    assert_eq!(retrieved.expires_at.timestamp(), renewed.expires_at.timestamp());
    assert_eq!(retrieved.created_at.timestamp(), first.created_at.timestamp());
    assert_eq!(retrieved.updated_at.timestamp(), renewed.updated_at.timestamp());
    assert_eq!(store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_list_is_ordered_by_domain() {
    let store = SeaOrmCertificateStore::new(setup_test_db().await);
    for domain in ["www.example.com", "api.example.com", "mail.example.com"] {
        store
            .store(&cert(domain, 30, CertificateType::Production))
            .await
            .unwrap();
    }

    let domains: Vec<_> = store
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.domain)
        .collect();
    assert_eq!(
        domains,
        vec!["api.example.com", "mail.example.com", "www.example.com"]
    );
}

#[tokio::test]
async fn test_missing_certificate_is_not_found() {
    let store = SeaOrmCertificateStore::new(setup_test_db().await);

    assert!(store
        .retrieve("missing.example.com")
        .await
        .unwrap_err()
        .is_not_found());
    assert!(store
        .delete("missing.example.com")
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_delete_certificate() {
    let store = SeaOrmCertificateStore::new(setup_test_db().await);
    store
        .store(&cert("api.example.com", 30, CertificateType::Production))
        .await
        .unwrap();

    store.delete("api.example.com").await.unwrap();
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_job_history_round_trip() {
    let history = SeaOrmJobHistory::new(setup_test_db().await);

    let older = record(JobType::ConfigUpdate, JobOutcome::Succeeded, Duration::minutes(5));
    let mut newer = record(JobType::CertificateRenewal, JobOutcome::Failed, Duration::zero());
    newer.attempts = 4;
    newer.error = Some("authority unreachable".to_string());

    history.record(older.clone()).await;
    history.record(newer.clone()).await;

    let recent = history.recent(10).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].job_id, newer.job_id);
    assert_eq!(recent[0].job_type, JobType::CertificateRenewal);
    assert_eq!(recent[0].outcome, JobOutcome::Failed);
    assert_eq!(recent[0].attempts, 4);
    assert_eq!(recent[0].error.as_deref(), Some("authority unreachable"));
    assert_eq!(recent[1].job_id, older.job_id);

    assert_eq!(history.recent(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_history_record_is_ignored() {
    let history = SeaOrmJobHistory::new(setup_test_db().await);
    let record = record(JobType::Analytics, JobOutcome::Dropped, Duration::zero());

    history.record(record.clone()).await;
    history.record(record).await;

    assert_eq!(history.recent(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cleanup_job_deletes_expired_history() {
    let history = Arc::new(SeaOrmJobHistory::new(setup_test_db().await));

    let stale = record(JobType::ConfigUpdate, JobOutcome::Succeeded, Duration::days(45));
    let fresh = record(JobType::ConfigUpdate, JobOutcome::Succeeded, Duration::days(2));
    history.record(stale).await;
    history.record(fresh.clone()).await;

    let handler = DatabaseCleanupHandler::new(history.clone());
    handler
        .handle(&Job::new(JobType::DatabaseCleanup, Map::new()))
        .await
        .unwrap();

    let remaining = history.recent(10).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].job_id, fresh.job_id);

    let job = Job::new(JobType::DatabaseCleanup, Map::new()).with_payload_entry("retention_days", 1);
    handler.handle(&job).await.unwrap();
    assert!(history.recent(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cleanup_job_rejects_huge_retention() {
    let history = Arc::new(SeaOrmJobHistory::new(setup_test_db().await));
    history
        .record(record(JobType::ConfigUpdate, JobOutcome::Succeeded, Duration::days(45)))
        .await;

    let handler = DatabaseCleanupHandler::new(history.clone());
    let job = Job::new(JobType::DatabaseCleanup, Map::new())
        .with_payload_entry("retention_days", i64::MAX);
    let err = handler.handle(&job).await.unwrap_err();

    assert!(!err.is_retryable());
    assert_eq!(history.recent(10).await.unwrap().len(), 1);
}
