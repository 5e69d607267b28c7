//! End-to-end content versioning scenarios against an on-disk SQLite store

use std::sync::Arc;

use storyvault_core::{
    ContentError, ContentService, NewProject, ProjectDirectory, ProjectId, SaveReason, SaveRequest,
    SqliteStore, VaultConfig,
};
use tempfile::TempDir;

const OWNER: i64 = 42;

async fn setup() -> (TempDir, ContentService, ProjectId) {
    let tmp = TempDir::new().unwrap();
    let config = VaultConfig {
        database_path: tmp.path().join("vault.sqlite"),
        retry_backoff_ms: 1,
        ..VaultConfig::default()
    };
    let service = ContentService::open_sqlite(config).unwrap();
    let project = service
        .create_project(NewProject { owner: OWNER, title: "The Long Road".into(), ..Default::default() })
        .await
        .unwrap();
    (tmp, service, project.id)
}

async fn active_count(service: &ContentService, project: ProjectId) -> usize {
    service.store().count_active(project).await.unwrap()
}

#[tokio::test]
async fn test_new_project_has_empty_version_one() {
    let (_tmp, service, project) = setup().await;
    let active = service.get_active_content(OWNER, project).await.unwrap();
    assert_eq!(active.version, 1);
    assert_eq!(active.text(), "");
    assert!(active.is_active);
    assert_eq!(active.save_reason, SaveReason::InitialCreation);
}

#[tokio::test]
async fn test_save_updates_word_count() {
    let (_tmp, service, project) = setup().await;
    let saved = service
        .save_content(OWNER, project, SaveRequest::text("Hello world"))
        .await
        .unwrap();
    assert_eq!(saved.text(), "Hello world");
    assert_eq!(service.get_active_content(OWNER, project).await.unwrap().text(), "Hello world");

    let record = service.projects().fetch_owned(project, OWNER).await.unwrap();
    assert_eq!(record.word_count, 2);
    assert!(record.last_edited_at.is_some());
    assert!(record.updated_at.is_some());
}

#[tokio::test]
async fn test_snapshot_then_edit() {
    let (_tmp, service, project) = setup().await;
    service.save_content(OWNER, project, SaveRequest::text("Hello world")).await.unwrap();
    service.create_version_snapshot(OWNER, project).await.unwrap();
    service.save_content(OWNER, project, SaveRequest::text("Hello world v2")).await.unwrap();

    let versions = service.list_versions(OWNER, project).await.unwrap();
    assert_eq!(versions.iter().map(|r| r.version).collect::<Vec<_>>(), vec![2, 1]);
    assert_eq!(versions[0].text(), "Hello world v2");
    assert!(versions[0].is_active);
    assert_eq!(versions[1].text(), "Hello world");
    assert!(!versions[1].is_active);
}

#[tokio::test]
async fn test_restore_after_edit() {
    let (_tmp, service, project) = setup().await;
    service.save_content(OWNER, project, SaveRequest::text("Hello world")).await.unwrap();
    service.create_version_snapshot(OWNER, project).await.unwrap();
    service.save_content(OWNER, project, SaveRequest::text("Hello world v2")).await.unwrap();

    let restored = service.restore_version(OWNER, project, 1).await.unwrap();
    assert_eq!(restored.text(), "Hello world");
    assert_eq!(restored.save_reason, SaveReason::Restore);

    let active = service.get_active_content(OWNER, project).await.unwrap();
    assert_eq!(active.id, restored.id);

    let versions = service.list_versions(OWNER, project).await.unwrap();
    assert_eq!(versions.len(), 3);
    assert_eq!(active_count(&service, project).await, 1);
}

#[tokio::test]
async fn test_later_auto_save_wins() {
    let (_tmp, service, project) = setup().await;
    service.save_content(OWNER, project, SaveRequest::text("A")).await.unwrap();
    assert!(service.schedule_auto_save(OWNER, project, Some("B".into())).await.unwrap());
    service.flush(project).await.unwrap();

    let active = service.get_active_content(OWNER, project).await.unwrap();
    assert_eq!(active.text(), "B");
    assert!(active.auto_saved);
}

#[tokio::test]
async fn test_manual_save_waits_for_queued_auto_saves() {
    let (_tmp, service, project) = setup().await;
    for i in 0..10 {
        service
            .schedule_auto_save(OWNER, project, Some(format!("auto {}", i)))
            .await
            .unwrap();
    }
    let saved = service.save_content(OWNER, project, SaveRequest::text("manual")).await.unwrap();
    assert_eq!(saved.text(), "manual");
    assert_eq!(service.get_active_content(OWNER, project).await.unwrap().text(), "manual");
}

#[tokio::test]
async fn test_concurrent_saves_keep_single_active() {
    let (_tmp, service, project) = setup().await;
    let service = Arc::new(service);
    let mut handles = Vec::new();
    for i in 0..16 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            if i % 4 == 0 {
                service.create_version_snapshot(OWNER, project).await.map(|_| ())
            } else {
                service
                    .save_content(OWNER, project, SaveRequest::text(format!("text {}", i)))
                    .await
                    .map(|_| ())
            }
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }
    assert_eq!(active_count(&service, project).await, 1);
    // Initial revision plus one per snapshot
    assert_eq!(service.list_versions(OWNER, project).await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_projects_are_isolated() {
    let (_tmp, service, first) = setup().await;
    let second = service
        .create_project(NewProject { owner: OWNER, title: "Side Story".into(), ..Default::default() })
        .await
        .unwrap()
        .id;
    service.save_content(OWNER, first, SaveRequest::text("first")).await.unwrap();
    service.create_version_snapshot(OWNER, second).await.unwrap();

    assert_eq!(service.list_versions(OWNER, first).await.unwrap().len(), 1);
    assert_eq!(service.list_versions(OWNER, second).await.unwrap().len(), 2);
    assert_eq!(service.get_active_content(OWNER, second).await.unwrap().text(), "");
}

#[tokio::test]
async fn test_snapshot_preserves_content() {
    let (_tmp, service, project) = setup().await;
    service.save_content(OWNER, project, SaveRequest::text("frozen words")).await.unwrap();
    let before = service.get_active_content(OWNER, project).await.unwrap();

    let successor = service.create_version_snapshot(OWNER, project).await.unwrap();
    let frozen = service
        .list_versions(OWNER, project)
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.id == before.id)
        .unwrap();
    assert!(!frozen.is_active);
    assert_eq!(frozen.text(), before.text());
    assert_eq!(successor.text(), before.text());
}

#[tokio::test]
async fn test_restore_is_non_destructive() {
    let (_tmp, service, project) = setup().await;
    service.save_content(OWNER, project, SaveRequest::text("original")).await.unwrap();
    service.create_version_snapshot(OWNER, project).await.unwrap();
    service.save_content(OWNER, project, SaveRequest::text("rewritten")).await.unwrap();
    service.restore_version(OWNER, project, 1).await.unwrap();
    service.restore_version(OWNER, project, 2).await.unwrap();

    let versions = service.list_versions(OWNER, project).await.unwrap();
    let v1 = versions.iter().find(|r| r.version == 1).unwrap();
    assert_eq!(v1.text(), "original");
    let numbers: Vec<u32> = versions.iter().map(|r| r.version).collect();
    assert_eq!(numbers, vec![4, 3, 2, 1]);
    assert_eq!(versions[0].text(), "rewritten");
}

#[tokio::test]
async fn test_empty_auto_save_touches_nothing() {
    let (_tmp, service, project) = setup().await;
    let before = service.list_versions(OWNER, project).await.unwrap();
    assert!(!service.schedule_auto_save(OWNER, project, Some(String::new())).await.unwrap());
    assert!(!service.schedule_auto_save(OWNER, project, None).await.unwrap());
    service.flush(project).await.unwrap();
    assert_eq!(service.list_versions(OWNER, project).await.unwrap(), before);
}

#[tokio::test]
async fn test_error_surfaces() {
    let (_tmp, service, project) = setup().await;
    assert!(matches!(
        service.restore_version(OWNER, project, 7).await,
        Err(ContentError::VersionNotFound { version: 7, .. })
    ));
    assert!(matches!(
        service.list_versions(OWNER + 1, project).await,
        Err(ContentError::NotFoundOrForbidden(_))
    ));
    assert!(matches!(
        service.export_backup(OWNER, project + 100).await,
        Err(ContentError::NotFoundOrForbidden(_))
    ));
}

#[tokio::test]
async fn test_backup_lists_every_version() {
    let (_tmp, service, project) = setup().await;
    service.save_content(OWNER, project, SaveRequest::text("alpha")).await.unwrap();
    service.create_version_snapshot(OWNER, project).await.unwrap();
    let backup = service.export_backup(OWNER, project).await.unwrap();
    assert_eq!(backup.project.title, "The Long Road");
    assert_eq!(backup.project.word_count, 1);
    assert_eq!(backup.content_versions.len(), 2);
    assert_eq!(backup.content_versions[0].version, 2);
    assert!(backup.content_versions[0].is_active);
}

#[tokio::test]
async fn test_repair_after_crash() {
    let (tmp, service, project) = setup().await;
    service.create_version_snapshot(OWNER, project).await.unwrap();

    let raw = rusqlite::Connection::open(tmp.path().join("vault.sqlite")).unwrap();
    raw.execute("UPDATE revisions SET is_active=0", []).unwrap();
    drop(raw);
    assert!(service.needs_repair(project).await.unwrap());

    let active = service.get_active_content(OWNER, project).await.unwrap();
    assert_eq!(active.version, 2);
    assert!(!service.needs_repair(project).await.unwrap());
}

#[tokio::test]
async fn test_rejected_stats_roll_back_save() {
    let (tmp, service, project) = setup().await;
    let raw = rusqlite::Connection::open(tmp.path().join("vault.sqlite")).unwrap();
    raw.execute_batch(
        "CREATE TRIGGER freeze_stats BEFORE UPDATE ON projects BEGIN SELECT RAISE(ABORT, 'frozen'); END;",
    )
    .unwrap();

    let result = service
        .save_content(OWNER, project, SaveRequest::text("three words here"))
        .await;
    assert!(result.is_err());
    assert_eq!(service.get_active_content(OWNER, project).await.unwrap().text(), "");
    let record = service.projects().fetch_owned(project, OWNER).await.unwrap();
    assert_eq!(record.word_count, 0);
    assert!(record.last_edited_at.is_none());

    raw.execute_batch("DROP TRIGGER freeze_stats").unwrap();
    drop(raw);
    service
        .save_content(OWNER, project, SaveRequest::text("three words here"))
        .await
        .unwrap();
    assert_eq!(service.get_active_content(OWNER, project).await.unwrap().text(), "three words here");
    assert_eq!(service.projects().fetch_owned(project, OWNER).await.unwrap().word_count, 3);
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let config = VaultConfig {
        database_path: tmp.path().join("vault.sqlite"),
        ..VaultConfig::default()
    };
    let project = {
        let service = ContentService::open_sqlite(config.clone()).unwrap();
        let project = service
            .create_project(NewProject { owner: OWNER, title: "Persist".into(), ..Default::default() })
            .await
            .unwrap();
        service.save_content(OWNER, project.id, SaveRequest::text("durable")).await.unwrap();
        service.create_version_snapshot(OWNER, project.id).await.unwrap();
        project.id
    };

    let store = Arc::new(SqliteStore::open(&config.database_path).unwrap());
    let reopened = ContentService::new(store.clone(), store, config);
    let record = reopened.projects().fetch_owned(project, OWNER).await.unwrap();
    assert_eq!(record.title, "Persist");
    let versions = reopened.list_versions(OWNER, project).await.unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].text(), "durable");
    assert!(versions[0].is_active);
}
