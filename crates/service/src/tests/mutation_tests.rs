use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use configs::ItemsConfig;
use models::query::{Filter, Query};
use models::schema::{ROLES_COLLECTION, USERS_COLLECTION};
use models::PrimaryKey;
use serde_json::json;

use super::item;
use crate::test_support::{seed_admin, test_services};
use crate::{ItemsService, MutationOptions, QueryOptions, ServiceError, UserIntegrityCheckFlag, UsersService};

async fn articles_with_limit(limit: u64) -> Result<ItemsService> {
    let services = test_services()
        .await?
        .with_items_config(ItemsConfig { max_batch_mutation: Some(limit), ..Default::default() });
    Ok(ItemsService::new("articles", services))
}

async fn count_articles(articles: &ItemsService) -> Result<usize> {
    Ok(articles.get_keys_by_query(&Query::new()).await?.len())
}

async fn user_field(users: &UsersService, key: &PrimaryKey, field: &str) -> Result<serde_json::Value> {
    let row = users.read_one(key, &Query::new(), &QueryOptions::default()).await?;
    Ok(row.get(field).cloned().unwrap_or_default())
}

#[tokio::test]
async fn nested_writes_share_one_ceiling() -> Result<()> {
    let articles = articles_with_limit(6).await?;
    let opts = MutationOptions::new();
    let mut ctx = articles.begin(&opts).await?;

    // a parent write cascading into five child writes counts as six
    articles.create_one_in(&mut ctx, item(json!({"title": "parent"})), &opts).await?;
    let children = (0..5).map(|i| item(json!({"title": format!("child {i}")}))).collect();
    articles.create_many_in(&mut ctx, children, &opts.for_nested()).await?;
    assert_eq!(ctx.tracker().count(), 6);

    let err = articles.create_one_in(&mut ctx, item(json!({"title": "one too many"})), &opts).await.unwrap_err();
    assert_eq!(err, ServiceError::LimitExceeded { count: 7, limit: 6 });

    // the failed operation takes everything staged with it
    assert!(ctx.finish(articles.services(), Err::<(), _>(err)).await.is_err());
    assert_eq!(count_articles(&articles).await?, 0);
    Ok(())
}

#[tokio::test]
async fn tracker_carries_across_top_level_calls() -> Result<()> {
    let articles = articles_with_limit(3).await?;
    let tracker = articles.create_mutation_tracker(0);
    let opts = MutationOptions::new().with_tracker(tracker.clone());

    articles.create_many(vec![item(json!({"title": "A"})), item(json!({"title": "B"}))], &opts).await?;
    articles.create_one(item(json!({"title": "C"})), &opts).await?;
    let err = articles.create_one(item(json!({"title": "D"})), &opts).await.unwrap_err();
    assert!(matches!(err, ServiceError::LimitExceeded { count: 4, limit: 3 }));
    assert_eq!(tracker.count(), 4);
    assert_eq!(count_articles(&articles).await?, 3);
    Ok(())
}

#[tokio::test]
async fn bypass_ignores_the_ceiling_but_still_counts() -> Result<()> {
    let articles = articles_with_limit(1).await?;
    let tracker = articles.create_mutation_tracker(0);
    let opts = MutationOptions::new().with_tracker(tracker.clone()).bypass_limits();
    let batch = (0..3).map(|i| item(json!({"title": format!("T{i}")}))).collect();
    assert_eq!(articles.create_many(batch, &opts).await?.len(), 3);
    assert_eq!(tracker.count(), 3);
    Ok(())
}

#[tokio::test]
async fn limit_failure_on_batch_keeps_nothing() -> Result<()> {
    let articles = articles_with_limit(2).await?;
    let batch = (0..3).map(|i| item(json!({"title": format!("T{i}")}))).collect();
    let err = articles.create_many(batch, &MutationOptions::new()).await.unwrap_err();
    assert!(matches!(err, ServiceError::LimitExceeded { .. }));
    assert_eq!(count_articles(&articles).await?, 0);
    Ok(())
}

#[tokio::test]
async fn batch_past_the_limit_fails_before_any_write() -> Result<()> {
    let articles = articles_with_limit(2).await?;
    let tracker = articles.create_mutation_tracker(0);
    let written = Arc::new(AtomicUsize::new(0));
    let w = written.clone();
    let opts = MutationOptions::new().with_tracker(tracker.clone()).on_revision(move |_| {
        w.fetch_add(1, Ordering::SeqCst);
    });

    let batch = (0..3).map(|i| item(json!({"title": format!("T{i}")}))).collect();
    let err = articles.create_many(batch, &opts).await.unwrap_err();
    assert_eq!(err, ServiceError::LimitExceeded { count: 3, limit: 2 });
    assert_eq!(tracker.count(), 3);
    assert_eq!(written.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn pre_mutation_error_aborts_before_writing() -> Result<()> {
    let services = test_services().await?;
    let articles = ItemsService::new("articles", services);
    let revisions = Arc::new(AtomicUsize::new(0));
    let seen = revisions.clone();
    let opts = MutationOptions::new()
        .fail_with(ServiceError::Forbidden("maintenance window".into()))
        .on_revision(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

    let err = articles.create_one(item(json!({"title": "A"})), &opts).await.unwrap_err();
    assert_eq!(err, ServiceError::Forbidden("maintenance window".into()));
    assert_eq!(count_articles(&articles).await?, 0);
    assert_eq!(revisions.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn observer_fires_once_with_combined_flags() -> Result<()> {
    let services = test_services().await?;
    seed_admin(&services.db).await?;
    let users = ItemsService::new(USERS_COLLECTION, services.clone());

    let calls = Arc::new(AtomicUsize::new(0));
    let flags = Arc::new(AtomicU8::new(0));
    let (c, f) = (calls.clone(), flags.clone());
    let outer = MutationOptions::new()
        .request_integrity_check(UserIntegrityCheckFlag::USER_LIMITS)
        .on_integrity_check(move |requested| {
            c.fetch_add(1, Ordering::SeqCst);
            f.store(requested.bits(), Ordering::SeqCst);
        });
    let nested = outer.for_nested().request_integrity_check(UserIntegrityCheckFlag::REMAINING_ADMINS);

    let mut ctx = users.begin(&outer).await?;
    users.create_one_in(&mut ctx, item(json!({"email": "a@example.com"})), &outer).await?;
    users.create_one_in(&mut ctx, item(json!({"email": "b@example.com"})), &nested).await?;
    users.create_one_in(&mut ctx, item(json!({"email": "c@example.com"})), &nested).await?;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    ctx.finish(&services, Ok(())).await?;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(flags.load(Ordering::SeqCst), UserIntegrityCheckFlag::ALL.bits());
    Ok(())
}

#[tokio::test]
async fn observer_is_silent_without_requests() -> Result<()> {
    let services = test_services().await?;
    let articles = ItemsService::new("articles", services);
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let opts = MutationOptions::new().on_integrity_check(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    articles.create_one(item(json!({"title": "A"})), &opts).await?;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn deleting_last_admin_is_rolled_back() -> Result<()> {
    let services = test_services().await?;
    let admin_id = seed_admin(&services.db).await?;
    let users = UsersService::new(services);
    let key = PrimaryKey::from(admin_id.as_str());

    let err = users.delete_one(&key, &MutationOptions::new()).await.unwrap_err();
    assert!(matches!(err, ServiceError::IntegrityViolation(_)));

    let row = users.items().read_one(&key, &Query::new(), &QueryOptions::default()).await?;
    assert_eq!(row.get("email"), Some(&json!("admin@example.com")));
    Ok(())
}

#[tokio::test]
async fn demoting_the_only_admin_is_rejected() -> Result<()> {
    let services = test_services().await?;
    let admin_id = seed_admin(&services.db).await?;
    let users = UsersService::new(services);
    let key = PrimaryKey::from(admin_id.as_str());

    let err = users.update_one(&key, item(json!({"status": "suspended"})), &MutationOptions::new()).await.unwrap_err();
    assert!(matches!(err, ServiceError::IntegrityViolation(_)));

    // a rename does not touch access, so no check is requested
    users.update_one(&key, item(json!({"first_name": "Ada"})), &MutationOptions::new()).await?;
    Ok(())
}

#[tokio::test]
async fn user_seat_limits_apply_on_create() -> Result<()> {
    let services = test_services()
        .await?
        .with_user_limits(configs::UserLimitsConfig { max_api_users: Some(1), ..Default::default() });
    let users = UsersService::new(services);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let opts = MutationOptions::new().on_integrity_check(move |flags| s.lock().unwrap().push(flags));

    users.create_one(item(json!({"email": "bot1@example.com"})), &opts).await?;
    let err = users.create_one(item(json!({"email": "bot2@example.com"})), &opts).await.unwrap_err();
    assert!(matches!(err, ServiceError::IntegrityViolation(_)));
    assert_eq!(*seen.lock().unwrap(), vec![UserIntegrityCheckFlag::USER_LIMITS; 2]);
    assert_eq!(users.items().get_keys_by_query(&Query::new()).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn every_user_write_path_keeps_an_admin() -> Result<()> {
    let services = test_services().await?;
    let admin_id = seed_admin(&services.db).await?;
    let users = UsersService::new(services);
    let key = PrimaryKey::from(admin_id.as_str());
    let suspend = || item(json!({"status": "suspended"}));
    let by_id = Query::new().filter(Filter::eq("id", admin_id.as_str()));

    let results = [
        users.update_by_query(&by_id, suspend(), &MutationOptions::new()).await.map(|_| ()),
        users.update_batch(vec![item(json!({"id": admin_id, "status": "suspended"}))], &MutationOptions::new()).await.map(|_| ()),
        users.upsert_one(item(json!({"id": admin_id, "status": "suspended"})), &MutationOptions::new()).await.map(|_| ()),
        users.upsert_many(vec![item(json!({"id": admin_id, "role": null}))], &MutationOptions::new()).await.map(|_| ()),
        users.delete_by_query(&by_id, &MutationOptions::new()).await.map(|_| ()),
        users.items().update_many(&[key.clone()], suspend(), &MutationOptions::new()).await.map(|_| ()),
    ];
    for result in results {
        assert!(matches!(result, Err(ServiceError::IntegrityViolation(_))), "{result:?}");
    }
    assert_eq!(user_field(&users, &key, "status").await?, json!("active"));
    Ok(())
}

#[tokio::test]
async fn nested_user_writes_request_checks_on_the_context() -> Result<()> {
    let services = test_services().await?;
    let admin_id = seed_admin(&services.db).await?;
    let users = UsersService::new(services.clone());
    let key = PrimaryKey::from(admin_id.as_str());

    let opts = MutationOptions::new();
    let mut ctx = users.begin(&opts).await?;
    users.update_one_in(&mut ctx, &key, item(json!({"first_name": "Ada"})), &opts).await?;
    assert!(ctx.pending_checks().is_empty());
    users.create_one_in(&mut ctx, item(json!({"email": "b@example.com"})), &opts).await?;
    assert_eq!(ctx.pending_checks(), UserIntegrityCheckFlag::USER_LIMITS);
    users.update_one_in(&mut ctx, &key, item(json!({"status": "suspended"})), &opts).await?;
    assert_eq!(ctx.pending_checks(), UserIntegrityCheckFlag::ALL);

    let err = ctx.finish(&services, Ok(())).await.unwrap_err();
    assert!(matches!(err, ServiceError::IntegrityViolation(_)));
    assert_eq!(user_field(&users, &key, "status").await?, json!("active"));
    Ok(())
}

#[tokio::test]
async fn role_access_changes_keep_an_admin() -> Result<()> {
    let services = test_services().await?;
    let admin_id = seed_admin(&services.db).await?;
    let users = UsersService::new(services.clone());
    let roles = ItemsService::new(ROLES_COLLECTION, services);
    let role_id = user_field(&users, &PrimaryKey::from(admin_id.as_str()), "role").await?;
    let role = PrimaryKey::from_json(&role_id).ok_or_else(|| anyhow::anyhow!("admin has no role"))?;

    let err = roles.update_one(&role, item(json!({"admin_access": false})), &MutationOptions::new()).await.unwrap_err();
    assert!(matches!(err, ServiceError::IntegrityViolation(_)));
    let err = roles.delete_one(&role, &MutationOptions::new()).await.unwrap_err();
    assert!(matches!(err, ServiceError::IntegrityViolation(_)));

    // renaming leaves access alone
    roles.update_one(&role, item(json!({"name": "Owners"})), &MutationOptions::new()).await?;
    let row = roles.read_one(&role, &Query::new(), &QueryOptions::default()).await?;
    assert_eq!(row.get("admin_access"), Some(&json!(true)));
    Ok(())
}
