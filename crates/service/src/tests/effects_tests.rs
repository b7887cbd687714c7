use std::sync::Arc;

use anyhow::Result;
use models::query::Query;
use serde_json::json;
use tokio::sync::broadcast::error::TryRecvError;

use super::item;
use crate::events::{ActionCollector, BroadcastEventBus};
use crate::permissions::Accountability;
use crate::test_support::{seed_admin, test_services, RecordingCache};
use crate::{ItemsService, MutationOptions, QueryOptions, ServiceError, UsersService};

async fn with_bus() -> Result<(ItemsService, Arc<BroadcastEventBus>)> {
    let bus = Arc::new(BroadcastEventBus::default());
    let services = test_services().await?.with_events(bus.clone());
    Ok((ItemsService::new("articles", services), bus))
}

#[tokio::test]
async fn create_many_without_events_is_silent() -> Result<()> {
    let (articles, bus) = with_bus().await?;
    let mut rx = bus.subscribe();

    let keys = articles
        .create_many(vec![item(json!({"title": "A"})), item(json!({"title": "B"}))], &MutationOptions::new().without_events())
        .await?;
    assert_eq!(keys.len(), 2);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    Ok(())
}

#[tokio::test]
async fn actions_are_emitted_after_commit() -> Result<()> {
    let (articles, bus) = with_bus().await?;
    let articles = articles.with_accountability(Accountability::admin());
    let mut rx = bus.subscribe();

    let opts = MutationOptions::new();
    let mut ctx = articles.begin(&opts).await?;
    articles.create_one_in(&mut ctx, item(json!({"title": "A"})), &opts).await?;
    articles.create_one_in(&mut ctx, item(json!({"title": "B"})), &opts).await?;
    assert_eq!(ctx.queued_actions().len(), 2);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    ctx.finish(articles.services(), Ok(())).await?;

    let first = rx.try_recv()?;
    assert!(first.is("items.create") && first.is("articles.items.create"));
    assert_eq!(first.meta["key"], json!(1));
    assert_eq!(first.meta["payload"]["title"], json!("A"));
    assert_eq!(first.context.collection, "articles");
    assert_eq!(rx.try_recv()?.meta["key"], json!(2));
    Ok(())
}

#[tokio::test]
async fn failed_mutations_emit_nothing() -> Result<()> {
    let (articles, bus) = with_bus().await?;
    let mut rx = bus.subscribe();
    let batch = vec![item(json!({"title": "A"})), item(json!({"rating": 1}))];
    assert!(articles.create_many(batch, &MutationOptions::new()).await.is_err());
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    Ok(())
}

#[tokio::test]
async fn collector_takes_actions_instead_of_the_bus() -> Result<()> {
    let (articles, bus) = with_bus().await?;
    let mut rx = bus.subscribe();
    let collector = ActionCollector::new();

    let key = articles.create_one(item(json!({"title": "A"})), &MutationOptions::new().collect_actions(collector.clone())).await?;
    articles
        .update_one(&key, item(json!({"rating": 2})), &MutationOptions::new().collect_actions(collector.clone()))
        .await?;
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

    let collected = collector.drain();
    assert_eq!(collected.len(), 2);
    assert!(collected[0].is("items.create"));
    assert!(collected[1].is("articles.items.update"));
    assert_eq!(collected[1].meta["keys"], json!([1]));

    // disabling events wins over the collector
    articles
        .delete_one(&key, &MutationOptions::new().collect_actions(collector.clone()).without_events())
        .await?;
    assert!(collector.is_empty());
    Ok(())
}

#[tokio::test]
async fn reads_emit_query_and_read() -> Result<()> {
    let (articles, bus) = with_bus().await?;
    articles.create_one(item(json!({"title": "A"})), &MutationOptions::new()).await?;
    let mut rx = bus.subscribe();

    articles.read_by_query(&Query::new(), &QueryOptions::default()).await?;
    assert!(rx.try_recv()?.is("articles.items.query"));
    let read = rx.try_recv()?;
    assert!(read.is("items.read"));
    assert_eq!(read.meta["count"], json!(1));

    articles.read_by_query(&Query::new(), &QueryOptions::default().without_events()).await?;
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    Ok(())
}

#[tokio::test]
async fn cache_is_purged_once_committed() -> Result<()> {
    let cache = Arc::new(RecordingCache::default());
    let services = test_services().await?.with_cache(cache.clone());
    let articles = ItemsService::new("articles", services.clone());

    let opts = MutationOptions::new();
    let mut ctx = articles.begin(&opts).await?;
    articles.create_one_in(&mut ctx, item(json!({"title": "A"})), &opts).await?;
    articles.create_one_in(&mut ctx, item(json!({"title": "B"})), &opts).await?;
    assert!(cache.purged().is_empty());
    ctx.finish(&services, Ok(())).await?;
    assert_eq!(cache.purged(), vec!["articles".to_string()]);
    assert_eq!(cache.system_purges(), 0);

    articles.create_one(item(json!({"title": "C"})), &MutationOptions::new().without_cache_purge()).await?;
    assert_eq!(cache.purged().len(), 1);

    let err = articles.create_one(item(json!({"colour": "red"})), &MutationOptions::new()).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    assert_eq!(cache.purged().len(), 1);
    Ok(())
}

#[tokio::test]
async fn system_collections_also_purge_the_system_cache() -> Result<()> {
    let cache = Arc::new(RecordingCache::default());
    let services = test_services().await?.with_cache(cache.clone());
    seed_admin(&services.db).await?;
    let users = UsersService::new(services);

    users.create_one(item(json!({"email": "new@example.com"})), &MutationOptions::new()).await?;
    assert_eq!(cache.purged(), vec![models::schema::USERS_COLLECTION.to_string()]);
    assert_eq!(cache.system_purges(), 1);
    Ok(())
}
