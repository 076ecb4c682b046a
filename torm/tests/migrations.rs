use std::sync::Arc;
use torm::{memory::InMemoryTransport, migrate::MIGRATIONS_KEY, prelude::*};

/// Creates a seed document in `collection` on `up` and removes it on `down`.
struct Seed {
    collection: &'static str,
}

#[async_trait]
impl MigrationAction for Seed {
    async fn run(&self, op: &MigrateOp<'_>) -> TormResult<()> {
        op.collection(self.collection)
            .create(into_document(json!({"id": "seed", "name": "seed"}))?)
            .await?;
        Ok(())
    }
}

struct Unseed {
    collection: &'static str,
}

#[async_trait]
impl MigrationAction for Unseed {
    async fn run(&self, op: &MigrateOp<'_>) -> TormResult<()> {
        op.collection(self.collection).delete("seed").await?;
        Ok(())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn tracker(client: &TormClient<InMemoryTransport>) -> MigrationTracker<InMemoryTransport> {
    init_tracing();
    let mut migrations = client.migrations();
    migrations
        .register("001", "create_users", Seed { collection: "users" }, Unseed { collection: "users" })
        .unwrap()
        .register(
            "002",
            "create_products",
            Seed { collection: "products" },
            Unseed { collection: "products" },
        )
        .unwrap();
    migrations
}

#[tokio::test]
async fn migrate_applies_pending_in_order() {
    let client = TormClient::new(InMemoryTransport::new());
    let migrations = tracker(&client);

    assert_eq!(migrations.pending().await, vec!["001", "002"]);
    assert_eq!(migrations.migrate().await.unwrap(), vec!["create_users", "create_products"]);
    assert!(migrations.migrate().await.unwrap().is_empty());

    for (id, status) in migrations.status().await {
        assert!(status.is_applied(), "{id} should be applied");
        assert!(status.to_string().starts_with("Applied ("));
    }

    assert_eq!(client.collection("users").count().await.unwrap(), 1);
    assert_eq!(client.collection("products").count().await.unwrap(), 1);
}

#[tokio::test]
async fn applied_state_survives_the_tracker() {
    let client = TormClient::new(InMemoryTransport::new());
    tracker(&client).migrate().await.unwrap();

    let fresh = tracker(&client);
    assert!(fresh.pending().await.is_empty());
    assert!(fresh.migrate().await.unwrap().is_empty());

    let applied = fresh.applied().await;
    assert_eq!(
        applied.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        vec!["create_users", "create_products"]
    );

    let blob = client.transport().get_key(MIGRATIONS_KEY).await.unwrap().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&blob).unwrap();
    assert_eq!(parsed["002"]["id"], json!("002"));
}

#[tokio::test]
async fn rollback_undoes_the_latest_step() {
    let client = TormClient::new(InMemoryTransport::new());
    let migrations = tracker(&client);
    migrations.migrate().await.unwrap();

    assert_eq!(migrations.rollback(1).await.unwrap(), vec!["create_products"]);
    assert_eq!(client.collection("products").count().await.unwrap(), 0);
    assert_eq!(migrations.pending().await, vec!["002"]);

    let status = migrations.status().await;
    assert_eq!(status[1], ("002".to_string(), MigrationStatus::Pending));

    assert_eq!(migrations.migrate().await.unwrap(), vec!["create_products"]);
    assert!(migrations.pending().await.is_empty());
}

#[tokio::test]
async fn failing_actions_report_their_migration() {
    let client = TormClient::new(InMemoryTransport::new());
    let mut migrations = tracker(&client);
    migrations
        .register(
            "003",
            "duplicate_seed",
            Seed { collection: "users" },
            action_fn(|_| Box::pin(async { Ok(()) })),
        )
        .unwrap();

    let err = migrations.migrate().await.unwrap_err();
    match err {
        TormError::MigrationAction { id, direction, source } => {
            assert_eq!(id, "003");
            assert_eq!(direction, MigrationDirection::Up);
            assert!(matches!(*source, TormError::Gateway { status: Some(409), .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(migrations.pending().await, vec!["003"]);
}

#[tokio::test]
async fn trackers_share_a_transport() {
    init_tracing();
    let transport = Arc::new(InMemoryTransport::new());
    let client = TormClient::from_shared(transport.clone());

    let mut migrations = MigrationTracker::new(transport.clone());
    migrations
        .register(
            "001",
            "flag",
            action_fn(|op| Box::pin(async move { op.set_key("feature:flag", "on").await })),
            action_fn(|op| Box::pin(async move { op.set_key("feature:flag", "off").await })),
        )
        .unwrap();

    migrations.migrate().await.unwrap();
    assert_eq!(client.transport().get_key("feature:flag").await.unwrap().as_deref(), Some("on"));

    migrations.rollback(1).await.unwrap();
    assert_eq!(transport.get_key("feature:flag").await.unwrap().as_deref(), Some("off"));
}
