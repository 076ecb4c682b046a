//! Ordered, reversible migrations with their applied state stored on the server.
//!
//! Registered migrations live in memory; which of them have been applied is persisted as one JSON
//! blob under [`MIGRATIONS_KEY`] through the raw key/value endpoint:
//!
//! ```json
//! { "001": { "id": "001", "name": "create_users", "applied_at": "2024-05-01T10:00:00Z" } }
//! ```
//!
//! The blob is rewritten with a read-modify-write after every step. There is no locking: two
//! trackers running against the same server at once can overwrite each other's records.
//!
//! A record that cannot be decoded is skipped when reading and written back untouched, so one bad
//! timestamp never hides or erases the other records.
//!
//! # Example
//!
//! ```ignore
//! use torm::prelude::*;
//!
//! let mut migrations = client.migrations();
//! migrations.register(
//!     "001",
//!     "create_users",
//!     action_fn(|op| Box::pin(async move {
//!         op.collection("users").create(into_document(json!({"name": "admin"}))?).await?;
//!         Ok(())
//!     })),
//!     action_fn(|_| Box::pin(async { Ok(()) })),
//! )?;
//!
//! let applied = migrations.migrate().await?;
//! let rolled_back = migrations.rollback(1).await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Deserializer, Serialize};
use std::{collections::BTreeMap, fmt, sync::Arc};
use tracing::{info, warn};

use crate::{
    collection::{Collection, TypedCollection},
    document::Model,
    error::{MigrationDirection, TormError, TormResult},
    transport::Transport,
};

/// The key the applied-set blob is stored under.
pub const MIGRATIONS_KEY: &str = "torm:migrations";

/// One direction of a migration.
///
/// Implement this for a struct, or wrap a closure with [`action_fn`].
#[async_trait]
pub trait MigrationAction: Send + Sync {
    /// Runs the action.
    ///
    /// # Arguments
    ///
    /// * `op` - Access to the server's collections and raw keys
    ///
    /// # Errors
    ///
    /// Any error aborts the run; the tracker reports it as
    /// [`TormError::MigrationAction`].
    async fn run(&self, op: &MigrateOp<'_>) -> TormResult<()>;
}

/// A [`MigrationAction`] backed by a closure. Created by [`action_fn`].
pub struct FnAction<F>(F);

#[async_trait]
impl<F> MigrationAction for FnAction<F>
where
    F: for<'a> Fn(&'a MigrateOp<'a>) -> BoxFuture<'a, TormResult<()>> + Send + Sync,
{
    async fn run(&self, op: &MigrateOp<'_>) -> TormResult<()> {
        (self.0)(op).await
    }
}

/// Wraps a closure returning a boxed future as a [`MigrationAction`].
pub fn action_fn<F>(f: F) -> FnAction<F>
where
    F: for<'a> Fn(&'a MigrateOp<'a>) -> BoxFuture<'a, TormResult<()>> + Send + Sync,
{
    FnAction(f)
}

/// What a migration action can do against the server.
pub struct MigrateOp<'a> {
    transport: &'a (dyn Transport + 'a),
}

impl<'a> MigrateOp<'a> {
    pub fn new(transport: &'a (dyn Transport + 'a)) -> Self {
        Self { transport }
    }

    /// Returns an untyped collection handle without a schema.
    pub fn collection(&self, name: impl Into<String>) -> Collection<'a, dyn Transport + 'a> {
        Collection::new(name, self.transport)
    }

    /// Returns a typed collection handle for `M`.
    pub fn typed<M: Model>(&self) -> TypedCollection<'a, dyn Transport + 'a, M> {
        TypedCollection::new(self.transport)
    }

    pub async fn get_key(&self, key: &str) -> TormResult<Option<String>> {
        self.transport.get_key(key).await
    }

    pub async fn set_key(&self, key: &str, value: impl Into<String>) -> TormResult<()> {
        self.transport.set_key(key, value.into()).await
    }

    pub fn transport(&self) -> &'a (dyn Transport + 'a) {
        self.transport
    }
}

/// A registered migration: an id, a human-readable name and its two actions.
#[derive(Clone)]
pub struct Migration {
    id: String,
    name: String,
    up: Arc<dyn MigrationAction>,
    down: Arc<dyn MigrationAction>,
}

impl Migration {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        up: impl MigrationAction + 'static,
        down: impl MigrationAction + 'static,
    ) -> Self {
        Self { id: id.into(), name: name.into(), up: Arc::new(up), down: Arc::new(down) }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A persisted record of an applied migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedMigration {
    pub id: String,
    pub name: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub applied_at: DateTime<Utc>,
}

/// Accepts RFC 3339 timestamps as well as offset-less ISO 8601 ones, read as UTC.
fn deserialize_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;

    DateTime::parse_from_rfc3339(&raw)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f").map(|naive| naive.and_utc()))
        .map_err(serde::de::Error::custom)
}

type AppliedSet = BTreeMap<String, AppliedMigration>;
type RawAppliedSet = serde_json::Map<String, serde_json::Value>;

/// Whether a registered migration has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStatus {
    Pending,
    Applied(DateTime<Utc>),
}

impl MigrationStatus {
    pub fn is_applied(&self) -> bool {
        matches!(self, MigrationStatus::Applied(_))
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationStatus::Pending => write!(f, "Pending"),
            MigrationStatus::Applied(at) => write!(f, "Applied ({})", at.to_rfc3339()),
        }
    }
}

/// Runs registered migrations forward and back, recording progress on the server.
#[derive(Debug)]
pub struct MigrationTracker<T: Transport> {
    transport: Arc<T>,
    migrations: Vec<Migration>,
}

impl<T: Transport> MigrationTracker<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport, migrations: Vec::new() }
    }

    /// Registers a migration after those already registered.
    ///
    /// # Errors
    ///
    /// Returns [`TormError::DuplicateMigration`] if the id is already registered.
    pub fn add_migration(&mut self, migration: Migration) -> TormResult<&mut Self> {
        if self.migrations.iter().any(|m| m.id == migration.id) {
            return Err(TormError::DuplicateMigration(migration.id));
        }

        self.migrations.push(migration);
        Ok(self)
    }

    /// Shorthand for [`add_migration`](Self::add_migration) with [`Migration::new`].
    ///
    /// # Errors
    ///
    /// Returns [`TormError::DuplicateMigration`] if the id is already registered.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        up: impl MigrationAction + 'static,
        down: impl MigrationAction + 'static,
    ) -> TormResult<&mut Self> {
        self.add_migration(Migration::new(id, name, up, down))
    }

    /// Returns the registered migrations in registration order.
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Applies every pending migration in registration order.
    ///
    /// # Returns
    ///
    /// The names of the migrations applied by this call.
    ///
    /// # Errors
    ///
    /// Stops at the first failing `up` action with [`TormError::MigrationAction`], or the first
    /// failed write of the applied-set. Steps completed before the failure stay recorded.
    pub async fn migrate(&self) -> TormResult<Vec<String>> {
        let applied = self.load().await;
        let op = MigrateOp::new(&*self.transport);
        let mut newly_applied = Vec::new();

        for migration in self.migrations.iter().filter(|m| !applied.contains_key(&m.id)) {
            migration.up.run(&op).await.map_err(|source| TormError::MigrationAction {
                id: migration.id.clone(),
                direction: MigrationDirection::Up,
                source: Box::new(source),
            })?;

            self.save_record(AppliedMigration {
                id: migration.id.clone(),
                name: migration.name.clone(),
                applied_at: Utc::now(),
            })
            .await?;

            info!(id = %migration.id, name = %migration.name, "applied migration");
            newly_applied.push(migration.name.clone());
        }

        Ok(newly_applied)
    }

    /// Reverts the `steps` most recently applied migrations.
    ///
    /// Records whose id is no longer registered use up a step but are left in place.
    ///
    /// # Returns
    ///
    /// The names of the migrations rolled back, most recent first.
    ///
    /// # Errors
    ///
    /// Stops at the first failing `down` action with [`TormError::MigrationAction`], or the first
    /// failed write of the applied-set.
    pub async fn rollback(&self, steps: usize) -> TormResult<Vec<String>> {
        if steps == 0 {
            return Ok(Vec::new());
        }

        let mut records: Vec<AppliedMigration> = self.load().await.into_values().collect();
        records.sort_by(|a, b| {
            b.applied_at
                .cmp(&a.applied_at)
                .then_with(|| self.position(&b.id).cmp(&self.position(&a.id)))
        });

        let op = MigrateOp::new(&*self.transport);
        let mut rolled_back = Vec::new();

        for record in records.into_iter().take(steps) {
            let Some(migration) = self.migrations.iter().find(|m| m.id == record.id) else {
                warn!(id = %record.id, "skipping rollback of unregistered migration");
                continue;
            };

            migration.down.run(&op).await.map_err(|source| TormError::MigrationAction {
                id: migration.id.clone(),
                direction: MigrationDirection::Down,
                source: Box::new(source),
            })?;

            self.remove_record(&record.id).await?;

            info!(id = %record.id, name = %record.name, "rolled back migration");
            rolled_back.push(record.name);
        }

        Ok(rolled_back)
    }

    /// Reports each registered migration's state in registration order.
    pub async fn status(&self) -> Vec<(String, MigrationStatus)> {
        let applied = self.load().await;

        self.migrations
            .iter()
            .map(|migration| {
                let status = match applied.get(&migration.id) {
                    Some(record) => MigrationStatus::Applied(record.applied_at),
                    None => MigrationStatus::Pending,
                };
                (migration.id.clone(), status)
            })
            .collect()
    }

    /// Returns the ids of registered migrations not yet applied, in registration order.
    pub async fn pending(&self) -> Vec<String> {
        let applied = self.load().await;

        self.migrations
            .iter()
            .filter(|m| !applied.contains_key(&m.id))
            .map(|m| m.id.clone())
            .collect()
    }

    /// Returns the persisted applied records, oldest first.
    pub async fn applied(&self) -> Vec<AppliedMigration> {
        let mut records: Vec<AppliedMigration> = self.load().await.into_values().collect();
        records.sort_by(|a, b| a.applied_at.cmp(&b.applied_at).then_with(|| self.position(&a.id).cmp(&self.position(&b.id))));
        records
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.migrations.iter().position(|m| m.id == id)
    }

    /// Reads the stored blob as raw records keyed by id. Any failure reads as an empty blob.
    async fn load_raw(&self) -> RawAppliedSet {
        let raw = match self.transport.get_key(MIGRATIONS_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return RawAppliedSet::new(),
            Err(err) => {
                warn!(error = %err, "could not read applied migrations, assuming none");
                return RawAppliedSet::new();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!(error = %err, "applied migrations record is malformed, assuming none");
            RawAppliedSet::new()
        })
    }

    /// Reads the applied-set. Records that cannot be decoded are skipped one by one.
    async fn load(&self) -> AppliedSet {
        self.load_raw()
            .await
            .into_iter()
            .filter_map(|(id, value)| match serde_json::from_value::<AppliedMigration>(value) {
                Ok(record) => Some((id, record)),
                Err(err) => {
                    warn!(%id, error = %err, "skipping unreadable applied migration record");
                    None
                }
            })
            .collect()
    }

    async fn store(&self, applied: &RawAppliedSet) -> TormResult<()> {
        self.transport
            .set_key(MIGRATIONS_KEY, serde_json::to_string(applied)?)
            .await
    }

    /// Rewrites the blob with one record added. Unreadable records are carried over untouched.
    async fn save_record(&self, record: AppliedMigration) -> TormResult<()> {
        let mut applied = self.load_raw().await;
        applied.insert(record.id.clone(), serde_json::to_value(&record)?);
        self.store(&applied).await
    }

    async fn remove_record(&self, id: &str) -> TormResult<()> {
        let mut applied = self.load_raw().await;
        if applied.remove(id).is_some() {
            self.store(&applied).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{document::into_document, testing::StubTransport};
    use serde_json::json;
    use std::sync::{Mutex, atomic::Ordering};

    /// Records its label into a shared journal; fails when `fail` is set.
    struct Journal {
        label: String,
        entries: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl MigrationAction for Journal {
        async fn run(&self, _op: &MigrateOp<'_>) -> TormResult<()> {
            if self.fail {
                return Err(TormError::Gateway {
                    operation: "create".into(),
                    status: Some(500),
                    cause: "boom".into(),
                });
            }

            self.entries.lock().unwrap().push(self.label.clone());
            Ok(())
        }
    }

    fn journal(entries: &Arc<Mutex<Vec<String>>>, label: &str) -> Journal {
        Journal { label: label.to_string(), entries: entries.clone(), fail: false }
    }

    fn tracker(stub: &Arc<StubTransport>, entries: &Arc<Mutex<Vec<String>>>) -> MigrationTracker<StubTransport> {
        let mut tracker = MigrationTracker::new(stub.clone());
        tracker
            .register("001", "create_users", journal(entries, "up 001"), journal(entries, "down 001"))
            .unwrap()
            .register("002", "create_products", journal(entries, "up 002"), journal(entries, "down 002"))
            .unwrap();
        tracker
    }

    #[tokio::test]
    async fn migrate_applies_in_order_once() {
        let stub = Arc::new(StubTransport::new());
        let entries = Arc::new(Mutex::new(Vec::new()));
        let tracker = tracker(&stub, &entries);

        assert_eq!(tracker.migrate().await.unwrap(), vec!["create_users", "create_products"]);
        assert!(tracker.migrate().await.unwrap().is_empty());
        assert_eq!(*entries.lock().unwrap(), vec!["up 001", "up 002"]);

        let status = tracker.status().await;
        assert_eq!(status.len(), 2);
        assert!(status.iter().all(|(_, s)| s.is_applied()));
        assert!(status[0].1.to_string().starts_with("Applied ("));
        assert!(tracker.pending().await.is_empty());

        let blob: serde_json::Value = serde_json::from_str(&stub.key(MIGRATIONS_KEY).unwrap()).unwrap();
        assert_eq!(blob["001"]["name"], json!("create_users"));
    }

    #[tokio::test]
    async fn rollback_reverts_most_recent_first() {
        let stub = Arc::new(StubTransport::new());
        let entries = Arc::new(Mutex::new(Vec::new()));
        let tracker = tracker(&stub, &entries);
        tracker.migrate().await.unwrap();

        assert_eq!(tracker.rollback(1).await.unwrap(), vec!["create_products"]);
        assert_eq!(tracker.pending().await, vec!["002"]);
        assert_eq!(tracker.status().await[1].1, MigrationStatus::Pending);

        assert!(tracker.rollback(0).await.unwrap().is_empty());
        assert_eq!(tracker.rollback(5).await.unwrap(), vec!["create_users"]);
        assert_eq!(*entries.lock().unwrap(), vec!["up 001", "up 002", "down 002", "down 001"]);
    }

    #[tokio::test]
    async fn migrate_then_rollback_restores_membership() {
        let stub = Arc::new(StubTransport::new());
        let entries = Arc::new(Mutex::new(Vec::new()));
        let mut tracker = tracker(&stub, &entries);
        tracker.migrate().await.unwrap();
        let before: Vec<String> = tracker.applied().await.into_iter().map(|r| r.id).collect();

        tracker
            .register("003", "add_index", journal(&entries, "up 003"), journal(&entries, "down 003"))
            .unwrap();
        assert_eq!(tracker.migrate().await.unwrap(), vec!["add_index"]);
        assert_eq!(tracker.rollback(1).await.unwrap(), vec!["add_index"]);

        let after: Vec<String> = tracker.applied().await.into_iter().map(|r| r.id).collect();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let stub = Arc::new(StubTransport::new());
        let entries = Arc::new(Mutex::new(Vec::new()));
        let mut tracker = tracker(&stub, &entries);

        let err = tracker
            .register("001", "again", journal(&entries, "x"), journal(&entries, "y"))
            .unwrap_err();
        assert!(matches!(err, TormError::DuplicateMigration(id) if id == "001"));
        assert_eq!(tracker.migrations().len(), 2);
    }

    #[tokio::test]
    async fn failed_up_keeps_earlier_steps() {
        let stub = Arc::new(StubTransport::new());
        let entries = Arc::new(Mutex::new(Vec::new()));
        let mut tracker = MigrationTracker::new(stub.clone());
        tracker
            .register("001", "create_users", journal(&entries, "up 001"), journal(&entries, "down 001"))
            .unwrap()
            .register(
                "002",
                "broken",
                Journal { label: "up 002".into(), entries: entries.clone(), fail: true },
                journal(&entries, "down 002"),
            )
            .unwrap();

        let err = tracker.migrate().await.unwrap_err();
        match err {
            TormError::MigrationAction { id, direction, source } => {
                assert_eq!(id, "002");
                assert_eq!(direction, MigrationDirection::Up);
                assert!(matches!(*source, TormError::Gateway { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(tracker.pending().await, vec!["002"]);
    }

    #[tokio::test]
    async fn unreadable_state_fails_open_and_writes_fail_closed() {
        let stub = Arc::new(StubTransport::new());
        stub.put_key(MIGRATIONS_KEY, "not json");
        let entries = Arc::new(Mutex::new(Vec::new()));
        let tracker = tracker(&stub, &entries);

        assert_eq!(tracker.pending().await, vec!["001", "002"]);

        stub.fail_key_reads.store(true, Ordering::SeqCst);
        assert!(tracker.status().await.iter().all(|(_, s)| !s.is_applied()));
        stub.fail_key_reads.store(false, Ordering::SeqCst);

        stub.fail_key_writes.store(true, Ordering::SeqCst);
        let err = tracker.migrate().await.unwrap_err();
        assert!(matches!(err, TormError::Gateway { status: Some(500), .. }));
    }

    #[tokio::test]
    async fn stale_records_consume_steps() {
        let stub = Arc::new(StubTransport::new());
        stub.put_key(
            MIGRATIONS_KEY,
            &json!({
                "001": {"id": "001", "name": "create_users", "applied_at": "2024-01-01T00:00:00Z"},
                "000": {"id": "000", "name": "removed", "applied_at": "2024-06-01T00:00:00.123456"},
            })
            .to_string(),
        );
        let entries = Arc::new(Mutex::new(Vec::new()));
        let tracker = tracker(&stub, &entries);

        assert!(tracker.rollback(1).await.unwrap().is_empty());
        assert_eq!(tracker.rollback(2).await.unwrap(), vec!["create_users"]);
        assert_eq!(tracker.applied().await.len(), 1);
    }

    #[tokio::test]
    async fn unreadable_records_are_skipped_and_kept() {
        let stub = Arc::new(StubTransport::new());
        stub.put_key(
            MIGRATIONS_KEY,
            &json!({
                "001": {"id": "001", "name": "create_users", "applied_at": "2024-01-01T00:00:00Z"},
                "legacy": {"id": "legacy", "name": "old", "applied_at": "last tuesday"},
            })
            .to_string(),
        );
        let entries = Arc::new(Mutex::new(Vec::new()));
        let tracker = tracker(&stub, &entries);

        assert_eq!(tracker.pending().await, vec!["002"]);
        assert_eq!(tracker.migrate().await.unwrap(), vec!["create_products"]);
        assert_eq!(*entries.lock().unwrap(), vec!["up 002"]);

        let blob: serde_json::Value = serde_json::from_str(&stub.key(MIGRATIONS_KEY).unwrap()).unwrap();
        assert_eq!(blob["legacy"]["applied_at"], json!("last tuesday"));
        assert_eq!(blob["001"]["name"], json!("create_users"));
        assert_eq!(blob["002"]["name"], json!("create_products"));
    }

    #[tokio::test]
    async fn closures_can_act_on_collections() {
        let stub = Arc::new(StubTransport::new());
        let mut tracker = MigrationTracker::new(stub.clone());
        tracker
            .register(
                "001",
                "seed_admin",
                action_fn(|op| {
                    Box::pin(async move {
                        op.collection("users").create(into_document(json!({"name": "admin"}))?).await?;
                        Ok(())
                    })
                }),
                action_fn(|op| {
                    Box::pin(async move {
                        op.collection("users").delete("users:1").await?;
                        Ok(())
                    })
                }),
            )
            .unwrap();

        tracker.migrate().await.unwrap();
        assert_eq!(stub.count_documents("users").await.unwrap(), 1);

        tracker.rollback(1).await.unwrap();
        assert_eq!(stub.count_documents("users").await.unwrap(), 0);
    }
}
