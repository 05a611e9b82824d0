use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::access::Role;
use crate::database::models::{Profile, Property};
use crate::database::store::Record;
use crate::database::{Collection, DatabaseError, MemoryStore, Store, WriteOp};
use crate::filter::FilterData;
use crate::push::{PushDispatcher, PushError, PushGateway, PushMessage, PushSettings};
use crate::services::{now, Services};

/// Push gateway that records deliveries. The first `fail_first` attempts fail
/// with a retryable error.
#[derive(Default)]
pub struct RecordingPushGateway {
    fail_first: usize,
    attempts: AtomicUsize,
    delivered: Mutex<Vec<PushMessage>>,
}

impl RecordingPushGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(fail_first: usize) -> Self {
        Self { fail_first, ..Self::default() }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<PushMessage> {
        self.delivered.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PushGateway for RecordingPushGateway {
    async fn deliver(&self, message: &PushMessage) -> Result<(), PushError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first {
            return Err(PushError::Rejected(503));
        }
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push(message.clone());
        }
        Ok(())
    }
}

enum Script {
    Interleave(Collection, Vec<WriteOp>),
    Fail(Collection),
}

/// In-memory store that can stage another writer's batch just ahead of the
/// next write to a collection, or fail every write to a collection.
#[derive(Default)]
pub struct ScriptedStore {
    inner: MemoryStore,
    scripts: Mutex<Vec<Script>>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit `ops` right before the next write touching `collection`.
    pub fn before_next_write(&self, collection: Collection, ops: Vec<WriteOp>) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.push(Script::Interleave(collection, ops));
        }
    }

    /// Every later write or delete touching `collection` fails.
    pub fn fail_writes_to(&self, collection: Collection) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.push(Script::Fail(collection));
        }
    }

    fn take_interleaved(&self, touched: &[Collection]) -> Option<Vec<WriteOp>> {
        let mut scripts = self.scripts.lock().ok()?;
        let index = scripts
            .iter()
            .position(|s| matches!(s, Script::Interleave(c, _) if touched.contains(c)))?;
        match scripts.remove(index) {
            Script::Interleave(_, ops) => Some(ops),
            Script::Fail(_) => None,
        }
    }

    fn check_failure(&self, touched: &[Collection]) -> Result<(), DatabaseError> {
        let failing = self
            .scripts
            .lock()
            .map(|scripts| scripts.iter().any(|s| matches!(s, Script::Fail(c) if touched.contains(c))))
            .unwrap_or(false);
        if failing {
            return Err(DatabaseError::QueryError("connection reset".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for ScriptedStore {
    async fn select(&self, collection: Collection, filter: FilterData) -> Result<Vec<Record>, DatabaseError> {
        self.inner.select(collection, filter).await
    }

    async fn count(&self, collection: Collection, filter: FilterData) -> Result<i64, DatabaseError> {
        self.inner.count(collection, filter).await
    }

    async fn write(&self, ops: Vec<WriteOp>) -> Result<Vec<Record>, DatabaseError> {
        let touched: Vec<Collection> = ops.iter().map(WriteOp::collection).collect();
        if let Some(other) = self.take_interleaved(&touched) {
            self.inner.write(other).await?;
        }
        self.check_failure(&touched)?;
        self.inner.write(ops).await
    }

    async fn delete(&self, collection: Collection, filter: FilterData) -> Result<u64, DatabaseError> {
        self.check_failure(&[collection])?;
        self.inner.delete(collection, filter).await
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        self.inner.health_check().await
    }
}

/// Services over a fresh in-memory store with a recording push gateway.
/// Must be created inside a tokio runtime.
pub struct TestContext {
    pub store: Arc<dyn Store>,
    pub gateway: Arc<RecordingPushGateway>,
    pub push: PushDispatcher,
    pub services: Services,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<dyn Store>) -> Self {
        let gateway = Arc::new(RecordingPushGateway::new());
        let settings = PushSettings {
            timeout: Duration::from_millis(500),
            max_retries: 2,
            backoff: Duration::from_millis(1),
            queue_capacity: 64,
        };
        let push = PushDispatcher::spawn(gateway.clone(), store.clone(), settings);
        let services = Services::new(store.clone(), push.clone());
        Self { store, gateway, push, services }
    }

    pub async fn seed_profile(&self, name: &str, role: Role) -> Profile {
        let timestamp = now();
        let profile = Profile {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: format!("{}-{}@example.com", name.to_lowercase(), Uuid::new_v4().simple()),
            phone: None,
            role,
            is_active: true,
            created_at: timestamp,
            updated_at: timestamp,
        };
        let op = WriteOp::insert(Collection::Profiles, &profile).unwrap();
        self.store.write(vec![op]).await.unwrap();
        profile
    }

    pub async fn seed_property(&self, created_by: Uuid) -> Property {
        let timestamp = now();
        let property = Property {
            id: Uuid::new_v4(),
            title: "Two-bedroom flat".into(),
            description: None,
            property_type: "Apartment".into(),
            location: "Cairo".into(),
            price: 150_000.0,
            bedrooms: Some(2),
            bathrooms: Some(1),
            area_size: Some(95.0),
            available: true,
            featured_image: None,
            created_by,
            views_count: 0,
            created_at: timestamp,
            updated_at: timestamp,
        };
        let op = WriteOp::insert(Collection::Properties, &property).unwrap();
        self.store.write(vec![op]).await.unwrap();
        property
    }

    /// Poll until the gateway has seen `count` deliveries (or give up after a second).
    pub async fn wait_for_pushes(&self, count: usize) {
        for _ in 0..100 {
            if self.gateway.delivered().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} push deliveries, saw {}", count, self.gateway.delivered().len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{Notification, NotificationStatus};
    use crate::database::Repository;
    use crate::services::{NotificationDraft, Outbox};

    #[tokio::test]
    async fn push_worker_records_delivery_status() {
        let ctx = TestContext::new();
        let user = ctx.seed_profile("Cora", Role::Customer).await;

        let mut outbox = Outbox::new();
        outbox.notify(NotificationDraft::new(user.id, "request", "Hi", "There")).unwrap();
        outbox.commit(ctx.store.as_ref(), &ctx.push).await.unwrap();
        ctx.wait_for_pushes(1).await;

        let notifications: Repository<Notification> = Repository::new(Collection::Notifications, ctx.store.clone());
        for _ in 0..100 {
            let stored = notifications.select_any(Default::default()).await.unwrap();
            if stored[0].status == NotificationStatus::Sent {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("notification never marked sent");
    }
}
