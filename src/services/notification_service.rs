use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use super::{now, Page, Paging, ServiceContext, ServiceError};
use crate::access::Caller;
use crate::database::models::{Notification, NotificationStatus};
use crate::database::{Collection, DatabaseError, Record, Repository, Store, WriteOp};
use crate::filter::FilterData;
use crate::push::{PushDispatcher, PushMessage};

/// A notification about to be written for one recipient.
#[derive(Debug, Clone)]
pub struct NotificationDraft {
    pub user_id: Uuid,
    pub kind: &'static str,
    pub title: String,
    pub message: String,
    pub related_entity: Option<(&'static str, Uuid)>,
    pub link: Option<String>,
}

impl NotificationDraft {
    pub fn new(user_id: Uuid, kind: &'static str, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
            related_entity: None,
            link: None,
        }
    }

    pub fn about(mut self, entity_type: &'static str, entity_id: Uuid) -> Self {
        self.related_entity = Some((entity_type, entity_id));
        self
    }

    pub fn link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    fn into_notification(self) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            title: self.title,
            message: self.message,
            kind: self.kind.to_string(),
            related_entity_id: self.related_entity.map(|(_, id)| id),
            related_entity_type: self.related_entity.map(|(t, _)| t.to_string()),
            link: self.link,
            is_read: false,
            status: NotificationStatus::Pending,
            created_at: now(),
        }
    }
}

/// Collects the writes of one workflow step together with the notifications
/// they trigger. `commit` stores everything in one atomic batch and only then
/// hands the notifications to the push worker.
#[derive(Default)]
pub struct Outbox {
    ops: Vec<WriteOp>,
    pushes: Vec<PushMessage>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn notify(&mut self, draft: NotificationDraft) -> Result<&mut Self, DatabaseError> {
        let notification = draft.into_notification();
        self.ops.push(WriteOp::insert(Collection::Notifications, &notification)?);
        self.pushes.push(PushMessage::from(&notification));
        Ok(self)
    }

    pub async fn commit(self, store: &dyn Store, push: &PushDispatcher) -> Result<Vec<Record>, DatabaseError> {
        if self.ops.is_empty() {
            return Ok(vec![]);
        }
        let rows = store.write(self.ops).await?;
        for message in self.pushes {
            push.enqueue(message);
        }
        Ok(rows)
    }
}

#[derive(Clone)]
pub struct NotificationService {
    notifications: Repository<Notification>,
    store: Arc<dyn Store>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            notifications: Repository::new(Collection::Notifications, store.clone()),
            store,
        }
    }

    /// Newest first.
    pub async fn list(&self, caller: &Caller, unread_only: bool, paging: Paging) -> Result<Page<Notification>, ServiceError> {
        let mut filter = FilterData::matching(json!({ "user_id": caller.id.to_string() }));
        if unread_only {
            filter = filter.and_where(json!({ "is_read": false }));
        }

        let (items, total) = self
            .notifications
            .select_page(filter.clone(), paging.apply(filter.order_by("created_at desc")))
            .await
            .context("Failed to list notifications")?;
        Ok(Page::new(items, total, paging))
    }

    pub async fn unread_count(&self, caller: &Caller) -> Result<i64, ServiceError> {
        self.notifications
            .count(FilterData::matching(json!({ "user_id": caller.id.to_string(), "is_read": false })))
            .await
            .context("Failed to count unread notifications")
    }

    /// Someone else's notification reads as not found.
    pub async fn mark_read(&self, caller: &Caller, id: Uuid) -> Result<Notification, ServiceError> {
        let notification = self
            .notifications
            .select_404(FilterData::matching(json!({ "id": id.to_string(), "user_id": caller.id.to_string() })))
            .await
            .context("Failed to load notification")?;
        if notification.is_read {
            return Ok(notification);
        }

        let op = WriteOp::update(Collection::Notifications, id, json!({ "is_read": true }))?;
        let mut rows = self.store.write(vec![op]).await.context("Failed to mark notification read")?;
        match rows.pop() {
            Some(row) => Ok(self.notifications.decode(row)?),
            None => Err(ServiceError::not_found("Notification")),
        }
    }

    /// Returns how many notifications changed.
    pub async fn mark_all_read(&self, caller: &Caller) -> Result<u64, ServiceError> {
        let unread = self
            .notifications
            .select_any(FilterData::matching(json!({ "user_id": caller.id.to_string(), "is_read": false })))
            .await
            .context("Failed to load unread notifications")?;

        let ops = unread
            .iter()
            .map(|n| WriteOp::update(Collection::Notifications, n.id, json!({ "is_read": true })))
            .collect::<Result<Vec<_>, _>>()?;
        let changed = ops.len() as u64;
        if !ops.is_empty() {
            self.store.write(ops).await.context("Failed to mark notifications read")?;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;
    use crate::testing::TestContext;

    #[tokio::test]
    async fn outbox_commits_atomically_then_pushes() {
        let ctx = TestContext::new();
        let customer = ctx.seed_profile("Cora", Role::Customer).await;

        let mut outbox = Outbox::new();
        outbox.notify(NotificationDraft::new(customer.id, "request", "Hello", "World")).unwrap();
        outbox.commit(ctx.store.as_ref(), &ctx.push).await.unwrap();

        let caller = Caller::new(customer.id, Role::Customer);
        assert_eq!(ctx.services.notifications.unread_count(&caller).await.unwrap(), 1);
        ctx.wait_for_pushes(1).await;
        assert_eq!(ctx.gateway.delivered()[0].title, "Hello");
    }

    #[tokio::test]
    async fn mark_read_is_scoped_to_the_recipient() {
        let ctx = TestContext::new();
        let alice = ctx.seed_profile("Alice", Role::Customer).await;
        let bob = ctx.seed_profile("Bob", Role::Customer).await;

        let mut outbox = Outbox::new();
        outbox.notify(NotificationDraft::new(alice.id, "request", "A1", "m")).unwrap();
        outbox.notify(NotificationDraft::new(alice.id, "request", "A2", "m")).unwrap();
        outbox.commit(ctx.store.as_ref(), &ctx.push).await.unwrap();

        let alice = Caller::new(alice.id, Role::Customer);
        let bob = Caller::new(bob.id, Role::Customer);
        let page = ctx.services.notifications.list(&alice, true, Paging::default()).await.unwrap();
        assert_eq!(page.total, 2);

        let first = page.items[0].id;
        assert!(matches!(ctx.services.notifications.mark_read(&bob, first).await, Err(ServiceError::NotFound(_))));
        assert!(ctx.services.notifications.mark_read(&alice, first).await.unwrap().is_read);
        assert_eq!(ctx.services.notifications.mark_all_read(&alice).await.unwrap(), 1);
        assert_eq!(ctx.services.notifications.unread_count(&alice).await.unwrap(), 0);
    }
}
