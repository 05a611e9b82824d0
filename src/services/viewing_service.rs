use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::{authorize, non_blank, now, NotificationDraft, Outbox, Page, Paging, ServiceContext, ServiceError};
use crate::access::{evaluate, Action, Caller, ListIntent};
use crate::database::models::profile::ProfileSummary;
use crate::database::models::property::PropertySummary;
use crate::database::models::property_request::RequestSummary;
use crate::database::models::{Profile, Property, PropertyRequest, ScheduledViewing};
use crate::database::{Collection, Repository, Store, WriteOp};
use crate::filter::FilterData;
use crate::push::PushDispatcher;
use crate::workflow::viewing;
use crate::workflow::ViewingStatus;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewViewing {
    pub property_id: Option<Uuid>,
    pub request_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ViewingListQuery {
    pub view_all: bool,
    pub mine: bool,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProposeInput {
    #[serde(default)]
    pub proposed_dates: Vec<String>,
    #[serde(default)]
    pub proposed_times: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectInput {
    pub selected_date: Option<String>,
    pub selected_time: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelInput {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompleteInput {
    pub feedback: Option<String>,
}

/// A viewing with its property, customer, handler and linked request.
#[derive(Debug, Clone, Serialize)]
pub struct ViewingView {
    #[serde(flatten)]
    pub viewing: ScheduledViewing,
    pub property: Option<PropertySummary>,
    pub customer: Option<ProfileSummary>,
    pub handler: Option<ProfileSummary>,
    pub request: Option<RequestSummary>,
}

#[derive(Clone)]
pub struct ViewingService {
    viewings: Repository<ScheduledViewing>,
    properties: Repository<Property>,
    profiles: Repository<Profile>,
    requests: Repository<PropertyRequest>,
    store: Arc<dyn Store>,
    push: PushDispatcher,
}

impl ViewingService {
    pub fn new(store: Arc<dyn Store>, push: PushDispatcher) -> Self {
        Self {
            viewings: Repository::new(Collection::ScheduledViewings, store.clone()),
            properties: Repository::new(Collection::Properties, store.clone()),
            profiles: Repository::new(Collection::Profiles, store.clone()),
            requests: Repository::new(Collection::PropertyRequests, store.clone()),
            store,
            push,
        }
    }

    /// `mine` narrows staff to the viewings they handle.
    pub async fn list(&self, caller: &Caller, query: ViewingListQuery, paging: Paging) -> Result<Page<ViewingView>, ServiceError> {
        let intent = ListIntent { view_all: query.view_all, only_mine: query.mine };
        let scope = authorize(evaluate(caller, Action::List(intent), None))?;

        let mut filter = FilterData::new();
        if let Some(clause) = scope.to_where(Some("handled_by")) {
            filter = filter.and_where(clause);
        }
        if let Some(status) = non_blank(query.status.as_deref()) {
            let status: ViewingStatus = status.parse()?;
            filter = filter.and_where(json!({ "status": status.as_str() }));
        }

        let (viewings, total) = self
            .viewings
            .select_page(filter.clone(), paging.apply(filter.order_by("created_at desc")))
            .await
            .context("Failed to list viewings")?;
        let items = self.expand(caller, viewings).await?;
        Ok(Page::new(items, total, paging))
    }

    pub async fn get(&self, caller: &Caller, id: Uuid) -> Result<ViewingView, ServiceError> {
        let viewing = self.load(id).await?;
        authorize(evaluate(caller, Action::Read, Some(viewing.user_id)))?;
        self.view(caller, viewing).await
    }

    pub async fn create(&self, caller: &Caller, input: NewViewing) -> Result<ViewingView, ServiceError> {
        let property_id = input.property_id.ok_or_else(|| ServiceError::field("property_id", "property_id is required"))?;
        let property = self.properties.find(property_id).await.context("Failed to load property")?;
        if !property.available {
            return Err(ServiceError::field("property_id", "Property is not available for viewings"));
        }

        let request = match input.request_id {
            Some(request_id) => {
                let request = self.requests.find(request_id).await.context("Failed to load property request")?;
                authorize(evaluate(caller, Action::Read, Some(request.user_id)))?;
                Some(request)
            }
            None => None,
        };

        let timestamp = now();
        let viewing = ScheduledViewing {
            id: Uuid::new_v4(),
            user_id: caller.id,
            property_id,
            request_id: request.as_ref().map(|r| r.id),
            status: ViewingStatus::Requested,
            proposed_dates: vec![],
            proposed_times: vec![],
            selected_date: None,
            selected_time: None,
            viewing_date: None,
            viewing_time: None,
            notes: non_blank(input.notes.as_deref()),
            private_notes: None,
            handled_by: None,
            created_at: timestamp,
            updated_at: timestamp,
        };

        let mut outbox = Outbox::new();
        outbox.write(WriteOp::insert(Collection::ScheduledViewings, &viewing)?);
        if let Some(assignee) = request.as_ref().and_then(|r| r.assigned_to).filter(|a| *a != caller.id) {
            outbox.notify(
                NotificationDraft::new(assignee, "viewing", "Viewing requested", format!("A viewing was requested for '{}'", property.title))
                    .about("scheduled_viewing", viewing.id)
                    .link(viewing_link(viewing.id)),
            )?;
        }
        outbox.commit(self.store.as_ref(), &self.push).await.context("Failed to create viewing")?;

        tracing::info!(viewing_id = %viewing.id, property_id = %property_id, "Viewing requested");
        self.view(caller, viewing).await
    }

    /// Staff offers dates and times. The proposer becomes the handler.
    pub async fn propose(&self, caller: &Caller, id: Uuid, input: ProposeInput) -> Result<ViewingView, ServiceError> {
        let current = self.load(id).await?;
        authorize(evaluate(caller, Action::StaffWorkflow, Some(current.user_id)))?;

        let (next, proposal) = viewing::propose(&current, &input.proposed_dates, &input.proposed_times)?;
        let mut changes = json!({
            "status": next.as_str(),
            "proposed_dates": proposal.dates,
            "proposed_times": proposal.times,
            "handled_by": caller.id.to_string(),
            "updated_at": now(),
        });
        if let Some(notes) = non_blank(input.notes.as_deref()) {
            changes["notes"] = json!(notes);
        }

        let draft = NotificationDraft::new(
            current.user_id,
            "viewing",
            "Viewing options available",
            "New dates are available for your viewing. Pick the slot that suits you.",
        );
        self.transition(caller, &current, changes, Some(draft)).await
    }

    /// Customer picks one of the proposed slots.
    pub async fn select(&self, caller: &Caller, id: Uuid, input: SelectInput) -> Result<ViewingView, ServiceError> {
        let current = self.load(id).await?;
        authorize(evaluate(caller, Action::SelectSlot, Some(current.user_id)))?;

        let mut missing = HashMap::new();
        let date = non_blank(input.selected_date.as_deref());
        let time = non_blank(input.selected_time.as_deref());
        if date.is_none() {
            missing.insert("selected_date".to_string(), "selected_date is required".to_string());
        }
        if time.is_none() {
            missing.insert("selected_time".to_string(), "selected_time is required".to_string());
        }
        let (Some(date), Some(time)) = (date, time) else {
            return Err(ServiceError::fields("A date and a time must be selected", missing));
        };

        let (next, date, time) = viewing::select(&current, &date, &time)?;
        let changes = json!({
            "status": next.as_str(),
            "selected_date": date,
            "selected_time": time,
            "updated_at": now(),
        });
        let draft = current.handled_by.map(|handler| {
            NotificationDraft::new(
                handler,
                "viewing",
                "Viewing slot selected",
                format!("The customer selected {} at {}", date, time),
            )
        });
        self.transition(caller, &current, changes, draft).await
    }

    pub async fn confirm(&self, caller: &Caller, id: Uuid) -> Result<ViewingView, ServiceError> {
        let current = self.load(id).await?;
        authorize(evaluate(caller, Action::StaffWorkflow, Some(current.user_id)))?;

        let (next, date, time) = viewing::confirm(&current)?;
        let changes = json!({
            "status": next.as_str(),
            "viewing_date": date,
            "viewing_time": time,
            "updated_at": now(),
        });
        let draft = NotificationDraft::new(
            current.user_id,
            "viewing",
            "Viewing confirmed",
            format!("Your viewing is confirmed for {} at {}", date, time),
        );
        self.transition(caller, &current, changes, Some(draft)).await
    }

    /// Owner or staff. The reason is kept in `notes`; the other party is notified.
    pub async fn cancel(&self, caller: &Caller, id: Uuid, input: CancelInput) -> Result<ViewingView, ServiceError> {
        let current = self.load(id).await?;
        authorize(evaluate(caller, Action::CancelViewing, Some(current.user_id)))?;

        let next = viewing::cancel(&current, caller.role.is_staff())?;
        let reason = non_blank(input.reason.as_deref());
        let mut changes = json!({ "status": next.as_str(), "updated_at": now() });
        if let Some(reason) = &reason {
            changes["notes"] = json!(reason);
        }

        let recipient = if caller.id == current.user_id { current.handled_by } else { Some(current.user_id) };
        let draft = recipient.map(|user| {
            let message = match &reason {
                Some(reason) => format!("A viewing was cancelled: {}", reason),
                None => "A viewing was cancelled".to_string(),
            };
            NotificationDraft::new(user, "viewing", "Viewing cancelled", message)
        });
        self.transition(caller, &current, changes, draft).await
    }

    /// Only a confirmed viewing can be completed. Feedback goes to `private_notes`.
    pub async fn complete(&self, caller: &Caller, id: Uuid, input: CompleteInput) -> Result<ViewingView, ServiceError> {
        let current = self.load(id).await?;
        authorize(evaluate(caller, Action::StaffWorkflow, Some(current.user_id)))?;

        let next = viewing::complete(&current)?;
        let mut changes = json!({ "status": next.as_str(), "updated_at": now() });
        if let Some(feedback) = non_blank(input.feedback.as_deref()) {
            changes["private_notes"] = json!(feedback);
        }
        let draft = NotificationDraft::new(current.user_id, "viewing", "Viewing completed", "Thanks for visiting. We hope you liked it.");
        self.transition(caller, &current, changes, Some(draft)).await
    }

    /// Guarded write of one status step plus its notification, then the fresh view.
    async fn transition(
        &self,
        caller: &Caller,
        current: &ScheduledViewing,
        changes: serde_json::Value,
        draft: Option<NotificationDraft>,
    ) -> Result<ViewingView, ServiceError> {
        let op = WriteOp::update(Collection::ScheduledViewings, current.id, changes)?
            .guarded(json!({ "status": current.status.as_str() }))?;

        let mut outbox = Outbox::new();
        outbox.write(op);
        if let Some(draft) = draft.filter(|d| d.user_id != caller.id) {
            outbox.notify(draft.about("scheduled_viewing", current.id).link(viewing_link(current.id)))?;
        }
        let mut rows = outbox
            .commit(self.store.as_ref(), &self.push)
            .await
            .context("Failed to update viewing")?;

        tracing::info!(viewing_id = %current.id, from = %current.status, by = %caller.id, "Viewing status changed");
        let row = if rows.is_empty() { None } else { Some(rows.swap_remove(0)) };
        let updated = match row {
            Some(row) => self.viewings.decode(row)?,
            None => self.load(current.id).await?,
        };
        self.view(caller, updated).await
    }

    async fn load(&self, id: Uuid) -> Result<ScheduledViewing, ServiceError> {
        self.viewings.find(id).await.context("Failed to load viewing")
    }

    async fn view(&self, caller: &Caller, viewing: ScheduledViewing) -> Result<ViewingView, ServiceError> {
        self.expand(caller, vec![viewing])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::not_found("Scheduled viewing"))
    }

    async fn expand(&self, caller: &Caller, viewings: Vec<ScheduledViewing>) -> Result<Vec<ViewingView>, ServiceError> {
        let mut people: Vec<Uuid> = viewings.iter().flat_map(|v| [Some(v.user_id), v.handled_by]).flatten().collect();
        people.sort();
        people.dedup();
        let people: HashMap<Uuid, ProfileSummary> = self
            .profiles
            .select_ids(people)
            .await
            .context("Failed to load viewing participants")?
            .iter()
            .map(|p| (p.id, ProfileSummary::from(p)))
            .collect();
        let properties: HashMap<Uuid, PropertySummary> = self
            .properties
            .select_ids(viewings.iter().map(|v| v.property_id).collect())
            .await
            .context("Failed to load viewing properties")?
            .iter()
            .map(|p| (p.id, PropertySummary::from(p)))
            .collect();
        let requests: HashMap<Uuid, RequestSummary> = self
            .requests
            .select_ids(viewings.iter().filter_map(|v| v.request_id).collect())
            .await
            .context("Failed to load linked requests")?
            .iter()
            .map(|r| (r.id, RequestSummary::from(r)))
            .collect();

        let staff = caller.role.is_staff();
        Ok(viewings
            .into_iter()
            .map(|mut viewing| {
                if !staff {
                    viewing.private_notes = None;
                }
                ViewingView {
                    property: properties.get(&viewing.property_id).cloned(),
                    customer: people.get(&viewing.user_id).cloned(),
                    handler: viewing.handled_by.and_then(|h| people.get(&h).cloned()),
                    request: viewing.request_id.and_then(|r| requests.get(&r).cloned()),
                    viewing,
                }
            })
            .collect())
    }
}

fn viewing_link(id: Uuid) -> String {
    format!("/scheduled-viewings/{}", id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;
    use crate::testing::TestContext;
    use chrono::NaiveDate;

    struct Cast {
        ctx: TestContext,
        customer: Caller,
        other: Caller,
        rep: Caller,
        property_id: Uuid,
    }

    async fn cast() -> Cast {
        let ctx = TestContext::new();
        let customer = Caller::new(ctx.seed_profile("Cora", Role::Customer).await.id, Role::Customer);
        let other = Caller::new(ctx.seed_profile("Olly", Role::Customer).await.id, Role::Customer);
        let rep = Caller::new(ctx.seed_profile("Rex", Role::SalesOps).await.id, Role::SalesOps);
        let property_id = ctx.seed_property(rep.id).await.id;
        Cast { ctx, customer, other, rep, property_id }
    }

    fn proposal() -> ProposeInput {
        ProposeInput {
            proposed_dates: vec!["2025-01-01".into(), "2025-01-02".into()],
            proposed_times: vec!["10:00".into()],
            notes: None,
        }
    }

    fn slot(date: &str, time: &str) -> SelectInput {
        SelectInput { selected_date: Some(date.into()), selected_time: Some(time.into()) }
    }

    async fn requested(c: &Cast) -> Uuid {
        let input = NewViewing { property_id: Some(c.property_id), ..Default::default() };
        c.ctx.services.viewings.create(&c.customer, input).await.unwrap().viewing.id
    }

    #[tokio::test]
    async fn full_booking_flow() {
        let c = cast().await;
        let svc = &c.ctx.services.viewings;
        let id = requested(&c).await;
        assert_eq!(svc.get(&c.customer, id).await.unwrap().viewing.status, ViewingStatus::Requested);

        let v = svc.propose(&c.rep, id, proposal()).await.unwrap();
        assert_eq!(v.viewing.status, ViewingStatus::OptionsSent);
        assert_eq!(v.handler.map(|h| h.id), Some(c.rep.id));

        let v = svc.select(&c.customer, id, slot("2025-01-01", "10:00")).await.unwrap();
        assert_eq!(v.viewing.status, ViewingStatus::SlotSelected);

        let v = svc.confirm(&c.rep, id).await.unwrap();
        assert_eq!(v.viewing.status, ViewingStatus::Confirmed);
        assert_eq!(v.viewing.viewing_date, NaiveDate::from_ymd_opt(2025, 1, 1));
        assert_eq!(v.viewing.viewing_time.as_deref(), Some("10:00"));

        let v = svc.complete(&c.rep, id, CompleteInput { feedback: Some("Liked the kitchen".into()) }).await.unwrap();
        assert_eq!(v.viewing.status, ViewingStatus::Completed);
        assert_eq!(v.viewing.private_notes.as_deref(), Some("Liked the kitchen"));
        assert_eq!(svc.get(&c.customer, id).await.unwrap().viewing.private_notes, None);

        // propose, confirm and complete notify the customer; select notifies the handler
        assert_eq!(c.ctx.services.notifications.unread_count(&c.customer).await.unwrap(), 3);
        assert_eq!(c.ctx.services.notifications.unread_count(&c.rep).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn selecting_an_unproposed_slot_changes_nothing() {
        let c = cast().await;
        let svc = &c.ctx.services.viewings;
        let id = requested(&c).await;
        svc.propose(&c.rep, id, proposal()).await.unwrap();

        for input in [slot("2099-12-31", "10:00"), slot("2025-01-01", "18:00"), SelectInput::default()] {
            assert!(matches!(svc.select(&c.customer, id, input).await, Err(ServiceError::Validation { .. })));
        }
        assert!(matches!(svc.select(&c.other, id, slot("2025-01-01", "10:00")).await, Err(ServiceError::Forbidden(_))));
        assert_eq!(svc.get(&c.rep, id).await.unwrap().viewing.status, ViewingStatus::OptionsSent);
    }

    #[tokio::test]
    async fn out_of_order_steps_do_not_mutate() {
        let c = cast().await;
        let svc = &c.ctx.services.viewings;
        let id = requested(&c).await;

        assert!(matches!(svc.confirm(&c.rep, id).await, Err(ServiceError::InvalidTransition(_))));
        assert!(matches!(svc.select(&c.customer, id, slot("2025-01-01", "10:00")).await, Err(ServiceError::InvalidTransition(_))));
        assert!(matches!(svc.complete(&c.rep, id, CompleteInput::default()).await, Err(ServiceError::InvalidTransition(_))));
        assert!(matches!(svc.propose(&c.customer, id, proposal()).await, Err(ServiceError::Forbidden(_))));

        svc.propose(&c.rep, id, proposal()).await.unwrap();
        assert!(matches!(svc.propose(&c.rep, id, proposal()).await, Err(ServiceError::InvalidTransition(_))));
        let v = svc.get(&c.rep, id).await.unwrap().viewing;
        assert_eq!(v.status, ViewingStatus::OptionsSent);
        assert_eq!(v.proposed_dates.len(), 2);
    }

    #[tokio::test]
    async fn cancel_records_reason_and_is_final() {
        let c = cast().await;
        let svc = &c.ctx.services.viewings;
        let id = requested(&c).await;

        assert!(matches!(svc.cancel(&c.other, id, CancelInput::default()).await, Err(ServiceError::Forbidden(_))));
        let v = svc.cancel(&c.customer, id, CancelInput { reason: Some("Found another place".into()) }).await.unwrap();
        assert_eq!(v.viewing.status, ViewingStatus::Cancelled);
        assert_eq!(v.viewing.notes.as_deref(), Some("Found another place"));
        assert!(matches!(svc.cancel(&c.rep, id, CancelInput::default()).await, Err(ServiceError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn customers_cannot_cancel_mid_scheduling() {
        let c = cast().await;
        let svc = &c.ctx.services.viewings;
        let id = requested(&c).await;
        svc.propose(&c.rep, id, proposal()).await.unwrap();
        svc.select(&c.customer, id, slot("2025-01-01", "10:00")).await.unwrap();

        assert!(matches!(svc.cancel(&c.customer, id, CancelInput::default()).await, Err(ServiceError::InvalidTransition(_))));
        assert_eq!(svc.get(&c.customer, id).await.unwrap().viewing.status, ViewingStatus::SlotSelected);

        let v = svc.cancel(&c.rep, id, CancelInput { reason: Some("Owner withdrew".into()) }).await.unwrap();
        assert_eq!(v.viewing.status, ViewingStatus::Cancelled);
    }

    #[tokio::test]
    async fn customers_only_list_their_own_viewings() {
        let c = cast().await;
        let svc = &c.ctx.services.viewings;
        let mine = requested(&c).await;
        let theirs = svc
            .create(&c.other, NewViewing { property_id: Some(c.property_id), ..Default::default() })
            .await
            .unwrap()
            .viewing
            .id;
        svc.propose(&c.rep, theirs, proposal()).await.unwrap();

        let all = ViewingListQuery { view_all: true, ..Default::default() };
        let page = svc.list(&c.customer, all.clone(), Paging::default()).await.unwrap();
        assert_eq!(page.items.iter().map(|v| v.viewing.id).collect::<Vec<_>>(), vec![mine]);
        assert!(matches!(svc.get(&c.customer, theirs).await, Err(ServiceError::Forbidden(_))));

        assert_eq!(svc.list(&c.rep, all, Paging::default()).await.unwrap().total, 2);
        let handled = ViewingListQuery { mine: true, ..Default::default() };
        let page = svc.list(&c.rep, handled, Paging::default()).await.unwrap();
        assert_eq!(page.items.iter().map(|v| v.viewing.id).collect::<Vec<_>>(), vec![theirs]);

        let missing = NewViewing::default();
        assert!(matches!(svc.create(&c.customer, missing).await, Err(ServiceError::Validation { .. })));
    }
}
