//! Property requests: customer-owned search briefs worked by sales_ops.
//!
//! Every status change writes the request, its history row and any
//! notifications in one batch. Status-changing writes are guarded on the
//! status they were validated against, so a concurrent change fails with a
//! conflict instead of being silently overwritten.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::{authorize, non_blank, now, NotificationDraft, Outbox, Page, Paging, ServiceContext, ServiceError};
use crate::access::{evaluate, Action, Caller, ListIntent, Role};
use crate::database::models::profile::ProfileSummary;
use crate::database::models::{Profile, PropertyRequest, RequestStatusHistory};
use crate::database::store::to_record;
use crate::database::{Collection, Repository, Store, WriteOp};
use crate::filter::FilterData;
use crate::push::PushDispatcher;
use crate::workflow::RequestStatus;

/// Fields a customer may change on their own request.
const CUSTOMER_FIELDS: &[&str] = &[
    "title",
    "property_type",
    "location",
    "min_price",
    "max_price",
    "bedrooms",
    "bathrooms",
    "area_size",
    "additional_features",
    "custom_fields",
];

/// Staff may additionally change these through a plain update.
const STAFF_FIELDS: &[&str] = &["description", "status"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub property_type: Option<String>,
    pub location: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub area_size: Option<f64>,
    pub additional_features: Option<Vec<String>>,
    pub custom_fields: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct RequestListQuery {
    pub view_all: bool,
    pub mine: bool,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssignInput {
    pub assigned_to: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusUpdate {
    pub status: Option<String>,
    pub notes: Option<String>,
    pub is_private: Option<bool>,
}

/// A request with the people around it. `history` is only present on detail reads.
#[derive(Debug, Clone, Serialize)]
pub struct RequestView {
    #[serde(flatten)]
    pub request: PropertyRequest,
    pub customer: Option<ProfileSummary>,
    pub assignee: Option<ProfileSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<RequestStatusHistory>>,
}

#[derive(Clone)]
pub struct RequestService {
    requests: Repository<PropertyRequest>,
    history: Repository<RequestStatusHistory>,
    profiles: Repository<Profile>,
    store: Arc<dyn Store>,
    push: PushDispatcher,
}

impl RequestService {
    pub fn new(store: Arc<dyn Store>, push: PushDispatcher) -> Self {
        Self {
            requests: Repository::new(Collection::PropertyRequests, store.clone()),
            history: Repository::new(Collection::RequestStatusHistory, store.clone()),
            profiles: Repository::new(Collection::Profiles, store.clone()),
            store,
            push,
        }
    }

    pub async fn list(&self, caller: &Caller, query: RequestListQuery, paging: Paging) -> Result<Page<RequestView>, ServiceError> {
        let intent = ListIntent { view_all: query.view_all, only_mine: query.mine };
        let scope = authorize(evaluate(caller, Action::List(intent), None))?;

        let mut filter = FilterData::new();
        if let Some(clause) = scope.to_where(Some("assigned_to")) {
            filter = filter.and_where(clause);
        }
        if let Some(status) = non_blank(query.status.as_deref()) {
            let status: RequestStatus = status.parse()?;
            filter = filter.and_where(json!({ "status": status.as_str() }));
        }

        let (requests, total) = self
            .requests
            .select_page(filter.clone(), paging.apply(filter.order_by("created_at desc")))
            .await
            .context("Failed to list property requests")?;
        let items = self.expand(requests).await?;
        Ok(Page::new(items, total, paging))
    }

    pub async fn get(&self, caller: &Caller, id: Uuid) -> Result<RequestView, ServiceError> {
        let request = self.load(id).await?;
        authorize(evaluate(caller, Action::Read, Some(request.user_id)))?;
        let history = self.visible_history(caller, id).await?;
        let mut view = self.expand(vec![request]).await?.pop().ok_or_else(|| ServiceError::not_found("Property request"))?;
        view.history = Some(history);
        Ok(view)
    }

    pub async fn create(&self, caller: &Caller, input: NewRequest) -> Result<RequestView, ServiceError> {
        let custom_fields = match input.custom_fields {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(Value::Object(map)) => Value::Object(map),
            Some(_) => return Err(ServiceError::field("custom_fields", "custom_fields must be an object")),
        };
        let timestamp = now();
        let request = PropertyRequest {
            id: Uuid::new_v4(),
            user_id: caller.id,
            title: input.title.unwrap_or_default().trim().to_string(),
            description: non_blank(input.description.as_deref()),
            property_type: input.property_type.unwrap_or_default().trim().to_string(),
            location: input.location.unwrap_or_default().trim().to_string(),
            min_price: input.min_price,
            max_price: input.max_price,
            bedrooms: input.bedrooms,
            bathrooms: input.bathrooms,
            area_size: input.area_size,
            additional_features: input.additional_features.unwrap_or_default(),
            custom_fields,
            status: RequestStatus::New,
            assigned_to: None,
            created_at: timestamp,
            updated_at: timestamp,
        };
        validate(&request)?;

        let mut outbox = Outbox::new();
        outbox
            .write(WriteOp::insert(Collection::PropertyRequests, &request)?)
            .write(history_entry(&request, None, RequestStatus::New, Some("Request created".into()), caller, false)?);
        outbox
            .commit(self.store.as_ref(), &self.push)
            .await
            .context("Failed to create property request")?;

        tracing::info!(request_id = %request.id, user_id = %caller.id, "Property request created");
        self.get(caller, request.id).await
    }

    /// Field-whitelisted update. `notes` and `is_private` annotate the history
    /// row written when `status` changes.
    pub async fn update(&self, caller: &Caller, id: Uuid, mut changes: Map<String, Value>) -> Result<RequestView, ServiceError> {
        let current = self.load(id).await?;
        authorize(evaluate(caller, Action::Update, Some(current.user_id)))?;

        let notes = changes.remove("notes").and_then(|v| v.as_str().and_then(|s| non_blank(Some(s))));
        let is_private = changes.remove("is_private").and_then(|v| v.as_bool()).unwrap_or(false);

        let staff = caller.role.is_staff();
        if let Some(field) = changes
            .keys()
            .find(|k| !CUSTOMER_FIELDS.contains(&k.as_str()) && !(staff && STAFF_FIELDS.contains(&k.as_str())))
        {
            return Err(if staff {
                ServiceError::field(field.clone(), format!("'{}' cannot be changed through an update", field))
            } else {
                ServiceError::Forbidden(format!("Customers cannot update '{}'", field))
            });
        }
        if changes.is_empty() {
            return Err(ServiceError::validation("No request fields to update"));
        }

        let next_status = match changes.get("status") {
            None => None,
            Some(Value::String(s)) => Some(current.status.transition(s.parse()?)?),
            Some(_) => return Err(ServiceError::field("status", "Status must be a string")),
        };
        if let Some(status) = next_status {
            changes.insert("status".into(), json!(status.as_str()));
        }

        let mut merged = to_record(Collection::PropertyRequests, &current)?;
        merged.extend(changes.clone());
        let merged: PropertyRequest = serde_json::from_value(Value::Object(merged))
            .map_err(|e| ServiceError::validation(format!("Invalid request fields: {}", e)))?;
        validate(&merged)?;

        changes.insert("updated_at".into(), json!(now()));
        let op = WriteOp::update(Collection::PropertyRequests, id, Value::Object(changes))?;

        let mut outbox = Outbox::new();
        match next_status {
            // Restating the status still guards on it, or a concurrent move would be reverted
            Some(status) => {
                outbox.write(op.guarded(json!({ "status": current.status.as_str() }))?);
                if status != current.status {
                    outbox.write(history_entry(&current, Some(current.status), status, notes.clone(), caller, is_private)?);
                    self.notify_owner(&mut outbox, caller, &merged, status, notes.filter(|_| !is_private))?;
                }
            }
            None => {
                outbox.write(op);
            }
        }
        outbox
            .commit(self.store.as_ref(), &self.push)
            .await
            .context("Failed to update property request")?;

        self.get(caller, id).await
    }

    /// Owner or admin only. History rows go with the request.
    pub async fn delete(&self, caller: &Caller, id: Uuid) -> Result<(), ServiceError> {
        let request = self.load(id).await?;
        authorize(evaluate(caller, Action::DeleteRequest, Some(request.user_id)))?;

        let ops = vec![
            WriteOp::delete(Collection::RequestStatusHistory, FilterData::matching(json!({ "request_id": id.to_string() }))),
            WriteOp::delete(Collection::PropertyRequests, FilterData::by_id(id)),
        ];
        self.store.write(ops).await.context("Failed to delete property request")?;
        tracing::info!(request_id = %id, deleted_by = %caller.id, "Property request deleted");
        Ok(())
    }

    pub async fn history(&self, caller: &Caller, id: Uuid) -> Result<Vec<RequestStatusHistory>, ServiceError> {
        let request = self.load(id).await?;
        authorize(evaluate(caller, Action::Read, Some(request.user_id)))?;
        self.visible_history(caller, id).await
    }

    /// Assign to a sales_ops member. Moves `new` to `in_progress` and always
    /// records a private history row.
    pub async fn assign(&self, caller: &Caller, id: Uuid, input: AssignInput) -> Result<RequestView, ServiceError> {
        let request = self.load(id).await?;
        authorize(evaluate(caller, Action::StaffWorkflow, Some(request.user_id)))?;

        let assignee_id = non_blank(input.assigned_to.as_deref())
            .ok_or_else(|| ServiceError::field("assigned_to", "assigned_to is required"))?;
        let assignee_id = Uuid::parse_str(&assignee_id)
            .map_err(|_| ServiceError::field("assigned_to", format!("'{}' is not a valid id", assignee_id)))?;
        let assignee = self
            .profiles
            .select_one(FilterData::by_id(assignee_id))
            .await
            .context("Failed to load assignee")?
            .ok_or_else(|| ServiceError::NotFound("Assignee not found".into()))?;
        if assignee.role != Role::SalesOps {
            return Err(ServiceError::field("assigned_to", "Requests can only be assigned to sales_ops members"));
        }
        if !assignee.is_active {
            return Err(ServiceError::field("assigned_to", "Assignee is not active"));
        }

        let next = request.status.after_assignment()?;
        let notes = non_blank(input.notes.as_deref()).unwrap_or_else(|| format!("Assigned to {}", assignee.name));
        let op = WriteOp::update(
            Collection::PropertyRequests,
            id,
            json!({ "assigned_to": assignee.id.to_string(), "status": next.as_str(), "updated_at": now() }),
        )?
        .guarded(json!({ "status": request.status.as_str() }))?;

        let mut outbox = Outbox::new();
        outbox
            .write(op)
            .write(history_entry(&request, Some(request.status), next, Some(notes), caller, true)?);
        if assignee.id != caller.id {
            outbox.notify(
                NotificationDraft::new(
                    assignee.id,
                    "assignment",
                    "Property request assigned",
                    format!("You have been assigned the request '{}'", request.title),
                )
                .about("property_request", request.id)
                .link(request_link(request.id)),
            )?;
        }
        if next != request.status {
            self.notify_owner(&mut outbox, caller, &request, next, None)?;
        }
        outbox
            .commit(self.store.as_ref(), &self.push)
            .await
            .context("Failed to assign property request")?;

        tracing::info!(request_id = %id, assignee = %assignee.id, "Property request assigned");
        self.get(caller, id).await
    }

    /// Explicit status update by staff. Always appends a history row, even
    /// when the status is restated to record a note.
    pub async fn add_status_update(&self, caller: &Caller, id: Uuid, input: StatusUpdate) -> Result<RequestView, ServiceError> {
        let request = self.load(id).await?;
        authorize(evaluate(caller, Action::StaffWorkflow, Some(request.user_id)))?;

        let status = non_blank(input.status.as_deref()).ok_or_else(|| ServiceError::field("status", "Status is required"))?;
        let next = request.status.transition(status.parse()?)?;
        let is_private = input.is_private.unwrap_or(false);
        let notes = non_blank(input.notes.as_deref());

        let op = WriteOp::update(
            Collection::PropertyRequests,
            id,
            json!({ "status": next.as_str(), "updated_at": now() }),
        )?
        .guarded(json!({ "status": request.status.as_str() }))?;

        let mut outbox = Outbox::new();
        outbox
            .write(op)
            .write(history_entry(&request, Some(request.status), next, notes.clone(), caller, is_private)?);
        if !is_private || next != request.status {
            self.notify_owner(&mut outbox, caller, &request, next, notes.filter(|_| !is_private))?;
        }
        outbox
            .commit(self.store.as_ref(), &self.push)
            .await
            .context("Failed to update request status")?;

        tracing::info!(request_id = %id, from = %request.status, to = %next, "Request status updated");
        self.get(caller, id).await
    }

    async fn load(&self, id: Uuid) -> Result<PropertyRequest, ServiceError> {
        self.requests.find(id).await.context("Failed to load property request")
    }

    /// Oldest first; private rows are hidden from customers.
    async fn visible_history(&self, caller: &Caller, id: Uuid) -> Result<Vec<RequestStatusHistory>, ServiceError> {
        let mut filter = FilterData::matching(json!({ "request_id": id.to_string() }));
        if !caller.role.is_staff() {
            filter = filter.and_where(json!({ "is_private": false }));
        }
        self.history
            .select_any(filter.order_by("created_at asc"))
            .await
            .context("Failed to load request history")
    }

    async fn expand(&self, requests: Vec<PropertyRequest>) -> Result<Vec<RequestView>, ServiceError> {
        let mut ids: Vec<Uuid> = requests.iter().flat_map(|r| [Some(r.user_id), r.assigned_to]).flatten().collect();
        ids.sort();
        ids.dedup();
        let people: HashMap<Uuid, ProfileSummary> = self
            .profiles
            .select_ids(ids)
            .await
            .context("Failed to load request participants")?
            .iter()
            .map(|p| (p.id, ProfileSummary::from(p)))
            .collect();

        Ok(requests
            .into_iter()
            .map(|request| RequestView {
                customer: people.get(&request.user_id).cloned(),
                assignee: request.assigned_to.and_then(|a| people.get(&a).cloned()),
                history: None,
                request,
            })
            .collect())
    }

    fn notify_owner(
        &self,
        outbox: &mut Outbox,
        caller: &Caller,
        request: &PropertyRequest,
        status: RequestStatus,
        note: Option<String>,
    ) -> Result<(), ServiceError> {
        if request.user_id == caller.id {
            return Ok(());
        }
        let mut message = format!("Your request '{}' is now {}", request.title, status.as_str().replace('_', " "));
        if let Some(note) = note {
            message.push_str(": ");
            message.push_str(&note);
        }
        outbox.notify(
            NotificationDraft::new(request.user_id, "request", "Property request updated", message)
                .about("property_request", request.id)
                .link(request_link(request.id)),
        )?;
        Ok(())
    }
}

fn request_link(id: Uuid) -> String {
    format!("/property-requests/{}", id)
}

fn history_entry(
    request: &PropertyRequest,
    old_status: Option<RequestStatus>,
    new_status: RequestStatus,
    notes: Option<String>,
    caller: &Caller,
    is_private: bool,
) -> Result<WriteOp, ServiceError> {
    let entry = RequestStatusHistory {
        id: Uuid::new_v4(),
        request_id: request.id,
        old_status,
        new_status,
        notes,
        created_by: caller.id,
        is_private,
        created_at: now(),
    };
    Ok(WriteOp::insert(Collection::RequestStatusHistory, &entry)?)
}

fn validate(request: &PropertyRequest) -> Result<(), ServiceError> {
    let mut errors = HashMap::new();
    for (field, value) in [
        ("title", &request.title),
        ("property_type", &request.property_type),
        ("location", &request.location),
    ] {
        if value.trim().is_empty() {
            errors.insert(field.to_string(), format!("{} is required", field));
        }
    }
    for (field, value) in [("min_price", request.min_price), ("max_price", request.max_price)] {
        if matches!(value, Some(p) if p < 0.0) {
            errors.insert(field.to_string(), format!("{} cannot be negative", field));
        }
    }
    if let (Some(min), Some(max)) = (request.min_price, request.max_price) {
        if min >= max {
            errors.insert("min_price".into(), "min_price must be less than max_price".into());
        }
    }
    if !request.custom_fields.is_object() {
        errors.insert("custom_fields".into(), "custom_fields must be an object".into());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::fields("Invalid property request", errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedStore, TestContext};

    struct Cast {
        ctx: TestContext,
        customer: Caller,
        other: Caller,
        rep: Caller,
        admin: Caller,
    }

    async fn cast() -> Cast {
        cast_on(TestContext::new()).await
    }

    async fn cast_on(ctx: TestContext) -> Cast {
        let customer = Caller::new(ctx.seed_profile("Cora", Role::Customer).await.id, Role::Customer);
        let other = Caller::new(ctx.seed_profile("Olly", Role::Customer).await.id, Role::Customer);
        let rep = Caller::new(ctx.seed_profile("Rex", Role::SalesOps).await.id, Role::SalesOps);
        let admin = Caller::new(ctx.seed_profile("Ada", Role::Admin).await.id, Role::Admin);
        Cast { ctx, customer, other, rep, admin }
    }

    fn brief() -> NewRequest {
        NewRequest {
            title: Some("Family flat".into()),
            property_type: Some("Apartment".into()),
            location: Some("Cairo".into()),
            min_price: Some(100.0),
            max_price: Some(200.0),
            ..Default::default()
        }
    }

    fn body(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    async fn history_len(c: &Cast, id: Uuid) -> usize {
        c.ctx.services.requests.history(&c.admin, id).await.unwrap().len()
    }

    #[tokio::test]
    async fn min_price_must_be_below_max_price() {
        let c = cast().await;
        let input = NewRequest { min_price: Some(100.0), max_price: Some(50.0), ..brief() };
        match c.ctx.services.requests.create(&c.customer, input).await {
            Err(ServiceError::Validation { field_errors: Some(f), .. }) => assert!(f.contains_key("min_price")),
            other => panic!("unexpected {:?}", other.map(|v| v.request.id)),
        }
        let page = c.ctx.services.requests.list(&c.admin, RequestListQuery { view_all: true, ..Default::default() }, Paging::default()).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn create_starts_history_with_new() {
        let c = cast().await;
        let view = c.ctx.services.requests.create(&c.customer, brief()).await.unwrap();
        assert_eq!(view.request.status, RequestStatus::New);
        let history = view.history.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!((history[0].old_status, history[0].new_status), (None, RequestStatus::New));
        assert_eq!(view.customer.map(|p| p.id), Some(c.customer.id));
    }

    #[tokio::test]
    async fn history_grows_only_on_status_changes() {
        let c = cast().await;
        let svc = &c.ctx.services.requests;
        let id = svc.create(&c.customer, brief()).await.unwrap().request.id;

        svc.update(&c.customer, id, body(json!({ "location": "Giza" }))).await.unwrap();
        assert_eq!(history_len(&c, id).await, 1);

        svc.update(&c.rep, id, body(json!({ "status": "in_progress", "notes": "Looking" }))).await.unwrap();
        assert_eq!(history_len(&c, id).await, 2);

        svc.update(&c.rep, id, body(json!({ "status": "in_progress" }))).await.unwrap();
        assert_eq!(history_len(&c, id).await, 2);

        let input = StatusUpdate { status: Some("in_progress".into()), notes: Some("Still looking".into()), is_private: Some(true) };
        svc.add_status_update(&c.rep, id, input).await.unwrap();
        assert_eq!(history_len(&c, id).await, 3);

        // private rows are hidden from the owner
        assert_eq!(svc.history(&c.customer, id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn customer_updates_are_whitelisted_and_owned() {
        let c = cast().await;
        let svc = &c.ctx.services.requests;
        let id = svc.create(&c.customer, brief()).await.unwrap().request.id;

        for field in json!({ "status": "matched", "assigned_to": c.rep.id.to_string(), "description": "x" }).as_object().unwrap() {
            let mut change = Map::new();
            change.insert(field.0.clone(), field.1.clone());
            assert!(matches!(svc.update(&c.customer, id, change).await, Err(ServiceError::Forbidden(_))), "{}", field.0);
        }
        assert!(matches!(svc.update(&c.other, id, body(json!({ "title": "Mine" }))).await, Err(ServiceError::Forbidden(_))));
        assert!(matches!(svc.get(&c.other, id).await, Err(ServiceError::Forbidden(_))));
        assert!(matches!(svc.delete(&c.other, id).await, Err(ServiceError::Forbidden(_))));
        assert!(matches!(svc.delete(&c.rep, id).await, Err(ServiceError::Forbidden(_))));

        let err = svc.update(&c.customer, id, body(json!({ "max_price": 10.0 }))).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation { .. }));
        assert_eq!(svc.get(&c.customer, id).await.unwrap().request.max_price, Some(200.0));

        svc.delete(&c.customer, id).await.unwrap();
        assert!(matches!(svc.get(&c.customer, id).await, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn assignment_requires_a_sales_ops_target() {
        let c = cast().await;
        let svc = &c.ctx.services.requests;
        let id = svc.create(&c.customer, brief()).await.unwrap().request.id;

        let to_admin = AssignInput { assigned_to: Some(c.admin.id.to_string()), notes: None };
        assert!(matches!(svc.assign(&c.admin, id, to_admin).await, Err(ServiceError::Validation { .. })));
        let to_nobody = AssignInput { assigned_to: Some(Uuid::new_v4().to_string()), notes: None };
        assert!(matches!(svc.assign(&c.admin, id, to_nobody).await, Err(ServiceError::NotFound(_))));
        let view = svc.get(&c.admin, id).await.unwrap();
        assert_eq!((view.request.assigned_to, view.request.status), (None, RequestStatus::New));

        let to_rep = AssignInput { assigned_to: Some(c.rep.id.to_string()), notes: None };
        let view = svc.assign(&c.admin, id, to_rep.clone()).await.unwrap();
        assert_eq!(view.request.assigned_to, Some(c.rep.id));
        assert_eq!(view.request.status, RequestStatus::InProgress);
        assert_eq!(view.assignee.map(|a| a.id), Some(c.rep.id));
        assert!(view.history.unwrap().last().unwrap().is_private);

        // reassigning an open request keeps its status but still records history
        let view = svc.assign(&c.admin, id, to_rep).await.unwrap();
        assert_eq!(view.request.status, RequestStatus::InProgress);
        assert_eq!(history_len(&c, id).await, 3);

        let customer = c.ctx.services.notifications.unread_count(&c.customer).await.unwrap();
        let rep = c.ctx.services.notifications.unread_count(&c.rep).await.unwrap();
        assert_eq!((customer, rep), (1, 2));
    }

    #[tokio::test]
    async fn status_updates_follow_the_transition_table() {
        let c = cast().await;
        let svc = &c.ctx.services.requests;
        let id = svc.create(&c.customer, brief()).await.unwrap().request.id;

        let update = |status: &str| StatusUpdate { status: Some(status.into()), notes: None, is_private: None };
        assert!(matches!(svc.add_status_update(&c.rep, id, update("completed")).await, Err(ServiceError::InvalidTransition(_))));
        assert!(matches!(svc.add_status_update(&c.rep, id, update("")).await, Err(ServiceError::Validation { .. })));
        assert!(matches!(svc.add_status_update(&c.rep, id, update("archived")).await, Err(ServiceError::Validation { .. })));
        assert!(matches!(svc.add_status_update(&c.customer, id, update("in_progress")).await, Err(ServiceError::Forbidden(_))));

        for status in ["in_progress", "matched", "completed"] {
            svc.add_status_update(&c.rep, id, update(status)).await.unwrap();
        }
        assert_eq!(svc.get(&c.customer, id).await.unwrap().request.status, RequestStatus::Completed);
        assert_eq!(history_len(&c, id).await, 4);
    }

    #[tokio::test]
    async fn list_visibility_follows_role_and_intent() {
        let c = cast().await;
        let svc = &c.ctx.services.requests;
        let mine = svc.create(&c.customer, brief()).await.unwrap().request.id;
        let theirs = svc.create(&c.other, brief()).await.unwrap().request.id;
        svc.assign(&c.admin, theirs, AssignInput { assigned_to: Some(c.rep.id.to_string()), notes: None }).await.unwrap();

        let ids = |page: Page<RequestView>| page.items.into_iter().map(|v| v.request.id).collect::<Vec<_>>();
        let all = RequestListQuery { view_all: true, ..Default::default() };

        assert_eq!(ids(svc.list(&c.customer, all.clone(), Paging::default()).await.unwrap()), vec![mine]);
        assert!(ids(svc.list(&c.rep, RequestListQuery::default(), Paging::default()).await.unwrap()).is_empty());
        assert_eq!(svc.list(&c.rep, all.clone(), Paging::default()).await.unwrap().total, 2);
        let assigned = RequestListQuery { view_all: true, mine: true, status: None };
        assert_eq!(ids(svc.list(&c.rep, assigned, Paging::default()).await.unwrap()), vec![theirs]);
        let by_status = RequestListQuery { view_all: true, mine: false, status: Some("new".into()) };
        assert_eq!(ids(svc.list(&c.admin, by_status, Paging::default()).await.unwrap()), vec![mine]);
    }

    #[tokio::test]
    async fn restating_the_status_does_not_revert_a_concurrent_move() {
        let store = Arc::new(ScriptedStore::new());
        let c = cast_on(TestContext::with_store(store.clone())).await;
        let svc = &c.ctx.services.requests;
        let id = svc.create(&c.customer, brief()).await.unwrap().request.id;
        svc.update(&c.rep, id, body(json!({ "status": "in_progress" }))).await.unwrap();

        // Another agent matches the request between our read and our write
        let seen = svc.get(&c.admin, id).await.unwrap().request;
        let matched = WriteOp::update(Collection::PropertyRequests, id, json!({ "status": "matched" })).unwrap();
        let audit = history_entry(&seen, Some(RequestStatus::InProgress), RequestStatus::Matched, None, &c.admin, false).unwrap();
        store.before_next_write(Collection::PropertyRequests, vec![matched, audit]);

        let res = svc.update(&c.rep, id, body(json!({ "status": "in_progress", "title": "Renamed" }))).await;
        assert!(matches!(res, Err(ServiceError::Conflict(_))));

        let view = svc.get(&c.admin, id).await.unwrap();
        assert_eq!(view.request.status, RequestStatus::Matched);
        assert_eq!(view.request.title, "Family flat");
        assert_eq!(history_len(&c, id).await, 3);
    }

    #[tokio::test]
    async fn restating_the_status_keeps_history_unchanged() {
        let c = cast().await;
        let svc = &c.ctx.services.requests;
        let id = svc.create(&c.customer, brief()).await.unwrap().request.id;
        let view = svc.update(&c.rep, id, body(json!({ "status": "new", "title": "Renamed" }))).await.unwrap();
        assert_eq!(view.request.title, "Renamed");
        assert_eq!(history_len(&c, id).await, 1);
    }

    #[tokio::test]
    async fn failed_delete_keeps_request_and_history() {
        let store = Arc::new(ScriptedStore::new());
        let c = cast_on(TestContext::with_store(store.clone())).await;
        let svc = &c.ctx.services.requests;
        let id = svc.create(&c.customer, brief()).await.unwrap().request.id;

        store.fail_writes_to(Collection::PropertyRequests);
        assert!(svc.delete(&c.customer, id).await.is_err());
        assert_eq!(svc.get(&c.customer, id).await.unwrap().request.id, id);
        assert_eq!(history_len(&c, id).await, 1);
    }

    #[tokio::test]
    async fn delete_removes_request_with_its_history() {
        let c = cast().await;
        let svc = &c.ctx.services.requests;
        let id = svc.create(&c.customer, brief()).await.unwrap().request.id;
        assert!(matches!(svc.delete(&c.other, id).await, Err(ServiceError::Forbidden(_))));

        svc.delete(&c.customer, id).await.unwrap();
        assert!(matches!(svc.get(&c.admin, id).await, Err(ServiceError::NotFound(_))));
        let by_request = FilterData::matching(json!({ "request_id": id.to_string() }));
        assert_eq!(c.ctx.store.count(Collection::RequestStatusHistory, by_request).await.unwrap(), 0);
    }
}
