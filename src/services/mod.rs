pub mod error;
pub mod notification_service;
pub mod profile_service;
pub mod property_service;
pub mod request_service;
pub mod saved_property_service;
pub mod viewing_service;

pub use error::{authorize, ServiceContext, ServiceError};
pub use notification_service::{NotificationDraft, NotificationService, Outbox};
pub use profile_service::ProfileService;
pub use property_service::PropertyService;
pub use request_service::RequestService;
pub use saved_property_service::SavedPropertyService;
pub use viewing_service::ViewingService;

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;

use crate::config;
use crate::database::Store;
use crate::filter::FilterData;
use crate::push::PushDispatcher;

/// Every service over one store and one push queue.
#[derive(Clone)]
pub struct Services {
    pub profiles: ProfileService,
    pub properties: PropertyService,
    pub requests: RequestService,
    pub viewings: ViewingService,
    pub notifications: NotificationService,
    pub saved: SavedPropertyService,
}

impl Services {
    pub fn new(store: Arc<dyn Store>, push: PushDispatcher) -> Self {
        Self {
            profiles: ProfileService::new(store.clone()),
            properties: PropertyService::new(store.clone()),
            requests: RequestService::new(store.clone(), push.clone()),
            viewings: ViewingService::new(store.clone(), push),
            notifications: NotificationService::new(store.clone()),
            saved: SavedPropertyService::new(store),
        }
    }
}

/// `page` / `limit` as supplied on a list call, clamped to the configured bounds.
#[derive(Debug, Clone, Copy, Default)]
pub struct Paging {
    page: Option<i32>,
    limit: Option<i32>,
}

impl Paging {
    pub fn new(page: Option<i32>, limit: Option<i32>) -> Self {
        Self { page, limit }
    }

    pub fn page(&self) -> i32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> i32 {
        let filter = &config::config().filter;
        let limit = self.limit.unwrap_or(filter.default_limit).max(1);
        match filter.max_limit {
            Some(max) => limit.min(max),
            None => limit,
        }
    }

    pub fn offset(&self) -> i32 {
        (self.page() - 1).saturating_mul(self.limit())
    }

    pub fn apply(&self, filter: FilterData) -> FilterData {
        filter.limit(self.limit()).offset(self.offset())
    }
}

/// One page of a list result plus the size of the full result set.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i32,
    pub limit: i32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, paging: Paging) -> Self {
        Self { items, total, page: paging.page(), limit: paging.limit() }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page { items: self.items.into_iter().map(f).collect(), total: self.total, page: self.page, limit: self.limit }
    }
}

/// Microsecond precision, so a stored timestamp reads back unchanged from Postgres.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Trimmed, non-empty text or `None`.
pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}
