use std::fmt;

/// Named record collections behind the data gateway. Each maps to one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Profiles,
    Properties,
    PropertyRequests,
    RequestStatusHistory,
    ScheduledViewings,
    Notifications,
    SavedProperties,
}

impl Collection {
    pub const ALL: [Collection; 7] = [
        Collection::Profiles,
        Collection::Properties,
        Collection::PropertyRequests,
        Collection::RequestStatusHistory,
        Collection::ScheduledViewings,
        Collection::Notifications,
        Collection::SavedProperties,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            Collection::Profiles => "profiles",
            Collection::Properties => "properties",
            Collection::PropertyRequests => "property_requests",
            Collection::RequestStatusHistory => "request_status_history",
            Collection::ScheduledViewings => "scheduled_viewings",
            Collection::Notifications => "notifications",
            Collection::SavedProperties => "saved_properties",
        }
    }

    /// Human label used in not-found messages.
    pub fn label(&self) -> &'static str {
        match self {
            Collection::Profiles => "Profile",
            Collection::Properties => "Property",
            Collection::PropertyRequests => "Property request",
            Collection::RequestStatusHistory => "Status history entry",
            Collection::ScheduledViewings => "Scheduled viewing",
            Collection::Notifications => "Notification",
            Collection::SavedProperties => "Saved property",
        }
    }

    /// Column sets that must be unique across the collection, besides `id`.
    /// Mirrors the UNIQUE constraints in `sql/schema.sql`.
    pub fn unique_keys(&self) -> &'static [&'static [&'static str]] {
        match self {
            Collection::Profiles => &[&["email"]],
            Collection::SavedProperties => &[&["user_id", "property_id"]],
            _ => &[],
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}
