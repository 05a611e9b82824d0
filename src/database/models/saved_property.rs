use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// At most one row per (user_id, property_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedProperty {
    pub id: Uuid,
    pub user_id: Uuid,
    pub property_id: Uuid,
    pub created_at: DateTime<Utc>,
}
