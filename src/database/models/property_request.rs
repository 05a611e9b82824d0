use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::workflow::RequestStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub property_type: String,
    pub location: String,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub area_size: Option<f64>,
    #[serde(default)]
    pub additional_features: Vec<String>,
    #[serde(default = "empty_object")]
    pub custom_fields: Value,
    pub status: RequestStatus,
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit row. Never updated or deleted by the service layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestStatusHistory {
    pub id: Uuid,
    pub request_id: Uuid,
    pub old_status: Option<RequestStatus>,
    pub new_status: RequestStatus,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSummary {
    pub id: Uuid,
    pub title: String,
    pub status: RequestStatus,
}

impl From<&PropertyRequest> for RequestSummary {
    fn from(r: &PropertyRequest) -> Self {
        Self { id: r.id, title: r.title.clone(), status: r.status }
    }
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}
