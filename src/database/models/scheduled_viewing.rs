use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflow::ViewingStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledViewing {
    pub id: Uuid,
    pub user_id: Uuid,
    pub property_id: Uuid,
    pub request_id: Option<Uuid>,
    pub status: ViewingStatus,
    #[serde(default)]
    pub proposed_dates: Vec<NaiveDate>,
    /// `HH:MM`, 24h
    #[serde(default)]
    pub proposed_times: Vec<String>,
    pub selected_date: Option<NaiveDate>,
    pub selected_time: Option<String>,
    pub viewing_date: Option<NaiveDate>,
    pub viewing_time: Option<String>,
    pub notes: Option<String>,
    pub private_notes: Option<String>,
    /// Staff member who proposed the options
    pub handled_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
