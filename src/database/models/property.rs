use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub property_type: String,
    pub location: String,
    pub price: f64,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub area_size: Option<f64>,
    pub available: bool,
    pub featured_image: Option<String>,
    pub created_by: Uuid,
    pub views_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySummary {
    pub id: Uuid,
    pub title: String,
    pub location: String,
    pub price: f64,
    pub featured_image: Option<String>,
}

impl From<&Property> for PropertySummary {
    fn from(p: &Property) -> Self {
        Self {
            id: p.id,
            title: p.title.clone(),
            location: p.location.clone(),
            price: p.price,
            featured_image: p.featured_image.clone(),
        }
    }
}
