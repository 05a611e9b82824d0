use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::{non_blank, now, Page, Paging, ServiceContext, ServiceError};
use crate::access::{Caller, Role};
use crate::database::models::profile::ProfileSummary;
use crate::database::models::Profile;
use crate::database::{Collection, DatabaseError, Repository, Store, WriteOp};
use crate::filter::FilterData;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewProfile {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminProfileUpdate {
    pub role: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Clone)]
pub struct ProfileService {
    profiles: Repository<Profile>,
    store: Arc<dyn Store>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            profiles: Repository::new(Collection::Profiles, store.clone()),
            store,
        }
    }

    /// Used by the user validation middleware. `None` when no such profile exists.
    pub async fn find_for_auth(&self, id: Uuid) -> Result<Option<Profile>, ServiceError> {
        self.profiles
            .select_one(FilterData::by_id(id))
            .await
            .context("Failed to load profile")
    }

    pub async fn me(&self, caller: &Caller) -> Result<Profile, ServiceError> {
        self.profiles.find(caller.id).await.context("Failed to load profile")
    }

    pub async fn update_me(&self, caller: &Caller, update: ProfileUpdate) -> Result<Profile, ServiceError> {
        let mut changes = Map::new();
        if let Some(name) = update.name {
            let name = non_blank(Some(&name)).ok_or_else(|| ServiceError::field("name", "Name cannot be empty"))?;
            changes.insert("name".into(), json!(name));
        }
        if let Some(phone) = update.phone {
            changes.insert("phone".into(), json!(non_blank(Some(&phone))));
        }
        if changes.is_empty() {
            return Err(ServiceError::validation("No profile fields to update"));
        }
        self.write_update(caller.id, changes).await
    }

    pub async fn list(&self, role: Option<&str>, paging: Paging) -> Result<Page<Profile>, ServiceError> {
        let mut filter = FilterData::new();
        if let Some(role) = role {
            let role: Role = role.parse().map_err(|e: String| ServiceError::field("role", e))?;
            filter = filter.and_where(json!({ "role": role.as_str() }));
        }
        let (items, total) = self
            .profiles
            .select_page(filter.clone(), paging.apply(filter.order_by("created_at desc")))
            .await
            .context("Failed to list profiles")?;
        Ok(Page::new(items, total, paging))
    }

    pub async fn create(&self, input: NewProfile) -> Result<Profile, ServiceError> {
        let mut errors = HashMap::new();
        let name = non_blank(input.name.as_deref());
        if name.is_none() {
            errors.insert("name".to_string(), "Name is required".to_string());
        }
        let email = non_blank(input.email.as_deref()).map(|e| e.to_lowercase());
        match &email {
            Some(e) if e.contains('@') => {}
            Some(_) => {
                errors.insert("email".to_string(), "Email address is invalid".to_string());
            }
            None => {
                errors.insert("email".to_string(), "Email is required".to_string());
            }
        }
        let role = match input.role.as_deref() {
            None => Some(Role::Customer),
            Some(r) => match r.parse::<Role>() {
                Ok(role) => Some(role),
                Err(e) => {
                    errors.insert("role".to_string(), e);
                    None
                }
            },
        };
        let (Some(name), Some(email), Some(role), true) = (name, email, role, errors.is_empty()) else {
            return Err(ServiceError::fields("Invalid profile", errors));
        };

        let timestamp = now();
        let profile = Profile {
            id: Uuid::new_v4(),
            name,
            email,
            phone: non_blank(input.phone.as_deref()),
            role,
            is_active: true,
            created_at: timestamp,
            updated_at: timestamp,
        };
        let op = WriteOp::insert(Collection::Profiles, &profile)?;
        match self.store.write(vec![op]).await {
            Ok(_) => {}
            Err(DatabaseError::Conflict(_)) => {
                return Err(ServiceError::Conflict(format!("A profile with email '{}' already exists", profile.email)));
            }
            Err(e) => return Err(ServiceError::unexpected("Failed to create profile", e)),
        }
        tracing::info!(profile_id = %profile.id, role = %profile.role, "Profile created");
        Ok(profile)
    }

    pub async fn get(&self, id: Uuid) -> Result<Profile, ServiceError> {
        self.profiles.find(id).await.context("Failed to load profile")
    }

    /// Role and active flag. An admin cannot demote or deactivate themselves.
    pub async fn admin_update(&self, caller: &Caller, id: Uuid, update: AdminProfileUpdate) -> Result<Profile, ServiceError> {
        self.profiles.find(id).await.context("Failed to load profile")?;

        let mut changes = Map::new();
        if let Some(role) = update.role {
            let role: Role = role.parse().map_err(|e: String| ServiceError::field("role", e))?;
            if id == caller.id && role != Role::Admin {
                return Err(ServiceError::field("role", "You cannot change your own role"));
            }
            changes.insert("role".into(), json!(role.as_str()));
        }
        if let Some(is_active) = update.is_active {
            if id == caller.id && !is_active {
                return Err(ServiceError::field("is_active", "You cannot deactivate your own profile"));
            }
            changes.insert("is_active".into(), Value::Bool(is_active));
        }
        if changes.is_empty() {
            return Err(ServiceError::validation("Nothing to update: expected role or is_active"));
        }

        let profile = self.write_update(id, changes).await?;
        tracing::info!(profile_id = %id, admin_id = %caller.id, "Profile updated by admin");
        Ok(profile)
    }

    /// Active sales_ops members, for assignment pickers.
    pub async fn team(&self) -> Result<Vec<ProfileSummary>, ServiceError> {
        let members = self
            .profiles
            .select_any(FilterData::matching(json!({ "role": Role::SalesOps.as_str(), "is_active": true })).order_by("name asc"))
            .await
            .context("Failed to list team")?;
        Ok(members.iter().map(ProfileSummary::from).collect())
    }

    async fn write_update(&self, id: Uuid, mut changes: Map<String, Value>) -> Result<Profile, ServiceError> {
        changes.insert("updated_at".into(), json!(now()));
        let op = WriteOp::update(Collection::Profiles, id, Value::Object(changes))?;
        let mut rows = self.store.write(vec![op]).await.context("Failed to update profile")?;
        let row = rows.pop().ok_or_else(|| ServiceError::not_found("Profile"))?;
        Ok(self.profiles.decode(row)?)
    }
}
