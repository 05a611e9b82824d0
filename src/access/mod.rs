//! Role-based visibility and capability checks.
//!
//! Every service operation asks [`evaluate`] once instead of branching on roles
//! itself. List operations turn the resulting [`Scope`] into a where clause.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    SalesOps,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::SalesOps => "sales_ops",
            Role::Admin => "admin",
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, Role::SalesOps | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "sales_ops" => Ok(Role::SalesOps),
            "admin" => Ok(Role::Admin),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// The authenticated identity an operation runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }
}

/// Query intent supplied with a list call (`viewAll`, `mine`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListIntent {
    pub view_all: bool,
    pub only_mine: bool,
}

/// Which rows of an owned collection a caller may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    OwnedBy(Uuid),
    AssignedTo(Uuid),
}

impl Scope {
    /// Where-clause fragment for the filter language. `None` means unrestricted.
    /// `assignee_column` is `None` for collections without an assignee, where
    /// `AssignedTo` falls back to ownership.
    pub fn to_where(&self, assignee_column: Option<&str>) -> Option<Value> {
        match self {
            Scope::All => None,
            Scope::OwnedBy(id) => Some(json!({ "user_id": id.to_string() })),
            Scope::AssignedTo(id) => match assignee_column {
                Some(column) => Some(json!({ column: id.to_string() })),
                None => Some(json!({ "user_id": id.to_string() })),
            },
        }
    }
}

/// Operations on owned records (property requests, scheduled viewings).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List(ListIntent),
    Read,
    Update,
    DeleteRequest,
    SelectSlot,
    CancelViewing,
    /// Propose, confirm, complete, assign, explicit status updates.
    StaffWorkflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow(Scope),
    Deny(&'static str),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }
}

/// Single capability check. `owner` is the record's `user_id` (absent for lists).
pub fn evaluate(caller: &Caller, action: Action, owner: Option<Uuid>) -> Decision {
    let owns = owner.map(|o| o == caller.id).unwrap_or(false);

    match action {
        Action::List(intent) => Decision::Allow(list_scope(caller, intent)),
        Action::Read | Action::Update => {
            if caller.role.is_staff() || owns {
                Decision::Allow(Scope::All)
            } else {
                Decision::Deny("You do not have access to this record")
            }
        }
        Action::DeleteRequest => {
            if owns || caller.role == Role::Admin {
                Decision::Allow(Scope::All)
            } else {
                Decision::Deny("Only the request owner or an admin can delete it")
            }
        }
        Action::SelectSlot => {
            if owns {
                Decision::Allow(Scope::All)
            } else {
                Decision::Deny("Only the customer who requested the viewing can select a slot")
            }
        }
        Action::CancelViewing => {
            if owns || caller.role.is_staff() {
                Decision::Allow(Scope::All)
            } else {
                Decision::Deny("You do not have access to this viewing")
            }
        }
        Action::StaffWorkflow => {
            if caller.role.is_staff() {
                Decision::Allow(Scope::All)
            } else {
                Decision::Deny("This action requires a sales_ops or admin role")
            }
        }
    }
}

/// Customers only ever see their own rows. Staff see everything with `viewAll`,
/// their assignments with `mine`, and otherwise their own rows.
fn list_scope(caller: &Caller, intent: ListIntent) -> Scope {
    match caller.role {
        Role::Customer => Scope::OwnedBy(caller.id),
        Role::SalesOps | Role::Admin if intent.only_mine => Scope::AssignedTo(caller.id),
        Role::SalesOps | Role::Admin if intent.view_all => Scope::All,
        Role::SalesOps | Role::Admin => Scope::OwnedBy(caller.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(role: Role) -> Caller {
        Caller::new(Uuid::new_v4(), role)
    }

    #[test]
    fn customer_view_all_has_no_effect() {
        let c = caller(Role::Customer);
        let intent = ListIntent { view_all: true, only_mine: false };
        assert_eq!(evaluate(&c, Action::List(intent), None), Decision::Allow(Scope::OwnedBy(c.id)));
    }

    #[test]
    fn staff_default_is_own_rows_only() {
        for role in [Role::SalesOps, Role::Admin] {
            let c = caller(role);
            assert_eq!(evaluate(&c, Action::List(ListIntent::default()), None), Decision::Allow(Scope::OwnedBy(c.id)));
            let all = ListIntent { view_all: true, only_mine: false };
            assert_eq!(evaluate(&c, Action::List(all), None), Decision::Allow(Scope::All));
        }
    }

    #[test]
    fn only_mine_restricts_staff_to_assignments() {
        let c = caller(Role::SalesOps);
        let intent = ListIntent { view_all: true, only_mine: true };
        let scope = match evaluate(&c, Action::List(intent), None) {
            Decision::Allow(s) => s,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(scope.to_where(Some("assigned_to")), Some(json!({"assigned_to": c.id.to_string()})));
    }

    #[test]
    fn customers_cannot_touch_other_records() {
        let c = caller(Role::Customer);
        let other = Some(Uuid::new_v4());
        for action in [Action::Read, Action::Update, Action::DeleteRequest, Action::SelectSlot, Action::CancelViewing, Action::StaffWorkflow] {
            assert!(!evaluate(&c, action, other).is_allowed(), "{:?}", action);
        }
        assert!(evaluate(&c, Action::Read, Some(c.id)).is_allowed());
        assert!(!evaluate(&c, Action::StaffWorkflow, Some(c.id)).is_allowed());
    }

    #[test]
    fn sales_ops_cannot_delete_unowned_requests() {
        let s = caller(Role::SalesOps);
        assert!(!evaluate(&s, Action::DeleteRequest, Some(Uuid::new_v4())).is_allowed());
        assert!(evaluate(&caller(Role::Admin), Action::DeleteRequest, Some(Uuid::new_v4())).is_allowed());
        assert!(evaluate(&s, Action::Update, Some(Uuid::new_v4())).is_allowed());
    }
}
