use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, ToSchema,
    strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Admin,
    Driver,
    #[default]
    Student,
}

/// Role assignment per user.
///
/// A user's role is fixed by the first assignment; later calls return it.
#[derive(Debug, Default)]
pub struct RoleRegistry {
    roles: Mutex<HashMap<String, Role>>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `role` for `user_id` unless one exists, and return the stored role.
    pub fn ensure_role(&self, user_id: &str, role: Role) -> Role {
        let mut roles = self.roles.lock().unwrap_or_else(PoisonError::into_inner);
        *roles.entry(user_id.to_string()).or_insert_with(|| {
            log::info!("Assigned role {} to {}", role, user_id);
            role
        })
    }

    pub fn role_of(&self, user_id: &str) -> Option<Role> {
        let roles = self.roles.lock().unwrap_or_else(PoisonError::into_inner);
        roles.get(user_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_first_assignment_wins() {
        let registry = RoleRegistry::new();

        assert_eq!(registry.ensure_role("u1", Role::Driver), Role::Driver);
        assert_eq!(registry.ensure_role("u1", Role::Student), Role::Driver);
        assert_eq!(registry.role_of("u1"), Some(Role::Driver));
        assert_eq!(registry.role_of("u2"), None);
    }

    #[test]
    fn test_concurrent_upserts_agree() {
        let registry = Arc::new(RoleRegistry::new());

        let handles: Vec<_> = [Role::Admin, Role::Driver, Role::Student, Role::Driver]
            .into_iter()
            .map(|role| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.ensure_role("shared", role))
            })
            .collect();

        let results: Vec<Role> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.iter().all(|r| *r == results[0]));
        assert_eq!(registry.role_of("shared"), Some(results[0]));
    }
}
