//! Administrator checks for privileged triggers.

use cohort_core::{AdminRoster, DocumentStore, EngineError, Result};

/// Load the roster and confirm `actor` is on it. A missing roster is
/// [`EngineError::MissingAdminRoster`], never an empty list.
pub async fn require_admin(store: &dyn DocumentStore, actor: &str) -> Result<AdminRoster> {
    let roster = store.admin_roster().await?.ok_or(EngineError::MissingAdminRoster)?;
    if !roster.contains(actor) {
        tracing::warn!(actor, roster_version = roster.version, "privileged trigger rejected");
        return Err(EngineError::Unauthorized(format!(
            "'{actor}' is not an administrator"
        )));
    }
    Ok(roster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_core::MemoryStore;

    fn roster() -> AdminRoster {
        AdminRoster {
            version: 2,
            emails: vec!["Admin@Example.com".into()],
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn roster_membership_is_case_insensitive() {
        let store = MemoryStore::new();
        store.set_admin_roster(Some(roster()));
        let r = require_admin(&store, "admin@example.com").await.unwrap();
        assert_eq!(r.version, 2);
    }

    #[tokio::test]
    async fn non_admin_is_unauthorized() {
        let store = MemoryStore::new();
        store.set_admin_roster(Some(roster()));
        assert!(matches!(
            require_admin(&store, "someone@example.com").await,
            Err(EngineError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn missing_roster_is_an_error() {
        let store = MemoryStore::new();
        assert!(matches!(
            require_admin(&store, "admin@example.com").await,
            Err(EngineError::MissingAdminRoster)
        ));
    }
}
