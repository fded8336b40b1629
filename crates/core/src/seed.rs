//! YAML seed documents for running the engine without a remote store.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::content::ContentItem;
use crate::entity::{AdminRoster, Cohort, DailyProgress, UserId, UserRecord};
use crate::error::{EngineError, Result};
use crate::rule::NotificationRule;

/// Snapshot of the collections the engine reads, keyed the same way the
/// document store keys them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seed {
    #[serde(default)]
    pub cohorts: Vec<Cohort>,
    #[serde(default)]
    pub users: Vec<UserRecord>,
    #[serde(default)]
    pub rules: Vec<NotificationRule>,
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(default)]
    pub admin_roster: Option<AdminRoster>,
    #[serde(default)]
    pub progress: HashMap<UserId, DailyProgress>,
}

impl Seed {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let seed: Seed = serde_yaml::from_str(yaml)?;
        seed.check_ids()?;
        Ok(seed)
    }

    fn check_ids(&self) -> Result<()> {
        if let Some(c) = self.cohorts.iter().find(|c| c.id.is_empty()) {
            return Err(EngineError::Validation(format!("cohort '{}' has no id", c.name)));
        }
        if self.users.iter().any(|u| u.id.is_empty()) {
            return Err(EngineError::Validation("user without id in seed".to_string()));
        }
        if let Some(r) = self.rules.iter().find(|r| r.id.is_empty()) {
            return Err(EngineError::Validation(format!("rule '{}' has no id", r.name)));
        }
        Ok(())
    }
}

/// Read and parse a seed file.
pub fn load_seed(path: &Path) -> Result<Seed> {
    let yaml = std::fs::read_to_string(path)?;
    let seed = Seed::from_yaml(&yaml)?;
    tracing::info!(
        path = %path.display(),
        cohorts = seed.cohorts.len(),
        users = seed.users.len(),
        rules = seed.rules.len(),
        "loaded seed"
    );
    Ok(seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SEED: &str = r#"
cohorts:
  - id: jan
    name: January Cohort
    startDate: 2025-01-06T14:00:00Z
    timezone: America/New_York
    settings:
      maxCapacity: 20
    memberIds: [u1]
users:
  - id: u1
    email: u1@example.com
    cohortId: jan
    notificationSettings:
      enabled: true
      timezone: America/Chicago
      channels: { email: true, sms: false }
rules:
  - id: am
    name: Morning nudge
    time: "09:00"
    criteria: morning_routine_incomplete
    message: Complete your morning routine
    enabled: true
adminRoster:
  version: 3
  emails: [admin@example.com]
"#;

    #[test]
    fn parses_seed_document() {
        let seed = Seed::from_yaml(SEED).unwrap();
        assert_eq!(seed.cohorts[0].settings.max_capacity, Some(20));
        assert!(seed.cohorts[0].settings.allow_late_joins);
        assert_eq!(seed.users[0].cohort_id.as_deref(), Some("jan"));
        assert!(seed.users[0].notification_settings.channels.email);
        assert_eq!(seed.rules[0].time, "09:00");
        assert_eq!(seed.admin_roster.as_ref().map(|r| r.version), Some(3));
    }

    #[test]
    fn load_seed_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SEED.as_bytes()).unwrap();
        let seed = load_seed(file.path()).unwrap();
        assert_eq!(seed.users.len(), 1);
    }

    #[test]
    fn rejects_rule_without_id() {
        let yaml = "rules:\n  - name: x\n    time: '09:00'\n    criteria: always\n    message: hi\n";
        assert!(matches!(Seed::from_yaml(yaml), Err(EngineError::Validation(_))));
    }
}
