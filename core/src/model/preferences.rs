// core/src/model/preferences.rs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const ORDER_STATUS_IN_APP: &str = "order_status_notifications";
pub const ORDER_STATUS_EMAIL: &str = "order_status_emails";

/// Per-user notification flags. Absent flags count as enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationPreferences {
  pub flags: HashMap<String, bool>,
}

impl NotificationPreferences {
  pub fn allows(&self, flag: &str) -> bool {
    self.flags.get(flag).copied().unwrap_or(true)
  }

  pub fn with(mut self, flag: &str, enabled: bool) -> Self {
    self.flags.insert(flag.to_string(), enabled);
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_flags_default_to_enabled() {
    let prefs = NotificationPreferences::default().with(ORDER_STATUS_EMAIL, false);
    assert!(prefs.allows(ORDER_STATUS_IN_APP));
    assert!(!prefs.allows(ORDER_STATUS_EMAIL));
  }
}
