//! Tunables for a board session, shared by every client front end.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Provisional offset above the current maximum position for a new
    /// placeholder, so it sorts after anything arriving before the reindex.
    #[serde(default = "default_placeholder_gap")]
    pub placeholder_gap: i64,
    /// Idle time after the last keystroke before `typingStop` is sent.
    #[serde(default = "default_typing_idle_ms")]
    pub typing_idle_ms: u64,
    #[serde(default = "default_recent_activity_limit")]
    pub recent_activity_limit: usize,
}

fn default_placeholder_gap() -> i64 {
    1000
}

fn default_typing_idle_ms() -> u64 {
    2000
}

fn default_recent_activity_limit() -> usize {
    50
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            placeholder_gap: default_placeholder_gap(),
            typing_idle_ms: default_typing_idle_ms(),
            recent_activity_limit: default_recent_activity_limit(),
        }
    }
}

impl SessionConfig {
    pub fn typing_idle(&self) -> Duration {
        Duration::from_millis(self.typing_idle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: SessionConfig = serde_json::from_str(r#"{"typingIdleMs":500}"#).unwrap();
        assert_eq!(config.typing_idle(), Duration::from_millis(500));
        assert_eq!(config.placeholder_gap, 1000);
        assert_eq!(config.recent_activity_limit, 50);
    }
}
