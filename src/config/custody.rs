//! Custody rule configuration.

use serde::Deserialize;

/// Custody rules and paging.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CustodyConfig {
    /// Days after a physical verification before the item is overdue for
    /// another one.
    pub verification_interval_days: u32,
    /// Events fetched per page when streaming a property's history.
    pub history_page_size: u32,
}

impl Default for CustodyConfig {
    fn default() -> Self {
        Self {
            verification_interval_days: 30,
            history_page_size: 100,
        }
    }
}

impl CustodyConfig {
    pub fn verification_interval(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.verification_interval_days))
    }
}
