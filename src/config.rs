//! Catalog configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! overrides:
//!
//! ```
//! use shared_catalog::CatalogConfig;
//!
//! let config = CatalogConfig::from_json_str(r#"{ "page_size": 12 }"#).unwrap();
//! assert_eq!(config.page_size, 12);
//! assert_eq!(config.loan_period_days, 30);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default interval of the fallback poll, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
/// Days between borrow date and due date.
pub const DEFAULT_LOAN_PERIOD_DAYS: u32 = 30;
/// Books per page in a view.
pub const DEFAULT_PAGE_SIZE: usize = 6;
/// Local image used when a cover is missing or malformed.
pub const DEFAULT_PLACEHOLDER_COVER: &str = "../img/a3.avif";
/// Polls before a social login request gives up (about a minute at 1s).
pub const DEFAULT_SOCIAL_LOGIN_MAX_POLLS: u32 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub poll_interval_ms: u64,
    pub loan_period_days: u32,
    pub page_size: usize,
    pub placeholder_cover: String,
    pub social_login_max_polls: u32,
    /// Seed missing collections with the demo data set.
    pub seed_defaults: bool,
    /// Restore author and cover of the seeded titles whenever books are loaded.
    pub repair_seed_books: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            loan_period_days: DEFAULT_LOAN_PERIOD_DAYS,
            page_size: DEFAULT_PAGE_SIZE,
            placeholder_cover: DEFAULT_PLACEHOLDER_COVER.to_string(),
            social_login_max_polls: DEFAULT_SOCIAL_LOGIN_MAX_POLLS,
            seed_defaults: true,
            repair_seed_books: true,
        }
    }
}

impl CatalogConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_loan_period_days(mut self, days: u32) -> Self {
        self.loan_period_days = days;
        self
    }

    /// Page size is clamped to at least one book per page.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    pub fn with_placeholder_cover(mut self, cover: impl Into<String>) -> Self {
        self.placeholder_cover = cover.into();
        self
    }

    pub fn with_social_login_max_polls(mut self, polls: u32) -> Self {
        self.social_login_max_polls = polls;
        self
    }

    pub fn with_seed_defaults(mut self, seed: bool) -> Self {
        self.seed_defaults = seed;
        self
    }

    pub fn with_repair_seed_books(mut self, repair: bool) -> Self {
        self.repair_seed_books = repair;
        self
    }
}
