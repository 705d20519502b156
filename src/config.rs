//! YAML settings.
//!
//! Every field is optional; a missing file section falls back to the
//! built-in defaults. Example:
//!
//! ```yaml
//! rss_sources:
//!   - id: ecb_press
//!     name: ECB Press Releases
//!     url: https://www.ecb.europa.eu/rss/press.html
//! retry:
//!   max_attempts: 5
//!   throttle_ms: 300
//! noise_rules:
//!   - deny: 'finance\.yahoo\.com'
//!     allow: '/news/'
//! ```

use crate::dedup::NoiseRule;
use crate::fetcher::{FetchOptions, RetryPolicy};
use crate::paywall::MarkerSniffer;
use crate::sources::gdelt::default_domains;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// One RSS or Atom feed to harvest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub id: String,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub throttle_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            throttle_ms: 300,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            throttle: Duration::from_millis(self.throttle_ms),
            ..RetryPolicy::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaywallSettings {
    pub markers: Vec<String>,
    /// Leading bytes of the page to scan.
    pub window: usize,
}

impl Default for PaywallSettings {
    fn default() -> Self {
        Self {
            markers: vec!["subscribe".to_string(), "paywall".to_string()],
            window: 6000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseRuleSettings {
    pub deny: String,
    #[serde(default)]
    pub allow: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rss_sources: Vec<FeedConfig>,
    pub user_agents: Vec<String>,
    pub timeout_secs: u64,
    pub retry: RetrySettings,
    /// Records of one source fetched at the same time.
    pub concurrency: usize,
    pub paywall: PaywallSettings,
    /// Used by `dedupe` only when noise filtering is switched on.
    pub noise_rules: Vec<NoiseRuleSettings>,
    pub gdelt_domains: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rss_sources: Vec::new(),
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120 Safari/537.36"
                    .to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X) AppleWebKit/605.1.15 Version/17 Safari/605.1.15"
                    .to_string(),
            ],
            timeout_secs: 20,
            retry: RetrySettings::default(),
            concurrency: 8,
            paywall: PaywallSettings::default(),
            noise_rules: vec![NoiseRuleSettings {
                deny: r"(?i)finance\.yahoo\.com".to_string(),
                allow: Some(r"(?i)/news/".to_string()),
            }],
            gdelt_domains: default_domains(),
        }
    }
}

impl Settings {
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions::with_timeout(Duration::from_secs(self.timeout_secs.max(1)))
    }

    pub fn paywall_policy(&self) -> MarkerSniffer {
        MarkerSniffer::new(&self.paywall.markers, self.paywall.window)
    }

    pub fn noise_rules(&self) -> Result<Vec<NoiseRule>, regex::Error> {
        self.noise_rules
            .iter()
            .map(|r| NoiseRule::new(&r.deny, r.allow.as_deref()))
            .collect()
    }
}

/// Load settings from `path`, or the defaults when no path is given.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, Box<dyn Error>> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("reading settings {}: {e}", path.display()))?;
    let settings: Settings = serde_yaml::from_str(&raw)?;
    info!(
        path = %path.display(),
        rss_sources = settings.rss_sources.len(),
        "Loaded settings"
    );
    Ok(settings)
}
