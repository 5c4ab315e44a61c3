// SPDX-License-Identifier: MIT

//! Engine configuration from environment variables
//!
//! | Variable | Default |
//! |---|---|
//! | `CONCIERGE_TOOL_TIMEOUT_SECS` | `30` |
//! | `CONCIERGE_APP_NAME` | `Concierge` |
//! | `CONCIERGE_APP_DESCRIPTION` | empty |
//! | `CONCIERGE_PRESENTATION` | `standard` |

use std::time::Duration;

use super::render::Presentation;
use crate::model::error::ConfigError;

pub const TOOL_TIMEOUT_VAR: &str = "CONCIERGE_TOOL_TIMEOUT_SECS";
pub const APP_NAME_VAR: &str = "CONCIERGE_APP_NAME";
pub const APP_DESCRIPTION_VAR: &str = "CONCIERGE_APP_DESCRIPTION";
pub const PRESENTATION_VAR: &str = "CONCIERGE_PRESENTATION";

const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Upper bound for a single tool call
    pub tool_timeout: Duration,
    /// Name shown in the handshake message
    pub app_name: String,
    pub app_description: String,
    /// Context rendered around each reply
    pub presentation: Presentation,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tool_timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
            app_name: "Concierge".to_string(),
            app_description: String::new(),
            presentation: Presentation::default(),
        }
    }
}

impl EngineConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary lookup function
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(TOOL_TIMEOUT_VAR) {
            let secs: u64 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidValue {
                    key: TOOL_TIMEOUT_VAR.to_string(),
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?;
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: TOOL_TIMEOUT_VAR.to_string(),
                    value: raw,
                    reason: "timeout must be at least one second".to_string(),
                });
            }
            config.tool_timeout = Duration::from_secs(secs);
        }
        if let Some(name) = lookup(APP_NAME_VAR) {
            config.app_name = name;
        }
        if let Some(description) = lookup(APP_DESCRIPTION_VAR) {
            config.app_description = description;
        }
        if let Some(raw) = lookup(PRESENTATION_VAR) {
            config.presentation = raw.parse().map_err(|reason| ConfigError::InvalidValue {
                key: PRESENTATION_VAR.to_string(),
                value: raw.clone(),
                reason,
            })?;
        }

        Ok(config)
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_presentation(mut self, presentation: Presentation) -> Self {
        self.presentation = presentation;
        self
    }
}
