// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Workflow settings.
//!
//! Defaults can be overridden from the environment (or a `.env` file):
//!
//! | Variable | Default |
//! |----------|---------|
//! | `RENTAL_RECEIPT_PREFIX` | `RCP` |
//! | `RENTAL_HISTORY_PAGE_SIZE` | `20` |
//! | `RENTAL_HISTORY_MAX_PAGE_SIZE` | `100` |
//! | `RENTAL_PROJECTION_MAX_MONTHS` | `24` |
//! | `RENTAL_WATER_TRAILING_MONTHS` | `3` |

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{key} must be at least 1")]
    Zero { key: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub receipt_prefix: String,
    pub history_page_size: usize,
    pub history_max_page_size: usize,
    pub projection_max_months: u32,
    pub water_trailing_months: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            receipt_prefix: "RCP".to_string(),
            history_page_size: 20,
            history_max_page_size: 100,
            projection_max_months: 24,
            water_trailing_months: 3,
        }
    }
}

impl WorkflowConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup; missing keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            receipt_prefix: lookup("RENTAL_RECEIPT_PREFIX")
                .filter(|p| !p.trim().is_empty())
                .unwrap_or(defaults.receipt_prefix),
            history_page_size: parse(&lookup, "RENTAL_HISTORY_PAGE_SIZE")?
                .unwrap_or(defaults.history_page_size),
            history_max_page_size: parse(&lookup, "RENTAL_HISTORY_MAX_PAGE_SIZE")?
                .unwrap_or(defaults.history_max_page_size),
            projection_max_months: parse(&lookup, "RENTAL_PROJECTION_MAX_MONTHS")?
                .unwrap_or(defaults.projection_max_months),
            water_trailing_months: parse(&lookup, "RENTAL_WATER_TRAILING_MONTHS")?
                .unwrap_or(defaults.water_trailing_months),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.history_page_size == 0 {
            return Err(ConfigError::Zero {
                key: "RENTAL_HISTORY_PAGE_SIZE",
            });
        }
        if self.history_max_page_size == 0 {
            return Err(ConfigError::Zero {
                key: "RENTAL_HISTORY_MAX_PAGE_SIZE",
            });
        }
        if self.water_trailing_months == 0 {
            return Err(ConfigError::Zero {
                key: "RENTAL_WATER_TRAILING_MONTHS",
            });
        }
        Ok(())
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| {
            value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key,
                value: value.clone(),
            })
        })
        .transpose()
}
