// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use crate::error::{FlowError, FlowResult};
use horn::Limits;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Inference budget for a single resolution.
    pub max_steps: u64,
    /// Upper bound on solutions enumerated per `prompt` clause.
    pub max_solutions: usize,
    /// Input names whose ETH amounts are converted to wei.
    pub wei_inputs: Vec<String>,
    pub default_http_scheme: String,
    pub effect_channel_capacity: usize,
    pub strict_unknown: bool,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_steps: 200_000,
            max_solutions: 64,
            wei_inputs: vec!["weth".to_string()],
            default_http_scheme: "https".to_string(),
            effect_channel_capacity: 256,
            strict_unknown: false,
        }
    }
}

impl FlowConfig {
    pub fn from_toml_str(text: &str) -> FlowResult<Self> {
        let config: FlowConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `HYPERFLOW_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    pub fn apply_env(self) -> Self {
        Self {
            max_steps: std::env::var("HYPERFLOW_MAX_STEPS")
                .unwrap_or_else(|_| self.max_steps.to_string())
                .parse()
                .unwrap_or(self.max_steps),
            max_solutions: std::env::var("HYPERFLOW_MAX_SOLUTIONS")
                .unwrap_or_else(|_| self.max_solutions.to_string())
                .parse()
                .unwrap_or(self.max_solutions),
            wei_inputs: std::env::var("HYPERFLOW_WEI_INPUTS")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or(self.wei_inputs),
            default_http_scheme: std::env::var("HYPERFLOW_HTTP_SCHEME")
                .unwrap_or(self.default_http_scheme),
            effect_channel_capacity: std::env::var("HYPERFLOW_EFFECT_CAPACITY")
                .unwrap_or_else(|_| self.effect_channel_capacity.to_string())
                .parse()
                .unwrap_or(self.effect_channel_capacity),
            strict_unknown: std::env::var("HYPERFLOW_STRICT_UNKNOWN")
                .map(|flag| matches!(flag.as_str(), "1" | "true" | "yes"))
                .unwrap_or(self.strict_unknown),
        }
    }

    pub fn validate(&self) -> FlowResult<()> {
        if self.max_steps == 0 {
            return Err(FlowError::Config("max_steps must be positive".to_string()));
        }
        if self.max_solutions == 0 {
            return Err(FlowError::Config("max_solutions must be positive".to_string()));
        }
        if self.effect_channel_capacity == 0 {
            return Err(FlowError::Config(
                "effect_channel_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_steps: self.max_steps,
            max_solutions: Some(self.max_solutions),
            strict_unknown: self.strict_unknown,
        }
    }

    pub fn is_wei_input(&self, name: &str) -> bool {
        self.wei_inputs.iter().any(|candidate| candidate == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = FlowConfig::from_toml_str("max_steps = 5000\nwei_inputs = [\"amount\"]\n").unwrap();
        assert_eq!(config.max_steps, 5000);
        assert!(config.is_wei_input("amount"));
        assert!(!config.is_wei_input("weth"));
        assert_eq!(config.default_http_scheme, "https");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            FlowConfig::from_toml_str("max_solutions = 0"),
            Err(FlowError::Config(_))
        ));
        assert!(matches!(
            FlowConfig::from_toml_str("max_steps = \"lots\""),
            Err(FlowError::Config(_))
        ));
    }

    #[test]
    fn test_limits() {
        let limits = FlowConfig::default().limits();
        assert_eq!(limits.max_steps, 200_000);
        assert_eq!(limits.max_solutions, Some(64));
        assert!(!limits.strict_unknown);
    }
}
