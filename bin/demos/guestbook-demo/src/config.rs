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

use anyhow::Context;
use hyperflow::FlowConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct DemoConfig {
    pub chain: ChainConfig,
    pub oracle: OracleConfig,
    #[serde(default)]
    pub flow: FlowConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    pub contract_address: String,
    pub account: String,
    pub start_block: u64,
    pub confirmation_delay_ms: u64,
    pub eth_usd: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OracleConfig {
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
        }
    }

    /// Reads `demo.toml`, then lets `GUESTBOOK_*` and `HYPERFLOW_*`
    /// environment variables override it.
    pub fn load_demo_config(&self) -> anyhow::Result<DemoConfig> {
        let path = self.config_dir.join("demo.toml");
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config: DemoConfig = toml::from_str(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        config.chain.account =
            std::env::var("GUESTBOOK_ACCOUNT").unwrap_or_else(|_| config.chain.account.clone());
        config.chain.start_block = std::env::var("GUESTBOOK_START_BLOCK")
            .unwrap_or_else(|_| config.chain.start_block.to_string())
            .parse()
            .unwrap_or(config.chain.start_block);
        config.chain.confirmation_delay_ms = std::env::var("GUESTBOOK_CONFIRMATION_DELAY_MS")
            .unwrap_or_else(|_| config.chain.confirmation_delay_ms.to_string())
            .parse()
            .unwrap_or(config.chain.confirmation_delay_ms);
        config.oracle.base_url =
            std::env::var("GUESTBOOK_PRICE_API").unwrap_or_else(|_| config.oracle.base_url.clone());
        config.flow = config.flow.apply_env();
        config.flow.validate()?;
        Ok(config)
    }
}
