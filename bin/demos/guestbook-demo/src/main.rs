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

mod chain;
mod config;

use anyhow::{anyhow, Result};
use chain::{MemoryChain, Wallet};
use clap::{Parser, Subcommand};
use config::{ConfigLoader, DemoConfig};
use hyperflow::{ActionRef, Effect, Flow, Prompt};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/config");
const DEFAULT_PROGRAM: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/programs/guestbook.pl");

#[derive(Parser, Debug)]
#[command(
    name = "guestbook-demo",
    version,
    about = "Drives the guestbook flow against an in-memory chain"
)]
struct Cli {
    #[arg(long, default_value = DEFAULT_CONFIG_DIR)]
    config_dir: PathBuf,

    #[arg(long, default_value = DEFAULT_PROGRAM)]
    program: PathBuf,

    /// Emit prompts and effects as JSON lines.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Print the prompts for a fresh session.
    Prompts,
    /// Create a guestbook, open it and sign it.
    Walkthrough {
        #[arg(long, default_value = "0.05")]
        tip: String,
        #[arg(long, default_value = "Hello from the demo")]
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::new(&cli.config_dir)
        .load_demo_config()
        .map_err(|e| anyhow!("Failed to load demo configuration: {}", e))?;
    let source = std::fs::read_to_string(&cli.program)
        .map_err(|e| anyhow!("Failed to read {}: {}", cli.program.display(), e))?;

    let chain = MemoryChain::new(&config.chain);
    let flow = Flow::load(
        &source,
        [
            ("contractAddr", config.chain.contract_address.as_str()),
            ("priceApi", config.oracle.base_url.as_str()),
        ],
        chain,
        config.flow.clone(),
    )?;
    info!(program = %cli.program.display(), "Guestbook program loaded");

    let printer = Printer { json: cli.json };
    match cli.command.unwrap_or(Commands::Walkthrough {
        tip: "0.05".to_string(),
        message: "Hello from the demo".to_string(),
    }) {
        Commands::Prompts => {
            let prompts = flow
                .init(&config.chain.account, config.chain.start_block, wallet(&config))
                .await?;
            printer.prompts(&prompts)?;
        }
        Commands::Walkthrough { tip, message } => {
            walkthrough(&flow, &config, &printer, &tip, &message).await?;
        }
    }
    Ok(())
}

fn wallet(config: &DemoConfig) -> Wallet {
    Wallet {
        address: config.chain.account.to_lowercase(),
    }
}

async fn walkthrough(
    flow: &Flow<MemoryChain>,
    config: &DemoConfig,
    printer: &Printer,
    tip: &str,
    message: &str,
) -> Result<()> {
    let mut outcomes = flow.subscribe();
    let mut block = config.chain.start_block;
    let prompts = flow
        .init(&config.chain.account, block, wallet(config))
        .await?;
    printer.prompts(&prompts)?;

    let create = button(flow, "Create Guestbook").await?;
    let execution = flow.execute(&create).await?;
    printer.effects(&execution.effects)?;

    let confirmation = tokio::time::timeout(Duration::from_secs(5), outcomes.recv()).await??;
    printer.effects(std::slice::from_ref(&confirmation))?;

    block += 1;
    flow.set_block_number(block).await?;
    let open = button(flow, "Open My Guestbook").await?;
    flow.execute(&open).await?;
    printer.prompts(&flow.get_prompts().await?)?;

    for (name, value) in [("tip", tip), ("message", message)] {
        let result = flow.handle_input(name, value).await?;
        if !result.is_accepted() {
            warn!(input = name, result = ?result, "Input not accepted");
        }
    }
    let submit = button(flow, "Submit").await?;
    let execution = flow.execute(&submit).await?;
    printer.effects(&execution.effects)?;

    let confirmation = tokio::time::timeout(Duration::from_secs(5), outcomes.recv()).await??;
    printer.effects(std::slice::from_ref(&confirmation))?;

    block += 1;
    flow.set_block_number(block).await?;
    printer.prompts(&flow.get_prompts().await?)?;

    let stats = flow.cache_stats().await?;
    info!(
        call_hits = stats.call_hits,
        call_misses = stats.call_misses,
        http_hits = stats.http_hits,
        cached_entries = stats.entries,
        "Walkthrough complete"
    );
    Ok(())
}

async fn button(flow: &Flow<MemoryChain>, label: &str) -> Result<ActionRef> {
    let matches = flow
        .match_prompts(&format!("button('{label}', [enabled(true)], _)"))
        .await?;
    matches
        .first()
        .and_then(|found| found.action().cloned())
        .ok_or_else(|| anyhow!("No enabled button labelled '{}'", label))
}

struct Printer {
    json: bool,
}

impl Printer {
    fn prompts(&self, prompts: &[Prompt]) -> Result<()> {
        for (index, prompt) in prompts.iter().enumerate() {
            if self.json {
                println!("{}", serde_json::to_string(prompt)?);
                continue;
            }
            println!("-- prompt {index}");
            for directive in prompt {
                println!("   {}", directive.to_term());
            }
        }
        Ok(())
    }

    fn effects(&self, effects: &[Effect]) -> Result<()> {
        for effect in effects {
            if self.json {
                println!("{}", serde_json::to_string(effect)?);
            } else {
                println!(">> {}", effect.to_term());
            }
        }
        Ok(())
    }
}
