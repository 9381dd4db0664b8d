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

//! An in-memory guestbook contract standing in for a real chain.

use async_trait::async_trait;
use hyperflow::{
    CallFnRequest, CallOutcome, FlowHooks, HookError, HttpRequest, HttpResponse,
    PendingTransaction, TxReceipt,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ChainConfig;

/// The signer a session acts for.
#[derive(Debug, Clone)]
pub struct Wallet {
    pub address: String,
}

#[derive(Debug, Clone)]
struct Entry {
    author: String,
    wei: String,
    message: String,
}

#[derive(Debug, Default)]
struct Ledger {
    next_book: u64,
    books: HashMap<String, u64>,
    entries: HashMap<u64, Vec<Entry>>,
    tx_count: u64,
}

#[derive(Debug, Clone)]
pub struct MemoryChain {
    ledger: Arc<Mutex<Ledger>>,
    confirmation_delay: Duration,
    eth_usd: u64,
}

impl MemoryChain {
    pub fn new(config: &ChainConfig) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(Ledger::default())),
            confirmation_delay: Duration::from_millis(config.confirmation_delay_ms),
            eth_usd: config.eth_usd,
        }
    }

    fn ledger(&self) -> Result<std::sync::MutexGuard<'_, Ledger>, HookError> {
        self.ledger
            .lock()
            .map_err(|_| HookError::Transport("ledger lock poisoned".to_string()))
    }

    fn submit(&self, ledger: &mut Ledger) -> CallOutcome {
        ledger.tx_count += 1;
        let id = format!("0x{:064x}", ledger.tx_count);
        info!(tx = %id, "Transaction submitted");
        CallOutcome::Pending(Box::new(MemoryTransaction {
            id,
            delay: self.confirmation_delay,
        }))
    }
}

struct MemoryTransaction {
    id: String,
    delay: Duration,
}

#[async_trait]
impl PendingTransaction for MemoryTransaction {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn wait(self: Box<Self>) -> Result<TxReceipt, HookError> {
        tokio::time::sleep(self.delay).await;
        Ok(TxReceipt {
            id: self.id,
            block_number: None,
        })
    }
}

fn uint_arg(args: &[Value], index: usize) -> Result<u64, HookError> {
    let parsed = match args.get(index) {
        Some(Value::Number(number)) => number.as_u64(),
        Some(Value::String(text)) => text.parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| HookError::Rejected(format!("argument {index} is not a uint")))
}

fn text_arg(args: &[Value], index: usize) -> Result<String, HookError> {
    args.get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| HookError::Rejected(format!("argument {index} is not a string")))
}

#[async_trait]
impl FlowHooks for MemoryChain {
    type Env = Wallet;

    async fn call_fn(
        &self,
        wallet: &Wallet,
        request: CallFnRequest,
    ) -> Result<CallOutcome, HookError> {
        debug!(
            signature = %request.signature,
            block = request.block.number,
            mutability = request.mutability.keyword(),
            "Contract call"
        );
        let mut ledger = self.ledger()?;
        let args = &request.args;
        match request.signature.as_str() {
            "guestbooks(address)" => {
                let owner = text_arg(args, 0)?.to_lowercase();
                let id = ledger.books.get(&owner).copied().unwrap_or(0);
                Ok(CallOutcome::Returned(vec![json!(id)]))
            }
            "entryCount(uint256)" => {
                let count = ledger.entries.get(&uint_arg(args, 0)?).map_or(0, Vec::len);
                Ok(CallOutcome::Returned(vec![json!(count)]))
            }
            "entries(uint256,uint256)" => {
                let index = usize::try_from(uint_arg(args, 1)?)
                    .map_err(|_| HookError::Reverted("index out of range".to_string()))?;
                let entry = ledger
                    .entries
                    .get(&uint_arg(args, 0)?)
                    .and_then(|entries| entries.get(index))
                    .cloned()
                    .ok_or_else(|| HookError::Reverted("index out of range".to_string()))?;
                Ok(CallOutcome::Returned(vec![json!([
                    entry.author,
                    entry.wei,
                    entry.message
                ])]))
            }
            "create()" => {
                if ledger.books.contains_key(&wallet.address) {
                    return Err(HookError::Reverted("ALREADY_CREATED".to_string()));
                }
                ledger.next_book += 1;
                let id = ledger.next_book;
                ledger.books.insert(wallet.address.clone(), id);
                Ok(self.submit(&mut ledger))
            }
            "sign(uint256,string)" => {
                let id = uint_arg(args, 0)?;
                if !ledger.books.values().any(|book| *book == id) {
                    return Err(HookError::Reverted("NO_SUCH_GUESTBOOK".to_string()));
                }
                let entry = Entry {
                    author: wallet.address.clone(),
                    wei: request.value.clone().unwrap_or_else(|| "0".to_string()),
                    message: text_arg(args, 1)?,
                };
                ledger.entries.entry(id).or_default().push(entry);
                Ok(self.submit(&mut ledger))
            }
            other => Err(HookError::Reverted(format!("unknown function {other}"))),
        }
    }

    async fn call_http(
        &self,
        _wallet: &Wallet,
        request: HttpRequest,
    ) -> Result<HttpResponse, HookError> {
        debug!(url = %request.url, "Oracle request");
        if request.url.ends_with("/eth") {
            return Ok(HttpResponse {
                status: 200,
                headers: BTreeMap::from([(
                    "content-type".to_string(),
                    "application/json".to_string(),
                )]),
                body: Some(json!({ "usd": self.eth_usd })),
            });
        }
        Ok(HttpResponse {
            status: 404,
            headers: BTreeMap::new(),
            body: None,
        })
    }
}
