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

#![allow(dead_code)]

use async_trait::async_trait;
use hyperflow::{
    CallFnRequest, CallOutcome, Flow, FlowConfig, FlowHooks, HookError, HttpRequest,
    HttpResponse, PendingTransaction, TxReceipt,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ALICE: &str = "0x00000000000000000000000000000000000a11ce";
pub const BOB: &str = "0x0000000000000000000000000000000000000b0b";
pub const CONTRACT: &str = "0x000000000000000000000000000000000000c0de";

pub const GUESTBOOK: &str = include_str!("../fixtures/guestbook.pl");

/// 2^256 - 1, the unlimited ERC-20 allowance.
pub const MAX_UINT256: &str =
    "115792089237316195423570985008687907853269984665640564039457584007913129639935";

#[derive(Debug, Clone)]
pub struct Signer {
    pub address: String,
}

impl Signer {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_lowercase(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub author: String,
    pub wei: String,
    pub message: String,
}

#[derive(Debug, Default)]
struct Chain {
    next_id: u64,
    books: HashMap<String, u64>,
    entries: HashMap<u64, Vec<Entry>>,
    tx_count: u64,
    calls: HashMap<String, usize>,
    requests: Vec<CallFnRequest>,
    http_calls: Vec<String>,
}

/// In-memory guestbook contract with call accounting.
#[derive(Debug, Clone, Default)]
pub struct MockChain {
    chain: Arc<Mutex<Chain>>,
    delay: Option<Duration>,
    fail_transactions: bool,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every hook call sleeps first, so concurrent operations overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing_transactions(mut self) -> Self {
        self.fail_transactions = true;
        self
    }

    /// Creates a guestbook outside of any flow, as another client would.
    pub fn create_for(&self, owner: &str) -> u64 {
        let mut chain = self.chain.lock().unwrap();
        chain.next_id += 1;
        let id = chain.next_id;
        chain.books.insert(owner.to_lowercase(), id);
        id
    }

    pub fn entries(&self, id: u64) -> Vec<Entry> {
        self.chain.lock().unwrap().entries.get(&id).cloned().unwrap_or_default()
    }

    pub fn calls(&self, signature: &str) -> usize {
        self.chain.lock().unwrap().calls.get(signature).copied().unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<CallFnRequest> {
        self.chain.lock().unwrap().requests.clone()
    }

    pub fn http_calls(&self) -> Vec<String> {
        self.chain.lock().unwrap().http_calls.clone()
    }

    fn transaction(&self, chain: &mut Chain) -> CallOutcome {
        chain.tx_count += 1;
        CallOutcome::Pending(Box::new(MockTransaction {
            id: format!("0xtx{}", chain.tx_count),
            fail: self.fail_transactions,
        }))
    }
}

struct MockTransaction {
    id: String,
    fail: bool,
}

#[async_trait]
impl PendingTransaction for MockTransaction {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn wait(self: Box<Self>) -> Result<TxReceipt, HookError> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if self.fail {
            return Err(HookError::Reverted("execution reverted".to_string()));
        }
        Ok(TxReceipt {
            id: self.id,
            block_number: None,
        })
    }
}

fn uint_arg(value: &Value) -> u64 {
    match value {
        Value::Number(number) => number.as_u64().unwrap_or(0),
        Value::String(text) => text.parse().unwrap_or(0),
        _ => 0,
    }
}

#[async_trait]
impl FlowHooks for MockChain {
    type Env = Signer;

    async fn call_fn(
        &self,
        env: &Signer,
        request: CallFnRequest,
    ) -> Result<CallOutcome, HookError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut chain = self.chain.lock().unwrap();
        *chain.calls.entry(request.signature.clone()).or_default() += 1;
        chain.requests.push(request.clone());
        let args = &request.args;
        match request.signature.as_str() {
            "guestbooks(address)" => {
                let owner = args[0].as_str().unwrap_or_default();
                let id = chain.books.get(owner).copied().unwrap_or(0);
                Ok(CallOutcome::Returned(vec![json!(id)]))
            }
            "entryCount(uint256)" => {
                let count = chain.entries.get(&uint_arg(&args[0])).map_or(0, Vec::len);
                Ok(CallOutcome::Returned(vec![json!(count)]))
            }
            "entries(uint256,uint256)" => {
                let entry = chain
                    .entries
                    .get(&uint_arg(&args[0]))
                    .and_then(|entries| entries.get(uint_arg(&args[1]) as usize))
                    .cloned()
                    .ok_or_else(|| HookError::Reverted("index out of range".to_string()))?;
                Ok(CallOutcome::Returned(vec![json!([
                    entry.author,
                    entry.wei,
                    entry.message
                ])]))
            }
            "create()" => {
                if chain.books.contains_key(&env.address) {
                    return Err(HookError::Reverted("ALREADY_CREATED".to_string()));
                }
                chain.next_id += 1;
                let id = chain.next_id;
                chain.books.insert(env.address.clone(), id);
                Ok(self.transaction(&mut chain))
            }
            "sign(uint256,string)" => {
                let id = uint_arg(&args[0]);
                if !chain.books.values().any(|book| *book == id) {
                    return Err(HookError::Reverted("NO_SUCH_GUESTBOOK".to_string()));
                }
                let entry = Entry {
                    author: env.address.clone(),
                    wei: request.value.clone().unwrap_or_else(|| "0".to_string()),
                    message: args[1].as_str().unwrap_or_default().to_string(),
                };
                chain.entries.entry(id).or_default().push(entry);
                Ok(self.transaction(&mut chain))
            }
            "allowance(address)" => Ok(CallOutcome::Returned(vec![json!(MAX_UINT256)])),
            "approve(address,uint256)" => Ok(self.transaction(&mut chain)),
            other => Err(HookError::Reverted(format!("unknown function {other}"))),
        }
    }

    async fn call_http(
        &self,
        _env: &Signer,
        request: HttpRequest,
    ) -> Result<HttpResponse, HookError> {
        self.chain.lock().unwrap().http_calls.push(request.url.clone());
        let body = if request.url.ends_with("/price") {
            Some(json!({"eth": {"usd": 3100}}))
        } else {
            None
        };
        Ok(HttpResponse {
            status: 200,
            headers: BTreeMap::new(),
            body,
        })
    }
}

pub fn load(source: &str, chain: &MockChain) -> Flow<MockChain> {
    load_with(source, chain, FlowConfig::default())
}

pub fn load_with(source: &str, chain: &MockChain, config: FlowConfig) -> Flow<MockChain> {
    Flow::load(source, [("contractAddr", CONTRACT)], chain.clone(), config)
        .expect("program loads")
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
