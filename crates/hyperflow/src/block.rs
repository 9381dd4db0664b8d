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

//! Per-session state: account, block number, call caches and the context
//! store read and written by `get/2` and `set/2`.

use crate::convert::json_field;
use crate::error::{FlowError, FlowResult};
use crate::hooks::{BlockView, HttpResponse};
use alloy_dyn_abi::DynSolValue;
use horn::Term;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

/// Digest identifying a read-only contract call: the contract address, the
/// canonical signature and the ABI encoding of the arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CallKey(String);

impl CallKey {
    pub fn new(address: &str, signature: &str, args: &[DynSolValue]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(address.to_lowercase().as_bytes());
        hasher.update(b"|");
        hasher.update(signature.as_bytes());
        hasher.update(b"|");
        hasher.update(DynSolValue::Tuple(args.to_vec()).abi_encode_params());
        CallKey(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub call_hits: u64,
    pub call_misses: u64,
    pub http_hits: u64,
    pub http_misses: u64,
    /// Stored call results across all block numbers.
    pub entries: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Leaf(Term),
    Branch(BTreeMap<String, Slot>),
}

impl Slot {
    fn to_term(&self) -> Term {
        match self {
            Slot::Leaf(term) => term.clone(),
            Slot::Branch(children) => {
                let pairs = children
                    .iter()
                    .map(|(key, slot)| Term::compound("-", vec![Term::atom(key), slot.to_term()]))
                    .collect::<Vec<_>>();
                Term::compound("json", vec![Term::list(pairs)])
            }
        }
    }
}

pub const INPUT_ROOT: &str = "input";

#[derive(Debug, Clone)]
pub struct Block {
    account: String,
    number: u64,
    calls: HashMap<(u64, CallKey), Vec<Value>>,
    http: HashMap<String, HttpResponse>,
    context: BTreeMap<String, Slot>,
    stats: CacheStats,
}

impl Block {
    pub fn new(account: impl Into<String>, number: u64) -> Self {
        Self {
            account: account.into().to_lowercase(),
            number,
            calls: HashMap::new(),
            http: HashMap::new(),
            context: BTreeMap::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    /// Entries cached under other numbers stay stored but are not visible.
    pub fn set_number(&mut self, number: u64) {
        self.number = number;
    }

    pub fn view(&self) -> BlockView {
        BlockView {
            account: self.account.clone(),
            number: self.number,
        }
    }

    pub fn cached_call(&mut self, key: &CallKey) -> Option<Vec<Value>> {
        match self.calls.get(&(self.number, key.clone())) {
            Some(values) => {
                self.stats.call_hits += 1;
                trace!(key = key.as_str(), number = self.number, "Call cache hit");
                Some(values.clone())
            }
            None => {
                self.stats.call_misses += 1;
                None
            }
        }
    }

    pub fn store_call(&mut self, key: CallKey, values: Vec<Value>) {
        self.calls.insert((self.number, key), values);
        self.stats.entries = self.calls.len();
    }

    pub fn cached_http(&mut self, url: &str) -> Option<HttpResponse> {
        match self.http.get(url) {
            Some(response) => {
                self.stats.http_hits += 1;
                Some(response.clone())
            }
            None => {
                self.stats.http_misses += 1;
                None
            }
        }
    }

    pub fn store_http(&mut self, url: impl Into<String>, response: HttpResponse) {
        self.http.insert(url.into(), response);
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn context_get(&self, path: &[String]) -> Option<Term> {
        match path {
            [] => None,
            [root, key] if root == "me" && key == "address" => Some(Term::atom(&self.account)),
            [root, key] if root == "block" && key == "number" => Some(Term::int(self.number)),
            [first, rest @ ..] => {
                let mut slot = self.context.get(first)?;
                for (index, key) in rest.iter().enumerate() {
                    match slot {
                        Slot::Branch(children) => slot = children.get(key)?,
                        Slot::Leaf(term) => return descend_json(term, &rest[index..]),
                    }
                }
                Some(slot.to_term())
            }
        }
    }

    /// Replaces the whole value at `path`, creating intermediate levels.
    pub fn context_set(&mut self, path: &[String], value: Term) -> FlowResult<()> {
        if is_reserved(path) {
            return Err(FlowError::InvalidArgument(format!(
                "{} is read-only",
                path.join("/")
            )));
        }
        let Some((last, parents)) = path.split_last() else {
            return Err(FlowError::InvalidArgument("empty context path".to_string()));
        };
        let mut level = &mut self.context;
        for key in parents {
            let slot = level
                .entry(key.clone())
                .or_insert_with(|| Slot::Branch(BTreeMap::new()));
            if matches!(slot, Slot::Leaf(_)) {
                *slot = Slot::Branch(BTreeMap::new());
            }
            let Slot::Branch(children) = slot else {
                return Err(FlowError::InvalidArgument(format!("cannot descend into {key}")));
            };
            level = children;
        }
        level.insert(last.clone(), Slot::Leaf(value));
        Ok(())
    }

    pub fn bind_input(&mut self, name: &str, value: Term) -> FlowResult<()> {
        self.context_set(&[INPUT_ROOT.to_string(), name.to_string()], value)
    }

    pub fn input(&self, name: &str) -> Option<Term> {
        self.context_get(&[INPUT_ROOT.to_string(), name.to_string()])
    }
}

fn is_reserved(path: &[String]) -> bool {
    match path {
        [root] => root == "me" || root == "block",
        [root, key] => (root == "me" && key == "address") || (root == "block" && key == "number"),
        _ => false,
    }
}

fn descend_json(term: &Term, path: &[String]) -> Option<Term> {
    path.iter()
        .try_fold(term.clone(), |current, key| json_field(&current, key))
}

/// Splits `a/b/c`, a single atom, or a list of atoms into path segments.
pub fn path_segments(term: &Term) -> FlowResult<Vec<String>> {
    let invalid = || FlowError::InvalidArgument(format!("invalid context path {term}"));
    if let Some(items) = term.list_items() {
        if items.is_empty() {
            return Err(invalid());
        }
        return items.iter().map(|item| item.text().ok_or_else(invalid)).collect();
    }
    let mut segments = Vec::new();
    let mut current = term;
    while current.is_functor("/", 2) {
        segments.push(current.args()[1].text().ok_or_else(invalid)?);
        current = &current.args()[0];
    }
    segments.push(current.text().ok_or_else(invalid)?);
    segments.reverse();
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use serde_json::json;

    fn path(text: &str) -> Vec<String> {
        text.split('/').map(str::to_string).collect()
    }

    fn uint(value: u64) -> DynSolValue {
        DynSolValue::Uint(U256::from(value), 256)
    }

    #[test]
    fn test_call_keys_are_deterministic() {
        let a = CallKey::new("0xAA", "f(uint256)", &[uint(1)]);
        let b = CallKey::new("0xaa", "f(uint256)", &[uint(1)]);
        let c = CallKey::new("0xaa", "f(uint256)", &[uint(2)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);

        let max = CallKey::new("0xaa", "f(uint256)", &[DynSolValue::Uint(U256::MAX, 256)]);
        let below = CallKey::new(
            "0xaa",
            "f(uint256)",
            &[DynSolValue::Uint(U256::MAX - U256::from(1u8), 256)],
        );
        assert_ne!(max, below);
    }

    #[test]
    fn test_cache_is_scoped_by_block_number() {
        let mut block = Block::new("0xabc", 10);
        let key = CallKey::new("0xaa", "f()", &[]);
        assert!(block.cached_call(&key).is_none());
        block.store_call(key.clone(), vec![json!(1)]);
        assert_eq!(block.cached_call(&key), Some(vec![json!(1)]));

        block.set_number(20);
        assert!(block.cached_call(&key).is_none());
        assert_eq!(block.stats().entries, 1);

        block.set_number(10);
        assert_eq!(block.cached_call(&key), Some(vec![json!(1)]));
        let stats = block.stats();
        assert_eq!((stats.call_hits, stats.call_misses), (2, 2));
    }

    #[test]
    fn test_context_paths() {
        let mut block = Block::new("0xABC", 7);
        assert_eq!(block.context_get(&path("me/address")), Some(Term::atom("0xabc")));
        assert_eq!(block.context_get(&path("block/number")), Some(Term::int(7)));
        assert!(block.context_set(&path("block/number"), Term::int(1)).is_err());

        assert!(block.context_get(&path("user/name")).is_none());
        block.context_set(&path("user/name"), Term::atom("ada")).unwrap();
        block.context_set(&path("user/age"), Term::int(36)).unwrap();
        assert_eq!(block.context_get(&path("user/name")), Some(Term::atom("ada")));
        assert_eq!(
            block.context_get(&path("user")).unwrap().to_string(),
            "json([age-36,name-ada])"
        );

        block.context_set(&path("user"), Term::atom("gone")).unwrap();
        assert!(block.context_get(&path("user/name")).is_none());
        assert_eq!(block.context_get(&path("user")), Some(Term::atom("gone")));
    }

    #[test]
    fn test_reads_descend_into_json_leaves() {
        let mut block = Block::new("0xabc", 1);
        let response = crate::convert::json_to_term(&json!({"eth": {"usd": 3100}}));
        block.context_set(&path("prices"), response).unwrap();
        assert_eq!(block.context_get(&path("prices/eth/usd")), Some(Term::int(3100)));
        assert!(block.context_get(&path("prices/btc/usd")).is_none());
    }

    #[test]
    fn test_path_segments() {
        let term = Term::compound(
            "/",
            vec![Term::compound("/", vec![Term::atom("a"), Term::atom("b")]), Term::int(3)],
        );
        assert_eq!(path_segments(&term).unwrap(), vec!["a", "b", "3"]);
        assert_eq!(path_segments(&Term::atom("a")).unwrap(), vec!["a"]);
        assert!(path_segments(&Term::Var(0)).is_err());
    }
}
