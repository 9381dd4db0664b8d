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

use crate::abi::ContractAbi;
use crate::error::{FlowError, FlowResult};
use horn::{parse_program, Clause, Database, Term};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("valid regex"));
static HEX_ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("valid regex"));

/// A loaded, immutable flow program.
#[derive(Debug, Clone)]
pub struct Program {
    db: Arc<Database>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contract {
    pub name: String,
    pub address: String,
    pub abi: ContractAbi,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Oracle {
    pub name: String,
    pub permission: String,
    pub base_url: String,
}

/// Replaces `{{name}}` placeholders. Hex addresses are lowercased so that
/// checksummed and plain spellings load identically.
pub fn substitute<I, K, V>(source: &str, substitutions: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let values: HashMap<String, String> = substitutions
        .into_iter()
        .map(|(key, value)| {
            let value = value.as_ref();
            let value = if HEX_ADDRESS_RE.is_match(value) {
                value.to_lowercase()
            } else {
                value.to_string()
            };
            (key.as_ref().to_string(), value)
        })
        .collect();
    PLACEHOLDER_RE
        .replace_all(source, |caps: &Captures<'_>| match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => {
                warn!(placeholder = &caps[1], "Unreplaced program placeholder");
                caps[0].to_string()
            }
        })
        .into_owned()
}

impl Program {
    pub fn load<I, K, V>(source: &str, substitutions: I) -> FlowResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let text = substitute(source, substitutions);
        let db = parse_program(&text)?;
        debug!(
            prompt_clauses = db.clauses("prompt", 0).len(),
            "Program loaded"
        );
        Ok(Self { db: Arc::new(db) })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn prompt_clauses(&self) -> &[Arc<Clause>] {
        self.db.clauses("prompt", 0)
    }

    pub fn contract(&self, name: &str) -> FlowResult<Contract> {
        let address = self
            .fact_value("address", name)
            .and_then(|term| term.text())
            .ok_or_else(|| FlowError::UnknownContract(name.to_string()))?;
        let abi = self
            .fact_value("abi", name)
            .ok_or_else(|| FlowError::UnknownContract(name.to_string()))?;
        Ok(Contract {
            name: name.to_string(),
            address: address.to_lowercase(),
            abi: ContractAbi::parse(&abi)?,
        })
    }

    pub fn oracle(&self, name: &str) -> FlowResult<Oracle> {
        self.db
            .clauses("oracle", 3)
            .iter()
            .filter(|clause| is_fact(clause))
            .find(|clause| clause.head.args()[0].as_atom() == Some(name))
            .and_then(|clause| {
                let args = clause.head.args();
                Some(Oracle {
                    name: name.to_string(),
                    permission: args[1].text()?,
                    base_url: args[2].text()?,
                })
            })
            .ok_or_else(|| FlowError::UnknownOracle(name.to_string()))
    }

    fn fact_value(&self, predicate: &str, name: &str) -> Option<Term> {
        self.db
            .clauses(predicate, 2)
            .iter()
            .filter(|clause| is_fact(clause))
            .find(|clause| clause.head.args()[0].as_atom() == Some(name))
            .map(|clause| clause.head.args()[1].clone())
    }
}

fn is_fact(clause: &Clause) -> bool {
    clause.body.as_atom() == Some("true") && clause.head.is_ground()
}
