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

//! Host predicates available to flow programs: `show/1`, `get/2`, `set/2`,
//! `call_fn/3,4`, `get_http/3`, `call_http/4`, `log/2` and `effect/1`.

use crate::abi;
use crate::block::{path_segments, Block, CallKey};
use crate::config::FlowConfig;
use crate::convert::json_to_term;
use crate::effect::Effect;
use crate::error::{FlowError, FlowResult};
use crate::hooks::{CallFnRequest, CallOutcome, FlowHooks, HttpRequest, PendingTransaction};
use crate::input::{eth_to_wei, parse_eth};
use crate::loader::Program;
use crate::logging::log_hook_call;
use async_trait::async_trait;
use horn::{EngineError, Host, Reply, Term};
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Resolving prompts: `show/1` is recorded, state changes are refused.
    Prompt,
    /// Executing an action: effects are recorded, `show/1` is ignored.
    Action,
}

pub struct FlowHost<'a, H: FlowHooks> {
    mode: Mode,
    program: &'a Program,
    block: &'a mut Block,
    hooks: &'a H,
    env: &'a H::Env,
    config: &'a FlowConfig,
    pending: Vec<Box<dyn PendingTransaction>>,
}

impl<'a, H: FlowHooks> FlowHost<'a, H> {
    pub fn new(
        mode: Mode,
        program: &'a Program,
        block: &'a mut Block,
        hooks: &'a H,
        env: &'a H::Env,
        config: &'a FlowConfig,
    ) -> Self {
        Self {
            mode,
            program,
            block,
            hooks,
            env,
            config,
            pending: Vec::new(),
        }
    }

    /// Transactions submitted during this run, awaiting confirmation.
    pub fn into_pending(self) -> Vec<Box<dyn PendingTransaction>> {
        self.pending
    }

    async fn dispatch(&mut self, goal: &Term) -> FlowResult<Reply> {
        let args = goal.args();
        match (goal.name().unwrap_or(""), args.len()) {
            ("show", 1) => Ok(match self.mode {
                Mode::Prompt => Reply::emit(goal.clone()),
                Mode::Action => Reply::succeed(),
            }),
            ("get", 2) => self.get(&args[0], &args[1]),
            ("set", 2) => self.set(&args[0], &args[1]),
            ("call_fn", 3) => {
                self.call_fn(&args[0], &args[1], &Term::nil(), &args[2])
                    .await
            }
            ("call_fn", 4) => self.call_fn(&args[0], &args[1], &args[2], &args[3]).await,
            ("get_http", 3) => {
                self.call_http(&Term::atom("get"), &args[0], &args[1], &args[2])
                    .await
            }
            ("call_http", 4) => {
                self.call_http(&args[0], &args[1], &args[2], &args[3])
                    .await
            }
            ("log", 2) | ("effect", 1) => Ok(match self.mode {
                Mode::Action if goal.name() == Some("log") => Reply::emit(goal.clone()),
                Mode::Action => Reply::emit(args[0].clone()),
                Mode::Prompt => Reply::succeed(),
            }),
            _ => Err(FlowError::Query(format!("no host predicate for {goal}"))),
        }
    }

    fn get(&self, path: &Term, var: &Term) -> FlowResult<Reply> {
        let segments = path_segments(path)?;
        Ok(match self.block.context_get(&segments) {
            Some(value) => Reply::unify(var.clone(), value),
            None => Reply::Fail,
        })
    }

    fn set(&mut self, path: &Term, value: &Term) -> FlowResult<Reply> {
        if self.mode == Mode::Prompt {
            return Err(FlowError::InvalidArgument(format!(
                "set({path}, _) is only allowed inside actions"
            )));
        }
        if !value.is_ground() {
            return Err(FlowError::InvalidArgument(format!(
                "set/2 needs a ground value for {path}, got {value}"
            )));
        }
        let segments = path_segments(path)?;
        self.block.context_set(&segments, value.clone())?;
        debug!(path = %path, "Context updated");
        Ok(Reply::succeed())
    }

    async fn call_fn(
        &mut self,
        contract: &Term,
        call: &Term,
        options: &Term,
        outputs: &Term,
    ) -> FlowResult<Reply> {
        let contract_name = contract.as_atom().ok_or_else(|| {
            FlowError::InvalidArgument(format!("call_fn/3 expects a contract name, got {contract}"))
        })?;
        let contract = self.program.contract(contract_name)?;
        let function_name = call
            .name()
            .filter(|_| call.is_callable())
            .ok_or_else(|| FlowError::InvalidArgument(format!("invalid contract call {call}")))?;
        let function = contract
            .abi
            .find(function_name, call.arity())
            .ok_or_else(|| FlowError::UnknownFunction {
                contract: contract.name.clone(),
                function: function_name.to_string(),
                arity: call.arity(),
            })?;
        let args = function.encode_args(call.args())?;
        let signature = function.signature();
        let read_only = function.mutability.is_read_only();

        if !read_only && self.mode == Mode::Prompt {
            return Err(FlowError::InvalidArgument(format!(
                "{signature} changes state and cannot run while resolving prompts"
            )));
        }

        let key = read_only.then(|| CallKey::new(&contract.address, &signature, &args));
        if let Some(key) = &key {
            if let Some(values) = self.block.cached_call(key) {
                log_hook_call("call_fn", &signature, true);
                return self.returned(function.decode_outputs(&values)?, outputs);
            }
        }

        let request = CallFnRequest {
            block: self.block.view(),
            contract: contract.name.clone(),
            address: contract.address.clone(),
            function: function.name.clone(),
            signature: signature.clone(),
            param_types: function.param_types(),
            args: args.iter().map(abi::to_json).collect(),
            return_types: function.return_types(),
            value: call_value(options)?.map(|wei| wei.to_string()),
            mutability: function.mutability,
        };
        log_hook_call("call_fn", &signature, false);
        match self.hooks.call_fn(self.env, request).await? {
            CallOutcome::Returned(values) => {
                let decoded = function.decode_outputs(&values)?;
                if let Some(key) = key {
                    self.block.store_call(key, values);
                }
                self.returned(decoded, outputs)
            }
            CallOutcome::Pending(tx) => {
                let id = tx.id();
                debug!(tx = %id, signature = %signature, "Transaction submitted");
                self.pending.push(tx);
                Ok(Reply::emit(Effect::submitted(id).to_term()).and_unify(outputs.clone(), Term::nil()))
            }
        }
    }

    fn returned(&self, decoded: Vec<Term>, outputs: &Term) -> FlowResult<Reply> {
        Ok(Reply::unify(outputs.clone(), Term::list(decoded)))
    }

    async fn call_http(
        &mut self,
        method: &Term,
        oracle: &Term,
        path: &Term,
        var: &Term,
    ) -> FlowResult<Reply> {
        let method = method.text().unwrap_or_else(|| method.to_string()).to_uppercase();
        if method != "GET" {
            return Err(FlowError::HttpMethodNotSupported { method });
        }
        let oracle_name = oracle.as_atom().ok_or_else(|| {
            FlowError::InvalidArgument(format!("expected an oracle name, got {oracle}"))
        })?;
        let oracle = self.program.oracle(oracle_name)?;
        let suffix = path
            .text()
            .ok_or_else(|| FlowError::InvalidArgument(format!("invalid oracle path {path}")))?;
        let url = self.build_url(&oracle.base_url, &suffix)?;

        let response = match self.block.cached_http(&url) {
            Some(response) => {
                log_hook_call("call_http", &url, true);
                response
            }
            None => {
                log_hook_call("call_http", &url, false);
                let request = HttpRequest {
                    method,
                    url: url.clone(),
                };
                let response = self.hooks.call_http(self.env, request).await?;
                if response.body.is_some() {
                    self.block.store_http(url, response.clone());
                }
                response
            }
        };
        let body = response
            .body
            .as_ref()
            .map_or_else(|| Term::atom("null"), json_to_term);
        let result = Term::compound("response", vec![Term::int(response.status), body]);
        Ok(Reply::unify(var.clone(), result))
    }

    fn build_url(&self, base: &str, suffix: &str) -> FlowResult<String> {
        let joined = format!("{base}{suffix}");
        let full = if joined.contains("://") {
            joined
        } else {
            format!("{}://{joined}", self.config.default_http_scheme)
        };
        Url::parse(&full)
            .map(|url| url.to_string())
            .map_err(|err| FlowError::InvalidUrl(format!("{full}: {err}")))
    }
}

/// Wei attached through `value(eth(X))`, `value(wei(X))` or `value(X)`.
fn call_value(options: &Term) -> FlowResult<Option<i128>> {
    let items = options.list_items().unwrap_or_else(|| vec![options.clone()]);
    for option in items {
        if !option.is_functor("value", 1) {
            continue;
        }
        let amount = &option.args()[0];
        let wei = if amount.is_functor("eth", 1) {
            eth_to_wei(parse_eth(&amount.args()[0])?)?
        } else {
            let raw = if amount.is_functor("wei", 1) {
                &amount.args()[0]
            } else {
                amount
            };
            match raw {
                Term::Int(value) => *value,
                Term::Atom(text) => text.parse::<i128>().map_err(|_| {
                    FlowError::InvalidArgument(format!("{raw} is not a wei amount"))
                })?,
                _ => {
                    return Err(FlowError::InvalidArgument(format!(
                        "{raw} is not a wei amount"
                    )))
                }
            }
        };
        return Ok(Some(wei));
    }
    Ok(None)
}

#[async_trait]
impl<'a, H: FlowHooks> Host for FlowHost<'a, H> {
    fn handles(&self, name: &str, arity: usize) -> bool {
        matches!(
            (name, arity),
            ("show", 1)
                | ("get", 2)
                | ("set", 2)
                | ("call_fn", 3)
                | ("call_fn", 4)
                | ("get_http", 3)
                | ("call_http", 4)
                | ("log", 2)
                | ("effect", 1)
        )
    }

    async fn call(&mut self, goal: &Term) -> Result<Reply, EngineError> {
        self.dispatch(goal).await.map_err(EngineError::from)
    }
}
