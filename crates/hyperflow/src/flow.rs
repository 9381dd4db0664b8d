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

//! The flow instance: one program, one session, every operation serialized
//! behind the instance mutex.

use crate::block::{Block, CacheStats};
use crate::config::FlowConfig;
use crate::directive::{input_names, ActionRef, Directive, Prompt};
use crate::effect::Effect;
use crate::error::{FlowError, FlowResult};
use crate::executor::{ActionExecutor, Execution};
use crate::hooks::{FlowHooks, PendingTransaction};
use crate::input::{coerce, InputResult};
use crate::loader::Program;
use crate::logging::{log_effect, log_error, log_flow_event};
use crate::resolver::PromptResolver;
use horn::{unify_terms, Query, Resolver, SldResolver, Term};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, instrument};

struct Session<E> {
    block: Block,
    env: E,
}

struct FlowState<E> {
    program: Program,
    session: Option<Session<E>>,
    prompts: Vec<Prompt>,
    stale: bool,
    effect_log: Vec<Term>,
}

/// A directive that matched a query, with the query's named variables.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptMatch {
    pub bindings: Vec<(String, Term)>,
    pub directive: Directive,
}

impl PromptMatch {
    pub fn binding(&self, name: &str) -> Option<&Term> {
        self.bindings
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, term)| term)
    }

    /// The action of a matched button.
    pub fn action(&self) -> Option<&ActionRef> {
        match &self.directive {
            Directive::Button { action, .. } => Some(action),
            _ => None,
        }
    }
}

pub struct Flow<H: FlowHooks> {
    state: Arc<Mutex<FlowState<H::Env>>>,
    hooks: Arc<H>,
    effects: broadcast::Sender<Effect>,
    config: Arc<FlowConfig>,
    resolver: Arc<dyn Resolver>,
}

impl<H: FlowHooks> Clone for Flow<H> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            hooks: Arc::clone(&self.hooks),
            effects: self.effects.clone(),
            config: Arc::clone(&self.config),
            resolver: Arc::clone(&self.resolver),
        }
    }
}

impl<H: FlowHooks> Flow<H> {
    /// Loads a program into an uninitialized flow.
    pub fn load<I, K, V>(
        source: &str,
        substitutions: I,
        hooks: H,
        config: FlowConfig,
    ) -> FlowResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        config.validate()?;
        let program = Program::load(source, substitutions)?;
        let (effects, _) = broadcast::channel(config.effect_channel_capacity);
        log_flow_event(
            "loaded",
            json!({ "prompt_clauses": program.prompt_clauses().len() }),
        );
        Ok(Self {
            state: Arc::new(Mutex::new(FlowState {
                program,
                session: None,
                prompts: Vec::new(),
                stale: true,
                effect_log: Vec::new(),
            })),
            hooks: Arc::new(hooks),
            effects,
            config: Arc::new(config),
            resolver: Arc::new(SldResolver),
        })
    }

    /// Swaps the resolution engine.
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    #[instrument(level = "info", skip(self, env), fields(account = %account))]
    pub async fn init(
        &self,
        account: &str,
        block_number: u64,
        env: H::Env,
    ) -> FlowResult<Vec<Prompt>> {
        let mut state = self.state.lock().await;
        state.session = Some(Session {
            block: Block::new(account, block_number),
            env,
        });
        state.effect_log.clear();
        state.stale = true;
        info!(block_number = block_number, "Flow initialized");
        self.refresh(&mut state).await?;
        Ok(state.prompts.clone())
    }

    pub async fn get_prompts(&self) -> FlowResult<Vec<Prompt>> {
        let mut state = self.state.lock().await;
        self.refresh(&mut state).await?;
        Ok(state.prompts.clone())
    }

    /// Binds a value for an input shown in the latest prompts. Does not run
    /// any action; the next resolution observes the binding.
    pub async fn handle_input(&self, name: &str, value: impl Into<Value>) -> FlowResult<InputResult> {
        let value = value.into();
        let mut state = self.state.lock().await;
        self.refresh(&mut state).await?;
        let Some(kind) = input_names(&state.prompts)
            .into_iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, kind)| kind)
        else {
            debug!(input = name, "Input rejected: not pending");
            return Ok(InputResult::Rejected {
                reason: format!("no pending input named {name}"),
            });
        };
        let coerced = match coerce(kind, &value, self.config.is_wei_input(name)) {
            Ok(coerced) => coerced,
            Err(err) => {
                debug!(input = name, error = %err, "Input rejected: invalid value");
                return Ok(InputResult::Rejected {
                    reason: err.to_string(),
                });
            }
        };
        let session = state
            .session
            .as_mut()
            .ok_or(FlowError::NotInitialized("handle_input"))?;
        session.block.bind_input(name, coerced.term)?;
        state.stale = true;
        log_flow_event("input", json!({ "name": name, "kind": kind.as_str() }));
        Ok(InputResult::Accepted {
            value: coerced.value,
        })
    }

    /// Runs an action to its first solution and returns its effects.
    /// Transaction confirmations arrive later through [`Flow::subscribe`].
    pub async fn execute(&self, action: &ActionRef) -> FlowResult<Execution> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let session = state
            .session
            .as_mut()
            .ok_or(FlowError::NotInitialized("execute"))?;
        let executor = ActionExecutor {
            engine: self.resolver.as_ref(),
            program: &state.program,
            hooks: self.hooks.as_ref(),
            env: &session.env,
            config: &self.config,
        };
        let executed = executor.execute(&mut session.block, action).await;
        state.stale = true;
        state.effect_log.extend(executed.log);
        for tx in executed.pending {
            self.watch_transaction(tx);
        }
        executed.result.inspect_err(|err| log_error("execute", err))
    }

    /// Cached entries are kept; reads only see entries for the current number.
    pub async fn set_block_number(&self, number: u64) -> FlowResult<()> {
        let mut state = self.state.lock().await;
        let session = state
            .session
            .as_mut()
            .ok_or(FlowError::NotInitialized("set_block_number"))?;
        session.block.set_number(number);
        state.stale = true;
        debug!(block_number = number, "Block number updated");
        Ok(())
    }

    /// Every directive node of the current prompts matching `query`.
    pub async fn match_prompts(&self, query: &str) -> FlowResult<Vec<PromptMatch>> {
        let mut state = self.state.lock().await;
        self.refresh(&mut state).await?;
        let query = parse_query(&state.program, query)?;
        let mut matches = Vec::new();
        for directive in state.prompts.iter().flatten() {
            for node in directive.walk() {
                if let Some(bindings) = match_term(&query, &node.to_term()) {
                    matches.push(PromptMatch {
                        bindings,
                        directive: node.clone(),
                    });
                }
            }
        }
        Ok(matches)
    }

    pub async fn prompt_count(&self, query: &str) -> FlowResult<usize> {
        Ok(self.match_prompts(query).await?.len())
    }

    /// Effects recorded so far, including deferred transaction outcomes.
    pub async fn effect_count(&self, query: &str) -> FlowResult<usize> {
        let state = self.state.lock().await;
        let query = parse_query(&state.program, query)?;
        Ok(state
            .effect_log
            .iter()
            .filter(|effect| match_term(&query, effect).is_some())
            .count())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Effect> {
        self.effects.subscribe()
    }

    pub async fn cache_stats(&self) -> FlowResult<CacheStats> {
        let state = self.state.lock().await;
        state
            .session
            .as_ref()
            .map(|session| session.block.stats())
            .ok_or(FlowError::NotInitialized("cache_stats"))
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    async fn refresh(&self, state: &mut FlowState<H::Env>) -> FlowResult<()> {
        if !state.stale {
            return Ok(());
        }
        let FlowState {
            program,
            session,
            prompts,
            stale,
            ..
        } = state;
        let session = session
            .as_mut()
            .ok_or(FlowError::NotInitialized("prompt resolution"))?;
        let resolver = PromptResolver {
            engine: self.resolver.as_ref(),
            program,
            hooks: self.hooks.as_ref(),
            env: &session.env,
            config: &self.config,
        };
        let resolution = resolver.resolve(&mut session.block).await?;
        *prompts = resolution.prompts;
        *stale = false;
        Ok(())
    }

    fn watch_transaction(&self, tx: Box<dyn PendingTransaction>) {
        let state = Arc::clone(&self.state);
        let sender = self.effects.clone();
        tokio::spawn(async move {
            let id = tx.id();
            let effect = match tx.wait().await {
                Ok(receipt) => Effect::confirmed(receipt.id),
                Err(err) => Effect::failed(id, err.to_string()),
            };
            {
                let mut state = state.lock().await;
                state.effect_log.push(effect.to_term());
                state.stale = true;
            }
            log_effect("tx", serde_json::to_value(&effect).unwrap_or_default());
            if sender.send(effect).is_err() {
                debug!("No subscribers for transaction outcome");
            }
        });
    }
}

fn parse_query(program: &Program, text: &str) -> FlowResult<Query> {
    program
        .database()
        .parse_query(text)
        .map_err(|err| FlowError::Query(err.to_string()))
}

/// Unifies a query with a standalone term, returning the named bindings.
fn match_term(query: &Query, term: &Term) -> Option<Vec<(String, Term)>> {
    let value = term.offset_vars(query.var_count);
    let (_, bindings) = unify_terms(&query.goal, &value)?;
    Some(
        query
            .variables
            .iter()
            .filter(|(name, _)| !name.starts_with('_'))
            .map(|(name, id)| (name.clone(), bindings.resolve(&Term::Var(*id))))
            .collect(),
    )
}
