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

use crate::block::Block;
use crate::config::FlowConfig;
use crate::directive::ActionRef;
use crate::effect::{Classified, Effect, RawEffect};
use crate::error::{FlowError, FlowResult};
use crate::hooks::{FlowHooks, PendingTransaction};
use crate::host::{FlowHost, Mode};
use crate::loader::Program;
use crate::logging::{log_effect, log_unrecognized_effect};
use horn::{Resolver, Term};
use serde::Serialize;
use tracing::{debug, instrument};

/// Result of running one action.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Execution {
    pub succeeded: bool,
    pub effects: Vec<Effect>,
    pub unrecognized: Vec<RawEffect>,
}

/// Everything a run leaves behind. `log` and `pending` are filled even when
/// `result` is an error, since transactions sent before the failure are live.
pub(crate) struct Executed {
    pub result: FlowResult<Execution>,
    /// Every effect term in emission order, recognized or not.
    pub log: Vec<Term>,
    pub pending: Vec<Box<dyn PendingTransaction>>,
}

/// An action list runs as a left-to-right conjunction.
pub fn action_goal(action: &ActionRef) -> Term {
    let goal = match action.goal.list_items() {
        Some(items) => conjunction(items),
        None => action.goal.clone(),
    };
    goal.normalize_vars().0
}

fn conjunction(items: Vec<Term>) -> Term {
    let mut items = items.into_iter().rev();
    match items.next() {
        None => Term::atom("true"),
        Some(last) => items.fold(last, |acc, item| Term::compound(",", vec![item, acc])),
    }
}

pub(crate) struct ActionExecutor<'a, H: FlowHooks> {
    pub engine: &'a dyn Resolver,
    pub program: &'a Program,
    pub hooks: &'a H,
    pub env: &'a H::Env,
    pub config: &'a FlowConfig,
}

impl<'a, H: FlowHooks> ActionExecutor<'a, H> {
    #[instrument(level = "debug", skip_all, fields(action = %action.goal))]
    pub async fn execute(&self, block: &mut Block, action: &ActionRef) -> Executed {
        let goal = action_goal(action);
        let limits = self.config.limits().first_solution();
        let mut host = FlowHost::new(
            Mode::Action,
            self.program,
            block,
            self.hooks,
            self.env,
            self.config,
        );
        let solved = self
            .engine
            .solve(self.program.database(), &goal, &mut host, limits)
            .await;
        let pending = host.into_pending();
        let submitted: Vec<String> = pending.iter().map(|tx| tx.id()).collect();
        let mut execution = Execution::default();
        let mut log = Vec::new();

        let result = solved.map_err(FlowError::from).map(|solutions| {
            if let Some(solution) = solutions.into_iter().next() {
                execution.succeeded = true;
                for event in &solution.events {
                    record(&mut execution, &mut log, event, &submitted);
                }
            } else {
                debug!("Action goal failed");
            }
        });

        // Sent transactions the surviving events do not mention: the run
        // failed or backtracked past the call.
        for id in &submitted {
            let announced = execution.effects.iter().any(|effect| {
                matches!(effect, Effect::Transaction { id: seen, .. } if seen == id)
            });
            if !announced {
                let effect = Effect::submitted(id.clone());
                log.push(effect.to_term());
                execution.effects.push(effect);
            }
        }

        Executed {
            result: result.map(|()| execution),
            log,
            pending,
        }
    }
}

fn record(execution: &mut Execution, log: &mut Vec<Term>, event: &Term, submitted: &[String]) {
    let classified = Effect::classify(event, submitted);
    log.push(classified.to_term());
    match classified {
        Classified::Known(effect) => {
            log_effect(
                event.name().unwrap_or_default(),
                serde_json::to_value(&effect).unwrap_or_default(),
            );
            execution.effects.push(effect);
        }
        Classified::Raw(raw) => {
            log_unrecognized_effect(&raw.kind, raw.args.len());
            execution.unrecognized.push(raw);
        }
    }
}
