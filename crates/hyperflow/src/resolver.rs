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

//! Prompt resolution: every derivation of every `prompt/0` clause, in
//! declaration order, rendered into directive lists.

use crate::block::{path_segments, Block, INPUT_ROOT};
use crate::config::FlowConfig;
use crate::directive::{Directive, Prompt};
use crate::error::{FlowError, FlowResult};
use crate::hooks::FlowHooks;
use crate::host::{FlowHost, Mode};
use crate::loader::Program;
use crate::logging::log_resolution;
use horn::{Database, Resolver, Term};
use std::collections::{BTreeSet, HashSet};
use tracing::{instrument, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub prompts: Vec<Prompt>,
    /// Clauses whose body raised and were left out.
    pub excluded: usize,
}

pub struct PromptResolver<'a, H: FlowHooks> {
    pub engine: &'a dyn Resolver,
    pub program: &'a Program,
    pub hooks: &'a H,
    pub env: &'a H::Env,
    pub config: &'a FlowConfig,
}

impl<'a, H: FlowHooks> PromptResolver<'a, H> {
    #[instrument(level = "debug", skip_all, fields(block = block.number()))]
    pub async fn resolve(&self, block: &mut Block) -> FlowResult<Resolution> {
        let db = self.program.database();
        let limits = self.config.limits();
        let mut resolution = Resolution::default();

        for (index, clause) in self.program.prompt_clauses().iter().enumerate() {
            let solved = {
                let mut host = FlowHost::new(
                    Mode::Prompt,
                    self.program,
                    block,
                    self.hooks,
                    self.env,
                    self.config,
                );
                self.engine.solve(db, &clause.body, &mut host, limits).await
            };
            let solutions = match solved {
                Ok(solutions) => solutions,
                Err(err) => {
                    let err = FlowError::from(err);
                    if err.is_fatal() {
                        return Err(err);
                    }
                    warn!(clause = index, error = %err, "Prompt clause excluded");
                    resolution.excluded += 1;
                    continue;
                }
            };
            for solution in solutions {
                let mut prompt = collect_shown(&solution.events);
                if prompt.is_empty() {
                    continue;
                }
                for directive in &mut prompt {
                    gate_buttons(directive, db, block);
                }
                resolution.prompts.push(prompt);
            }
        }

        log_resolution(block.number(), resolution.prompts.len(), resolution.excluded);
        Ok(resolution)
    }
}

/// Concatenates the directives of every `show/1` event of one derivation.
fn collect_shown(events: &[Term]) -> Prompt {
    events
        .iter()
        .filter(|event| event.is_functor("show", 1))
        .flat_map(|event| {
            let shown = &event.args()[0];
            shown.list_items().unwrap_or_else(|| vec![shown.clone()])
        })
        .map(|term| Directive::from_term(&term))
        .collect()
}

fn gate_buttons(directive: &mut Directive, db: &Database, block: &Block) {
    match directive {
        Directive::Button { attrs, action, .. } => {
            if attrs.enabled {
                attrs.enabled = required_inputs(db, &action.goal)
                    .iter()
                    .all(|name| block.input(name).is_some());
            }
        }
        Directive::Col { children } | Directive::Row { children } => {
            for child in children {
                gate_buttons(child, db, block);
            }
        }
        Directive::Log { inner, .. } => gate_buttons(inner, db, block),
        _ => {}
    }
}

/// Input names read through `get(input/Name, _)` by `goal` or, transitively,
/// by the user predicates it calls.
pub fn required_inputs(db: &Database, goal: &Term) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let mut visited = HashSet::new();
    scan(db, goal, &mut names, &mut visited);
    names
}

fn scan(
    db: &Database,
    term: &Term,
    names: &mut BTreeSet<String>,
    visited: &mut HashSet<(String, usize)>,
) {
    let Some(name) = term.name() else {
        return;
    };
    if term.is_functor("get", 2) {
        if let Ok(segments) = path_segments(&term.args()[0]) {
            if let [root, input] = segments.as_slice() {
                if root == INPUT_ROOT {
                    names.insert(input.clone());
                }
            }
        }
    }
    let key = (name.to_string(), term.arity());
    if db.is_defined(name, term.arity())
        && !db.is_library(name, term.arity())
        && visited.insert(key)
    {
        for clause in db.clauses(name, term.arity()) {
            scan(db, &clause.body, names, visited);
        }
    }
    for arg in term.args() {
        scan(db, arg, names, visited);
    }
}
