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

use crate::database::Database;
use crate::error::EngineError;
use crate::host::Host;
use crate::machine::Machine;
use crate::term::Term;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub max_steps: u64,
    pub max_solutions: Option<usize>,
    /// Raise `UnknownPredicate` instead of failing on undefined predicates.
    pub strict_unknown: bool,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_steps: 200_000,
            max_solutions: None,
            strict_unknown: false,
        }
    }
}

impl Limits {
    pub fn first_solution(self) -> Self {
        Self {
            max_solutions: Some(1),
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// The goal with this derivation's bindings substituted.
    pub goal: Term,
    /// Host events emitted along this derivation, in execution order.
    pub events: Vec<Term>,
}

#[async_trait]
pub trait Resolver: Send + Sync {
    async fn solve(
        &self,
        db: &Database,
        goal: &Term,
        host: &mut dyn Host,
        limits: Limits,
    ) -> Result<Vec<Solution>, EngineError>;
}

/// Depth-first SLD resolution with chronological backtracking.
#[derive(Debug, Default, Clone, Copy)]
pub struct SldResolver;

#[async_trait]
impl Resolver for SldResolver {
    #[instrument(level = "trace", skip(self, db, host), fields(goal = %goal))]
    async fn solve(
        &self,
        db: &Database,
        goal: &Term,
        host: &mut dyn Host,
        limits: Limits,
    ) -> Result<Vec<Solution>, EngineError> {
        let mut machine = Machine::new(db, host, limits);
        let solutions = machine.solve(goal).await?;
        debug!(
            solutions = solutions.len(),
            steps = machine.steps(),
            "Resolution finished"
        );
        Ok(solutions)
    }
}
