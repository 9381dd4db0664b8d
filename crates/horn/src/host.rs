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

use crate::error::EngineError;
use crate::term::Term;
use async_trait::async_trait;

/// Outcome of a host predicate call. Hosts are semidet: one answer or none.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Fail,
    Succeed {
        bindings: Vec<(Term, Term)>,
        events: Vec<Term>,
    },
}

impl Reply {
    pub fn succeed() -> Self {
        Reply::Succeed {
            bindings: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn unify(left: Term, right: Term) -> Self {
        Reply::succeed().and_unify(left, right)
    }

    pub fn emit(event: Term) -> Self {
        Reply::succeed().and_emit(event)
    }

    pub fn and_unify(mut self, left: Term, right: Term) -> Self {
        if let Reply::Succeed { bindings, .. } = &mut self {
            bindings.push((left, right));
        }
        self
    }

    pub fn and_emit(mut self, event: Term) -> Self {
        if let Reply::Succeed { events, .. } = &mut self {
            events.push(event);
        }
        self
    }

    pub fn from_bool(ok: bool) -> Self {
        if ok {
            Reply::succeed()
        } else {
            Reply::Fail
        }
    }
}

/// Predicates implemented outside the clause database. The goal passed to
/// `call` has every bound variable substituted; unbound variables remain and
/// may be bound through `Reply::Succeed::bindings`. Events are kept only on
/// the derivation that produced them and discarded on backtracking.
#[async_trait]
pub trait Host: Send {
    fn handles(&self, name: &str, arity: usize) -> bool;

    async fn call(&mut self, goal: &Term) -> Result<Reply, EngineError>;
}

/// A host with no predicates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHost;

#[async_trait]
impl Host for NoHost {
    fn handles(&self, _name: &str, _arity: usize) -> bool {
        false
    }

    async fn call(&mut self, goal: &Term) -> Result<Reply, EngineError> {
        Err(EngineError::Internal(format!(
            "no host predicate registered for {goal}"
        )))
    }
}
