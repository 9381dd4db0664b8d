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

use crate::term::{Term, VarId};

/// Variable store with a trail for undoing bindings on backtrack.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    store: Vec<Option<Term>>,
    trail: Vec<VarId>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures every variable in `term` has a slot.
    pub fn reserve_for(&mut self, term: &Term) {
        if let Some(max) = term.max_var() {
            if max >= self.store.len() {
                self.store.resize(max + 1, None);
            }
        }
    }

    /// Allocates `count` fresh variables, returning the first id.
    pub fn allocate(&mut self, count: usize) -> VarId {
        let base = self.store.len();
        self.store.resize(base + count, None);
        base
    }

    pub fn fresh(&mut self) -> Term {
        Term::Var(self.allocate(1))
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn lookup(&self, id: VarId) -> Option<&Term> {
        self.store.get(id).and_then(Option::as_ref)
    }

    /// Follows variable chains until an unbound variable or a non-variable.
    pub fn deref(&self, term: &Term) -> Term {
        let mut current = term;
        while let Term::Var(id) = current {
            match self.lookup(*id) {
                Some(bound) => current = bound,
                None => break,
            }
        }
        current.clone()
    }

    /// Fully substitutes bound variables.
    pub fn resolve(&self, term: &Term) -> Term {
        match self.deref(term) {
            Term::Compound(name, args) => {
                Term::Compound(name, args.iter().map(|arg| self.resolve(arg)).collect())
            }
            other => other,
        }
    }

    pub fn bind(&mut self, id: VarId, value: Term) {
        if id >= self.store.len() {
            self.store.resize(id + 1, None);
        }
        self.store[id] = Some(value);
        self.trail.push(id);
    }

    pub fn mark(&self) -> usize {
        self.trail.len()
    }

    pub fn undo_to(&mut self, mark: usize) {
        while self.trail.len() > mark {
            if let Some(id) = self.trail.pop() {
                if let Some(slot) = self.store.get_mut(id) {
                    *slot = None;
                }
            }
        }
    }

    /// Unifies without occurs check. On failure, bindings made so far stay
    /// on the trail; callers undo to their own mark.
    pub fn unify(&mut self, left: &Term, right: &Term) -> bool {
        let mut pending = vec![(left.clone(), right.clone())];
        while let Some((a, b)) = pending.pop() {
            let a = self.deref(&a);
            let b = self.deref(&b);
            match (&a, &b) {
                (Term::Var(x), Term::Var(y)) if x == y => {}
                (Term::Var(x), _) => self.bind(*x, b.clone()),
                (_, Term::Var(y)) => self.bind(*y, a.clone()),
                (Term::Atom(x), Term::Atom(y)) if x == y => {}
                (Term::Int(x), Term::Int(y)) if x == y => {}
                (Term::BigInt(x), Term::BigInt(y)) if x == y => {}
                (Term::Float(x), Term::Float(y)) if x.to_bits() == y.to_bits() || x == y => {}
                (Term::Compound(nx, ax), Term::Compound(ny, ay))
                    if nx == ny && ax.len() == ay.len() =>
                {
                    for (x, y) in ax.iter().zip(ay.iter()).rev() {
                        pending.push((x.clone(), y.clone()));
                    }
                }
                _ => return false,
            }
        }
        true
    }

    /// Checks unifiability without leaving bindings behind.
    pub fn unifiable(&mut self, left: &Term, right: &Term) -> bool {
        let mark = self.mark();
        let result = self.unify(left, right);
        self.undo_to(mark);
        result
    }
}

/// One-shot match of two standalone terms, returning the substituted pattern.
pub fn unify_terms(pattern: &Term, value: &Term) -> Option<(Term, Bindings)> {
    let mut bindings = Bindings::new();
    bindings.reserve_for(pattern);
    bindings.reserve_for(value);
    if bindings.unify(pattern, value) {
        Some((bindings.resolve(pattern), bindings))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unify_binds_both_sides() {
        let mut b = Bindings::new();
        b.allocate(2);
        let left = Term::compound("f", vec![Term::Var(0), Term::atom("b")]);
        let right = Term::compound("f", vec![Term::atom("a"), Term::Var(1)]);
        assert!(b.unify(&left, &right));
        assert_eq!(b.resolve(&left), b.resolve(&right));
        assert_eq!(b.resolve(&Term::Var(0)), Term::atom("a"));
    }

    #[test]
    fn test_undo_restores_variables() {
        let mut b = Bindings::new();
        b.allocate(1);
        let mark = b.mark();
        assert!(b.unify(&Term::Var(0), &Term::int(3)));
        b.undo_to(mark);
        assert_eq!(b.deref(&Term::Var(0)), Term::Var(0));
    }

    #[test]
    fn test_mismatch_fails() {
        let mut b = Bindings::new();
        assert!(!b.unify(&Term::atom("a"), &Term::atom("b")));
        assert!(!b.unify(&Term::int(1), &Term::Float(1.0)));
        let f1 = Term::compound("f", vec![Term::int(1)]);
        let f2 = Term::compound("f", vec![Term::int(1), Term::int(2)]);
        assert!(!b.unify(&f1, &f2));
    }

    #[test]
    fn test_unify_terms_returns_instance() {
        let pattern = Term::compound("input", vec![Term::Var(0), Term::atom("owner")]);
        let value = Term::compound("input", vec![Term::atom("address"), Term::atom("owner")]);
        let (instance, _) = unify_terms(&pattern, &value).unwrap();
        assert_eq!(instance, value);
    }
}
