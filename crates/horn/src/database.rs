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

use crate::error::ParseError;
use crate::parser::{OpTable, OpType, Parser};
use crate::term::{Term, VarId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

const PRELUDE: &str = include_str!("prelude.pl");

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub head: Term,
    pub body: Term,
    pub var_count: usize,
}

impl Clause {
    pub fn fact(head: Term) -> Self {
        let (head, var_count) = head.normalize_vars();
        Self {
            head,
            body: Term::atom("true"),
            var_count,
        }
    }

    fn from_term(term: Term, var_count: usize) -> Result<Self, String> {
        let (head, body) = if term.is_functor(":-", 2) {
            (term.args()[0].clone(), term.args()[1].clone())
        } else if term.is_functor("-->", 2) {
            return Err("grammar rules are not supported".to_string());
        } else {
            (term, Term::atom("true"))
        };
        if !head.is_callable() {
            return Err(format!("clause head {head} is not callable"));
        }
        if matches!(head.name(), Some("," | ";" | "->" | "!")) {
            return Err(format!("cannot redefine control construct {head}"));
        }
        Ok(Self {
            head,
            body,
            var_count,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Query {
    pub goal: Term,
    pub variables: Vec<(String, VarId)>,
    pub var_count: usize,
}

impl Query {
    pub fn variable(&self, name: &str) -> Option<Term> {
        self.variables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| Term::Var(*id))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Database {
    predicates: HashMap<String, HashMap<usize, Vec<Arc<Clause>>>>,
    order: Vec<(String, usize)>,
    library: HashSet<(String, usize)>,
    ops: OpTable,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// A database with the list and control library loaded.
    pub fn with_prelude() -> Self {
        let mut db = Self::new();
        match db.consult(PRELUDE) {
            Ok(count) => debug!(clauses = count, "Loaded prelude"),
            Err(err) => warn!(error = %err, "Prelude failed to load"),
        }
        db.library = db.order.iter().cloned().collect();
        db
    }

    /// Adds every clause in `source`, returning how many were added.
    pub fn consult(&mut self, source: &str) -> Result<usize, ParseError> {
        let mut parser = Parser::new(source, self.ops.clone())?;
        let mut added = 0;
        while let Some(read) = parser.next_clause()? {
            if read.term.is_functor(":-", 1) || read.term.is_functor("?-", 1) {
                self.directive(&read.term.args()[0], parser.ops_mut(), read.line);
                continue;
            }
            let clause = Clause::from_term(read.term, read.var_count).map_err(|message| {
                ParseError::InvalidClause {
                    line: read.line,
                    message,
                }
            })?;
            self.add_clause(clause);
            added += 1;
        }
        self.ops = parser.into_ops();
        Ok(added)
    }

    /// User clauses for a library predicate replace the library definition.
    pub fn add_clause(&mut self, clause: Clause) {
        let Some(name) = clause.head.name().map(str::to_string) else {
            return;
        };
        let arity = clause.head.arity();
        let key = (name.clone(), arity);
        let clauses = self
            .predicates
            .entry(name)
            .or_default()
            .entry(arity)
            .or_default();
        if self.library.remove(&key) {
            debug!(predicate = %key.0, arity, "User clauses override library predicate");
            clauses.clear();
        }
        clauses.push(Arc::new(clause));
        if !self.order.contains(&key) {
            self.order.push(key);
        }
    }

    pub fn clauses(&self, name: &str, arity: usize) -> &[Arc<Clause>] {
        self.predicates
            .get(name)
            .and_then(|by_arity| by_arity.get(&arity))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_defined(&self, name: &str, arity: usize) -> bool {
        self.predicates
            .get(name)
            .is_some_and(|by_arity| by_arity.contains_key(&arity))
    }

    pub fn is_library(&self, name: &str, arity: usize) -> bool {
        self.library.contains(&(name.to_string(), arity))
    }

    /// Predicates in the order they were first declared.
    pub fn predicates(&self) -> impl Iterator<Item = (&str, usize)> {
        self.order.iter().map(|(name, arity)| (name.as_str(), *arity))
    }

    pub fn ops(&self) -> &OpTable {
        &self.ops
    }

    /// Reads a single term using this database's operator table.
    pub fn parse_query(&self, text: &str) -> Result<Query, ParseError> {
        let trimmed = text.trim();
        let source = if trimmed.ends_with('.') {
            format!("{trimmed}\n")
        } else {
            format!("{trimmed} .\n")
        };
        let mut parser = Parser::new(&source, self.ops.clone())?;
        let read = parser.next_clause()?.ok_or_else(|| ParseError::Syntax {
            line: 1,
            column: 1,
            message: "expected a term, found end of input".to_string(),
        })?;
        if let Some(extra) = parser.next_clause()? {
            return Err(ParseError::Syntax {
                line: extra.line,
                column: 1,
                message: "expected a single term".to_string(),
            });
        }
        Ok(Query {
            goal: read.term,
            variables: read.variables,
            var_count: read.var_count,
        })
    }

    fn directive(&mut self, goal: &Term, ops: &mut OpTable, line: usize) {
        match (goal.name(), goal.arity()) {
            (Some("op"), 3) => {
                let args = goal.args();
                let priority = args[0].as_int().and_then(|p| u16::try_from(p).ok());
                let op_type = args[1].as_atom().and_then(OpType::parse);
                let names = args[2]
                    .list_items()
                    .unwrap_or_else(|| vec![args[2].clone()]);
                match (priority, op_type) {
                    (Some(priority), Some(op_type)) if priority <= 1200 => {
                        for name in names.iter().filter_map(Term::as_atom) {
                            ops.add(priority, op_type, name);
                        }
                    }
                    _ => warn!(line, directive = %goal, "Malformed op/3 directive ignored"),
                }
            }
            (Some("dynamic" | "discontiguous"), 1) => {
                for spec in indicators(&goal.args()[0]) {
                    if let Some((name, arity)) = spec {
                        self.predicates
                            .entry(name.clone())
                            .or_default()
                            .entry(arity)
                            .or_default();
                        let key = (name, arity);
                        if !self.order.contains(&key) {
                            self.order.push(key);
                        }
                    } else {
                        warn!(line, directive = %goal, "Malformed predicate indicator ignored");
                    }
                }
            }
            _ => warn!(line, directive = %goal, "Unsupported directive ignored"),
        }
    }
}

fn indicators(spec: &Term) -> Vec<Option<(String, usize)>> {
    if let Some(items) = spec.list_items() {
        return items.iter().flat_map(indicators).collect();
    }
    if spec.is_functor(",", 2) {
        return spec.args().iter().flat_map(indicators).collect();
    }
    if spec.is_functor("/", 2) {
        let args = spec.args();
        let name = args[0].as_atom().map(str::to_string);
        let arity = args[1].as_int().and_then(|a| usize::try_from(a).ok());
        return vec![name.zip(arity)];
    }
    vec![None]
}

/// Parses a program on top of the library prelude.
pub fn parse_program(source: &str) -> Result<Database, ParseError> {
    let mut db = Database::with_prelude();
    db.consult(source)?;
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_order_is_kept() {
        let db = parse_program("b(1).\na(1).\nb(2).\n").unwrap();
        let user: Vec<_> = db
            .predicates()
            .filter(|(name, arity)| !db.is_library(name, *arity))
            .collect();
        assert_eq!(user, vec![("b", 1), ("a", 1)]);
        let b = db.clauses("b", 1);
        assert_eq!(b.len(), 2);
        assert_eq!(b[1].head, Term::compound("b", vec![Term::int(2)]));
    }

    #[test]
    fn test_rule_is_split_into_head_and_body() {
        let db = parse_program("p(X) :- q(X), r.").unwrap();
        let clause = &db.clauses("p", 1)[0];
        assert!(clause.body.is_functor(",", 2));
        assert_eq!(clause.var_count, 1);
    }

    #[test]
    fn test_op_directive_extends_syntax() {
        let db = parse_program(":- op(700, xfx, ===>).\nrule(a ===> b).").unwrap();
        let clause = &db.clauses("rule", 1)[0];
        assert!(clause.head.args()[0].is_functor("===>", 2));
    }

    #[test]
    fn test_dynamic_declares_predicate() {
        let db = parse_program(":- dynamic(seen/1).").unwrap();
        assert!(db.is_defined("seen", 1));
        assert!(db.clauses("seen", 1).is_empty());
    }

    #[test]
    fn test_user_definition_replaces_library() {
        let db = parse_program("member(x, _).").unwrap();
        assert_eq!(db.clauses("member", 2).len(), 1);
        assert!(!db.is_library("member", 2));
    }

    #[test]
    fn test_invalid_head_reports_line() {
        let err = parse_program("ok.\n42 :- true.").unwrap_err();
        assert_eq!(err.line(), 2);
    }

    #[test]
    fn test_parse_query_names_variables() {
        let db = Database::with_prelude();
        let query = db.parse_query("button(Label, Attrs, _)").unwrap();
        assert!(query.goal.is_functor("button", 3));
        assert_eq!(query.variable("Attrs"), Some(Term::Var(1)));
        assert!(db.parse_query("a. b.").is_err());
    }
}
