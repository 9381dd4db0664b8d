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
use crate::lexer::{Lexer, Token, TokenKind};
use crate::term::{Term, VarId};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    Xfx,
    Xfy,
    Yfx,
    Fy,
    Fx,
}

impl OpType {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "xfx" => Some(OpType::Xfx),
            "xfy" => Some(OpType::Xfy),
            "yfx" => Some(OpType::Yfx),
            "fy" => Some(OpType::Fy),
            "fx" => Some(OpType::Fx),
            _ => None,
        }
    }

    fn is_prefix(self) -> bool {
        matches!(self, OpType::Fy | OpType::Fx)
    }
}

#[derive(Debug, Clone, Default)]
struct OpDefs {
    prefix: Option<(u16, OpType)>,
    infix: Option<(u16, OpType)>,
}

#[derive(Debug, Clone)]
pub struct OpTable {
    ops: HashMap<String, OpDefs>,
}

impl Default for OpTable {
    fn default() -> Self {
        let mut table = Self {
            ops: HashMap::new(),
        };
        let defaults: &[(u16, OpType, &[&str])] = &[
            (1200, OpType::Xfx, &[":-", "-->"]),
            (1200, OpType::Fx, &[":-", "?-"]),
            (1150, OpType::Fx, &["dynamic", "discontiguous", "initialization"]),
            (1100, OpType::Xfy, &[";", "|"]),
            (1050, OpType::Xfy, &["->", "*->"]),
            (1000, OpType::Xfy, &[","]),
            (900, OpType::Fy, &["\\+"]),
            (800, OpType::Fx, &["show"]),
            (
                700,
                OpType::Xfx,
                &[
                    "=", "\\=", "==", "\\==", "@<", "@>", "@=<", "@>=", "=..", "is", "=:=",
                    "=\\=", "<", ">", "=<", ">=",
                ],
            ),
            (500, OpType::Yfx, &["+", "-", "/\\", "\\/", "xor"]),
            (
                400,
                OpType::Yfx,
                &["*", "/", "//", "mod", "rem", "div", "<<", ">>"],
            ),
            (200, OpType::Xfx, &["**"]),
            (200, OpType::Xfy, &["^", ":"]),
            (200, OpType::Fy, &["-", "+", "\\"]),
        ];
        for (priority, op_type, names) in defaults {
            for name in *names {
                table.add(*priority, *op_type, name);
            }
        }
        table
    }
}

impl OpTable {
    /// Priority zero removes the definition, as `op/3` does.
    pub fn add(&mut self, priority: u16, op_type: OpType, name: &str) {
        let defs = self.ops.entry(name.to_string()).or_default();
        let slot = if op_type.is_prefix() {
            &mut defs.prefix
        } else {
            &mut defs.infix
        };
        *slot = (priority > 0).then_some((priority, op_type));
    }

    fn prefix(&self, name: &str) -> Option<(u16, OpType)> {
        self.ops.get(name).and_then(|defs| defs.prefix)
    }

    fn infix(&self, name: &str) -> Option<(u16, OpType)> {
        self.ops.get(name).and_then(|defs| defs.infix)
    }

    fn is_infix(&self, name: &str) -> bool {
        self.infix(name).is_some()
    }
}

/// One clause as read, plus the source names of its variables.
#[derive(Debug, Clone)]
pub struct ReadTerm {
    pub term: Term,
    pub variables: Vec<(String, VarId)>,
    pub var_count: usize,
    pub line: usize,
}

pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    ops: OpTable,
    names: Vec<(String, VarId)>,
    var_count: usize,
}

impl Parser {
    pub(crate) fn new(source: &str, ops: OpTable) -> Result<Self, ParseError> {
        Ok(Self {
            tokens: Lexer::new(source).tokenize()?,
            pos: 0,
            ops,
            names: Vec::new(),
            var_count: 0,
        })
    }

    /// Reads the next `.`-terminated clause; `None` at end of input.
    pub(crate) fn next_clause(&mut self) -> Result<Option<ReadTerm>, ParseError> {
        self.names.clear();
        self.var_count = 0;
        if self.peek().kind == TokenKind::Eof {
            return Ok(None);
        }
        let line = self.peek().line;
        let (term, _) = self.parse(1200)?;
        match self.peek().kind {
            TokenKind::End => self.pos += 1,
            _ => return Err(self.unexpected("end of clause")),
        }
        Ok(Some(ReadTerm {
            term,
            variables: self.names.clone(),
            var_count: self.var_count,
            line,
        }))
    }

    pub(crate) fn ops_mut(&mut self) -> &mut OpTable {
        &mut self.ops
    }

    pub(crate) fn into_ops(self) -> OpTable {
        self.ops
    }

    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek_next(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.pos + 1).min(last)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        Self::unexpected_token(self.peek(), expected)
    }

    fn unexpected_token(token: &Token, expected: &str) -> ParseError {
        let found = match &token.kind {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::End => "end of clause".to_string(),
            other => format!("{other:?}"),
        };
        ParseError::Syntax {
            line: token.line,
            column: token.column,
            message: format!("expected {expected}, found {found}"),
        }
    }

    fn expect_punct(&mut self, c: char) -> Result<(), ParseError> {
        if self.peek().kind == TokenKind::Punct(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{c}'")))
        }
    }

    fn variable(&mut self, name: &str) -> Term {
        if name == "_" {
            let id = self.var_count;
            self.var_count += 1;
            return Term::Var(id);
        }
        if let Some((_, id)) = self.names.iter().find(|(n, _)| n == name) {
            return Term::Var(*id);
        }
        let id = self.var_count;
        self.var_count += 1;
        self.names.push((name.to_string(), id));
        Term::Var(id)
    }

    fn infix_name(&self, max: u16) -> Option<String> {
        match &self.peek().kind {
            TokenKind::Name(name) | TokenKind::QuotedName(name) => Some(name.clone()),
            TokenKind::Punct(',') => Some(",".to_string()),
            TokenKind::Punct('|') if max >= 1100 => Some("|".to_string()),
            _ => None,
        }
    }

    fn parse(&mut self, max: u16) -> Result<(Term, u16), ParseError> {
        let (mut left, mut left_priority) = self.parse_primary(max)?;
        while let Some(name) = self.infix_name(max) {
            let Some((priority, op_type)) = self.ops.infix(&name) else {
                break;
            };
            let (left_max, right_max) = match op_type {
                OpType::Xfx => (priority - 1, priority - 1),
                OpType::Xfy => (priority - 1, priority),
                _ => (priority, priority - 1),
            };
            if priority > max || left_priority > left_max {
                break;
            }
            self.advance();
            let (right, _) = self.parse(right_max)?;
            let functor = if name == "|" { ";" } else { name.as_str() };
            left = Term::compound(functor, vec![left, right]);
            left_priority = priority;
        }
        Ok((left, left_priority))
    }

    fn starts_term(&self, token: &Token) -> bool {
        match &token.kind {
            TokenKind::End | TokenKind::Eof => false,
            TokenKind::Punct(c) => matches!(c, '(' | '[' | '{'),
            TokenKind::Name(name) => {
                !self.ops.is_infix(name) || self.ops.prefix(name).is_some() || {
                    let following = self.peek_next();
                    following.kind == TokenKind::Punct('(') && !following.layout_before
                }
            }
            _ => true,
        }
    }

    fn parse_primary(&mut self, max: u16) -> Result<(Term, u16), ParseError> {
        let token = self.advance();
        match &token.kind {
            TokenKind::Int(value) => Ok((Term::Int(*value), 0)),
            TokenKind::BigInt(value) => Ok((value.into_term(), 0)),
            TokenKind::Float(value) => Ok((Term::Float(*value), 0)),
            TokenKind::Var(name) => Ok((self.variable(name), 0)),
            TokenKind::Str(text) => Ok((Term::atom(text), 0)),
            TokenKind::Punct('(') => {
                let (term, _) = self.parse(1200)?;
                self.expect_punct(')')?;
                Ok((term, 0))
            }
            TokenKind::Punct('[') => {
                if self.peek().kind == TokenKind::Punct(']') {
                    self.pos += 1;
                    return self.after_name("[]".to_string(), max);
                }
                let mut items = vec![self.parse(999)?.0];
                while self.peek().kind == TokenKind::Punct(',') {
                    self.pos += 1;
                    items.push(self.parse(999)?.0);
                }
                let tail = if self.peek().kind == TokenKind::Punct('|') {
                    self.pos += 1;
                    self.parse(999)?.0
                } else {
                    Term::nil()
                };
                self.expect_punct(']')?;
                Ok((Term::list_with_tail(items, tail), 0))
            }
            TokenKind::Punct('{') => {
                if self.peek().kind == TokenKind::Punct('}') {
                    self.pos += 1;
                    return self.after_name("{}".to_string(), max);
                }
                let (inner, _) = self.parse(1200)?;
                self.expect_punct('}')?;
                Ok((Term::compound("{}", vec![inner]), 0))
            }
            TokenKind::QuotedName(name) => {
                if self.is_call_open() {
                    return Ok((self.arguments(name)?, 0));
                }
                Ok((Term::atom(name), 0))
            }
            TokenKind::Name(name) => self.after_name(name.clone(), max),
            _ => Err(Self::unexpected_token(&token, "a term")),
        }
    }

    fn is_call_open(&self) -> bool {
        let next = self.peek();
        next.kind == TokenKind::Punct('(') && !next.layout_before
    }

    fn after_name(&mut self, name: String, max: u16) -> Result<(Term, u16), ParseError> {
        if self.is_call_open() {
            return Ok((self.arguments(&name)?, 0));
        }

        if name == "-" {
            let next = self.peek();
            if !next.layout_before {
                let literal = match next.kind {
                    TokenKind::Int(value) => Some(Term::Int(-value)),
                    TokenKind::BigInt(value) => Some(value.neg().into_term()),
                    TokenKind::Float(value) => Some(Term::Float(-value)),
                    _ => None,
                };
                if let Some(literal) = literal {
                    self.pos += 1;
                    return Ok((literal, 0));
                }
            }
        }

        if let Some((priority, op_type)) = self.ops.prefix(&name) {
            if self.starts_term(self.peek()) {
                let priority = priority.min(max);
                let arg_max = match op_type {
                    OpType::Fy => priority,
                    _ => priority.saturating_sub(1),
                };
                let (arg, _) = self.parse(arg_max)?;
                return Ok((Term::compound(&name, vec![arg]), priority));
            }
        }

        let priority = match (self.ops.prefix(&name), self.ops.infix(&name)) {
            (Some((p, _)), _) | (None, Some((p, _))) if p <= max => p,
            _ => 0,
        };
        Ok((Term::atom(name), priority.min(max)))
    }

    fn arguments(&mut self, name: &str) -> Result<Term, ParseError> {
        self.expect_punct('(')?;
        let mut args = vec![self.parse(999)?.0];
        while self.peek().kind == TokenKind::Punct(',') {
            self.pos += 1;
            args.push(self.parse(999)?.0);
        }
        self.expect_punct(')')?;
        Ok(Term::compound(name, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(source: &str) -> Term {
        let mut parser = Parser::new(source, OpTable::default()).unwrap();
        parser.next_clause().unwrap().unwrap().term
    }

    #[test]
    fn test_operator_precedence() {
        let term = read("X is 1 + 2 * 3.");
        assert_eq!(term.to_string(), "_G0 is 1+2*3");
        let sum = &term.args()[1];
        assert!(sum.is_functor("+", 2));
        assert!(sum.args()[1].is_functor("*", 2));
    }

    #[test]
    fn test_left_associative_minus() {
        let term = read("X = 5 - 2 - 1.");
        let diff = &term.args()[1];
        assert!(diff.args()[0].is_functor("-", 2));
        assert_eq!(diff.args()[1], Term::Int(1));
    }

    #[test]
    fn test_clause_with_body() {
        let term = read("prompt :- get(me/address, A), show [text(A)].");
        assert!(term.is_functor(":-", 2));
        let body = &term.args()[1];
        assert!(body.is_functor(",", 2));
        let show = &body.args()[1];
        assert!(show.is_functor("show", 1));
        assert!(show.args()[0].is_list());
    }

    #[test]
    fn test_abi_entries() {
        let term = read("abi(g, [ sign(uint256, string): payable, get(address): uint256 / view ]).");
        let entries = term.args()[1].list_items().unwrap();
        assert!(entries[0].is_functor(":", 2));
        assert!(entries[1].is_functor("/", 2));
        assert!(entries[1].args()[0].is_functor(":", 2));
    }

    #[test]
    fn test_negative_numbers_and_minus() {
        assert_eq!(read("x(-1).").args()[0], Term::Int(-1));
        assert_eq!(
            read("x(-170141183460469231731687303715884105728).").args()[0],
            Term::Int(i128::MIN)
        );
        let wide_term = read("x(-170141183460469231731687303715884105729).");
        let wide = &wide_term.args()[0];
        assert!(matches!(wide, Term::BigInt(value) if value.is_negative()));
        let term = read("x(a - 1).");
        assert!(term.args()[0].is_functor("-", 2));
        let term = read("x(- a).");
        assert!(term.args()[0].is_functor("-", 1));
    }

    #[test]
    fn test_variables_share_ids() {
        let mut parser = Parser::new("f(X, Y, X, _, _).", OpTable::default()).unwrap();
        let read = parser.next_clause().unwrap().unwrap();
        assert_eq!(read.var_count, 4);
        assert_eq!(read.variables.len(), 2);
        let args = read.term.args();
        assert_eq!(args[0], args[2]);
        assert_ne!(args[3], args[4]);
    }

    #[test]
    fn test_if_then_else_and_negation() {
        let term = read("p :- ( \\+ a -> b ; c ).");
        let body = &term.args()[1];
        assert!(body.is_functor(";", 2));
        assert!(body.args()[0].is_functor("->", 2));
        assert!(body.args()[0].args()[0].is_functor("\\+", 1));
    }

    #[test]
    fn test_operator_as_atom_argument() {
        let term = read("f(-, [+], =).");
        assert_eq!(term.args()[0], Term::atom("-"));
        assert_eq!(term.args()[1], Term::list(vec![Term::atom("+")]));
        assert_eq!(term.args()[2], Term::atom("="));
    }

    #[test]
    fn test_curly_and_strings() {
        let term = read("f({a, b}, \"hello world\").");
        assert!(term.args()[0].is_functor("{}", 1));
        assert_eq!(term.args()[1], Term::atom("hello world"));
    }

    #[test]
    fn test_missing_end_is_error() {
        let mut parser = Parser::new("f(a) g", OpTable::default()).unwrap();
        assert!(parser.next_clause().is_err());
    }
}
