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

use crate::bigint::BigInt;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

pub type VarId = usize;

pub const NIL: &str = "[]";
pub const CONS: &str = ".";

#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Atom(Arc<str>),
    Int(i128),
    /// Only for values outside the `i128` range.
    BigInt(BigInt),
    Float(f64),
    Var(VarId),
    Compound(Arc<str>, Arc<[Term]>),
}

impl Term {
    pub fn atom(name: impl AsRef<str>) -> Self {
        Term::Atom(Arc::from(name.as_ref()))
    }

    pub fn int(value: impl Into<i128>) -> Self {
        Term::Int(value.into())
    }

    /// Builds `name(args...)`; an empty argument list yields the plain atom.
    pub fn compound(name: impl AsRef<str>, args: Vec<Term>) -> Self {
        if args.is_empty() {
            return Term::atom(name);
        }
        Term::Compound(Arc::from(name.as_ref()), Arc::from(args))
    }

    pub fn nil() -> Self {
        Term::atom(NIL)
    }

    pub fn cons(head: Term, tail: Term) -> Self {
        Term::Compound(Arc::from(CONS), Arc::from(vec![head, tail]))
    }

    pub fn list(items: impl IntoIterator<Item = Term>) -> Self {
        let items: Vec<Term> = items.into_iter().collect();
        Self::list_with_tail(items, Term::nil())
    }

    pub fn list_with_tail(items: Vec<Term>, tail: Term) -> Self {
        items
            .into_iter()
            .rev()
            .fold(tail, |acc, item| Term::cons(item, acc))
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Term::Atom(name) | Term::Compound(name, _) => Some(name),
            _ => None,
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Term::Compound(_, args) => args.len(),
            _ => 0,
        }
    }

    pub fn args(&self) -> &[Term] {
        match self {
            Term::Compound(_, args) => args,
            _ => &[],
        }
    }

    pub fn is_functor(&self, name: &str, arity: usize) -> bool {
        self.name() == Some(name) && self.arity() == arity
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Term::Atom(_) | Term::Compound(_, _))
    }

    pub fn is_atomic(&self) -> bool {
        matches!(
            self,
            Term::Atom(_) | Term::Int(_) | Term::BigInt(_) | Term::Float(_)
        )
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Term::Atom(name) if &**name == NIL)
    }

    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Term::Atom(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            Term::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Any integer, widened.
    pub fn as_integer(&self) -> Option<BigInt> {
        match self {
            Term::Int(value) => Some(BigInt::from_i128(*value)),
            Term::BigInt(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_var(&self) -> Option<VarId> {
        match self {
            Term::Var(id) => Some(*id),
            _ => None,
        }
    }

    /// Items of a proper list, or `None` when the term is not one.
    pub fn list_items(&self) -> Option<Vec<Term>> {
        let mut items = Vec::new();
        let mut current = self;
        loop {
            match current {
                Term::Atom(name) if &**name == NIL => return Some(items),
                Term::Compound(name, args) if &**name == CONS && args.len() == 2 => {
                    items.push(args[0].clone());
                    current = &args[1];
                }
                _ => return None,
            }
        }
    }

    pub fn is_list(&self) -> bool {
        self.list_items().is_some()
    }

    /// Textual content of an atomic term: atom names verbatim, numbers formatted.
    pub fn text(&self) -> Option<String> {
        match self {
            Term::Atom(name) => Some(name.to_string()),
            Term::Int(value) => Some(value.to_string()),
            Term::BigInt(value) => Some(value.to_string()),
            Term::Float(value) => Some(format_float(*value)),
            _ => None,
        }
    }

    pub fn max_var(&self) -> Option<VarId> {
        match self {
            Term::Var(id) => Some(*id),
            Term::Compound(_, args) => args.iter().filter_map(Term::max_var).max(),
            _ => None,
        }
    }

    pub fn offset_vars(&self, offset: usize) -> Term {
        if offset == 0 {
            return self.clone();
        }
        match self {
            Term::Var(id) => Term::Var(id + offset),
            Term::Compound(name, args) => Term::Compound(
                name.clone(),
                args.iter().map(|arg| arg.offset_vars(offset)).collect(),
            ),
            other => other.clone(),
        }
    }

    pub fn is_ground(&self) -> bool {
        match self {
            Term::Var(_) => false,
            Term::Compound(_, args) => args.iter().all(Term::is_ground),
            _ => true,
        }
    }

    /// Distinct variables in depth-first, left-to-right order.
    pub fn variables(&self) -> Vec<VarId> {
        let mut seen = Vec::new();
        self.collect_vars(&mut seen);
        seen
    }

    fn collect_vars(&self, seen: &mut Vec<VarId>) {
        match self {
            Term::Var(id) if !seen.contains(id) => seen.push(*id),
            Term::Compound(_, args) => args.iter().for_each(|arg| arg.collect_vars(seen)),
            _ => {}
        }
    }

    /// Renumbers variables densely from zero, returning the count.
    pub fn normalize_vars(&self) -> (Term, usize) {
        let vars = self.variables();
        let renamed = self.map_vars(&|id| {
            let index = vars.iter().position(|v| *v == id).unwrap_or(0);
            Term::Var(index)
        });
        (renamed, vars.len())
    }

    pub fn map_vars(&self, f: &dyn Fn(VarId) -> Term) -> Term {
        match self {
            Term::Var(id) => f(*id),
            Term::Compound(name, args) => {
                Term::Compound(name.clone(), args.iter().map(|arg| arg.map_vars(f)).collect())
            }
            other => other.clone(),
        }
    }
}

impl From<&str> for Term {
    fn from(name: &str) -> Self {
        Term::atom(name)
    }
}

impl From<i64> for Term {
    fn from(value: i64) -> Self {
        Term::Int(value.into())
    }
}

impl From<f64> for Term {
    fn from(value: f64) -> Self {
        Term::Float(value)
    }
}

fn type_rank(term: &Term) -> u8 {
    match term {
        Term::Var(_) => 0,
        Term::Float(_) | Term::Int(_) | Term::BigInt(_) => 1,
        Term::Atom(_) => 3,
        Term::Compound(_, _) => 4,
    }
}

/// Standard order of terms: Var < Number < Atom < Compound.
pub fn standard_order(left: &Term, right: &Term) -> Ordering {
    let rank = type_rank(left).cmp(&type_rank(right));
    if rank != Ordering::Equal {
        return rank;
    }
    match (left, right) {
        (Term::Var(a), Term::Var(b)) => a.cmp(b),
        (Term::Int(a), Term::Int(b)) => a.cmp(b),
        (Term::Float(a), Term::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (Term::Int(a), Term::Float(b)) => {
            (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal).then(Ordering::Greater)
        }
        (Term::Float(a), Term::Int(b)) => {
            a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal).then(Ordering::Less)
        }
        (Term::Float(a), Term::BigInt(b)) => {
            a.partial_cmp(&b.to_f64()).unwrap_or(Ordering::Equal).then(Ordering::Less)
        }
        (Term::BigInt(a), Term::Float(b)) => {
            a.to_f64().partial_cmp(b).unwrap_or(Ordering::Equal).then(Ordering::Greater)
        }
        (Term::Int(_) | Term::BigInt(_), Term::Int(_) | Term::BigInt(_)) => {
            left.as_integer().cmp(&right.as_integer())
        }
        (Term::Atom(a), Term::Atom(b)) => a.cmp(b),
        (Term::Compound(na, aa), Term::Compound(nb, ab)) => aa
            .len()
            .cmp(&ab.len())
            .then_with(|| na.cmp(nb))
            .then_with(|| {
                aa.iter()
                    .zip(ab.iter())
                    .map(|(x, y)| standard_order(x, y))
                    .find(|ord| *ord != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            }),
        _ => Ordering::Equal,
    }
}

pub(crate) fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

const SYMBOL_CHARS: &str = "+-*/\\^<>=~:.?@#&$";

fn atom_needs_quotes(name: &str) -> bool {
    if name.is_empty() {
        return true;
    }
    if matches!(name, "[]" | "!" | ";" | "{}") {
        return false;
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or(' ');
    if first.is_ascii_lowercase() {
        return !name.chars().all(|c| c.is_alphanumeric() || c == '_');
    }
    !name.chars().all(|c| SYMBOL_CHARS.contains(c))
}

pub(crate) fn write_atom(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if !atom_needs_quotes(name) {
        return f.write_str(name);
    }
    f.write_str("'")?;
    for c in name.chars() {
        match c {
            '\'' => f.write_str("\\'")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            other => write!(f, "{other}")?,
        }
    }
    f.write_str("'")
}

const INFIX_DISPLAY: &[&str] = &[
    ":-", "-->", ";", "->", ",", "=", "\\=", "==", "\\==", "is", "=:=", "=\\=", "<", ">", "=<",
    ">=", "=..", ":", "+", "-", "*", "/", "//", "mod", "^", "**",
];

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Atom(name) => write_atom(f, name),
            Term::Int(value) => write!(f, "{value}"),
            Term::BigInt(value) => write!(f, "{value}"),
            Term::Float(value) => f.write_str(&format_float(*value)),
            Term::Var(id) => write!(f, "_G{id}"),
            Term::Compound(name, args) if &**name == CONS && args.len() == 2 => {
                f.write_str("[")?;
                write!(f, "{}", args[0])?;
                let mut tail = &args[1];
                loop {
                    match tail {
                        Term::Compound(n, a) if &**n == CONS && a.len() == 2 => {
                            write!(f, ",{}", a[0])?;
                            tail = &a[1];
                        }
                        t if t.is_nil() => break,
                        t => {
                            write!(f, "|{t}")?;
                            break;
                        }
                    }
                }
                f.write_str("]")
            }
            Term::Compound(name, args) if &**name == "{}" && args.len() == 1 => {
                write!(f, "{{{}}}", args[0])
            }
            Term::Compound(name, args) if args.len() == 2 && INFIX_DISPLAY.contains(&&**name) => {
                let spaced = name.chars().all(char::is_alphabetic) || &**name == ":-";
                write_operand(f, &args[0])?;
                if spaced {
                    write!(f, " {name} ")?;
                } else if &**name == "," {
                    f.write_str(",")?;
                } else {
                    f.write_str(name)?;
                }
                write_operand(f, &args[1])
            }
            Term::Compound(name, args) => {
                write_atom(f, name)?;
                f.write_str("(")?;
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, term: &Term) -> fmt::Result {
    match term {
        Term::Compound(name, args)
            if args.len() == 2 && INFIX_DISPLAY.contains(&&**name) =>
        {
            write!(f, "({term})")
        }
        Term::Int(value) if *value < 0 => write!(f, "({value})"),
        Term::BigInt(value) if value.is_negative() => write!(f, "({value})"),
        _ => write!(f, "{term}"),
    }
}

impl Serialize for Term {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Term::Atom(name) => serializer.serialize_str(name),
            Term::Int(value) => {
                if let Ok(small) = i64::try_from(*value) {
                    serializer.serialize_i64(small)
                } else {
                    serializer.serialize_str(&value.to_string())
                }
            }
            Term::BigInt(value) => serializer.serialize_str(&value.to_string()),
            Term::Float(value) => serializer.serialize_f64(*value),
            Term::Var(id) => serializer.serialize_str(&format!("_G{id}")),
            Term::Compound(name, args) => {
                if let Some(items) = self.list_items() {
                    let mut seq = serializer.serialize_seq(Some(items.len()))?;
                    for item in &items {
                        seq.serialize_element(item)?;
                    }
                    return seq.end();
                }
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("functor", &**name)?;
                map.serialize_entry("args", &**args)?;
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_round_trip() {
        let list = Term::list(vec![Term::atom("a"), Term::int(1)]);
        assert_eq!(list.list_items(), Some(vec![Term::atom("a"), Term::int(1)]));
        assert_eq!(list.to_string(), "[a,1]");
        assert!(Term::nil().is_list());
    }

    #[test]
    fn test_display_quotes_when_needed() {
        assert_eq!(Term::atom("Create Guestbook").to_string(), "'Create Guestbook'");
        assert_eq!(Term::atom("it's").to_string(), "'it\\'s'");
        assert_eq!(Term::atom("hello_world").to_string(), "hello_world");
        let path = Term::compound("/", vec![Term::atom("input"), Term::atom("owner")]);
        assert_eq!(path.to_string(), "input/owner");
    }

    #[test]
    fn test_standard_order() {
        assert_eq!(standard_order(&Term::Var(3), &Term::int(1)), Ordering::Less);
        assert_eq!(standard_order(&Term::int(1), &Term::atom("a")), Ordering::Less);
        assert_eq!(standard_order(&Term::atom("b"), &Term::atom("a")), Ordering::Greater);
        let small = Term::compound("f", vec![Term::int(1)]);
        let big = Term::compound("a", vec![Term::int(1), Term::int(2)]);
        assert_eq!(standard_order(&small, &big), Ordering::Less);
    }

    #[test]
    fn test_wide_integers_order_and_print() {
        let huge = BigInt::parse("-400000000000000000000000000000000000000")
            .unwrap()
            .into_term();
        assert_eq!(huge.to_string(), "-400000000000000000000000000000000000000");
        assert_eq!(standard_order(&huge, &Term::int(-1)), Ordering::Less);
        assert_eq!(standard_order(&huge.clone(), &huge), Ordering::Equal);
        let term = Term::compound("-", vec![Term::int(1), huge.clone()]);
        assert_eq!(term.to_string(), "1-(-400000000000000000000000000000000000000)");
        assert_eq!(
            serde_json::to_value(&huge).unwrap(),
            serde_json::json!("-400000000000000000000000000000000000000")
        );
        assert!(huge.is_atomic());
    }

    #[test]
    fn test_normalize_vars() {
        let term = Term::compound("f", vec![Term::Var(7), Term::Var(3), Term::Var(7)]);
        let (normalized, count) = term.normalize_vars();
        assert_eq!(count, 2);
        assert_eq!(
            normalized,
            Term::compound("f", vec![Term::Var(0), Term::Var(1), Term::Var(0)])
        );
    }

    #[test]
    fn test_serialize_to_json() {
        let term = Term::compound(
            "button",
            vec![Term::atom("Go"), Term::list(vec![Term::int(1), Term::Float(0.5)])],
        );
        let json = serde_json::to_value(&term).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"functor": "button", "args": ["Go", [1, 0.5]]})
        );
    }
}
