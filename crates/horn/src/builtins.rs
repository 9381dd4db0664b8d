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

use crate::arith;
use crate::bigint::BigInt;
use crate::bindings::Bindings;
use crate::error::{EngineError, EngineResult};
use crate::term::{standard_order, Term};
use std::cmp::Ordering;

/// Deterministic built-ins. `Ok(None)` means `name/arity` is not one of them.
pub(crate) fn call(b: &mut Bindings, name: &str, args: &[Term]) -> EngineResult<Option<bool>> {
    let outcome = match (name, args.len()) {
        ("=", 2) => b.unify(&args[0], &args[1]),
        ("\\=", 2) => !b.unifiable(&args[0], &args[1]),
        ("==", 2) => order(b, args) == Ordering::Equal,
        ("\\==", 2) => order(b, args) != Ordering::Equal,
        ("@<", 2) => order(b, args) == Ordering::Less,
        ("@>", 2) => order(b, args) == Ordering::Greater,
        ("@=<", 2) => order(b, args) != Ordering::Greater,
        ("@>=", 2) => order(b, args) != Ordering::Less,
        ("compare", 3) => {
            let symbol = match order(b, &args[1..]) {
                Ordering::Less => "<",
                Ordering::Equal => "=",
                Ordering::Greater => ">",
            };
            b.unify(&args[0], &Term::atom(symbol))
        }

        ("var", 1) => matches!(b.deref(&args[0]), Term::Var(_)),
        ("nonvar", 1) => !matches!(b.deref(&args[0]), Term::Var(_)),
        ("atom", 1) => matches!(b.deref(&args[0]), Term::Atom(_)),
        ("number", 1) => matches!(
            b.deref(&args[0]),
            Term::Int(_) | Term::BigInt(_) | Term::Float(_)
        ),
        ("integer", 1) => matches!(b.deref(&args[0]), Term::Int(_) | Term::BigInt(_)),
        ("float", 1) => matches!(b.deref(&args[0]), Term::Float(_)),
        ("atomic", 1) => b.deref(&args[0]).is_atomic(),
        ("compound", 1) => matches!(b.deref(&args[0]), Term::Compound(_, _)),
        ("callable", 1) => b.deref(&args[0]).is_callable(),
        ("is_list", 1) => b.resolve(&args[0]).is_list(),
        ("ground", 1) => b.resolve(&args[0]).is_ground(),

        ("is", 2) => {
            let value = arith::eval(b, &args[1])?.into_term();
            b.unify(&args[0], &value)
        }
        ("=:=", 2) => arith::compare(b, &args[0], &args[1])? == Ordering::Equal,
        ("=\\=", 2) => arith::compare(b, &args[0], &args[1])? != Ordering::Equal,
        ("<", 2) => arith::compare(b, &args[0], &args[1])? == Ordering::Less,
        (">", 2) => arith::compare(b, &args[0], &args[1])? == Ordering::Greater,
        ("=<", 2) => arith::compare(b, &args[0], &args[1])? != Ordering::Greater,
        (">=", 2) => arith::compare(b, &args[0], &args[1])? != Ordering::Less,

        ("=..", 2) => univ(b, &args[0], &args[1])?,
        ("functor", 3) => functor(b, args)?,
        ("arg", 3) => arg(b, args)?,
        ("length", 2) => length(b, &args[0], &args[1])?,
        ("msort", 2) => {
            let mut items = proper_list(b, &args[0])?;
            items.sort_by(standard_order);
            b.unify(&args[1], &Term::list(items))
        }
        ("atom_length", 2) => {
            let text = text_of(b, &args[0])?;
            b.unify(&args[1], &Term::Int(text.chars().count() as i128))
        }
        ("atom_concat", 3) => atom_concat(b, args)?,
        ("atom_number", 2) => {
            let text = text_of(b, &args[0])?;
            match parse_number(&text) {
                Some(number) => b.unify(&args[1], &number),
                None => false,
            }
        }
        ("atomic_list_concat", 2) => {
            let joined = join(b, &args[0], "")?;
            b.unify(&args[1], &Term::atom(joined))
        }
        ("atomic_list_concat", 3) => atomic_list_concat(b, args)?,
        ("throw", 1) => return Err(EngineError::Thrown(b.resolve(&args[0]))),
        _ => return Ok(None),
    };
    Ok(Some(outcome))
}

fn order(b: &Bindings, args: &[Term]) -> Ordering {
    standard_order(&b.resolve(&args[0]), &b.resolve(&args[1]))
}

fn proper_list(b: &Bindings, term: &Term) -> EngineResult<Vec<Term>> {
    let resolved = b.resolve(term);
    resolved.list_items().ok_or_else(|| match resolved {
        Term::Var(_) => EngineError::Instantiation("expected a list".to_string()),
        other => EngineError::type_error("list", &other),
    })
}

fn text_of(b: &Bindings, term: &Term) -> EngineResult<String> {
    let value = b.deref(term);
    match value {
        Term::Var(_) => Err(EngineError::Instantiation("expected atomic text".to_string())),
        other => other
            .text()
            .ok_or_else(|| EngineError::type_error("atomic", &other)),
    }
}

pub(crate) fn parse_number(text: &str) -> Option<Term> {
    let trimmed = text.trim();
    if let Ok(value) = trimmed.parse::<i128>() {
        return Some(Term::Int(value));
    }
    if let Some(wide) = BigInt::parse(trimmed) {
        return Some(wide.into_term());
    }
    let looks_numeric = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+'));
    if looks_numeric && trimmed.chars().any(|c| c.is_ascii_digit()) {
        return trimmed.parse::<f64>().ok().map(Term::Float);
    }
    None
}

fn univ(b: &mut Bindings, term: &Term, list: &Term) -> EngineResult<bool> {
    match b.deref(term) {
        Term::Var(_) => {
            let items = proper_list(b, list)?;
            let Some((head, rest)) = items.split_first() else {
                return Err(EngineError::Evaluation("=.. with an empty list".to_string()));
            };
            let built = match head {
                Term::Atom(name) => Term::compound(&**name, rest.to_vec()),
                other if rest.is_empty() && other.is_atomic() => other.clone(),
                other => return Err(EngineError::type_error("atom", other)),
            };
            Ok(b.unify(term, &built))
        }
        Term::Compound(name, args) => {
            let mut items = vec![Term::Atom(name)];
            items.extend(args.iter().cloned());
            Ok(b.unify(list, &Term::list(items)))
        }
        atomic => Ok(b.unify(list, &Term::list(vec![atomic]))),
    }
}

fn functor(b: &mut Bindings, args: &[Term]) -> EngineResult<bool> {
    match b.deref(&args[0]) {
        Term::Var(_) => {
            let name = b.deref(&args[1]);
            let arity = arith::eval(b, &args[2])?.into_term();
            let Some(arity) = arity.as_int().and_then(|a| usize::try_from(a).ok()) else {
                return Err(EngineError::type_error("non-negative integer", &arity));
            };
            let built = if arity == 0 {
                name
            } else {
                let Some(atom) = name.as_atom() else {
                    return Err(EngineError::type_error("atom", &name));
                };
                let fresh = b.allocate(arity);
                Term::compound(atom, (fresh..fresh + arity).map(Term::Var).collect())
            };
            Ok(b.unify(&args[0], &built))
        }
        Term::Compound(name, inner) => {
            let arity = Term::Int(inner.len() as i128);
            Ok(b.unify(&args[1], &Term::Atom(name)) && b.unify(&args[2], &arity))
        }
        atomic => Ok(b.unify(&args[1], &atomic) && b.unify(&args[2], &Term::Int(0))),
    }
}

fn arg(b: &mut Bindings, args: &[Term]) -> EngineResult<bool> {
    let index = b.deref(&args[0]);
    let target = b.deref(&args[1]);
    let Term::Compound(_, inner) = &target else {
        return Err(EngineError::type_error("compound", &target));
    };
    let Some(n) = index.as_int() else {
        return Err(EngineError::Instantiation("arg/3 needs an integer index".to_string()));
    };
    let Some(value) = usize::try_from(n).ok().and_then(|n| n.checked_sub(1)).and_then(|i| inner.get(i)) else {
        return Ok(false);
    };
    let value = value.clone();
    Ok(b.unify(&args[2], &value))
}

fn length(b: &mut Bindings, list: &Term, count: &Term) -> EngineResult<bool> {
    let mut known = 0usize;
    let mut current = b.deref(list);
    loop {
        let next = match &current {
            Term::Compound(name, args) if &**name == "." && args.len() == 2 => b.deref(&args[1]),
            _ => break,
        };
        known += 1;
        current = next;
    }
    match current {
        ref nil if nil.is_nil() => Ok(b.unify(count, &Term::Int(known as i128))),
        Term::Var(_) => {
            let wanted = b.deref(count);
            let Some(total) = wanted.as_int() else {
                return Err(EngineError::Instantiation(
                    "length/2 of a partial list needs a bound length".to_string(),
                ));
            };
            let Some(extra) = usize::try_from(total).ok().and_then(|t| t.checked_sub(known)) else {
                return Ok(false);
            };
            let fresh = b.allocate(extra);
            let tail = Term::list((fresh..fresh + extra).map(Term::Var));
            Ok(b.unify(&current, &tail))
        }
        other => Err(EngineError::type_error("list", &other)),
    }
}

fn atom_concat(b: &mut Bindings, args: &[Term]) -> EngineResult<bool> {
    let left = b.deref(&args[0]);
    let right = b.deref(&args[1]);
    if let (Some(l), Some(r)) = (left.text(), right.text()) {
        return Ok(b.unify(&args[2], &Term::atom(format!("{l}{r}"))));
    }
    let whole = text_of(b, &args[2])?;
    if let Some(l) = left.text() {
        return Ok(match whole.strip_prefix(&l) {
            Some(rest) => b.unify(&args[1], &Term::atom(rest)),
            None => false,
        });
    }
    if let Some(r) = right.text() {
        return Ok(match whole.strip_suffix(&r) {
            Some(rest) => b.unify(&args[0], &Term::atom(rest)),
            None => false,
        });
    }
    Err(EngineError::Instantiation(
        "atom_concat/3 needs two bound arguments".to_string(),
    ))
}

fn join(b: &Bindings, list: &Term, separator: &str) -> EngineResult<String> {
    let items = proper_list(b, list)?;
    let parts = items
        .iter()
        .map(|item| {
            item.text()
                .ok_or_else(|| EngineError::type_error("atomic", item))
        })
        .collect::<EngineResult<Vec<_>>>()?;
    Ok(parts.join(separator))
}

fn atomic_list_concat(b: &mut Bindings, args: &[Term]) -> EngineResult<bool> {
    let separator = text_of(b, &args[1])?;
    let resolved = b.resolve(&args[0]);
    if resolved.list_items().is_some_and(|items| items.iter().all(Term::is_atomic)) {
        let joined = join(b, &resolved, &separator)?;
        return Ok(b.unify(&args[2], &Term::atom(joined)));
    }
    if separator.is_empty() {
        return Err(EngineError::Instantiation(
            "atomic_list_concat/3 split mode needs a separator".to_string(),
        ));
    }
    let whole = text_of(b, &args[2])?;
    let parts = whole.split(separator.as_str()).map(Term::atom);
    Ok(b.unify(&args[0], &Term::list(parts)))
}
