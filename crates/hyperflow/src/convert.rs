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

//! Conversions between terms and JSON values at the hook boundary.
//!
//! Objects are represented as `json([Key-Value, ...])`; `true`, `false` and
//! `null` atoms map to their JSON counterparts. Integers outside the `i64` /
//! `u64` range travel as decimal strings.

use crate::error::{FlowError, FlowResult};
use horn::{BigInt, Term};
use serde_json::{Map, Number, Value};

pub fn json_to_term(value: &Value) -> Term {
    match value {
        Value::Null => Term::atom("null"),
        Value::Bool(flag) => Term::atom(if *flag { "true" } else { "false" }),
        Value::Number(number) => number_to_term(number),
        Value::String(text) => Term::atom(text),
        Value::Array(items) => Term::list(items.iter().map(json_to_term)),
        Value::Object(map) => {
            let pairs = map
                .iter()
                .map(|(key, value)| Term::compound("-", vec![Term::atom(key), json_to_term(value)]))
                .collect::<Vec<_>>();
            Term::compound("json", vec![Term::list(pairs)])
        }
    }
}

fn number_to_term(number: &Number) -> Term {
    if let Some(value) = number.as_i64() {
        Term::int(value)
    } else if let Some(value) = number.as_u64() {
        Term::int(value)
    } else {
        Term::Float(number.as_f64().unwrap_or(f64::NAN))
    }
}

pub fn int_to_json(value: i128) -> Value {
    if let Ok(small) = i64::try_from(value) {
        Value::from(small)
    } else if let Ok(unsigned) = u64::try_from(value) {
        Value::from(unsigned)
    } else {
        Value::String(value.to_string())
    }
}

pub fn wide_to_json(value: BigInt) -> Value {
    value
        .to_i128()
        .map_or_else(|| Value::String(value.to_string()), int_to_json)
}

pub fn term_to_json(term: &Term) -> FlowResult<Value> {
    match term {
        Term::Var(_) => Err(FlowError::InvalidArgument(
            "cannot convert an unbound variable to JSON".to_string(),
        )),
        Term::Int(value) => Ok(int_to_json(*value)),
        Term::BigInt(value) => Ok(wide_to_json(*value)),
        Term::Float(value) => Ok(Number::from_f64(*value).map_or(Value::Null, Value::Number)),
        Term::Atom(name) => Ok(match &**name {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            "null" => Value::Null,
            "[]" => Value::Array(Vec::new()),
            other => Value::String(other.to_string()),
        }),
        compound => {
            if let Some(items) = compound.list_items() {
                return items.iter().map(term_to_json).collect::<FlowResult<Vec<_>>>().map(Value::Array);
            }
            if compound.is_functor("json", 1) {
                return object_to_json(&compound.args()[0]);
            }
            Ok(Value::String(compound.to_string()))
        }
    }
}

fn object_to_json(pairs: &Term) -> FlowResult<Value> {
    let items = pairs.list_items().ok_or_else(|| {
        FlowError::InvalidArgument(format!("json/1 expects a list of pairs, got {pairs}"))
    })?;
    let mut map = Map::new();
    for pair in items {
        let is_pair = pair.is_functor("-", 2) || pair.is_functor("=", 2) || pair.is_functor(":", 2);
        let key = if is_pair { pair.args()[0].text() } else { None };
        match key {
            Some(key) => {
                map.insert(key, term_to_json(&pair.args()[1])?);
            }
            None => {
                return Err(FlowError::InvalidArgument(format!(
                    "json/1 entry {pair} is not a Key-Value pair"
                )))
            }
        }
    }
    Ok(Value::Object(map))
}

/// Looks up `key` in a `json([...])` term.
pub fn json_field(object: &Term, key: &str) -> Option<Term> {
    if !object.is_functor("json", 1) {
        return None;
    }
    object.args()[0].list_items()?.into_iter().find_map(|pair| {
        let is_pair = pair.is_functor("-", 2) || pair.is_functor("=", 2) || pair.is_functor(":", 2);
        (is_pair && pair.args()[0].text().as_deref() == Some(key)).then(|| pair.args()[1].clone())
    })
}
