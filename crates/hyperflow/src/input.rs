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

//! Coercion of user-supplied values for `input/2` directives.

use crate::convert::{int_to_json, json_to_term};
use crate::directive::InputKind;
use crate::error::{FlowError, FlowResult};
use horn::Term;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;

static ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("valid regex"));
static BYTES32_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{64}$").expect("valid regex"));

const WEI_PER_ETH: i128 = 1_000_000_000_000_000_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InputResult {
    Accepted { value: Value },
    Rejected { reason: String },
}

impl InputResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, InputResult::Accepted { .. })
    }
}

/// A validated input: the term bound into the context and its JSON echo.
#[derive(Debug, Clone, PartialEq)]
pub struct Coerced {
    pub term: Term,
    pub value: Value,
}

pub fn coerce(kind: InputKind, value: &Value, as_wei: bool) -> FlowResult<Coerced> {
    let invalid = || FlowError::InvalidArgument(format!("{value} is not a valid {} input", kind.as_str()));
    match kind {
        InputKind::Address | InputKind::Bytes32 => {
            let pattern = if kind == InputKind::Address { &ADDRESS_RE } else { &BYTES32_RE };
            match value {
                Value::String(text) if pattern.is_match(text.trim()) => Ok(Coerced {
                    term: Term::atom(text.trim().to_lowercase()),
                    value: Value::String(text.trim().to_string()),
                }),
                _ => Err(invalid()),
            }
        }
        InputKind::Eth => {
            let amount = match value {
                Value::Number(number) => Decimal::from_str(&number.to_string()).ok(),
                Value::String(text) => Decimal::from_str(text.trim()).ok(),
                _ => None,
            }
            .ok_or_else(invalid)?;
            if amount.is_sign_negative() {
                return Err(invalid());
            }
            if as_wei {
                let wei = eth_to_wei(amount)?;
                return Ok(Coerced {
                    term: Term::Int(wei),
                    value: int_to_json(wei),
                });
            }
            Ok(Coerced {
                term: decimal_term(amount),
                value: value.clone(),
            })
        }
        InputKind::Text => match value {
            Value::String(text) => Ok(Coerced {
                term: Term::atom(text),
                value: value.clone(),
            }),
            Value::Number(_) | Value::Bool(_) => Ok(Coerced {
                term: json_to_term(value),
                value: value.clone(),
            }),
            _ => Err(invalid()),
        },
    }
}

/// Whole-wei amount for an ETH quantity; sub-wei precision is rejected.
pub fn eth_to_wei(amount: Decimal) -> FlowResult<i128> {
    let wei = amount
        .checked_mul(Decimal::from_i128_with_scale(WEI_PER_ETH, 0))
        .ok_or_else(|| FlowError::InvalidArgument(format!("{amount} ETH is out of range")))?;
    if !wei.fract().is_zero() {
        return Err(FlowError::InvalidArgument(format!(
            "{amount} ETH is not a whole number of wei"
        )));
    }
    wei.to_i128()
        .ok_or_else(|| FlowError::InvalidArgument(format!("{amount} ETH is out of range")))
}

pub fn parse_eth(term: &Term) -> FlowResult<Decimal> {
    let parsed = match term {
        Term::Int(value) => Decimal::try_from_i128_with_scale(*value, 0).ok(),
        Term::Float(value) => Decimal::from_f64(*value),
        Term::Atom(text) => Decimal::from_str(text).ok(),
        _ => None,
    };
    parsed.ok_or_else(|| FlowError::InvalidArgument(format!("{term} is not an ETH amount")))
}

fn decimal_term(amount: Decimal) -> Term {
    if amount.fract().is_zero() {
        if let Some(value) = amount.to_i128() {
            return Term::Int(value);
        }
    }
    Term::Float(amount.to_f64().unwrap_or(f64::NAN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_address_validation() {
        let ok = coerce(
            InputKind::Address,
            &json!("0xAbCdEf0123456789aBcDeF0123456789AbCdEf01"),
            false,
        )
        .unwrap();
        assert_eq!(ok.term, Term::atom("0xabcdef0123456789abcdef0123456789abcdef01"));
        assert!(coerce(InputKind::Address, &json!("0x1234"), false).is_err());
        assert!(coerce(InputKind::Bytes32, &json!(format!("0x{}", "ab".repeat(32))), false).is_ok());
        assert!(coerce(InputKind::Bytes32, &json!(12), false).is_err());
    }

    #[test]
    fn test_eth_amounts() {
        let plain = coerce(InputKind::Eth, &json!(0.2), false).unwrap();
        assert_eq!(plain.term, Term::Float(0.2));
        assert_eq!(plain.value, json!(0.2));

        let wei = coerce(InputKind::Eth, &json!("0.2"), true).unwrap();
        assert_eq!(wei.term, Term::Int(200_000_000_000_000_000));
        assert_eq!(wei.value, json!(200_000_000_000_000_000i64));

        assert!(coerce(InputKind::Eth, &json!("abc"), false).is_err());
        assert!(coerce(InputKind::Eth, &json!("-1"), false).is_err());
        assert!(coerce(InputKind::Eth, &json!("0.0000000000000000001"), true).is_err());
    }

    #[test]
    fn test_text_becomes_atom() {
        let coerced = coerce(InputKind::Text, &json!("Good job!"), false).unwrap();
        assert_eq!(coerced.term, Term::atom("Good job!"));
        assert!(coerce(InputKind::Text, &json!(null), false).is_err());
    }

    #[test]
    fn test_parse_eth_terms() {
        assert_eq!(eth_to_wei(parse_eth(&Term::int(2)).unwrap()).unwrap(), 2 * WEI_PER_ETH);
        assert_eq!(
            eth_to_wei(parse_eth(&Term::atom("1.5")).unwrap()).unwrap(),
            1_500_000_000_000_000_000
        );
        assert!(parse_eth(&Term::Var(0)).is_err());
    }

    #[test]
    fn test_out_of_range_eth_is_rejected() {
        let beyond_decimal = Term::int(100_000_000_000_000_000_000_000_000_000i128);
        assert!(matches!(
            parse_eth(&beyond_decimal),
            Err(FlowError::InvalidArgument(_))
        ));
        assert!(parse_eth(&Term::int(i128::MAX)).is_err());
        let wide = horn::BigInt::parse(&format!("1{}", "0".repeat(60))).unwrap();
        assert!(parse_eth(&wide.into_term()).is_err());
        assert!(parse_eth(&Term::Float(1e40)).is_err());
    }
}
