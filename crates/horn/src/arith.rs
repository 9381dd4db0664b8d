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
use crate::bindings::Bindings;
use crate::error::{EngineError, EngineResult};
use crate::term::Term;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Number {
    Int(i128),
    /// Never holds a value that fits `Int`.
    Big(BigInt),
    Float(f64),
}

impl Number {
    pub(crate) fn into_term(self) -> Term {
        match self {
            Number::Int(value) => Term::Int(value),
            Number::Big(value) => value.into_term(),
            Number::Float(value) => Term::Float(value),
        }
    }

    fn from_wide(value: BigInt) -> Self {
        value.to_i128().map_or(Number::Big(value), Number::Int)
    }

    fn wide(self) -> Option<BigInt> {
        match self {
            Number::Int(value) => Some(BigInt::from_i128(value)),
            Number::Big(value) => Some(value),
            Number::Float(_) => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(value) => value as f64,
            Number::Big(value) => value.to_f64(),
            Number::Float(value) => value,
        }
    }

    pub(crate) fn compare(self, other: Number) -> Ordering {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a.cmp(&b),
            (a, b) => match (a.wide(), b.wide()) {
                (Some(a), Some(b)) => a.cmp(&b),
                _ => a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(Ordering::Equal),
            },
        }
    }
}

fn overflow() -> EngineError {
    EngineError::Evaluation("integer overflow".to_string())
}

fn require_int(value: Number, op: &str) -> EngineResult<i128> {
    match value {
        Number::Int(v) => Ok(v),
        Number::Big(v) => Err(EngineError::Evaluation(format!(
            "{op} needs an integer within 128 bits, got {v}"
        ))),
        Number::Float(v) => Err(EngineError::Type {
            expected: format!("integer operand for {op}"),
            found: Term::Float(v).to_string(),
        }),
    }
}

fn float_to_int(value: f64) -> EngineResult<Number> {
    if !value.is_finite() || value.abs() >= 1.7e38 {
        return Err(EngineError::Evaluation(format!(
            "cannot convert {value} to integer"
        )));
    }
    Ok(Number::Int(value as i128))
}

fn checked(result: Option<i128>) -> EngineResult<Number> {
    result.map(Number::Int).ok_or_else(overflow)
}

/// `+`, `-` and `*` on integers, widening past `i128` when needed.
fn integer_op(name: &str, x: Number, y: Number) -> EngineResult<Number> {
    if let (Number::Int(a), Number::Int(b)) = (x, y) {
        let narrow = match name {
            "+" => a.checked_add(b),
            "-" => a.checked_sub(b),
            _ => a.checked_mul(b),
        };
        if let Some(value) = narrow {
            return Ok(Number::Int(value));
        }
    }
    let (a, b) = (x.wide().ok_or_else(overflow)?, y.wide().ok_or_else(overflow)?);
    let wide = match name {
        "+" => a.checked_add(b),
        "-" => a.checked_sub(b),
        _ => a.checked_mul(b),
    };
    wide.map(Number::from_wide).ok_or_else(overflow)
}

pub(crate) fn eval(bindings: &Bindings, term: &Term) -> EngineResult<Number> {
    let term = bindings.deref(term);
    match &term {
        Term::Int(value) => Ok(Number::Int(*value)),
        Term::BigInt(value) => Ok(Number::from_wide(*value)),
        Term::Float(value) => Ok(Number::Float(*value)),
        Term::Var(_) => Err(EngineError::Instantiation(
            "arithmetic expression is not sufficiently instantiated".to_string(),
        )),
        Term::Atom(name) => match &**name {
            "pi" => Ok(Number::Float(std::f64::consts::PI)),
            "e" => Ok(Number::Float(std::f64::consts::E)),
            "inf" | "infinite" => Ok(Number::Float(f64::INFINITY)),
            "nan" => Ok(Number::Float(f64::NAN)),
            "max_tagged_integer" => Ok(Number::Int(i128::from(i64::MAX))),
            _ => Err(EngineError::type_error("evaluable", &term)),
        },
        Term::Compound(name, args) => match args.len() {
            1 => unary(name, eval(bindings, &args[0])?, &term),
            2 => binary(
                name,
                eval(bindings, &args[0])?,
                eval(bindings, &args[1])?,
                &term,
            ),
            _ => Err(EngineError::type_error("evaluable", &term)),
        },
    }
}

fn unary(name: &str, x: Number, term: &Term) -> EngineResult<Number> {
    match (name, x) {
        ("-", Number::Int(v)) => Ok(v
            .checked_neg()
            .map_or_else(|| Number::from_wide(BigInt::from_i128(v).neg()), Number::Int)),
        ("-", Number::Big(v)) => Ok(Number::from_wide(v.neg())),
        ("-", Number::Float(v)) => Ok(Number::Float(-v)),
        ("+", v) => Ok(v),
        ("abs", Number::Int(v)) => Ok(v
            .checked_abs()
            .map_or_else(|| Number::from_wide(BigInt::from_i128(v).abs()), Number::Int)),
        ("abs", Number::Big(v)) => Ok(Number::from_wide(v.abs())),
        ("abs", Number::Float(v)) => Ok(Number::Float(v.abs())),
        ("sign", Number::Int(v)) => Ok(Number::Int(v.signum())),
        ("sign", Number::Big(v)) => Ok(Number::Int(if v.is_negative() { -1 } else { 1 })),
        ("sign", Number::Float(v)) => Ok(Number::Float(if v == 0.0 { 0.0 } else { v.signum() })),
        ("float", v) => Ok(Number::Float(v.as_f64())),
        ("integer", v @ (Number::Int(_) | Number::Big(_))) => Ok(v),
        ("integer" | "round", v) => float_to_int(v.as_f64().round()),
        ("truncate", v) => float_to_int(v.as_f64().trunc()),
        ("floor", v) => float_to_int(v.as_f64().floor()),
        ("ceiling", v) => float_to_int(v.as_f64().ceil()),
        ("sqrt", v) => Ok(Number::Float(v.as_f64().sqrt())),
        ("exp", v) => Ok(Number::Float(v.as_f64().exp())),
        ("log", v) => Ok(Number::Float(v.as_f64().ln())),
        ("\\", v) => Ok(Number::Int(!require_int(v, "\\")?)),
        _ => Err(EngineError::type_error("evaluable", term)),
    }
}

fn int_pow(base: i128, exp: i128) -> EngineResult<Number> {
    if exp < 0 {
        return match base {
            1 => Ok(Number::Int(1)),
            -1 => Ok(Number::Int(if exp % 2 == 0 { 1 } else { -1 })),
            _ => Err(EngineError::Evaluation(
                "negative exponent for integer power".to_string(),
            )),
        };
    }
    let exp = u32::try_from(exp).map_err(|_| overflow())?;
    if let Some(value) = base.checked_pow(exp) {
        return Ok(Number::Int(value));
    }
    // |base| >= 2 here, so the loop overflows within 256 rounds.
    let factor = BigInt::from_i128(base);
    let mut acc = BigInt::from_i128(1);
    for _ in 0..exp {
        acc = acc.checked_mul(factor).ok_or_else(overflow)?;
    }
    Ok(Number::from_wide(acc))
}

fn binary(name: &str, x: Number, y: Number, term: &Term) -> EngineResult<Number> {
    use Number::{Big, Float, Int};
    match (name, x, y) {
        ("+" | "-" | "*", Int(_) | Big(_), Int(_) | Big(_)) => integer_op(name, x, y),
        ("+", a, b) => Ok(Float(a.as_f64() + b.as_f64())),
        ("-", a, b) => Ok(Float(a.as_f64() - b.as_f64())),
        ("*", a, b) => Ok(Float(a.as_f64() * b.as_f64())),
        ("/", Int(_), Int(0)) | ("//" | "mod" | "rem" | "div", _, Int(0)) => {
            Err(EngineError::Evaluation("zero divisor".to_string()))
        }
        ("/", Int(a), Int(b)) if a % b == 0 => Ok(Int(a / b)),
        ("/", a, b) => Ok(Float(a.as_f64() / b.as_f64())),
        ("//", a, b) => checked(require_int(a, "//")?.checked_div(require_int(b, "//")?)),
        ("rem", a, b) => checked(require_int(a, "rem")?.checked_rem(require_int(b, "rem")?)),
        ("mod", a, b) => {
            let (a, b) = (require_int(a, "mod")?, require_int(b, "mod")?);
            checked(a.checked_rem(b).map(|r| if r != 0 && (r < 0) != (b < 0) { r + b } else { r }))
        }
        ("div", a, b) => {
            let (a, b) = (require_int(a, "div")?, require_int(b, "div")?);
            let q = a.checked_div(b).ok_or_else(overflow)?;
            Ok(Int(if a % b != 0 && ((a < 0) != (b < 0)) { q - 1 } else { q }))
        }
        ("min", a, b) => Ok(if a.compare(b) == Ordering::Greater { b } else { a }),
        ("max", a, b) => Ok(if a.compare(b) == Ordering::Less { b } else { a }),
        ("^", Int(a), Int(b)) => int_pow(a, b),
        ("**", Int(a), Int(b)) if b >= 0 => int_pow(a, b),
        ("^" | "**", a, b) => Ok(Float(a.as_f64().powf(b.as_f64()))),
        (">>", a, b) => {
            let shift = u32::try_from(require_int(b, ">>")?).map_err(|_| overflow())?;
            checked(require_int(a, ">>")?.checked_shr(shift))
        }
        ("<<", a, b) => {
            let shift = u32::try_from(require_int(b, "<<")?).map_err(|_| overflow())?;
            checked(require_int(a, "<<")?.checked_shl(shift))
        }
        ("/\\", a, b) => Ok(Int(require_int(a, "/\\")? & require_int(b, "/\\")?)),
        ("\\/", a, b) => Ok(Int(require_int(a, "\\/")? | require_int(b, "\\/")?)),
        ("xor", a, b) => Ok(Int(require_int(a, "xor")? ^ require_int(b, "xor")?)),
        ("atan2", a, b) => Ok(Float(a.as_f64().atan2(b.as_f64()))),
        _ => Err(EngineError::type_error("evaluable", term)),
    }
}

/// Evaluates both sides and compares numerically.
pub(crate) fn compare(bindings: &Bindings, left: &Term, right: &Term) -> EngineResult<Ordering> {
    Ok(eval(bindings, left)?.compare(eval(bindings, right)?))
}
