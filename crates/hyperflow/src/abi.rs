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

//! ABI entries as written in flow programs:
//! `name(Type, ...): Returns / Mutability`, with every part after the
//! signature optional.

use crate::convert::wide_to_json;
use crate::error::{FlowError, FlowResult};
use crate::hooks::Mutability;
use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{Address, B256, I256, U256};
use horn::{BigInt, Term};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("valid regex"));
static HEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0x([0-9a-fA-F]{2})*$").expect("valid regex"));

/// Parses a type as a program writes it: an atom such as `uint` or
/// `'bytes32[]'`, `array(T)`, or a flat `tuple(T, ...)`.
pub fn parse_type(term: &Term) -> FlowResult<DynSolType> {
    let name = type_name(term)?;
    let parsed = DynSolType::parse(&name)
        .map_err(|e| FlowError::UnsupportedAbi(format!("unknown ABI type {term}: {e}")))?;
    if nested_tuple(&parsed, false) {
        return Err(FlowError::UnsupportedAbi(format!(
            "nested tuples are not supported: {term}"
        )));
    }
    Ok(parsed)
}

fn type_name(term: &Term) -> FlowResult<String> {
    if term.is_functor("array", 1) {
        return Ok(format!("{}[]", type_name(&term.args()[0])?));
    }
    if term.name() == Some("tuple") && term.arity() > 0 {
        let items = term
            .args()
            .iter()
            .map(type_name)
            .collect::<FlowResult<Vec<_>>>()?;
        return Ok(format!("({})", items.join(",")));
    }
    match term.as_atom() {
        Some("uint") => Ok("uint256".to_string()),
        Some("int") => Ok("int256".to_string()),
        Some(name) => Ok(name.to_string()),
        None => Err(FlowError::UnsupportedAbi(format!("unknown ABI type {term}"))),
    }
}

fn nested_tuple(ty: &DynSolType, inside: bool) -> bool {
    match ty {
        DynSolType::Tuple(items) => inside || items.iter().any(|item| nested_tuple(item, true)),
        DynSolType::Array(inner) | DynSolType::FixedArray(inner, _) => nested_tuple(inner, inside),
        _ => false,
    }
}

fn unsupported(ty: &DynSolType) -> FlowError {
    FlowError::UnsupportedAbi(format!("{} values are not supported", ty.sol_type_name()))
}

/// Checks a program-supplied argument against its ABI type.
pub fn encode(ty: &DynSolType, term: &Term) -> FlowResult<DynSolValue> {
    let invalid = || {
        FlowError::InvalidArgument(format!("{term} is not a valid {}", ty.sol_type_name()))
    };
    let hex_atom = || term.as_atom().and_then(hex_bytes).ok_or_else(invalid);
    match ty {
        DynSolType::Uint(bits) => integer_term(term)
            .and_then(|value| uint_value(value, *bits))
            .map(|value| DynSolValue::Uint(value, *bits))
            .ok_or_else(invalid),
        DynSolType::Int(bits) => integer_term(term)
            .and_then(|value| int_value(value, *bits))
            .map(|value| DynSolValue::Int(value, *bits))
            .ok_or_else(invalid),
        DynSolType::Address => term
            .as_atom()
            .and_then(parse_address)
            .map(DynSolValue::Address)
            .ok_or_else(invalid),
        DynSolType::Bool => match term.as_atom() {
            Some("true") => Ok(DynSolValue::Bool(true)),
            Some("false") => Ok(DynSolValue::Bool(false)),
            _ => Err(invalid()),
        },
        DynSolType::String => term.text().map(DynSolValue::String).ok_or_else(invalid),
        DynSolType::Bytes => hex_atom().map(DynSolValue::Bytes),
        DynSolType::FixedBytes(size) => fixed_word(&hex_atom()?, *size)
            .map(|word| DynSolValue::FixedBytes(word, *size))
            .ok_or_else(invalid),
        DynSolType::Array(inner) => {
            let items = term.list_items().ok_or_else(invalid)?;
            encode_all(inner, &items).map(DynSolValue::Array)
        }
        DynSolType::FixedArray(inner, len) => {
            let items = term
                .list_items()
                .filter(|items| items.len() == *len)
                .ok_or_else(invalid)?;
            encode_all(inner, &items).map(DynSolValue::FixedArray)
        }
        DynSolType::Tuple(types) => {
            let items = term
                .list_items()
                .or_else(|| (term.name() == Some("tuple")).then(|| term.args().to_vec()))
                .filter(|items| items.len() == types.len())
                .ok_or_else(invalid)?;
            types
                .iter()
                .zip(&items)
                .map(|(ty, item)| encode(ty, item))
                .collect::<FlowResult<Vec<_>>>()
                .map(DynSolValue::Tuple)
        }
        other => Err(unsupported(other)),
    }
}

fn encode_all(ty: &DynSolType, items: &[Term]) -> FlowResult<Vec<DynSolValue>> {
    items.iter().map(|item| encode(ty, item)).collect()
}

/// Validates a value returned by the call hook and converts it to a term.
pub fn decode(ty: &DynSolType, value: &Value) -> FlowResult<Term> {
    from_json(ty, value).map(|decoded| to_term(&decoded))
}

fn from_json(ty: &DynSolType, value: &Value) -> FlowResult<DynSolValue> {
    let invalid = || {
        FlowError::InvalidArgument(format!("hook returned {value} for {}", ty.sol_type_name()))
    };
    let hex_text = || value.as_str().and_then(hex_bytes).ok_or_else(invalid);
    let items = |expected: Option<usize>| {
        value
            .as_array()
            .filter(|items| expected.map_or(true, |len| items.len() == len))
            .ok_or_else(invalid)
    };
    match ty {
        DynSolType::Uint(bits) => integer_json(value)
            .and_then(|wide| uint_value(wide, *bits))
            .map(|wide| DynSolValue::Uint(wide, *bits))
            .ok_or_else(invalid),
        DynSolType::Int(bits) => integer_json(value)
            .and_then(|wide| int_value(wide, *bits))
            .map(|wide| DynSolValue::Int(wide, *bits))
            .ok_or_else(invalid),
        DynSolType::Address => value
            .as_str()
            .and_then(parse_address)
            .map(DynSolValue::Address)
            .ok_or_else(invalid),
        DynSolType::Bool => value.as_bool().map(DynSolValue::Bool).ok_or_else(invalid),
        DynSolType::String => value
            .as_str()
            .map(|text| DynSolValue::String(text.to_string()))
            .ok_or_else(invalid),
        DynSolType::Bytes => hex_text().map(DynSolValue::Bytes),
        DynSolType::FixedBytes(size) => fixed_word(&hex_text()?, *size)
            .map(|word| DynSolValue::FixedBytes(word, *size))
            .ok_or_else(invalid),
        DynSolType::Array(inner) => items(None)?
            .iter()
            .map(|item| from_json(inner, item))
            .collect::<FlowResult<Vec<_>>>()
            .map(DynSolValue::Array),
        DynSolType::FixedArray(inner, len) => items(Some(*len))?
            .iter()
            .map(|item| from_json(inner, item))
            .collect::<FlowResult<Vec<_>>>()
            .map(DynSolValue::FixedArray),
        DynSolType::Tuple(types) => types
            .iter()
            .zip(items(Some(types.len()))?)
            .map(|(ty, item)| from_json(ty, item))
            .collect::<FlowResult<Vec<_>>>()
            .map(DynSolValue::Tuple),
        other => Err(unsupported(other)),
    }
}

/// Term form of an ABI value: integers exact, addresses and byte strings as
/// lowercase `0x` atoms, arrays and tuples as lists.
pub fn to_term(value: &DynSolValue) -> Term {
    match value {
        DynSolValue::Bool(flag) => Term::atom(if *flag { "true" } else { "false" }),
        DynSolValue::Uint(wide, _) => BigInt::new(false, *wide).into_term(),
        DynSolValue::Int(wide, _) => signed(*wide).into_term(),
        DynSolValue::Address(address) => Term::atom(format!("0x{}", hex::encode(address))),
        DynSolValue::FixedBytes(word, size) => {
            Term::atom(format!("0x{}", hex::encode(&word[..*size])))
        }
        DynSolValue::Bytes(bytes) => Term::atom(format!("0x{}", hex::encode(bytes))),
        DynSolValue::String(text) => Term::atom(text),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Term::list(items.iter().map(to_term))
        }
        other => Term::atom(format!("{other:?}")),
    }
}

/// JSON form handed to the call hook. Integers past `i64`/`u64` travel as
/// decimal strings.
pub fn to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(flag) => Value::Bool(*flag),
        DynSolValue::Uint(wide, _) => wide_to_json(BigInt::new(false, *wide)),
        DynSolValue::Int(wide, _) => wide_to_json(signed(*wide)),
        DynSolValue::String(text) => Value::String(text.clone()),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(to_json).collect())
        }
        other => match to_term(other) {
            Term::Atom(text) => Value::String(text.to_string()),
            _ => Value::Null,
        },
    }
}

fn signed(value: I256) -> BigInt {
    BigInt::new(value.is_negative(), value.unsigned_abs())
}

fn integer_term(term: &Term) -> Option<BigInt> {
    term.as_integer()
        .or_else(|| term.as_atom().and_then(integer_text))
}

fn integer_json(value: &Value) -> Option<BigInt> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .map(i128::from)
            .or_else(|| number.as_u64().map(i128::from))
            .map(BigInt::from_i128),
        Value::String(text) => integer_text(text),
        _ => None,
    }
}

/// Decimal, or `0x` hex for non-negative values.
fn integer_text(text: &str) -> Option<BigInt> {
    let text = text.trim();
    match text.strip_prefix("0x") {
        Some(digits) if !digits.is_empty() => U256::from_str_radix(digits, 16)
            .ok()
            .map(|magnitude| BigInt::new(false, magnitude)),
        Some(_) => None,
        None => BigInt::parse(text),
    }
}

fn uint_value(value: BigInt, bits: usize) -> Option<U256> {
    (!value.is_negative() && value.magnitude().bit_len() <= bits).then(|| value.magnitude())
}

fn int_value(value: BigInt, bits: usize) -> Option<I256> {
    let magnitude = value.magnitude();
    let limit = U256::from(1u8) << (bits - 1);
    if value.is_negative() {
        (magnitude <= limit).then(|| I256::from_raw(magnitude.wrapping_neg()))
    } else {
        (magnitude < limit).then(|| I256::from_raw(magnitude))
    }
}

fn parse_address(text: &str) -> Option<Address> {
    if !ADDRESS_RE.is_match(text) {
        return None;
    }
    let bytes = hex::decode(&text[2..]).ok()?;
    <[u8; 20]>::try_from(bytes.as_slice()).ok().map(Address::from)
}

fn hex_bytes(text: &str) -> Option<Vec<u8>> {
    if !HEX_RE.is_match(text) {
        return None;
    }
    hex::decode(&text[2..]).ok()
}

fn fixed_word(bytes: &[u8], size: usize) -> Option<B256> {
    if bytes.len() != size || size > 32 {
        return None;
    }
    let mut word = [0u8; 32];
    word[..size].copy_from_slice(bytes);
    Some(B256::from(word))
}

#[derive(Debug, Clone, PartialEq)]
pub struct AbiFunction {
    pub name: String,
    pub inputs: Vec<DynSolType>,
    pub outputs: Vec<DynSolType>,
    pub mutability: Mutability,
}

impl AbiFunction {
    pub fn parse(entry: &Term) -> FlowResult<Self> {
        let (body, mutability) = split_mutability(entry);
        let (signature, outputs) = if body.is_functor(":", 2) {
            (&body.args()[0], parse_outputs(&body.args()[1])?)
        } else {
            (&body, Vec::new())
        };
        let name = signature
            .name()
            .ok_or_else(|| FlowError::UnsupportedAbi(format!("invalid ABI signature {signature}")))?
            .to_string();
        let inputs = signature
            .args()
            .iter()
            .map(parse_type)
            .collect::<FlowResult<Vec<_>>>()?;
        Ok(Self {
            name,
            inputs,
            outputs,
            mutability,
        })
    }

    /// Canonical signature, e.g. `entries(uint256,uint256)`.
    pub fn signature(&self) -> String {
        format!("{}({})", self.name, self.param_types().join(","))
    }

    pub fn param_types(&self) -> Vec<String> {
        type_names(&self.inputs)
    }

    pub fn return_types(&self) -> Vec<String> {
        type_names(&self.outputs)
    }

    pub fn encode_args(&self, args: &[Term]) -> FlowResult<Vec<DynSolValue>> {
        self.inputs
            .iter()
            .zip(args)
            .map(|(ty, arg)| encode(ty, arg))
            .collect()
    }

    pub fn decode_outputs(&self, values: &[Value]) -> FlowResult<Vec<Term>> {
        if values.len() != self.outputs.len() {
            return Err(FlowError::InvalidArgument(format!(
                "{} returned {} values, expected {}",
                self.signature(),
                values.len(),
                self.outputs.len()
            )));
        }
        self.outputs
            .iter()
            .zip(values)
            .map(|(ty, value)| decode(ty, value))
            .collect()
    }
}

fn type_names(types: &[DynSolType]) -> Vec<String> {
    types.iter().map(|ty| ty.sol_type_name().into_owned()).collect()
}

fn mutability_keyword(term: &Term) -> Option<Mutability> {
    term.as_atom().and_then(Mutability::from_keyword)
}

fn split_mutability(entry: &Term) -> (Term, Mutability) {
    if entry.is_functor("/", 2) {
        if let Some(mutability) = mutability_keyword(&entry.args()[1]) {
            return (entry.args()[0].clone(), mutability);
        }
    }
    if entry.is_functor(":", 2) {
        let (signature, rest) = (&entry.args()[0], &entry.args()[1]);
        if let Some(mutability) = mutability_keyword(rest) {
            return (signature.clone(), mutability);
        }
        if rest.is_functor("/", 2) {
            if let Some(mutability) = mutability_keyword(&rest.args()[1]) {
                let body = Term::compound(":", vec![signature.clone(), rest.args()[0].clone()]);
                return (body, mutability);
            }
        }
    }
    (entry.clone(), Mutability::nonpayable())
}

fn parse_outputs(term: &Term) -> FlowResult<Vec<DynSolType>> {
    match term.list_items() {
        Some(items) if !term.is_nil() => items.iter().map(parse_type).collect(),
        Some(_) => Ok(Vec::new()),
        None => Ok(vec![parse_type(term)?]),
    }
}

/// The functions of one contract, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContractAbi {
    pub functions: Vec<AbiFunction>,
}

impl ContractAbi {
    pub fn parse(entries: &Term) -> FlowResult<Self> {
        let items = entries.list_items().ok_or_else(|| {
            FlowError::UnsupportedAbi(format!("abi/2 expects a list of entries, got {entries}"))
        })?;
        let functions = items
            .iter()
            .map(AbiFunction::parse)
            .collect::<FlowResult<Vec<_>>>()?;
        Ok(Self { functions })
    }

    pub fn find(&self, name: &str, arity: usize) -> Option<&AbiFunction> {
        self.functions
            .iter()
            .find(|function| function.name == name && function.inputs.len() == arity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn term(text: &str) -> Term {
        horn::Database::with_prelude().parse_query(text).unwrap().goal
    }

    #[test]
    fn test_entry_shapes() {
        let abi = ContractAbi::parse(&term(
            "[create, guestbooks(address): uint / view, entryCount(uint256): view, \
              entries(uint256, uint256): tuple(address, uint256, string) / view, \
              sign(uint256, string): payable]",
        ))
        .unwrap();
        assert_eq!(abi.functions.len(), 5);

        let create = abi.find("create", 0).unwrap();
        assert_eq!(create.signature(), "create()");
        assert!(create.mutability.nonpayable);

        let guestbooks = abi.find("guestbooks", 1).unwrap();
        assert_eq!(guestbooks.signature(), "guestbooks(address)");
        assert_eq!(guestbooks.outputs, vec![DynSolType::Uint(256)]);
        assert!(guestbooks.mutability.view);

        let count = abi.find("entryCount", 1).unwrap();
        assert!(count.outputs.is_empty());
        assert!(count.mutability.view);

        let entries = abi.find("entries", 2).unwrap();
        assert_eq!(entries.outputs[0].sol_type_name(), "(address,uint256,string)");

        assert!(abi.find("sign", 2).unwrap().mutability.payable);
        assert!(abi.find("sign", 1).is_none());
    }

    #[test]
    fn test_nested_tuples_are_unsupported() {
        let result = AbiFunction::parse(&term("f: tuple(uint, tuple(bool)) / view"));
        assert!(matches!(result, Err(FlowError::UnsupportedAbi(_))));
    }

    #[test]
    fn test_array_types() {
        assert_eq!(
            parse_type(&term("array(address)")).unwrap(),
            DynSolType::Array(Box::new(DynSolType::Address))
        );
        assert_eq!(parse_type(&term("'uint8[]'")).unwrap().sol_type_name(), "uint8[]");
        assert_eq!(
            parse_type(&term("tuple(int, 'bytes32[2]')")).unwrap().sol_type_name(),
            "(int256,bytes32[2])"
        );
        assert!(parse_type(&term("uint7")).is_err());
    }

    #[test]
    fn test_argument_encoding() {
        let function = AbiFunction::parse(&term("sign(uint256, string, address)")).unwrap();
        let args = function
            .encode_args(&[
                Term::int(1),
                Term::atom("Good job!"),
                Term::atom("0xAbCdEf0123456789aBcDeF0123456789AbCdEf01"),
            ])
            .unwrap();
        assert_eq!(
            args.iter().map(to_json).collect::<Vec<_>>(),
            vec![
                json!(1),
                json!("Good job!"),
                json!("0xabcdef0123456789abcdef0123456789abcdef01")
            ]
        );
        assert!(function
            .encode_args(&[Term::int(-1), Term::atom("x"), Term::atom("0x1")])
            .is_err());
    }

    #[test]
    fn test_output_decoding() {
        let function =
            AbiFunction::parse(&term("entries(uint, uint): tuple(address, uint, string) / view"))
                .unwrap();
        let decoded = function
            .decode_outputs(&[json!([
                "0x00000000000000000000000000000000000000AB",
                "200000000000000000000",
                "hi"
            ])])
            .unwrap();
        assert_eq!(
            decoded[0].to_string(),
            "['0x00000000000000000000000000000000000000ab',200000000000000000000,hi]"
        );
        assert!(function.decode_outputs(&[]).is_err());
        assert!(function
            .decode_outputs(&[json!(["0xAB", "1", "hi"])])
            .is_err());
    }

    const MAX_UINT256: &str =
        "115792089237316195423570985008687907853269984665640564039457584007913129639935";

    #[test]
    fn test_full_width_integers() {
        let allowance = AbiFunction::parse(&term("allowance(address): uint256 / view")).unwrap();
        let decoded = allowance.decode_outputs(&[json!(MAX_UINT256)]).unwrap();
        assert_eq!(decoded[0].to_string(), MAX_UINT256);
        assert!(matches!(decoded[0], Term::BigInt(_)));
        assert!(allowance
            .decode_outputs(&[json!(format!("{MAX_UINT256}0"))])
            .is_err());

        let hex = allowance.decode_outputs(&[json!(format!("0x{}", "ff".repeat(32)))]).unwrap();
        assert_eq!(hex, decoded);

        let set = AbiFunction::parse(&term("approve(address, uint256)")).unwrap();
        let spender = Term::atom("0x000000000000000000000000000000000000c0de");
        let args = set.encode_args(&[spender, decoded[0].clone()]).unwrap();
        assert_eq!(args[1], DynSolValue::Uint(U256::MAX, 256));
        assert_eq!(to_json(&args[1]), json!(MAX_UINT256));
    }

    #[test]
    fn test_integer_widths_are_checked() {
        let small = AbiFunction::parse(&term("f(uint8, int8)")).unwrap();
        assert!(small.encode_args(&[Term::int(255), Term::int(-128)]).is_ok());
        assert!(small.encode_args(&[Term::int(256), Term::int(0)]).is_err());
        assert!(small.encode_args(&[Term::int(0), Term::int(128)]).is_err());
        assert!(small.encode_args(&[Term::int(0), Term::int(-129)]).is_err());

        let signed = AbiFunction::parse(&term("g: int256 / view")).unwrap();
        let min = "-57896044618658097711785492504343953926634992332820282019728792003956564819968";
        let decoded = signed.decode_outputs(&[json!(min)]).unwrap();
        assert_eq!(decoded[0].to_string(), min);
        let too_small = "-57896044618658097711785492504343953926634992332820282019728792003956564819969";
        assert!(signed.decode_outputs(&[json!(too_small)]).is_err());
    }
}
