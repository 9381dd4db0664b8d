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

//! Integers past the `i128` range, as met in 256-bit contract values.
//!
//! A [`BigInt`] only ever appears in a [`Term`] when its value does not fit
//! `i128`; [`BigInt::into_term`] keeps that representation canonical so
//! unification can compare integers structurally.

use crate::term::Term;
use alloy_primitives::U256;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BigInt {
    negative: bool,
    magnitude: U256,
}

impl BigInt {
    pub fn new(negative: bool, magnitude: U256) -> Self {
        Self {
            negative: negative && !magnitude.is_zero(),
            magnitude,
        }
    }

    pub fn from_i128(value: i128) -> Self {
        Self::new(value < 0, U256::from(value.unsigned_abs()))
    }

    /// Parses an optionally negative run of decimal digits.
    pub fn parse(text: &str) -> Option<Self> {
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        U256::from_str_radix(digits, 10)
            .ok()
            .map(|magnitude| Self::new(negative, magnitude))
    }

    pub const fn is_negative(&self) -> bool {
        self.negative
    }

    pub const fn magnitude(&self) -> U256 {
        self.magnitude
    }

    pub fn to_i128(self) -> Option<i128> {
        if self.magnitude.bit_len() > 128 {
            return None;
        }
        let [low, high, ..] = *self.magnitude.as_limbs();
        let small = u128::from(low) | (u128::from(high) << 64);
        if self.negative {
            0i128.checked_sub_unsigned(small)
        } else {
            i128::try_from(small).ok()
        }
    }

    /// `Term::Int` when the value fits, `Term::BigInt` otherwise.
    pub fn into_term(self) -> Term {
        self.to_i128().map_or(Term::BigInt(self), Term::Int)
    }

    #[must_use]
    pub fn neg(self) -> Self {
        Self::new(!self.negative, self.magnitude)
    }

    #[must_use]
    pub fn abs(self) -> Self {
        Self::new(false, self.magnitude)
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        if self.negative == other.negative {
            return self
                .magnitude
                .checked_add(other.magnitude)
                .map(|magnitude| Self::new(self.negative, magnitude));
        }
        Some(if self.magnitude >= other.magnitude {
            Self::new(self.negative, self.magnitude.wrapping_sub(other.magnitude))
        } else {
            Self::new(other.negative, other.magnitude.wrapping_sub(self.magnitude))
        })
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.checked_add(other.neg())
    }

    pub fn checked_mul(self, other: Self) -> Option<Self> {
        self.magnitude
            .checked_mul(other.magnitude)
            .map(|magnitude| Self::new(self.negative != other.negative, magnitude))
    }

    pub fn to_f64(self) -> f64 {
        self.to_string().parse().unwrap_or(f64::NAN)
    }
}

impl Ord for BigInt {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, false) => self.magnitude.cmp(&other.magnitude),
            (true, true) => other.magnitude.cmp(&self.magnitude),
        }
    }
}

impl PartialOrd for BigInt {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }
        write!(f, "{}", self.magnitude)
    }
}
