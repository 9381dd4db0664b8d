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

//! A small Prolog dialect: reader, clause database and an async resolver
//! whose extension predicates are supplied by a [`Host`].

mod arith;
pub mod bigint;
pub mod bindings;
mod builtins;
pub mod database;
pub mod error;
pub mod host;
mod lexer;
mod machine;
pub mod parser;
pub mod resolver;
pub mod term;

pub use bigint::BigInt;
pub use bindings::{unify_terms, Bindings};
pub use database::{parse_program, Clause, Database, Query};
pub use error::{EngineError, EngineResult, ParseError};
pub use host::{Host, NoHost, Reply};
pub use parser::{OpTable, OpType};
pub use resolver::{Limits, Resolver, SldResolver, Solution};
pub use term::{standard_order, Term, VarId};
