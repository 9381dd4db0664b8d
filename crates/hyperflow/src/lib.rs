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

//! Hyperflow drives a dApp user interface from a small logic program.
//!
//! A [`Flow`] loads the program, resolves `prompt/0` into directive trees,
//! binds user input, and executes button actions through host-supplied
//! [`FlowHooks`] for contract and HTTP calls. View-call results are cached
//! per block number.

pub mod abi;
pub mod block;
pub mod config;
pub mod convert;
pub mod directive;
pub mod effect;
pub mod error;
pub mod executor;
pub mod flow;
pub mod hooks;
pub mod host;
pub mod input;
pub mod loader;
pub mod logging;
pub mod resolver;

pub use block::{Block, CacheStats, CallKey};
pub use config::FlowConfig;
pub use directive::{ActionRef, ButtonAttrs, Directive, InputKind, LogLevel, Prompt, TextPart};
pub use effect::{Effect, RawEffect, TxStatus};
pub use error::{FlowError, FlowResult};
pub use executor::Execution;
pub use flow::{Flow, PromptMatch};
pub use hooks::{
    BlockView, CallFnRequest, CallOutcome, FlowHooks, HookError, HttpRequest, HttpResponse,
    Mutability, PendingTransaction, TxReceipt,
};
pub use input::InputResult;
pub use loader::Program;

pub use horn::{Resolver, SldResolver, Term};
