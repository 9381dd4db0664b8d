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

use crate::directive::{Directive, LogLevel, TextPart};
use crate::hooks::HookError;
use horn::{EngineError, ParseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Program load error: {0}")]
    ProgramLoad(#[from] ParseError),

    #[error("Flow not initialized: {0} requires init")]
    NotInitialized(&'static str),

    #[error("Engine error: {0}")]
    Engine(EngineError),

    #[error("Hook error: {0}")]
    Hook(#[from] HookError),

    #[error("HTTP method not supported: {method}")]
    HttpMethodNotSupported { method: String },

    #[error("Unsupported ABI: {0}")]
    UnsupportedAbi(String),

    #[error("Unknown contract: {0}")]
    UnknownContract(String),

    #[error("Unknown function: {contract}.{function}/{arity}")]
    UnknownFunction {
        contract: String,
        function: String,
        arity: usize,
    },

    #[error("Unknown oracle: {0}")]
    UnknownOracle(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<EngineError> for FlowError {
    /// Host predicates raise `FlowError`s through the engine; unwrap them here.
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::Host(inner) => match inner.downcast::<FlowError>() {
                Ok(flow) => *flow,
                Err(other) => FlowError::Engine(EngineError::Host(other)),
            },
            other => FlowError::Engine(other),
        }
    }
}

impl From<FlowError> for EngineError {
    fn from(error: FlowError) -> Self {
        EngineError::host(error)
    }
}

impl From<toml::de::Error> for FlowError {
    fn from(error: toml::de::Error) -> Self {
        FlowError::Config(format!("TOML parse error: {error}"))
    }
}

impl FlowError {
    /// Only a broken resolver aborts a whole resolution pass.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FlowError::Engine(engine) if engine.is_fatal())
    }

    pub fn to_directive(&self) -> Directive {
        Directive::Log {
            level: LogLevel::Error,
            inner: Box::new(Directive::Text {
                parts: vec![TextPart::Str(self.to_string())],
            }),
        }
    }
}

pub type FlowResult<T> = Result<T, FlowError>;
