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

use crate::term::Term;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("Syntax error at {line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("Invalid clause at line {line}: {message}")]
    InvalidClause { line: usize, message: String },
}

impl ParseError {
    pub fn line(&self) -> usize {
        match self {
            ParseError::Syntax { line, .. } | ParseError::InvalidClause { line, .. } => *line,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Instantiation error: {0}")]
    Instantiation(String),

    #[error("Type error: expected {expected}, found {found}")]
    Type { expected: String, found: String },

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Unknown predicate: {name}/{arity}")]
    UnknownPredicate { name: String, arity: usize },

    #[error("Uncaught exception: {0}")]
    Thrown(Term),

    #[error("Step limit exceeded: {0} inferences")]
    StepLimit(u64),

    #[error("Host predicate error: {0}")]
    Host(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Internal resolver error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn type_error(expected: impl Into<String>, found: &Term) -> Self {
        EngineError::Type {
            expected: expected.into(),
            found: found.to_string(),
        }
    }

    pub fn host(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        EngineError::Host(Box::new(error))
    }

    /// Fatal errors mean the resolver itself is broken, not the program.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Internal(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
