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

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookError {
    #[error("Call reverted: {0}")]
    Reverted(String),
    #[error("Transport failure: {0}")]
    Transport(String),
    #[error("Request rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mutability {
    pub view: bool,
    pub pure: bool,
    pub payable: bool,
    pub nonpayable: bool,
}

impl Mutability {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let mut flags = Self::default();
        match keyword {
            "view" => flags.view = true,
            "pure" => flags.pure = true,
            "payable" => flags.payable = true,
            "nonpayable" => flags.nonpayable = true,
            _ => return None,
        }
        Some(flags)
    }

    pub fn nonpayable() -> Self {
        Self {
            nonpayable: true,
            ..Self::default()
        }
    }

    /// Read-only calls are the only cacheable ones.
    pub fn is_read_only(&self) -> bool {
        self.view || self.pure
    }

    pub fn keyword(&self) -> &'static str {
        if self.view {
            "view"
        } else if self.pure {
            "pure"
        } else if self.payable {
            "payable"
        } else {
            "nonpayable"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockView {
    pub account: String,
    pub number: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallFnRequest {
    pub block: BlockView,
    pub contract: String,
    pub address: String,
    pub function: String,
    pub signature: String,
    pub param_types: Vec<String>,
    pub args: Vec<Value>,
    pub return_types: Vec<String>,
    /// Attached value in wei, as a decimal string.
    pub value: Option<String>,
    pub mutability: Mutability,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub id: String,
    pub block_number: Option<u64>,
}

/// A submitted transaction whose outcome arrives later.
#[async_trait]
pub trait PendingTransaction: Send {
    fn id(&self) -> String;

    async fn wait(self: Box<Self>) -> Result<TxReceipt, HookError>;
}

pub enum CallOutcome {
    Returned(Vec<Value>),
    Pending(Box<dyn PendingTransaction>),
}

impl std::fmt::Debug for CallOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallOutcome::Returned(values) => f.debug_tuple("Returned").field(values).finish(),
            CallOutcome::Pending(tx) => f.debug_tuple("Pending").field(&tx.id()).finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON body; `None` when absent or not JSON.
    pub body: Option<Value>,
}

/// Host-supplied side effects. `Env` is whatever the host passes to `init`
/// (a provider handle, a signer, a test fixture).
#[async_trait]
pub trait FlowHooks: Send + Sync + 'static {
    type Env: Send + Sync + 'static;

    async fn call_fn(
        &self,
        env: &Self::Env,
        request: CallFnRequest,
    ) -> Result<CallOutcome, HookError>;

    async fn call_http(
        &self,
        _env: &Self::Env,
        request: HttpRequest,
    ) -> Result<HttpResponse, HookError> {
        Err(HookError::Rejected(format!(
            "no HTTP transport configured for {}",
            request.url
        )))
    }
}
