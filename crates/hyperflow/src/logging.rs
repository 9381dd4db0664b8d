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

use serde_json::Value;
use tracing::{debug, error, info, warn};

pub fn log_flow_event(event: &str, payload: Value) {
    debug!(
        event = event,
        payload = %serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_string()),
        "Flow event"
    );
}

pub fn log_resolution(block_number: u64, prompts: usize, excluded: usize) {
    info!(
        block_number = block_number,
        prompts = prompts,
        excluded_clauses = excluded,
        "Prompts resolved"
    );
}

pub fn log_hook_call(hook: &str, target: &str, cached: bool) {
    debug!(hook = hook, target = target, cached = cached, "Hook call");
}

pub fn log_effect(kind: &str, payload: Value) {
    debug!(
        kind = kind,
        payload = %serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_string()),
        "Effect emitted"
    );
}

pub fn log_unrecognized_effect(kind: &str, arity: usize) {
    warn!(kind = kind, arity = arity, "Unrecognized effect passed through");
}

pub fn log_error(context: &str, error: &dyn std::error::Error) {
    error!(
        context = context,
        error = %error,
        "Flow error"
    );
}
