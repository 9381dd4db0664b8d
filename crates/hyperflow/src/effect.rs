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

use crate::directive::{Directive, LogLevel};
use horn::Term;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Submitted,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Effect {
    Log {
        level: LogLevel,
        directive: Directive,
    },
    Transaction {
        status: TxStatus,
        id: String,
        error: Option<String>,
    },
}

/// An effect of a kind the engine does not interpret.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawEffect {
    pub kind: String,
    pub args: Vec<Term>,
}

impl RawEffect {
    pub fn to_term(&self) -> Term {
        Term::compound(&self.kind, self.args.clone())
    }
}

/// Either an interpreted effect or a pass-through one.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Known(Effect),
    Raw(RawEffect),
}

impl Effect {
    pub fn submitted(id: impl Into<String>) -> Self {
        Effect::Transaction {
            status: TxStatus::Submitted,
            id: id.into(),
            error: None,
        }
    }

    pub fn confirmed(id: impl Into<String>) -> Self {
        Effect::Transaction {
            status: TxStatus::Confirmed,
            id: id.into(),
            error: None,
        }
    }

    pub fn failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        Effect::Transaction {
            status: TxStatus::Failed,
            id: id.into(),
            error: Some(error.into()),
        }
    }

    /// Sorts an emitted event term into a known effect or a raw one.
    /// `tx(submitted, Id)` is only a transaction effect when `Id` is in
    /// `submitted`, the transactions this run actually sent; any other `tx`
    /// term a program emits passes through untouched.
    pub fn classify(term: &Term, submitted: &[String]) -> Classified {
        let args = term.args();
        match term.name() {
            Some("log") if args.len() == 2 => {
                if let Some(level) = args[0].as_atom().and_then(LogLevel::parse) {
                    let directive = match Directive::from_term(&term_as_directive(&args[1])) {
                        Directive::Log { inner, .. } => *inner,
                        other => other,
                    };
                    return Classified::Known(Effect::Log { level, directive });
                }
            }
            Some("tx") if args.len() == 2 && args[0].as_atom() == Some("submitted") => {
                if let Some(id) = args[1].as_atom().filter(|id| submitted.iter().any(|s| s == id)) {
                    return Classified::Known(Effect::submitted(id));
                }
            }
            _ => {}
        }
        Classified::Raw(RawEffect {
            kind: term.name().map(str::to_string).unwrap_or_else(|| term.to_string()),
            args: args.to_vec(),
        })
    }

    pub fn to_term(&self) -> Term {
        match self {
            Effect::Log { level, directive } => Term::compound(
                "log",
                vec![Term::atom(level.as_str()), directive.to_term()],
            ),
            Effect::Transaction { status, id, error } => {
                let mut args = vec![Term::atom(status.as_str()), Term::atom(id)];
                if let Some(error) = error {
                    args.push(Term::atom(error));
                }
                Term::compound("tx", args)
            }
        }
    }

    pub fn to_directive(&self) -> Directive {
        match self {
            Effect::Log { level, directive } => Directive::Log {
                level: *level,
                inner: Box::new(directive.clone()),
            },
            Effect::Transaction { status, id, error } => {
                let (level, message) = match status {
                    TxStatus::Submitted => (LogLevel::Notice, format!("Transaction submitted: {id}")),
                    TxStatus::Confirmed => (LogLevel::Success, format!("Transaction confirmed: {id}")),
                    TxStatus::Failed => (
                        LogLevel::Error,
                        format!(
                            "Transaction failed: {id} ({})",
                            error.as_deref().unwrap_or("unknown error")
                        ),
                    ),
                };
                Directive::Log {
                    level,
                    inner: Box::new(Directive::text(message)),
                }
            }
        }
    }
}

impl Classified {
    pub fn to_term(&self) -> Term {
        match self {
            Classified::Known(effect) => effect.to_term(),
            Classified::Raw(raw) => raw.to_term(),
        }
    }
}

fn term_as_directive(term: &Term) -> Term {
    if term.is_atomic() {
        Term::compound("text", vec![term.clone()])
    } else {
        term.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_events_become_log_effects() {
        let event = Term::compound("log", vec![Term::atom("success"), Term::atom("Signed")]);
        match Effect::classify(&event, &[]) {
            Classified::Known(effect) => {
                assert_eq!(effect.to_term().to_string(), "log(success,text('Signed'))");
                assert!(matches!(
                    effect.to_directive(),
                    Directive::Log { level: LogLevel::Success, .. }
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_transaction_events() {
        let event = Term::compound("tx", vec![Term::atom("submitted"), Term::atom("0xabc")]);
        assert_eq!(
            Effect::classify(&event, &["0xabc".to_string()]),
            Classified::Known(Effect::submitted("0xabc"))
        );
        assert!(matches!(Effect::classify(&event, &[]), Classified::Raw(_)));
        let forged = Term::compound("tx", vec![Term::atom("confirmed"), Term::atom("0xabc")]);
        match Effect::classify(&forged, &["0xabc".to_string()]) {
            Classified::Raw(raw) => {
                assert_eq!(raw.kind, "tx");
                assert_eq!(raw.to_term(), forged);
            }
            other => panic!("unexpected {other:?}"),
        }
        let failed = Effect::failed("0xabc", "out of gas");
        assert_eq!(failed.to_term().to_string(), "tx(failed,'0xabc','out of gas')");
    }

    #[test]
    fn test_unknown_kinds_pass_through() {
        let event = Term::compound("confetti", vec![Term::int(3)]);
        match Effect::classify(&event, &[]) {
            Classified::Raw(raw) => {
                assert_eq!(raw.kind, "confetti");
                assert_eq!(raw.args, vec![Term::int(3)]);
            }
            other => panic!("unexpected {other:?}"),
        }
        let bad_level = Term::compound("log", vec![Term::atom("loud"), Term::atom("x")]);
        assert!(matches!(Effect::classify(&bad_level, &[]), Classified::Raw(_)));
    }
}
