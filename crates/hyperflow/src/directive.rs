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

//! The renderable directive tree produced by prompt resolution.

use horn::{BigInt, Term};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Address,
    Bytes32,
    Eth,
    Text,
}

impl InputKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "address" => Some(Self::Address),
            "bytes32" => Some(Self::Bytes32),
            "eth" => Some(Self::Eth),
            "text" | "string" => Some(Self::Text),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Address => "address",
            Self::Bytes32 => "bytes32",
            Self::Eth => "eth",
            Self::Text => "text",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Error,
    Notice,
    Success,
    Warning,
}

impl LogLevel {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "error" => Some(Self::Error),
            "notice" | "info" => Some(Self::Notice),
            "success" => Some(Self::Success),
            "warning" | "warn" => Some(Self::Warning),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Notice => "notice",
            Self::Success => "success",
            Self::Warning => "warning",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TextPart {
    Str(String),
    Int(i128),
    /// An integer past 128 bits, kept as decimal text.
    Wide(String),
    Float(f64),
}

impl TextPart {
    fn from_term(term: &Term) -> Self {
        match term {
            Term::Atom(name) => TextPart::Str(name.to_string()),
            Term::Int(value) => TextPart::Int(*value),
            Term::BigInt(value) => TextPart::Wide(value.to_string()),
            Term::Float(value) => TextPart::Float(*value),
            other => TextPart::Str(other.to_string()),
        }
    }

    fn to_term(&self) -> Term {
        match self {
            TextPart::Str(text) => Term::atom(text),
            TextPart::Int(value) => Term::Int(*value),
            TextPart::Wide(digits) => {
                BigInt::parse(digits).map_or_else(|| Term::atom(digits), BigInt::into_term)
            }
            TextPart::Float(value) => Term::Float(*value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ButtonAttrs {
    pub enabled: bool,
}

impl Default for ButtonAttrs {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// The deferred goal behind a button, closed over the bindings that were
/// live when the prompt was derived.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRef {
    pub goal: Term,
}

impl ActionRef {
    pub fn new(goal: Term) -> Self {
        Self { goal }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Directive {
    Col {
        children: Vec<Directive>,
    },
    Row {
        children: Vec<Directive>,
    },
    Text {
        parts: Vec<TextPart>,
    },
    Input {
        kind: InputKind,
        name: String,
    },
    Button {
        label: String,
        attrs: ButtonAttrs,
        action: ActionRef,
    },
    Image {
        url: String,
    },
    Log {
        level: LogLevel,
        inner: Box<Directive>,
    },
    Debug {
        term: Term,
    },
    Unrecognized {
        term: Term,
    },
}

pub type Prompt = Vec<Directive>;

impl Directive {
    pub fn text(message: impl Into<String>) -> Self {
        Directive::Text {
            parts: vec![TextPart::Str(message.into())],
        }
    }

    /// Maps a resolved term onto the directive model. Terms that match no
    /// known shape become `Unrecognized`.
    pub fn from_term(term: &Term) -> Self {
        match Self::known(term) {
            Some(directive) => directive,
            None => {
                warn!(term = %term, "Unrecognized directive");
                Directive::Unrecognized { term: term.clone() }
            }
        }
    }

    fn known(term: &Term) -> Option<Self> {
        let name = term.name()?;
        let args = term.args();
        match (name, args.len()) {
            ("col", _) => Some(Directive::Col {
                children: container_children(args),
            }),
            ("row", _) => Some(Directive::Row {
                children: container_children(args),
            }),
            ("text", n) if n > 0 => Some(Directive::Text {
                parts: args.iter().map(TextPart::from_term).collect(),
            }),
            ("input", 2) => {
                let kind = InputKind::parse(args[0].as_atom()?)?;
                let name = args[1].text()?;
                Some(Directive::Input { kind, name })
            }
            ("button", 2) => Some(Directive::Button {
                label: label_text(&args[0]),
                attrs: ButtonAttrs::default(),
                action: ActionRef::new(args[1].clone()),
            }),
            ("button", 3) => Some(Directive::Button {
                label: label_text(&args[0]),
                attrs: parse_attrs(&args[1]),
                action: ActionRef::new(args[2].clone()),
            }),
            ("image", 1) => Some(Directive::Image {
                url: args[0].text()?,
            }),
            ("log", 2) => {
                let level = LogLevel::parse(args[0].as_atom()?)?;
                let inner = if args[1].is_atomic() {
                    Directive::Text {
                        parts: vec![TextPart::from_term(&args[1])],
                    }
                } else {
                    Directive::from_term(&args[1])
                };
                Some(Directive::Log {
                    level,
                    inner: Box::new(inner),
                })
            }
            ("debug", 1) => Some(Directive::Debug {
                term: args[0].clone(),
            }),
            _ => None,
        }
    }

    /// Term view used by query matching and error rendering.
    pub fn to_term(&self) -> Term {
        match self {
            Directive::Col { children } => {
                Term::compound("col", children.iter().map(Directive::to_term).collect())
            }
            Directive::Row { children } => {
                Term::compound("row", children.iter().map(Directive::to_term).collect())
            }
            Directive::Text { parts } => {
                Term::compound("text", parts.iter().map(TextPart::to_term).collect())
            }
            Directive::Input { kind, name } => Term::compound(
                "input",
                vec![Term::atom(kind.as_str()), Term::atom(name)],
            ),
            Directive::Button {
                label,
                attrs,
                action,
            } => Term::compound(
                "button",
                vec![
                    Term::atom(label),
                    Term::list([Term::compound(
                        "enabled",
                        vec![Term::atom(if attrs.enabled { "true" } else { "false" })],
                    )]),
                    action.goal.clone(),
                ],
            ),
            Directive::Image { url } => Term::compound("image", vec![Term::atom(url)]),
            Directive::Log { level, inner } => Term::compound(
                "log",
                vec![Term::atom(level.as_str()), inner.to_term()],
            ),
            Directive::Debug { term } => Term::compound("debug", vec![term.clone()]),
            Directive::Unrecognized { term } => term.clone(),
        }
    }

    /// This node followed by every nested node, depth first.
    pub fn walk(&self) -> Vec<&Directive> {
        let mut nodes = vec![self];
        match self {
            Directive::Col { children } | Directive::Row { children } => {
                for child in children {
                    nodes.extend(child.walk());
                }
            }
            Directive::Log { inner, .. } => nodes.extend(inner.walk()),
            _ => {}
        }
        nodes
    }
}

fn container_children(args: &[Term]) -> Vec<Directive> {
    if let [single] = args {
        if let Some(items) = single.list_items() {
            return items.iter().map(Directive::from_term).collect();
        }
    }
    args.iter().map(Directive::from_term).collect()
}

fn label_text(term: &Term) -> String {
    term.text().unwrap_or_else(|| term.to_string())
}

fn parse_attrs(term: &Term) -> ButtonAttrs {
    let mut attrs = ButtonAttrs::default();
    let items = term.list_items().unwrap_or_else(|| vec![term.clone()]);
    for item in items {
        if item.as_atom() == Some("disabled") {
            attrs.enabled = false;
        } else if item.is_functor("enabled", 1) || item.is_functor(":", 2) {
            let (key, value) = match item.arity() {
                1 => ("enabled", &item.args()[0]),
                _ => (item.args()[0].as_atom().unwrap_or(""), &item.args()[1]),
            };
            if key == "enabled" {
                attrs.enabled = value.as_atom() != Some("false");
            }
        }
    }
    attrs
}

/// Every `Input` name appearing anywhere in the prompts.
pub fn input_names(prompts: &[Prompt]) -> Vec<(String, InputKind)> {
    let mut names = Vec::new();
    for directive in prompts.iter().flatten() {
        for node in directive.walk() {
            if let Directive::Input { kind, name } = node {
                if !names.iter().any(|(existing, _)| existing == name) {
                    names.push((name.clone(), *kind));
                }
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Term {
        let db = horn::Database::with_prelude();
        db.parse_query(text).unwrap().goal
    }

    #[test]
    fn test_leaf_shapes() {
        assert_eq!(
            Directive::from_term(&parse("text('Balance: ', 42)")),
            Directive::Text {
                parts: vec![TextPart::Str("Balance: ".into()), TextPart::Int(42)]
            }
        );
        assert_eq!(
            Directive::from_term(&parse("input(address, recipient)")),
            Directive::Input {
                kind: InputKind::Address,
                name: "recipient".into()
            }
        );
        assert_eq!(
            Directive::from_term(&parse("input(string, note)")),
            Directive::Input {
                kind: InputKind::Text,
                name: "note".into()
            }
        );
        assert_eq!(
            Directive::from_term(&parse("image('https://example.org/a.png')")),
            Directive::Image {
                url: "https://example.org/a.png".into()
            }
        );
        assert!(matches!(
            Directive::from_term(&parse("debug(foo(X))")),
            Directive::Debug { .. }
        ));
    }

    #[test]
    fn test_containers_accept_lists_and_arguments() {
        let listed = Directive::from_term(&parse("col([text(a), text(b)])"));
        let spread = Directive::from_term(&parse("col(text(a), text(b))"));
        assert_eq!(listed, spread);
        assert_eq!(Directive::from_term(&parse("row")), Directive::Row { children: vec![] });
        assert_eq!(listed.walk().len(), 3);
    }

    #[test]
    fn test_button_attrs() {
        match Directive::from_term(&parse("button('Go', [enabled(false)], [go])")) {
            Directive::Button { label, attrs, action } => {
                assert_eq!(label, "Go");
                assert!(!attrs.enabled);
                assert_eq!(action.goal.to_string(), "[go]");
            }
            other => panic!("unexpected directive {other:?}"),
        }
        match Directive::from_term(&parse("button('Go', [go])")) {
            Directive::Button { attrs, .. } => assert!(attrs.enabled),
            other => panic!("unexpected directive {other:?}"),
        }
    }

    #[test]
    fn test_log_wraps_atomic_inner_as_text() {
        let directive = Directive::from_term(&parse("log(success, 'Signed!')"));
        assert_eq!(directive.to_term().to_string(), "log(success,text('Signed!'))");
    }

    #[test]
    fn test_unknown_shapes_are_kept() {
        let term = parse("slider(1, 10)");
        assert_eq!(
            Directive::from_term(&term),
            Directive::Unrecognized { term: term.clone() }
        );
        assert!(matches!(
            Directive::from_term(&parse("input(color, c)")),
            Directive::Unrecognized { .. }
        ));
    }

    #[test]
    fn test_button_term_view() {
        let directive = Directive::Button {
            label: "Create".into(),
            attrs: ButtonAttrs::default(),
            action: ActionRef::new(parse("[create]")),
        };
        assert_eq!(
            directive.to_term().to_string(),
            "button('Create',[enabled(true)],[create])"
        );
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(Directive::Input {
            kind: InputKind::Eth,
            name: "amount".into(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "input", "kind": "eth", "name": "amount"})
        );
    }

    #[test]
    fn test_input_names_are_collected_once() {
        let prompts = vec![
            vec![Directive::from_term(&parse("col(input(eth, amount), text(x))"))],
            vec![Directive::from_term(&parse("input(eth, amount)"))],
        ];
        assert_eq!(input_names(&prompts), vec![("amount".to_string(), InputKind::Eth)]);
    }
}
