//! Rule configuration and handler response validation.
//!
//! Both checks run in two passes:
//!
//! 1. The raw JSON value is checked against a JSON schema (`jsonschema`),
//!    collecting every violation rather than stopping at the first.
//! 2. Whatever passed the structural check is deserialized and checked for
//!    the things a schema can't express: handler names must be registered,
//!    regexes and globs must compile, action ids must exist, targets must
//!    parse as URIs.
//!
//! Malformed input is never a panic; it is a [`ValidationError`] listing
//! every violation with the JSON pointer of the offending value.

use std::fmt;

use itertools::Itertools;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_lsp::lsp_types::Url;

use crate::buttons::{ButtonAction, LinkButton};
use crate::config::Settings;
use crate::handler::{HandlerRegistry, HandlerResult};
use crate::path_filter::{PathFilter, DEFAULT_INCLUDE};
use crate::resolve::JumpPattern;
use crate::rules::{LinkRule, RuleSet};
use crate::scanner::Pattern;

/// One violated constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// JSON pointer to the offending value; empty for the document root.
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Violation {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "(root): {}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

impl From<jsonschema::ValidationError<'_>> for Violation {
    fn from(error: jsonschema::ValidationError<'_>) -> Self {
        Violation::new(error.instance_path.to_string(), error.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", .violations.iter().join("; "))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

impl ValidationError {
    fn check(violations: Vec<Violation>) -> Result<(), ValidationError> {
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { violations })
        }
    }
}

static CONFIG_SCHEMA: Lazy<jsonschema::Validator> = Lazy::new(|| {
    jsonschema::validator_for(&json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": ["links"],
        "properties": {
            "links": {
                "type": "array",
                "items": { "$ref": "#/definitions/rule" }
            }
        },
        "definitions": {
            "globs": {
                "anyOf": [
                    { "type": "string" },
                    { "type": "array", "items": { "type": "string" } }
                ]
            },
            "pattern": {
                "anyOf": [
                    { "type": "string" },
                    {
                        "type": "object",
                        "required": ["regex"],
                        "properties": {
                            "regex": { "type": "string" },
                            "global": { "type": "boolean" }
                        },
                        "additionalProperties": false
                    }
                ]
            },
            "rule": {
                "type": "object",
                "required": ["pattern", "handle"],
                "properties": {
                    "include": { "$ref": "#/definitions/globs" },
                    "exclude": { "$ref": "#/definitions/globs" },
                    "pattern": {
                        "anyOf": [
                            { "$ref": "#/definitions/pattern" },
                            {
                                "type": "array",
                                "minItems": 1,
                                "items": { "$ref": "#/definitions/pattern" }
                            }
                        ]
                    },
                    "handle": { "type": "string" }
                }
            }
        }
    }))
    .unwrap()
});

static RESPONSE_SCHEMA: Lazy<jsonschema::Validator> = Lazy::new(|| {
    jsonschema::validator_for(&json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": ["target"],
        "properties": {
            "target": { "type": "string" },
            "tooltip": { "type": "string" },
            "description": { "type": "string" },
            "jumpPattern": {
                "anyOf": [
                    { "type": "string" },
                    {
                        "type": "object",
                        "required": ["regex"],
                        "properties": { "regex": { "type": "string" } },
                        "additionalProperties": false
                    }
                ]
            },
            "buttons": {
                "type": "array",
                "items": {
                    "anyOf": [
                        {
                            "type": "object",
                            "required": ["title", "target"],
                            "properties": {
                                "title": { "type": "string" },
                                "target": { "type": "string" }
                            }
                        },
                        {
                            "type": "object",
                            "required": ["title", "action"],
                            "properties": {
                                "title": { "type": "string" },
                                "action": { "type": "integer", "minimum": 0 }
                            }
                        }
                    ]
                }
            }
        }
    }))
    .unwrap()
});

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// Items paired with their JSON pointer below `base`.
    fn into_items(self, base: &str) -> Vec<(String, T)> {
        match self {
            OneOrMany::One(item) => vec![(base.to_string(), item)],
            OneOrMany::Many(items) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| (format!("{base}/{index}"), item))
                .collect(),
        }
    }
}

fn default_include() -> OneOrMany<String> {
    OneOrMany::One(DEFAULT_INCLUDE.to_string())
}

fn default_exclude() -> OneOrMany<String> {
    OneOrMany::Many(Vec::new())
}

fn default_global() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPattern {
    Source(String),
    Detailed {
        regex: String,
        #[serde(default = "default_global")]
        global: bool,
    },
}

#[derive(Deserialize)]
struct RawRule {
    #[serde(default = "default_include")]
    include: OneOrMany<String>,
    #[serde(default = "default_exclude")]
    exclude: OneOrMany<String>,
    pattern: OneOrMany<RawPattern>,
    handle: String,
}

/// Validates a raw rule configuration and compiles it into a [`RuleSet`].
pub fn validate(
    raw: &Value,
    handlers: &HandlerRegistry,
    settings: &Settings,
) -> Result<RuleSet, ValidationError> {
    let mut violations: Vec<Violation> = CONFIG_SCHEMA.iter_errors(raw).map(Violation::from).collect();
    let mut rules = Vec::new();

    let entries = raw.get("links").and_then(Value::as_array);
    for (index, entry) in entries.into_iter().flatten().enumerate() {
        // Structurally broken entries are already reported above.
        let Ok(raw_rule) = RawRule::deserialize(entry) else {
            continue;
        };
        match compile_rule(index, raw_rule, handlers, settings) {
            Ok(rule) => rules.push(rule),
            Err(mut errors) => violations.append(&mut errors),
        }
    }

    ValidationError::check(violations)?;
    Ok(RuleSet::new(rules))
}

fn compile_rule(
    index: usize,
    raw: RawRule,
    handlers: &HandlerRegistry,
    settings: &Settings,
) -> Result<LinkRule, Vec<Violation>> {
    let base = format!("/links/{index}");
    let mut violations = Vec::new();

    let handler = handlers.get(&raw.handle);
    if handler.is_none() {
        violations.push(Violation::new(
            format!("{base}/handle"),
            format!("\"{}\" is not a registered handler", raw.handle),
        ));
    }

    let mut patterns = Vec::new();
    for (path, pattern) in raw.pattern.into_items(&format!("{base}/pattern")) {
        let (source, global) = match pattern {
            RawPattern::Source(source) => (source, true),
            RawPattern::Detailed { regex, global } => (regex, global),
        };
        match Pattern::new(&source, global) {
            Ok(pattern) => patterns.push(pattern),
            Err(err) => violations.push(Violation::new(path, err.to_string())),
        }
    }

    let include = raw.include.into_items(&format!("{base}/include"));
    let exclude = raw.exclude.into_items(&format!("{base}/exclude"));
    let filter = PathFilter::new(
        include.iter().map(|(_, glob)| glob),
        exclude.iter().map(|(_, glob)| glob),
        settings.match_dotfiles,
    );
    let filter = match filter {
        Ok(filter) => Some(filter),
        Err(errors) => {
            violations.extend(errors.into_iter().map(|error| {
                let items = if error.field == "include" { &include } else { &exclude };
                Violation::new(items[error.index].0.clone(), error.message)
            }));
            None
        }
    };

    match (handler, filter) {
        (Some(handler), Some(filter)) if violations.is_empty() => Ok(LinkRule::new(
            index, filter, patterns, raw.handle, handler,
        )),
        _ => Err(violations),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawJumpPattern {
    Literal(String),
    Regex { regex: String },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawButton {
    Target { title: String, target: String },
    Action { title: String, action: usize },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResponse {
    target: String,
    tooltip: Option<String>,
    description: Option<String>,
    jump_pattern: Option<RawJumpPattern>,
    #[serde(default)]
    buttons: Vec<RawButton>,
}

/// Validates a handler's response. `actions` are the callbacks the handler
/// registered on its context; buttons refer to them by index.
pub fn validate_response(
    value: &Value,
    actions: &[ButtonAction],
) -> Result<HandlerResult, ValidationError> {
    let violations: Vec<Violation> = RESPONSE_SCHEMA.iter_errors(value).map(Violation::from).collect();
    ValidationError::check(violations)?;

    let raw = RawResponse::deserialize(value).map_err(|err| ValidationError {
        violations: vec![Violation::new("", err.to_string())],
    })?;

    let mut violations = Vec::new();

    let uri = Url::parse(&raw.target)
        .map_err(|err| violations.push(Violation::new("/target", format!("not a valid URI: {err}"))))
        .ok();

    let jump_pattern = match raw.jump_pattern {
        Some(RawJumpPattern::Literal(literal)) if !literal.is_empty() => {
            Some(JumpPattern::Literal(literal))
        }
        Some(RawJumpPattern::Literal(_)) | None => None,
        Some(RawJumpPattern::Regex { regex }) => JumpPattern::regex(&regex)
            .map_err(|err| violations.push(Violation::new("/jumpPattern/regex", err.to_string())))
            .ok(),
    };

    let mut buttons = Vec::new();
    for (index, button) in raw.buttons.into_iter().enumerate() {
        match button {
            RawButton::Target { title, target } => buttons.push(LinkButton::Target { title, target }),
            RawButton::Action { title, action } => match actions.get(action) {
                Some(callback) => buttons.push(LinkButton::Action {
                    title,
                    action: callback.clone(),
                }),
                None => violations.push(Violation::new(
                    format!("/buttons/{index}/action"),
                    format!("{action} does not refer to a registered action"),
                )),
            },
        }
    }

    ValidationError::check(violations)?;
    let uri = uri.ok_or_else(|| ValidationError {
        violations: vec![Violation::new("/target", "not a valid URI")],
    })?;

    Ok(HandlerResult {
        target: raw.target,
        uri,
        tooltip: raw.tooltip,
        description: raw.description,
        jump_pattern,
        buttons,
    })
}
