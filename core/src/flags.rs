//! Input tokenizing and flag parsing.
//!
//! [`tokenize`] splits an input line into shell words, [`parse_flags`]
//! separates declared flags from positional values, and [`validate_flags`]
//! reports unknown, missing, malformed and conflicting flags.
//!
//! Supported forms: `--long`, `--long=value`, `--long value`, `-s`,
//! `-s value`, `-svalue`, bundled switches (`-abc`), `--no-<switch>` and a
//! bare `--` that ends flag parsing.
//!
//! # Examples
//!
//! ```
//! use command_dispatch_core::*;
//!
//! let specs = vec![
//!     FlagSpec::switch(Some("-f"), Some("--force")),
//!     FlagSpec::with_value(Some("-r"), Some("--region"), ArgType::String),
//! ];
//! let tokens = tokenize("deploy web-1 -f --region=eu").unwrap();
//! let parsed = parse_flags(&tokens[1..], &specs);
//!
//! assert_eq!(parsed.positionals, vec!["web-1"]);
//! assert!(parsed.is_set("force"));
//! assert_eq!(parsed.value("region"), Some("eu"));
//! assert!(validate_flags(&parsed, &specs).is_empty());
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;

use crate::validate::parse_bool;
use crate::{ArgType, FlagSpec, flag_key};

/// Flag tokenizing, parsing or validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlagError {
    /// Input line has unbalanced quotes or a dangling escape.
    #[error("cannot split input: {0}")]
    Tokenize(String),
    /// Flag is not declared by the command.
    #[error("unknown flag '{0}'")]
    Unknown(String),
    /// Flag takes a value but none was supplied.
    #[error("flag '{0}' requires a value")]
    MissingValue(String),
    /// Switch was given an explicit value.
    #[error("flag '{0}' does not take a value")]
    UnexpectedValue(String),
    /// Mandatory flag is absent.
    #[error("missing required flag '--{0}'")]
    MissingRequired(String),
    /// Value does not match the declared type.
    #[error("invalid {expected} '{value}' for flag '--{flag}'")]
    InvalidValue {
        flag: String,
        value: String,
        expected: ArgType,
    },
    /// Two mutually exclusive flags were both given.
    #[error("flag '--{flag}' cannot be used with '--{other}'")]
    Conflict { flag: String, other: String },
    /// A flag was given without one it depends on.
    #[error("flag '--{flag}' requires '--{other}'")]
    Requires { flag: String, other: String },
}

/// Value of a parsed flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FlagValue {
    Switch(bool),
    Value(String),
}

impl FlagValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Switch(b) => Some(*b),
            Self::Value(v) => parse_bool(v),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Value(v) => Some(v),
            Self::Switch(_) => None,
        }
    }
}

/// Result of [`parse_flags`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedFlags {
    /// Flag values keyed by canonical name without dashes
    pub values: BTreeMap<String, FlagValue>,
    /// Non-flag tokens in order
    pub positionals: Vec<String>,
    /// Keys of flags that appeared in the input (defaults excluded)
    #[serde(skip)]
    pub explicit: BTreeSet<String>,
    /// Undeclared flags as written
    #[serde(skip)]
    pub unknown: Vec<String>,
    /// Value flags that had no value
    #[serde(skip)]
    pub missing_value: Vec<String>,
    /// Switches written with `=value`
    #[serde(skip)]
    pub unexpected_value: Vec<String>,
}

impl ParsedFlags {
    /// Returns the value for a flag, by key or dashed name.
    pub fn get(&self, name: &str) -> Option<&FlagValue> {
        self.values.get(flag_key(name))
    }

    /// Returns the string value of a value flag.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FlagValue::as_str)
    }

    /// Returns `true` when a switch is on or a value flag is present.
    pub fn is_set(&self, name: &str) -> bool {
        match self.get(name) {
            Some(FlagValue::Switch(on)) => *on,
            Some(FlagValue::Value(_)) => true,
            None => false,
        }
    }
}

/// Splits an input line into words using shell quoting rules.
///
/// # Errors
///
/// Returns [`FlagError::Tokenize`] on unbalanced quotes.
pub fn tokenize(line: &str) -> Result<Vec<String>, FlagError> {
    shell_words::split(line).map_err(|e| FlagError::Tokenize(e.to_string()))
}

/// Separates declared flags from positional values.
///
/// Parsing is lenient: problems are recorded on the result and surfaced by
/// [`validate_flags`]. Defaults are filled in for absent flags.
pub fn parse_flags(tokens: &[String], specs: &[FlagSpec]) -> ParsedFlags {
    let mut parsed = ParsedFlags::default();
    let mut iter = tokens.iter().peekable();

    while let Some(token) = iter.next() {
        if token == "--" {
            parsed.positionals.extend(iter.by_ref().cloned());
            break;
        }

        if let Some(body) = token.strip_prefix("--") {
            let (name, inline) = match body.split_once('=') {
                Some((name, value)) => (format!("--{name}"), Some(value.to_string())),
                None => (token.clone(), None),
            };

            let Some(spec) = find_spec(specs, &name) else {
                match negated_switch(specs, &name) {
                    Some(spec) if inline.is_none() => {
                        parsed.set(spec, FlagValue::Switch(false));
                    }
                    _ => parsed.unknown.push(name),
                }
                continue;
            };

            if !spec.takes_value {
                match inline {
                    Some(_) => parsed.unexpected_value.push(name),
                    None => parsed.set(spec, FlagValue::Switch(true)),
                }
                continue;
            }

            match inline.or_else(|| next_value(&mut iter)) {
                Some(value) => parsed.set(spec, FlagValue::Value(value)),
                None => parsed.missing_value.push(name),
            }
            continue;
        }

        if token.len() > 1 && token.starts_with('-') && !looks_numeric(token) {
            parse_short_cluster(token, specs, &mut iter, &mut parsed);
            continue;
        }

        parsed.positionals.push(token.clone());
    }

    for spec in specs {
        if parsed.values.contains_key(spec.key()) {
            continue;
        }
        if let Some(default) = &spec.default {
            let value = if spec.takes_value {
                FlagValue::Value(default.clone())
            } else {
                FlagValue::Switch(parse_bool(default).unwrap_or(false))
            };
            parsed.values.insert(spec.key().to_string(), value);
        }
    }

    parsed
}

/// Reports every problem with parsed flags against their declarations.
pub fn validate_flags(parsed: &ParsedFlags, specs: &[FlagSpec]) -> Vec<FlagError> {
    let mut errors: Vec<FlagError> = Vec::new();
    let mut reported_conflicts: BTreeSet<(&str, &str)> = BTreeSet::new();

    errors.extend(parsed.unknown.iter().cloned().map(FlagError::Unknown));
    errors.extend(parsed.missing_value.iter().cloned().map(FlagError::MissingValue));
    errors.extend(
        parsed
            .unexpected_value
            .iter()
            .cloned()
            .map(FlagError::UnexpectedValue),
    );

    for spec in specs {
        let key = spec.key();

        if spec.required && !parsed.values.contains_key(key) {
            errors.push(FlagError::MissingRequired(key.to_string()));
        }

        if let Some(FlagValue::Value(value)) = parsed.values.get(key) {
            let valid = match spec.value_type {
                ArgType::Number => value.trim().parse::<f64>().is_ok_and(f64::is_finite),
                ArgType::Boolean => parse_bool(value).is_some(),
                ArgType::String | ArgType::Path => true,
            };
            if !valid {
                errors.push(FlagError::InvalidValue {
                    flag: key.to_string(),
                    value: value.clone(),
                    expected: spec.value_type,
                });
            }
        }

        if !parsed.explicit.contains(key) {
            continue;
        }
        for other in &spec.conflicts_with {
            if !parsed.explicit.contains(other.as_str()) {
                continue;
            }
            let pair = if key < other.as_str() {
                (key, other.as_str())
            } else {
                (other.as_str(), key)
            };
            // Either side may declare the conflict; report the pair once
            if reported_conflicts.insert(pair) {
                errors.push(FlagError::Conflict {
                    flag: key.to_string(),
                    other: other.clone(),
                });
            }
        }
        for other in &spec.requires {
            if !parsed.values.contains_key(other.as_str()) {
                errors.push(FlagError::Requires {
                    flag: key.to_string(),
                    other: other.clone(),
                });
            }
        }
    }

    errors
}

impl ParsedFlags {
    fn set(&mut self, spec: &FlagSpec, value: FlagValue) {
        let key = spec.key().to_string();
        self.explicit.insert(key.clone());
        self.values.insert(key, value);
    }
}

fn find_spec<'a>(specs: &'a [FlagSpec], name: &str) -> Option<&'a FlagSpec> {
    specs.iter().find(|s| s.matches(name))
}

fn negated_switch<'a>(specs: &'a [FlagSpec], name: &str) -> Option<&'a FlagSpec> {
    let positive = format!("--{}", name.strip_prefix("--no-")?);
    find_spec(specs, &positive).filter(|s| !s.takes_value)
}

fn next_value<'a, I>(iter: &mut std::iter::Peekable<I>) -> Option<String>
where
    I: Iterator<Item = &'a String>,
{
    let candidate = iter.peek()?;
    if candidate.starts_with('-') && candidate.len() > 1 && !looks_numeric(candidate) {
        return None;
    }
    iter.next().cloned()
}

fn parse_short_cluster<'a, I>(
    token: &str,
    specs: &[FlagSpec],
    iter: &mut std::iter::Peekable<I>,
    parsed: &mut ParsedFlags,
) where
    I: Iterator<Item = &'a String>,
{
    let body = &token[1..];
    for (offset, c) in body.char_indices() {
        let name = format!("-{c}");
        let Some(spec) = find_spec(specs, &name) else {
            parsed.unknown.push(name);
            continue;
        };

        if !spec.takes_value {
            parsed.set(spec, FlagValue::Switch(true));
            continue;
        }

        let rest = &body[offset + c.len_utf8()..];
        let value = if rest.is_empty() {
            next_value(iter)
        } else {
            Some(rest.trim_start_matches('=').to_string())
        };
        match value {
            Some(value) => parsed.set(spec, FlagValue::Value(value)),
            None => parsed.missing_value.push(name),
        }
        return;
    }
}

fn looks_numeric(token: &str) -> bool {
    token.parse::<f64>().is_ok()
}
