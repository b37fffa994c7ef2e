//! Positional argument validation.
//!
//! Pairs provided values with declared [`ArgSpec`]s by position, applies
//! defaults, closed choice sets, type coercion and custom checks, and
//! collects every problem found in a single pass.
//!
//! # Examples
//!
//! ```
//! use command_dispatch_core::*;
//!
//! let specs = vec![
//!     ArgSpec::required("a", ArgType::Number),
//!     ArgSpec::required("b", ArgType::Number),
//! ];
//! let ok = validate_args(&specs, &["1".to_string(), "2.5".to_string()]);
//! assert!(ok.valid);
//! assert_eq!(ok.parsed.get("b").and_then(ArgValue::as_f64), Some(2.5));
//!
//! // Both problems are reported, not just the first
//! let bad = validate_args(&specs, &["one".to_string()]);
//! assert_eq!(bad.errors.len(), 2);
//! ```

use std::collections::BTreeMap;
use std::path::{MAIN_SEPARATOR, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::{ArgSpec, ArgType, ArgValue};

/// Tokens accepted as `true` by boolean arguments and flags.
pub const TRUTHY_TOKENS: &[&str] = &["true", "yes", "y", "1", "on", "tak", "t", "ja"];

/// Tokens accepted as `false` by boolean arguments and flags.
pub const FALSY_TOKENS: &[&str] = &["false", "no", "n", "0", "off", "nie", "f", "nein"];

/// Characters rejected in path arguments.
const INVALID_PATH_CHARS: &[char] = &['<', '>', '"', '|', '?', '*', '\0'];

/// A single argument validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgError {
    /// A required argument was not supplied and has no default.
    #[error("missing required argument '{arg}'")]
    Missing { arg: String },
    /// Value is outside the declared closed set.
    #[error("invalid value '{value}' for '{arg}': expected one of {}", .choices.join(", "))]
    NotInChoices {
        arg: String,
        value: String,
        choices: Vec<String>,
    },
    /// Value could not be parsed as a number.
    #[error("invalid number '{value}' for '{arg}'")]
    NotANumber { arg: String, value: String },
    /// Value is not in the boolean vocabulary.
    #[error("invalid boolean '{value}' for '{arg}'")]
    NotABoolean { arg: String, value: String },
    /// Value contains characters that are not valid in paths.
    #[error("invalid path '{value}' for '{arg}'")]
    InvalidPath { arg: String, value: String },
    /// A custom check rejected the value.
    #[error("invalid value for '{arg}': {message}")]
    Rejected { arg: String, message: String },
}

impl ArgError {
    /// Name of the argument this error refers to.
    pub fn arg(&self) -> &str {
        match self {
            Self::Missing { arg }
            | Self::NotInChoices { arg, .. }
            | Self::NotANumber { arg, .. }
            | Self::NotABoolean { arg, .. }
            | Self::InvalidPath { arg, .. }
            | Self::Rejected { arg, .. } => arg,
        }
    }
}

/// Typed arguments keyed by their declared names.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedArgs {
    /// Values for declared arguments
    pub values: BTreeMap<String, ArgValue>,
    /// Positional values beyond the declared specs, unchanged
    pub extra: Vec<String>,
}

impl ParsedArgs {
    /// Returns the value for a declared argument.
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    /// Returns a `String` argument.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ArgValue::as_str)
    }

    /// Returns a `Number` argument.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ArgValue::as_f64)
    }

    /// Returns a `Boolean` argument.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(ArgValue::as_bool)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.extra.is_empty()
    }
}

/// Outcome of [`validate_args`].
#[derive(Debug, Clone, Default)]
pub struct ArgValidation {
    /// `true` when `errors` is empty
    pub valid: bool,
    /// Every failure found, in declaration order
    pub errors: Vec<ArgError>,
    /// Values that passed validation
    pub parsed: ParsedArgs,
}

impl ArgValidation {
    /// Error messages, one per failure.
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

/// Validates provided positional values against declared specs.
///
/// Never stops at the first failure: a missing required argument is
/// recorded and validation moves on to the next spec.
pub fn validate_args(specs: &[ArgSpec], provided: &[String]) -> ArgValidation {
    let mut errors = Vec::new();
    let mut parsed = ParsedArgs::default();

    for (index, spec) in specs.iter().enumerate() {
        let raw = match provided.get(index).cloned().or_else(|| spec.default.clone()) {
            Some(raw) => raw,
            None => {
                if spec.required {
                    errors.push(ArgError::Missing {
                        arg: spec.name.clone(),
                    });
                }
                continue;
            }
        };

        if !spec.choices.is_empty() && !spec.choices.iter().any(|c| c == &raw) {
            errors.push(ArgError::NotInChoices {
                arg: spec.name.clone(),
                value: raw,
                choices: spec.choices.clone(),
            });
            continue;
        }

        let value = match coerce(&spec.name, spec.arg_type, &raw) {
            Ok(value) => value,
            Err(err) => {
                errors.push(err);
                continue;
            }
        };

        if let Some(check) = &spec.check {
            if let Err(message) = check.call(&value) {
                let message = if message.trim().is_empty() {
                    format!("check failed for value '{raw}'")
                } else {
                    message
                };
                errors.push(ArgError::Rejected {
                    arg: spec.name.clone(),
                    message,
                });
                continue;
            }
        }

        parsed.values.insert(spec.name.clone(), value);
    }

    if provided.len() > specs.len() {
        parsed.extra = provided[specs.len()..].to_vec();
    }

    ArgValidation {
        valid: errors.is_empty(),
        errors,
        parsed,
    }
}

/// Converts a raw string into a typed value.
pub fn coerce(arg: &str, arg_type: ArgType, raw: &str) -> Result<ArgValue, ArgError> {
    match arg_type {
        ArgType::String => Ok(ArgValue::String(raw.to_string())),
        ArgType::Number => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(ArgValue::Number)
            .ok_or_else(|| ArgError::NotANumber {
                arg: arg.to_string(),
                value: raw.to_string(),
            }),
        ArgType::Boolean => parse_bool(raw)
            .map(ArgValue::Boolean)
            .ok_or_else(|| ArgError::NotABoolean {
                arg: arg.to_string(),
                value: raw.to_string(),
            }),
        ArgType::Path => normalize_path(raw)
            .map(ArgValue::Path)
            .ok_or_else(|| ArgError::InvalidPath {
                arg: arg.to_string(),
                value: raw.to_string(),
            }),
    }
}

/// Parses a boolean token, case-insensitively.
///
/// # Examples
///
/// ```
/// use command_dispatch_core::parse_bool;
///
/// assert_eq!(parse_bool("Yes"), Some(true));
/// assert_eq!(parse_bool("nie"), Some(false));
/// assert_eq!(parse_bool("maybe"), None);
/// ```
pub fn parse_bool(raw: &str) -> Option<bool> {
    let token = raw.trim().to_lowercase();
    if TRUTHY_TOKENS.contains(&token.as_str()) {
        Some(true)
    } else if FALSY_TOKENS.contains(&token.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Rejects invalid path characters and normalizes separators.
///
/// A colon is accepted only as a drive designator: `C:` alone or followed
/// by a separator.
fn normalize_path(raw: &str) -> Option<PathBuf> {
    if raw.is_empty() || raw.contains(INVALID_PATH_CHARS) {
        return None;
    }

    let bytes = raw.as_bytes();
    let colon_ok = |i: usize| {
        i == 1
            && bytes[0].is_ascii_alphabetic()
            && matches!(bytes.get(2), None | Some(b'/') | Some(b'\\'))
    };
    if raw.char_indices().any(|(i, c)| c == ':' && !colon_ok(i)) {
        return None;
    }

    let normalized: String = raw
        .chars()
        .map(|c| if c == '/' || c == '\\' { MAIN_SEPARATOR } else { c })
        .collect();
    Some(PathBuf::from(normalized))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_reports_every_missing_argument() {
        let specs = vec![
            ArgSpec::required("a", ArgType::String),
            ArgSpec::required("b", ArgType::String),
            ArgSpec::required("c", ArgType::String),
        ];

        let result = validate_args(&specs, &args(&["only"]));
        assert!(!result.valid);
        assert_eq!(
            result.errors,
            vec![
                ArgError::Missing { arg: "b".into() },
                ArgError::Missing { arg: "c".into() },
            ]
        );
        assert_eq!(result.parsed.get_str("a"), Some("only"));
    }

    #[test]
    fn test_default_is_used_and_typed() {
        let specs = vec![ArgSpec::optional("count", ArgType::Number).with_default(5)];
        let result = validate_args(&specs, &[]);
        assert!(result.valid);
        assert_eq!(result.parsed.get_f64("count"), Some(5.0));
    }

    #[test]
    fn test_optional_without_default_is_skipped() {
        let specs = vec![ArgSpec::optional("name", ArgType::String)];
        let result = validate_args(&specs, &[]);
        assert!(result.valid);
        assert!(result.parsed.is_empty());
    }

    #[test]
    fn test_choices_reject_unknown_value() {
        let specs = vec![ArgSpec::required("env", ArgType::String).with_choices(["dev", "prod"])];
        let result = validate_args(&specs, &args(&["qa"]));
        assert!(matches!(
            &result.errors[..],
            [ArgError::NotInChoices { value, .. }] if value == "qa"
        ));
    }

    #[test]
    fn test_number_rejects_garbage_and_infinity() {
        let specs = vec![ArgSpec::required("n", ArgType::Number)];
        assert!(!validate_args(&specs, &args(&["12abc"])).valid);
        assert!(!validate_args(&specs, &args(&["inf"])).valid);
        assert!(validate_args(&specs, &args(&["-3.25"])).valid);
    }

    #[test]
    fn test_boolean_vocabulary() {
        for token in ["true", "YES", "on", "1", "tak", "ja"] {
            assert_eq!(parse_bool(token), Some(true), "{token}");
        }
        for token in ["false", "No", "off", "0", "nie", "nein"] {
            assert_eq!(parse_bool(token), Some(false), "{token}");
        }
        assert_eq!(parse_bool("perhaps"), None);
    }

    #[test]
    fn test_path_validation() {
        let specs = vec![ArgSpec::required("p", ArgType::Path)];

        let ok = validate_args(&specs, &args(&["dir\\sub/file.txt"]));
        let expected: PathBuf = format!("dir{MAIN_SEPARATOR}sub{MAIN_SEPARATOR}file.txt").into();
        assert_eq!(ok.parsed.get("p"), Some(&ArgValue::Path(expected)));

        assert!(validate_args(&specs, &args(&["C:\\data"])).valid);
        assert!(!validate_args(&specs, &args(&["bad|name"])).valid);
        assert!(!validate_args(&specs, &args(&["a:b"])).valid);
        assert!(validate_args(&specs, &args(&["D:"])).valid);
        assert!(validate_args(&specs, &args(&["c:/tmp"])).valid);
        assert!(!validate_args(&specs, &args(&["C:data"])).valid);
        assert!(!validate_args(&specs, &args(&["host:/srv"])).valid);
    }

    #[test]
    fn test_custom_check_runs_last_with_message() {
        let specs = vec![
            ArgSpec::required("port", ArgType::Number).with_check(|v| match v.as_f64() {
                Some(p) if (1.0..=65535.0).contains(&p) => Ok(()),
                _ => Err("port out of range".into()),
            }),
        ];

        let result = validate_args(&specs, &args(&["70000"]));
        assert_eq!(
            result.errors,
            vec![ArgError::Rejected {
                arg: "port".into(),
                message: "port out of range".into()
            }]
        );

        // Type errors win over the custom check
        let result = validate_args(&specs, &args(&["abc"]));
        assert!(matches!(result.errors[0], ArgError::NotANumber { .. }));
    }

    #[test]
    fn test_empty_check_message_gets_generic_text() {
        let specs = vec![ArgSpec::required("x", ArgType::String).with_check(|_| Err(String::new()))];
        let result = validate_args(&specs, &args(&["v"]));
        assert_eq!(result.messages(), vec!["invalid value for 'x': check failed for value 'v'"]);
    }

    #[test]
    fn test_extra_positionals_are_kept() {
        let specs = vec![ArgSpec::required("first", ArgType::String)];
        let result = validate_args(&specs, &args(&["a", "b", "c"]));
        assert_eq!(result.parsed.extra, args(&["b", "c"]));
    }
}
