//! Command metadata type definitions.
//!
//! This module defines the declarative side of a command: its priority tier,
//! positional argument declarations, flag declarations and the
//! serializable [`CommandInfo`] view used for listings and help text. The
//! executable side (handlers, contexts) lives in the engine crate.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Registration tier of a command.
///
/// Tiers are ordered `Plugin < User < Builtin`. When two registrations
/// collide on a name or alias, the higher tier wins.
///
/// # Examples
///
/// ```
/// use command_dispatch_core::Priority;
///
/// assert!(Priority::Builtin > Priority::User);
/// assert!(Priority::User > Priority::Plugin);
/// assert_eq!(Priority::default(), Priority::User);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Loaded from a plugin at runtime.
    Plugin = 0,
    /// Defined by the user (the default tier).
    #[default]
    User = 1,
    /// Shipped with the host application.
    Builtin = 2,
}

impl Priority {
    /// Returns the lowercase tier name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plugin => "plugin",
            Self::User => "user",
            Self::Builtin => "builtin",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared type of a positional argument or flag value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    /// Passed through unchanged (the default).
    #[default]
    String,
    /// Parsed as a finite floating point number.
    Number,
    /// One of the accepted truthy/falsy tokens.
    Boolean,
    /// Filesystem path with normalized separators.
    Path,
}

impl ArgType {
    /// Returns the lowercase type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Path => "path",
        }
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed argument value produced by validation.
///
/// # Examples
///
/// ```
/// use command_dispatch_core::ArgValue;
///
/// let value = ArgValue::Number(3.0);
/// assert_eq!(value.as_f64(), Some(3.0));
/// assert_eq!(value.as_str(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Path(PathBuf),
}

impl ArgValue {
    /// Returns the string payload of a `String` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the numeric payload of a `Number` value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the payload of a `Boolean` value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the payload of a `Path` value.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Path(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Path(p) => write!(f, "{}", p.display()),
        }
    }
}

/// Custom argument check, run after type coercion succeeded.
///
/// Returns `Err(message)` to reject the value. An empty message is replaced
/// with a generic one by the validator.
#[derive(Clone)]
pub struct ArgCheck(Arc<dyn Fn(&ArgValue) -> Result<(), String> + Send + Sync>);

impl ArgCheck {
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(&ArgValue) -> Result<(), String> + Send + Sync + 'static,
    {
        Self(Arc::new(check))
    }

    pub fn call(&self, value: &ArgValue) -> Result<(), String> {
        (self.0)(value)
    }
}

impl fmt::Debug for ArgCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ArgCheck(..)")
    }
}

/// Declaration of a positional argument.
///
/// Arguments are matched to provided values by position, in declaration
/// order.
///
/// # Examples
///
/// ```
/// use command_dispatch_core::{ArgSpec, ArgType};
///
/// let target = ArgSpec::required("target", ArgType::String)
///     .with_description("Host to deploy to");
/// assert!(target.required);
///
/// let env = ArgSpec::optional("env", ArgType::String)
///     .with_default("staging")
///     .with_choices(["staging", "prod"]);
/// assert_eq!(env.default.as_deref(), Some("staging"));
/// assert_eq!(env.choices.len(), 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgSpec {
    /// Name used as the key in parsed arguments
    pub name: String,
    /// Short description shown in help
    pub description: Option<String>,
    /// Whether the argument must be supplied (unless a default exists)
    pub required: bool,
    /// Default value, in its string form
    pub default: Option<String>,
    /// Declared value type
    #[serde(rename = "type")]
    pub arg_type: ArgType,
    /// Closed set of accepted values (empty = any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    /// Custom check run last
    #[serde(skip)]
    pub check: Option<ArgCheck>,
}

impl ArgSpec {
    /// Creates a required positional argument.
    pub fn required(name: &str, arg_type: ArgType) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            required: true,
            default: None,
            arg_type,
            choices: Vec::new(),
            check: None,
        }
    }

    /// Creates an optional positional argument.
    pub fn optional(name: &str, arg_type: ArgType) -> Self {
        Self {
            required: false,
            ..Self::required(name, arg_type)
        }
    }

    /// Adds a description.
    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = Some(desc.to_string());
        self
    }

    /// Sets the default value. Any `Display` value is stored stringified.
    pub fn with_default(mut self, default: impl ToString) -> Self {
        self.default = Some(default.to_string());
        self
    }

    /// Restricts the argument to a closed set of values.
    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    /// Attaches a custom check.
    pub fn with_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&ArgValue) -> Result<(), String> + Send + Sync + 'static,
    {
        self.check = Some(ArgCheck::new(check));
        self
    }
}

/// Declaration of a named option.
///
/// A flag has an optional short form (e.g., `-f`) and/or long form
/// (e.g., `--force`). Flags that do not take a value are switches.
///
/// # Examples
///
/// ```
/// use command_dispatch_core::{ArgType, FlagSpec};
///
/// let force = FlagSpec::switch(Some("-f"), Some("--force"));
/// assert_eq!(force.key(), "force");
/// assert!(force.matches("-f"));
///
/// let region = FlagSpec::with_value(None, Some("--region"), ArgType::String)
///     .with_default("eu");
/// assert!(region.takes_value);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagSpec {
    /// Short form (e.g., "-f")
    pub short: Option<String>,
    /// Long form (e.g., "--force")
    pub long: Option<String>,
    /// Description shown in help
    pub description: Option<String>,
    /// Whether the flag consumes a value
    pub takes_value: bool,
    /// Type of the value, when the flag takes one
    pub value_type: ArgType,
    /// Whether the flag must be present
    pub required: bool,
    /// Default value applied when the flag is absent
    pub default: Option<String>,
    /// Flags this one cannot be combined with
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts_with: Vec<String>,
    /// Flags that must be present alongside this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,
}

impl FlagSpec {
    /// Creates a switch (a flag without a value).
    pub fn switch(short: Option<&str>, long: Option<&str>) -> Self {
        Self {
            short: short.map(String::from),
            long: long.map(String::from),
            description: None,
            takes_value: false,
            value_type: ArgType::Boolean,
            required: false,
            default: None,
            conflicts_with: Vec::new(),
            requires: Vec::new(),
        }
    }

    /// Creates a flag that takes a value of the given type.
    pub fn with_value(short: Option<&str>, long: Option<&str>, value_type: ArgType) -> Self {
        Self {
            takes_value: true,
            value_type,
            ..Self::switch(short, long)
        }
    }

    /// Adds a description.
    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = Some(desc.to_string());
        self
    }

    /// Sets the default value.
    pub fn with_default(mut self, default: impl ToString) -> Self {
        self.default = Some(default.to_string());
        self
    }

    /// Marks the flag as mandatory.
    pub fn mandatory(mut self) -> Self {
        self.required = true;
        self
    }

    /// Declares a mutually exclusive flag.
    pub fn conflicts_with(mut self, other: &str) -> Self {
        self.conflicts_with.push(flag_key(other).to_string());
        self
    }

    /// Declares a flag that must accompany this one.
    pub fn requires(mut self, other: &str) -> Self {
        self.requires.push(flag_key(other).to_string());
        self
    }

    /// Returns the canonical name (long form preferred, falls back to short).
    pub fn canonical_name(&self) -> &str {
        self.long
            .as_deref()
            .or(self.short.as_deref())
            .unwrap_or("unknown")
    }

    /// Returns the canonical name without leading dashes.
    ///
    /// Parsed flag values are keyed by this name.
    pub fn key(&self) -> &str {
        flag_key(self.canonical_name())
    }

    /// Checks if this flag matches a given string (short or long form).
    pub fn matches(&self, s: &str) -> bool {
        self.short.as_deref() == Some(s) || self.long.as_deref() == Some(s)
    }
}

/// Strips leading dashes from a flag name.
pub fn flag_key(name: &str) -> &str {
    name.trim_start_matches('-')
}

/// Serializable description of a registered command.
///
/// This is the metadata half of a command, detached from its handler, used
/// for listings, autocompletion output and help text.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CommandInfo {
    /// Full identity (`namespace.name` or bare `name`)
    pub name: String,
    /// Short description
    pub description: Option<String>,
    /// Custom usage line; derived from the specs when absent
    pub usage: Option<String>,
    /// Alternate invocation strings
    pub aliases: Vec<String>,
    /// Dotted namespace prefix
    pub namespace: Option<String>,
    /// Grouping for help listings
    pub category: String,
    /// Registration tier
    pub priority: Priority,
    /// Excluded from listings when set
    pub hidden: bool,
    /// Positional argument declarations
    pub args: Vec<ArgSpec>,
    /// Flag declarations
    pub flags: Vec<FlagSpec>,
}
