//! "Did you mean" suggestions for unknown command names.
//!
//! Candidates are scored by Levenshtein distance; names that start with the
//! input get a synthetic distance of `0.5` so they rank above genuine edit
//! distance matches. Results are deterministic for a fixed candidate set.
//!
//! # Examples
//!
//! ```
//! use command_dispatch_core::*;
//!
//! let candidates = [
//!     Candidate::canonical("deploy"),
//!     Candidate::alias("ship", "deploy"),
//!     Candidate::canonical("status"),
//! ];
//! let found = find_similar_commands("deploi", candidates, &FuzzyOptions::default());
//! assert_eq!(found[0].name, "deploy");
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Distance assigned to prefix matches.
pub const PREFIX_DISTANCE: f64 = 0.5;

/// Tuning for [`find_similar_commands`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzyOptions {
    /// Candidates farther than this are discarded
    pub max_distance: usize,
    /// Maximum number of suggestions returned
    pub max_suggestions: usize,
}

impl Default for FuzzyOptions {
    fn default() -> Self {
        Self {
            max_distance: 3,
            max_suggestions: 3,
        }
    }
}

/// An identifier that can be suggested, and the command it resolves to.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    /// What the user would type
    pub name: &'a str,
    /// Full name of the command it resolves to
    pub command: &'a str,
}

impl<'a> Candidate<'a> {
    /// A command's own full name.
    pub fn canonical(name: &'a str) -> Self {
        Self {
            name,
            command: name,
        }
    }

    /// An alias resolving to `command`.
    pub fn alias(name: &'a str, command: &'a str) -> Self {
        Self { name, command }
    }

    fn is_canonical(&self) -> bool {
        self.name == self.command
    }
}

/// A ranked suggestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    /// Identifier to suggest
    pub name: String,
    /// Full name of the command it resolves to
    pub command: String,
    /// Edit distance, or [`PREFIX_DISTANCE`] for prefix matches
    pub distance: f64,
}

/// Finds the commands closest to `input`.
///
/// Comparison is case-insensitive. One suggestion is kept per target
/// command: the closest identifier, preferring the canonical name over an
/// alias on ties. Results are sorted by distance, then name.
pub fn find_similar_commands<'a, I>(
    input: &str,
    candidates: I,
    options: &FuzzyOptions,
) -> Vec<Suggestion>
where
    I: IntoIterator<Item = Candidate<'a>>,
{
    let needle = input.trim().to_lowercase();
    if needle.is_empty() || options.max_suggestions == 0 {
        return Vec::new();
    }

    let mut best: BTreeMap<&str, (f64, Candidate<'a>)> = BTreeMap::new();

    for candidate in candidates {
        let hay = candidate.name.to_lowercase();
        let mut distance = strsim::levenshtein(&needle, &hay) as f64;
        if hay != needle && hay.starts_with(&needle) {
            distance = distance.min(PREFIX_DISTANCE);
        }
        if distance > options.max_distance as f64 {
            continue;
        }

        let keep_existing = best.get(candidate.command).is_some_and(|(current, kept)| {
            *current < distance
                || (*current == distance
                    && (kept.is_canonical()
                        || (!candidate.is_canonical() && kept.name <= candidate.name)))
        });
        if !keep_existing {
            best.insert(candidate.command, (distance, candidate));
        }
    }

    let mut suggestions: Vec<Suggestion> = best
        .into_values()
        .map(|(distance, c)| Suggestion {
            name: c.name.to_string(),
            command: c.command.to_string(),
            distance,
        })
        .collect();

    suggestions.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.name.cmp(&b.name))
    });
    suggestions.truncate(options.max_suggestions);
    suggestions
}
