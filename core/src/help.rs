//! Help text derived from command metadata.
//!
//! Rendering is a pure function of [`CommandInfo`]; nothing here touches a
//! registry.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::types::{ArgSpec, CommandInfo, FlagSpec};

/// Usage line for a command: the custom one if set, otherwise derived as
/// `name [options] <required> [optional]`.
pub fn usage_line(info: &CommandInfo) -> String {
    if let Some(usage) = &info.usage {
        return usage.clone();
    }

    let mut line = info.name.clone();
    if !info.flags.is_empty() {
        line.push_str(" [options]");
    }
    for arg in &info.args {
        line.push(' ');
        line.push_str(&arg_placeholder(arg));
    }
    line
}

/// Full help page for a single command.
///
/// # Examples
///
/// ```
/// use command_dispatch_core::*;
///
/// let info = CommandInfo {
///     name: "copy".to_string(),
///     description: Some("Copy a file".to_string()),
///     args: vec![
///         ArgSpec::required("src", ArgType::Path),
///         ArgSpec::optional("dst", ArgType::Path).with_default("."),
///     ],
///     ..CommandInfo::default()
/// };
/// let help = render_help(&info);
/// assert!(help.starts_with("Usage: copy <src> [dst]"));
/// assert!(help.contains("(default: .)"));
/// ```
pub fn render_help(info: &CommandInfo) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Usage: {}", usage_line(info));

    if let Some(desc) = &info.description {
        let _ = writeln!(out, "\n{desc}");
    }

    if !info.aliases.is_empty() {
        let _ = writeln!(out, "\nAliases: {}", info.aliases.join(", "));
    }

    if !info.args.is_empty() {
        out.push_str("\nArguments:\n");
        let rows: Vec<(String, String)> = info
            .args
            .iter()
            .map(|arg| (arg_placeholder(arg), arg_details(arg)))
            .collect();
        write_rows(&mut out, &rows);
    }

    if !info.flags.is_empty() {
        out.push_str("\nOptions:\n");
        let rows: Vec<(String, String)> = info
            .flags
            .iter()
            .map(|flag| (flag_label(flag), flag_details(flag)))
            .collect();
        write_rows(&mut out, &rows);
    }

    out
}

/// Listing of visible commands grouped by category, one line each.
pub fn render_command_list<'a, I>(commands: I) -> String
where
    I: IntoIterator<Item = &'a CommandInfo>,
{
    let mut groups: BTreeMap<&str, Vec<&CommandInfo>> = BTreeMap::new();
    for info in commands.into_iter().filter(|c| !c.hidden) {
        groups.entry(info.category.as_str()).or_default().push(info);
    }

    let mut out = String::new();
    for (category, mut infos) in groups {
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        if !out.is_empty() {
            out.push('\n');
        }
        let heading = if category.is_empty() { "general" } else { category };
        let _ = writeln!(out, "{heading}:");

        let rows: Vec<(String, String)> = infos
            .iter()
            .map(|info| {
                (
                    info.name.clone(),
                    info.description.clone().unwrap_or_default(),
                )
            })
            .collect();
        write_rows(&mut out, &rows);
    }
    out
}

fn arg_placeholder(arg: &ArgSpec) -> String {
    if arg.required && arg.default.is_none() {
        format!("<{}>", arg.name)
    } else {
        format!("[{}]", arg.name)
    }
}

fn arg_details(arg: &ArgSpec) -> String {
    let mut parts = Vec::new();
    if let Some(desc) = &arg.description {
        parts.push(desc.clone());
    }
    parts.push(format!("({})", arg.arg_type));
    if !arg.choices.is_empty() {
        parts.push(format!("[choices: {}]", arg.choices.join(", ")));
    }
    if let Some(default) = &arg.default {
        parts.push(format!("(default: {default})"));
    }
    parts.join(" ")
}

fn flag_label(flag: &FlagSpec) -> String {
    let mut label = match (&flag.short, &flag.long) {
        (Some(short), Some(long)) => format!("{short}, {long}"),
        (Some(only), None) | (None, Some(only)) => only.clone(),
        (None, None) => flag.canonical_name().to_string(),
    };
    if flag.takes_value {
        let _ = write!(label, " <{}>", flag.value_type);
    }
    label
}

fn flag_details(flag: &FlagSpec) -> String {
    let mut parts = Vec::new();
    if let Some(desc) = &flag.description {
        parts.push(desc.clone());
    }
    if flag.required {
        parts.push("(required)".to_string());
    }
    if let Some(default) = &flag.default {
        parts.push(format!("(default: {default})"));
    }
    parts.join(" ")
}

fn write_rows(out: &mut String, rows: &[(String, String)]) {
    let width = rows.iter().map(|(left, _)| left.len()).max().unwrap_or(0);
    for (left, right) in rows {
        if right.is_empty() {
            let _ = writeln!(out, "  {left}");
        } else {
            let _ = writeln!(out, "  {left:<width$}  {right}");
        }
    }
}
