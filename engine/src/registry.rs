//! The command table, its alias and namespace indexes, and per-registry
//! admission state.
//!
//! A [`CommandRegistry`] owns everything about one set of commands:
//! registration with priority-based conflict resolution, name resolution,
//! listings and completion, the rate limiter, and the conflict audit trail.
//! Registries never share state with each other; only the error log may be
//! shared (see [`ErrorLogger::global`]).
//!
//! Execution lives in the dispatcher module as further methods on
//! [`CommandRegistry`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use command_dispatch_config::DispatchConfig;
use command_dispatch_core::{
    Candidate, CommandInfo, CommandRateLimit, DispatchError, FuzzyOptions, RateLimitConfig,
    RateLimitStatus, RateLimiter, Suggestion, find_similar_commands, render_command_list,
    render_help,
};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::command::{Command, qualify};
use crate::conflict::{
    ConflictHistory, ConflictKind, ConflictRecord, ConflictReport, RegisterOptions,
    would_overwrite,
};
use crate::error_log::{ErrorContext, ErrorLogger};

/// Best-effort observer called for every classified failure.
pub type ErrorHandler =
    Arc<dyn Fn(&DispatchError, &ErrorContext) -> anyhow::Result<()> + Send + Sync>;

/// Current time on the runtime clock, so paused-time tests drive the limiter.
pub(crate) fn clock_now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Registry of commands and their dispatch state.
///
/// # Examples
///
/// ```
/// use command_dispatch::{Command, CommandRegistry, CommandResult};
/// use command_dispatch_core::Priority;
///
/// let mut registry = CommandRegistry::new();
/// let builtin = Command::new("reset", |_| async { Ok(CommandResult::ok_message("builtin")) })
///     .with_priority(Priority::Builtin);
/// let plugin = Command::new("reset", |_| async { Ok(CommandResult::ok_message("plugin")) })
///     .with_priority(Priority::Plugin);
///
/// assert!(registry.register(builtin));
/// assert!(!registry.register(plugin));
/// assert_eq!(registry.get("reset").unwrap().priority, Priority::Builtin);
/// assert_eq!(registry.conflict_history().len(), 1);
/// ```
pub struct CommandRegistry {
    /// Keyed by full name
    commands: HashMap<String, Command>,
    /// Alias (short or namespaced form) to full name
    aliases: HashMap<String, String>,
    /// Bare name of a namespaced command to its full name
    short_names: HashMap<String, String>,
    categories: BTreeMap<String, BTreeSet<String>>,
    namespaces: BTreeMap<String, BTreeSet<String>>,
    conflicts: ConflictHistory,
    pub(crate) limiter: Mutex<RateLimiter>,
    pub(crate) fuzzy: FuzzyOptions,
    pub(crate) error_log: Arc<ErrorLogger>,
    pub(crate) error_handler: Option<ErrorHandler>,
    pub(crate) default_timeout: Option<Duration>,
}

impl CommandRegistry {
    /// Creates a registry with default configuration and the process-wide
    /// error log.
    pub fn new() -> Self {
        Self::from_config(&DispatchConfig::default())
    }

    /// Creates a registry configured from `config`.
    pub fn from_config(config: &DispatchConfig) -> Self {
        let mut limiter = RateLimiter::new_at(config.rate_limit, clock_now());
        limiter.add_to_whitelist(config.whitelist.iter().cloned());
        for (name, limit) in &config.command_limits {
            limiter.set_command_rate_limit(name.clone(), *limit);
        }

        Self {
            commands: HashMap::new(),
            aliases: HashMap::new(),
            short_names: HashMap::new(),
            categories: BTreeMap::new(),
            namespaces: BTreeMap::new(),
            conflicts: ConflictHistory::new(config.conflict_history_limit),
            limiter: Mutex::new(limiter),
            fuzzy: config.fuzzy,
            error_log: ErrorLogger::global(),
            error_handler: None,
            default_timeout: config.default_timeout(),
        }
    }

    /// Uses a private error log instead of the process-wide one.
    pub fn with_error_logger(mut self, logger: Arc<ErrorLogger>) -> Self {
        self.error_log = logger;
        self
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Registers a command with default options.
    ///
    /// Returns `false` if any identifier collides with a command that wins
    /// on priority; nothing is changed in that case.
    pub fn register(&mut self, command: Command) -> bool {
        self.register_with(command, RegisterOptions::default())
    }

    /// Registers a command.
    ///
    /// Every collision of the command's full name or aliases with an
    /// existing command is recorded. The registration succeeds only if it
    /// wins every collision; each losing command is then removed entirely
    /// before the newcomer is installed.
    pub fn register_with(&mut self, command: Command, options: RegisterOptions) -> bool {
        if command.name.trim().is_empty() {
            warn!("refusing to register a command with an empty name");
            return false;
        }

        let full = command.full_name();
        let report = self.check_conflicts(&command, &options);
        let resolvable = report.resolvable();
        let mut losers = BTreeSet::new();

        for record in report.conflicts {
            if !options.silent {
                warn!(
                    identifier = %record.identifier,
                    kind = ?record.kind,
                    existing = %record.existing_command,
                    existing_priority = %record.existing_priority,
                    new_priority = %record.new_priority,
                    overwrite = record.would_overwrite,
                    "command registration conflict"
                );
            }
            if record.would_overwrite {
                losers.insert(record.existing_command.clone());
            }
            self.conflicts.push(record);
        }

        if !resolvable {
            debug!(command = %full, "registration rejected by existing command");
            return false;
        }

        for loser in &losers {
            self.remove_command(loser);
            debug!(command = %loser, replaced_by = %full, "command replaced");
        }

        self.install(full, command);
        true
    }

    /// Lists every collision `command` would cause, without changing
    /// anything.
    ///
    /// The full name and every alias, in short and namespaced form, are
    /// checked against existing names and aliases.
    pub fn check_conflicts(&self, command: &Command, options: &RegisterOptions) -> ConflictReport {
        let full = command.full_name();
        let mut conflicts = Vec::new();

        for (identifier, kind) in identifiers_for(command, &full) {
            let Some(existing) = self.holder_of(&identifier) else {
                continue;
            };
            let Some(holder) = self.commands.get(existing) else {
                continue;
            };
            conflicts.push(ConflictRecord {
                identifier,
                kind,
                existing_command: existing.to_string(),
                new_command: full.clone(),
                existing_priority: holder.priority,
                new_priority: command.priority,
                would_overwrite: would_overwrite(holder.priority, command.priority, options),
                timestamp: Utc::now(),
            });
        }

        ConflictReport {
            has_conflict: !conflicts.is_empty(),
            conflicts,
        }
    }

    /// Removes a command by name, alias or short name.
    pub fn unregister(&mut self, name: &str) -> bool {
        let Some(full) = self.resolve(name).map(String::from) else {
            return false;
        };
        self.remove_command(&full).is_some()
    }

    /// Adds an alias to a registered command.
    ///
    /// An alias may shadow another command's alias only when the target
    /// wins on priority or overwrite is forced. Command names and short
    /// names of other commands are never shadowed.
    pub fn register_alias(&mut self, alias: &str, target: &str, options: RegisterOptions) -> bool {
        let Some(full) = self.resolve(target).map(String::from) else {
            debug!(alias, target, "alias target not found");
            return false;
        };
        if alias.trim().is_empty() || self.commands.contains_key(alias) {
            return false;
        }
        if self.short_names.get(alias).is_some_and(|holder| *holder != full) {
            debug!(alias, target = %full, "alias would shadow a short name");
            return false;
        }

        if let Some(existing) = self.aliases.get(alias).cloned() {
            if existing == full {
                return true;
            }
            let (Some(holder), Some(owner)) = (self.commands.get(&existing), self.commands.get(&full))
            else {
                return false;
            };

            let overwrite = would_overwrite(holder.priority, owner.priority, &options);
            let record = ConflictRecord {
                identifier: alias.to_string(),
                kind: ConflictKind::Alias,
                existing_command: existing.clone(),
                new_command: full.clone(),
                existing_priority: holder.priority,
                new_priority: owner.priority,
                would_overwrite: overwrite,
                timestamp: Utc::now(),
            };
            if !options.silent {
                warn!(alias, existing = %existing, target = %full, overwrite, "alias conflict");
            }
            self.conflicts.push(record);
            if !overwrite {
                return false;
            }
            if !self.detach_alias(&existing, alias) {
                self.aliases.remove(alias);
            }
        }

        let namespaced = self
            .commands
            .get(&full)
            .and_then(|c| c.namespace.as_deref())
            .filter(|ns| !ns.is_empty())
            .map(|ns| qualify(Some(ns), alias));

        self.aliases.insert(alias.to_string(), full.clone());
        if let Some(namespaced) = namespaced {
            let free = !self.commands.contains_key(&namespaced)
                && self.aliases.get(&namespaced).is_none_or(|holder| *holder == full);
            if free {
                self.aliases.insert(namespaced, full.clone());
            }
        }
        if let Some(owner) = self.commands.get_mut(&full) {
            if !owner.aliases.iter().any(|a| a == alias) {
                owner.aliases.push(alias.to_string());
            }
        }
        true
    }

    /// Removes an alias given in short or namespaced form; both forms go.
    /// Returns `false` if it did not exist.
    pub fn unregister_alias(&mut self, alias: &str) -> bool {
        let Some(full) = self.aliases.get(alias).cloned() else {
            return false;
        };
        if !self.detach_alias(&full, alias) {
            self.aliases.remove(alias);
        }
        self.reclaim_short_name(alias);
        true
    }

    /// Drops `alias` from `owner` along with its paired short or
    /// namespaced form. Returns `false` if `owner` does not declare it.
    fn detach_alias(&mut self, owner: &str, alias: &str) -> bool {
        let Some(command) = self.commands.get_mut(owner) else {
            return false;
        };
        let ns = command.namespace.clone().filter(|ns| !ns.is_empty());

        let base = if command.aliases.iter().any(|a| a == alias) {
            alias.to_string()
        } else {
            let stripped = ns
                .as_deref()
                .and_then(|ns| alias.strip_prefix(ns))
                .and_then(|rest| rest.strip_prefix('.'));
            match stripped {
                Some(short) if command.aliases.iter().any(|a| a == short) => short.to_string(),
                _ => return false,
            }
        };
        command.aliases.retain(|a| *a != base);

        let mut keys = vec![base.clone()];
        if let Some(ns) = ns.as_deref() {
            keys.push(qualify(Some(ns), &base));
        }
        for key in keys {
            if self.aliases.get(&key).is_some_and(|target| target == owner) {
                self.aliases.remove(&key);
            }
        }
        true
    }

    /// Removes every command and alias. Rate-limit settings and the
    /// conflict history are kept.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.aliases.clear();
        self.short_names.clear();
        self.categories.clear();
        self.namespaces.clear();
    }

    fn install(&mut self, full: String, command: Command) {
        for alias in &command.aliases {
            if *alias == full {
                continue;
            }
            self.aliases.insert(alias.clone(), full.clone());
            if let Some(ns) = command.namespace.as_deref().filter(|ns| !ns.is_empty()) {
                self.aliases.insert(qualify(Some(ns), alias), full.clone());
            }
        }

        if let Some(ns) = command.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            // Short names never conflict; a taken identifier is skipped
            if self.short_name_free(&command.name) {
                self.short_names.insert(command.name.clone(), full.clone());
            }
            self.namespaces
                .entry(ns.to_string())
                .or_default()
                .insert(full.clone());
        }

        self.categories
            .entry(command.category.clone())
            .or_default()
            .insert(full.clone());

        debug!(command = %full, priority = %command.priority, aliases = command.aliases.len(), "registered command");
        self.commands.insert(full, command);
    }

    fn remove_command(&mut self, full: &str) -> Option<Command> {
        let command = self.commands.remove(full)?;
        self.aliases.retain(|_, target| target != full);
        self.short_names.retain(|_, target| target != full);

        if let Some(members) = self.categories.get_mut(&command.category) {
            members.remove(full);
            if members.is_empty() {
                self.categories.remove(&command.category);
            }
        }
        if let Some(ns) = &command.namespace {
            if let Some(members) = self.namespaces.get_mut(ns) {
                members.remove(full);
                if members.is_empty() {
                    self.namespaces.remove(ns);
                }
            }
        }

        self.reclaim_short_name(&command.name);
        for alias in &command.aliases {
            self.reclaim_short_name(alias);
        }
        Some(command)
    }

    fn short_name_free(&self, name: &str) -> bool {
        !self.commands.contains_key(name)
            && !self.aliases.contains_key(name)
            && !self.short_names.contains_key(name)
    }

    /// Hands a freed identifier to the first namespaced command (by full
    /// name) whose bare name it is.
    fn reclaim_short_name(&mut self, name: &str) {
        if !self.short_name_free(name) {
            return;
        }
        let heir = self
            .commands
            .iter()
            .filter(|(_, c)| c.name == name && c.namespace.as_deref().is_some_and(|ns| !ns.is_empty()))
            .map(|(full, _)| full)
            .min()
            .cloned();
        if let Some(heir) = heir {
            debug!(short_name = name, command = %heir, "short name reassigned");
            self.short_names.insert(name.to_string(), heir);
        }
    }

    /// Full name of the command holding `identifier` as a name or alias.
    fn holder_of(&self, identifier: &str) -> Option<&str> {
        if let Some((full, _)) = self.commands.get_key_value(identifier) {
            return Some(full);
        }
        self.aliases.get(identifier).map(String::as_str)
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Full name for a name, alias or short name.
    ///
    /// Full names win over aliases, which win over short names.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        if let Some((full, _)) = self.commands.get_key_value(name) {
            return Some(full);
        }
        self.aliases
            .get(name)
            .or_else(|| self.short_names.get(name))
            .map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&Command> {
        self.resolve(name).and_then(|full| self.commands.get(full))
    }

    pub fn has(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Visible commands, sorted by full name.
    pub fn list(&self) -> Vec<CommandInfo> {
        self.sorted_infos(|c| !c.hidden)
    }

    /// Every command including hidden ones, sorted by full name.
    pub fn list_all(&self) -> Vec<CommandInfo> {
        self.sorted_infos(|_| true)
    }

    pub fn categories(&self) -> Vec<String> {
        self.categories.keys().cloned().collect()
    }

    /// Visible commands in a category, sorted.
    pub fn commands_in_category(&self, category: &str) -> Vec<CommandInfo> {
        self.visible_members(self.categories.get(category))
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.namespaces.keys().cloned().collect()
    }

    /// Visible commands in a namespace, sorted.
    pub fn commands_in_namespace(&self, namespace: &str) -> Vec<CommandInfo> {
        self.visible_members(self.namespaces.get(namespace))
    }

    /// Names, aliases and short names of visible commands starting with
    /// `partial` (case-insensitive), sorted and deduplicated.
    pub fn autocomplete(&self, partial: &str) -> Vec<String> {
        let needle = partial.to_lowercase();
        let visible = |full: &str| self.commands.get(full).is_some_and(|c| !c.hidden);

        let names = self.commands.keys().filter(|full| visible(full.as_str()));
        let indexed = self
            .aliases
            .iter()
            .chain(self.short_names.iter())
            .filter(|(_, full)| visible(full.as_str()))
            .map(|(name, _)| name);

        let matches: BTreeSet<String> = names
            .chain(indexed)
            .filter(|name| name.to_lowercase().starts_with(&needle))
            .cloned()
            .collect();
        matches.into_iter().collect()
    }

    /// "Did you mean" candidates among visible names and aliases.
    pub fn find_similar_commands(&self, input: &str) -> Vec<Suggestion> {
        let names = self
            .commands
            .iter()
            .filter(|(_, c)| !c.hidden)
            .map(|(full, _)| Candidate::canonical(full));
        let aliases = self
            .aliases
            .iter()
            .filter(|(_, full)| self.commands.get(*full).is_some_and(|c| !c.hidden))
            .map(|(alias, full)| Candidate::alias(alias, full));

        find_similar_commands(input, names.chain(aliases), &self.fuzzy)
    }

    /// Help page for a command.
    pub fn help(&self, name: &str) -> Option<String> {
        self.get(name).map(|c| render_help(&c.info()))
    }

    /// Listing of visible commands grouped by category.
    pub fn help_overview(&self) -> String {
        render_command_list(&self.list())
    }

    fn sorted_infos(&self, keep: impl Fn(&Command) -> bool) -> Vec<CommandInfo> {
        let mut infos: Vec<CommandInfo> = self
            .commands
            .values()
            .filter(|&c| keep(c))
            .map(Command::info)
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    fn visible_members(&self, members: Option<&BTreeSet<String>>) -> Vec<CommandInfo> {
        members
            .into_iter()
            .flatten()
            .filter_map(|full| self.commands.get(full))
            .filter(|c| !c.hidden)
            .map(Command::info)
            .collect()
    }

    // -----------------------------------------------------------------------
    // Conflict history
    // -----------------------------------------------------------------------

    /// Recorded collisions, oldest first.
    pub fn conflict_history(&self) -> Vec<ConflictRecord> {
        self.conflicts.to_vec()
    }

    pub fn clear_conflict_history(&mut self) {
        self.conflicts.clear();
    }

    pub fn set_conflict_history_limit(&mut self, limit: usize) {
        self.conflicts.set_limit(limit);
    }

    /// Recorded collisions as a JSON array.
    pub fn export_conflict_history(&self) -> serde_json::Result<String> {
        self.conflicts.export_json()
    }

    // -----------------------------------------------------------------------
    // Admission control
    // -----------------------------------------------------------------------

    /// Replaces the global limits; both buckets restart full.
    pub fn set_rate_limit(&self, config: RateLimitConfig) {
        self.limiter.lock().set_rate_limit(config, clock_now());
    }

    pub fn set_rate_limit_enabled(&self, enabled: bool) {
        self.limiter.lock().set_enabled(enabled);
    }

    /// Installs a per-command limit. Registered names and aliases are
    /// resolved to the full name.
    pub fn set_command_rate_limit(&self, name: &str, limit: CommandRateLimit) {
        let key = self.limit_key(name);
        self.limiter.lock().set_command_rate_limit(key, limit);
    }

    pub fn remove_command_rate_limit(&self, name: &str) -> bool {
        let key = self.limit_key(name);
        self.limiter.lock().remove_command_rate_limit(&key)
    }

    /// Exempts commands from rate limiting.
    pub fn add_to_whitelist<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys: Vec<String> = names
            .into_iter()
            .map(|n| self.limit_key(n.as_ref()))
            .collect();
        self.limiter.lock().add_to_whitelist(keys);
    }

    pub fn remove_from_whitelist(&self, name: &str) -> bool {
        let key = self.limit_key(name);
        self.limiter.lock().remove_from_whitelist(&key)
    }

    /// Read-only snapshot of the limiter.
    pub fn rate_limit_status(&self) -> RateLimitStatus {
        self.limiter.lock().status(clock_now())
    }

    fn limit_key(&self, name: &str) -> String {
        self.resolve(name).unwrap_or(name).to_string()
    }

    // -----------------------------------------------------------------------
    // Error reporting
    // -----------------------------------------------------------------------

    /// Installs the observer called after every failure is logged.
    pub fn set_error_handler<F>(&mut self, handler: F)
    where
        F: Fn(&DispatchError, &ErrorContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
    }

    pub fn clear_error_handler(&mut self) {
        self.error_handler = None;
    }

    /// The log failures are appended to.
    pub fn error_log(&self) -> Arc<ErrorLogger> {
        Arc::clone(&self.error_log)
    }

    pub fn set_fuzzy_options(&mut self, options: FuzzyOptions) {
        self.fuzzy = options;
    }

    /// Deadline applied by [`execute_line`](Self::execute_line).
    pub fn set_default_timeout(&mut self, timeout: Option<Duration>) {
        self.default_timeout = timeout;
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifiers a command claims: its full name, then each alias in short
/// form and, when namespaced, in `namespace.alias` form.
fn identifiers_for(command: &Command, full: &str) -> Vec<(String, ConflictKind)> {
    let mut seen = BTreeSet::new();
    let mut ids = Vec::new();
    let mut claim = |id: String, kind: ConflictKind| {
        if seen.insert(id.clone()) {
            ids.push((id, kind));
        }
    };

    claim(full.to_string(), ConflictKind::Name);
    for alias in &command.aliases {
        claim(alias.clone(), ConflictKind::Alias);
        if let Some(ns) = command.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            claim(qualify(Some(ns), alias), ConflictKind::Alias);
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use command_dispatch_core::{CommandResult, Priority};

    fn cmd(name: &str, priority: Priority) -> Command {
        Command::new(name, |_| async { Ok(CommandResult::ok()) }).with_priority(priority)
    }

    fn registry() -> CommandRegistry {
        CommandRegistry::new().with_error_logger(Arc::new(ErrorLogger::new()))
    }

    #[test]
    fn test_higher_priority_replaces_lower() {
        let mut reg = registry();
        assert!(reg.register(cmd("reset", Priority::Plugin).with_alias("rst")));
        assert!(reg.register(cmd("reset", Priority::Builtin)));

        assert_eq!(reg.get("reset").unwrap().priority, Priority::Builtin);
        // The loser's aliases went with it
        assert!(reg.get("rst").is_none());

        let history = reg.conflict_history();
        assert_eq!(history.len(), 1);
        assert!(history[0].would_overwrite);
        assert_eq!(history[0].kind, ConflictKind::Name);
    }

    #[test]
    fn test_equal_priority_needs_overwrite() {
        let mut reg = registry();
        assert!(reg.register(cmd("build", Priority::User)));
        assert!(!reg.register(cmd("build", Priority::User)));
        assert!(reg.register_with(cmd("build", Priority::User), RegisterOptions::overwrite()));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_alias_collision_with_name() {
        let mut reg = registry();
        assert!(reg.register(cmd("status", Priority::Builtin)));
        assert!(!reg.register(cmd("state", Priority::Plugin).with_alias("status")));

        let record = &reg.conflict_history()[0];
        assert_eq!(record.kind, ConflictKind::Alias);
        assert_eq!(record.existing_command, "status");
        assert_eq!(record.new_command, "state");
        assert!(reg.get("state").is_none());
    }

    #[test]
    fn test_check_conflicts_is_read_only() {
        let mut reg = registry();
        reg.register(cmd("lint", Priority::User).with_alias("l"));

        let candidate = cmd("lint", Priority::Plugin).with_alias("l");
        let report = reg.check_conflicts(&candidate, &RegisterOptions::default());
        assert!(report.has_conflict);
        assert_eq!(report.conflicts.len(), 2);
        assert!(!report.resolvable());

        let forced = reg.check_conflicts(&candidate, &RegisterOptions::overwrite());
        assert!(forced.resolvable());

        assert!(reg.conflict_history().is_empty());
        assert_eq!(reg.get("l").unwrap().priority, Priority::User);
    }

    #[test]
    fn test_silent_still_records() {
        let mut reg = registry();
        reg.register(cmd("a", Priority::Builtin));
        let opts = RegisterOptions::default().silent();
        assert!(!reg.register_with(cmd("a", Priority::Plugin), opts));
        assert_eq!(reg.conflict_history().len(), 1);
    }

    #[test]
    fn test_namespaced_resolution() {
        let mut reg = registry();
        reg.register(cmd("cwd", Priority::Builtin).with_namespace("sys").with_alias("pwd"));

        assert_eq!(reg.resolve("sys.cwd"), Some("sys.cwd"));
        assert_eq!(reg.resolve("cwd"), Some("sys.cwd"));
        assert_eq!(reg.resolve("pwd"), Some("sys.cwd"));
        assert_eq!(reg.resolve("sys.pwd"), Some("sys.cwd"));
        assert_eq!(reg.namespaces(), vec!["sys"]);
    }

    #[test]
    fn test_short_name_kept_by_first_holder() {
        let mut reg = registry();
        reg.register(cmd("list", Priority::Builtin).with_namespace("a"));
        assert!(reg.register(cmd("list", Priority::Plugin).with_namespace("b")));
        assert!(reg.conflict_history().is_empty());
        assert_eq!(reg.resolve("list"), Some("a.list"));
        assert_eq!(reg.resolve("b.list"), Some("b.list"));

        // Removing a non-holder leaves the short name alone
        assert!(reg.unregister("b.list"));
        assert_eq!(reg.resolve("list"), Some("a.list"));
    }

    #[test]
    fn test_short_name_passes_to_next_namespace() {
        let mut reg = registry();
        reg.register(cmd("list", Priority::User).with_namespace("b"));
        reg.register(cmd("list", Priority::User).with_namespace("a"));
        reg.register(cmd("list", Priority::User).with_namespace("c"));
        assert_eq!(reg.resolve("list"), Some("b.list"));

        assert!(reg.unregister("b.list"));
        assert_eq!(reg.resolve("list"), Some("a.list"));
    }

    #[test]
    fn test_bare_command_outranks_short_name() {
        let mut reg = registry();
        reg.register(cmd("list", Priority::Plugin).with_namespace("ns"));
        assert!(reg.register(cmd("list", Priority::Plugin)));
        assert!(reg.conflict_history().is_empty());
        assert_eq!(reg.resolve("list"), Some("list"));

        assert!(reg.unregister("list"));
        assert_eq!(reg.resolve("list"), Some("ns.list"));
    }

    #[test]
    fn test_register_alias_respects_short_names() {
        let mut reg = registry();
        reg.register(cmd("cwd", Priority::Plugin).with_namespace("sys"));
        reg.register(cmd("other", Priority::Builtin));

        assert!(!reg.register_alias("cwd", "other", RegisterOptions::overwrite()));
        assert_eq!(reg.resolve("cwd"), Some("sys.cwd"));
        assert!(reg.get("other").unwrap().aliases.is_empty());
    }

    #[test]
    fn test_namespaced_alias_forms_move_together() {
        let mut reg = registry();
        reg.register(cmd("cwd", Priority::Builtin).with_namespace("sys"));

        assert!(reg.register_alias("pwd", "sys.cwd", RegisterOptions::default()));
        assert_eq!(reg.resolve("pwd"), Some("sys.cwd"));
        assert_eq!(reg.resolve("sys.pwd"), Some("sys.cwd"));

        assert!(reg.unregister_alias("sys.pwd"));
        assert!(reg.resolve("pwd").is_none());
        assert!(reg.resolve("sys.pwd").is_none());
        assert!(reg.get("sys.cwd").unwrap().aliases.is_empty());
        assert!(!reg.unregister_alias("pwd"));
    }

    #[test]
    fn test_unregister_cleans_indexes() {
        let mut reg = registry();
        reg.register(
            cmd("deploy", Priority::User)
                .with_namespace("ops")
                .with_alias("ship")
                .with_category("release"),
        );
        assert!(reg.unregister("ship"));
        assert!(reg.is_empty());
        assert!(reg.resolve("ship").is_none());
        assert!(reg.resolve("deploy").is_none());
        assert!(reg.categories().is_empty());
        assert!(reg.namespaces().is_empty());
        assert!(!reg.unregister("deploy"));
    }

    #[test]
    fn test_register_alias_rules() {
        let mut reg = registry();
        reg.register(cmd("remove", Priority::Builtin));
        reg.register(cmd("rename", Priority::Plugin).with_alias("rn"));

        assert!(reg.register_alias("rm", "remove", RegisterOptions::default()));
        assert_eq!(reg.get("remove").unwrap().aliases, vec!["rm"]);

        // Shadowing a command name is never allowed
        assert!(!reg.register_alias("rename", "remove", RegisterOptions::overwrite()));

        // Builtin target outranks the plugin holder of "rn"
        assert!(reg.register_alias("rn", "remove", RegisterOptions::default()));
        assert_eq!(reg.resolve("rn"), Some("remove"));
        assert!(reg.get("rename").unwrap().aliases.is_empty());

        assert!(reg.unregister_alias("rm"));
        assert!(!reg.unregister_alias("rm"));
        assert_eq!(reg.get("remove").unwrap().aliases, vec!["rn"]);
    }

    #[test]
    fn test_listings_skip_hidden() {
        let mut reg = registry();
        reg.register(cmd("zeta", Priority::User));
        reg.register(cmd("alpha", Priority::User).with_alias("al"));
        reg.register(cmd("debug", Priority::User).hidden().with_alias("dbg"));

        let names: Vec<_> = reg.list().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(reg.list_all().len(), 3);
        assert_eq!(reg.commands_in_category("general").len(), 2);

        assert_eq!(reg.autocomplete("A"), vec!["al", "alpha"]);
        assert!(reg.autocomplete("d").is_empty());
        assert!(reg.find_similar_commands("debug").is_empty());
        assert!(reg.get("dbg").is_some());
    }

    #[test]
    fn test_conflict_history_bounded_and_exported() {
        let mut reg = registry();
        reg.set_conflict_history_limit(2);
        reg.register(cmd("a", Priority::Builtin));
        for _ in 0..5 {
            reg.register(cmd("a", Priority::Plugin));
        }
        assert_eq!(reg.conflict_history().len(), 2);

        let exported = reg.export_conflict_history().unwrap();
        assert!(exported.contains("\"existingCommand\": \"a\""));

        reg.clear_conflict_history();
        assert!(reg.conflict_history().is_empty());
    }

    #[test]
    fn test_rate_limit_keys_resolve_aliases() {
        let mut reg = registry();
        reg.register(cmd("deploy", Priority::User).with_alias("ship"));
        reg.add_to_whitelist(["ship"]);
        reg.set_command_rate_limit(
            "ship",
            CommandRateLimit {
                max_per_second: Some(1),
                max_per_minute: None,
            },
        );

        let status = reg.rate_limit_status();
        assert_eq!(status.whitelist, vec!["deploy"]);
        assert!(status.command_limits.contains_key("deploy"));
        assert!(reg.remove_from_whitelist("deploy"));
        assert!(reg.remove_command_rate_limit("ship"));
    }

    #[test]
    fn test_from_config_applies_settings() {
        let mut config = DispatchConfig::default();
        config.rate_limit.max_commands_per_second = 4;
        config.whitelist = vec!["help".into()];
        config.default_timeout_ms = None;

        let reg = CommandRegistry::from_config(&config);
        let status = reg.rate_limit_status();
        assert_eq!(status.max_commands_per_second, 4);
        assert_eq!(status.whitelist, vec!["help"]);
        assert_eq!(reg.default_timeout(), None);
    }
}
