//! Admission control for command execution.
//!
//! [`RateLimiter`] combines two global token buckets (per second and per
//! minute) with optional per-command sliding-window limits and a whitelist
//! of commands that bypass limiting entirely. It is pure state: every
//! operation takes the current [`Instant`] from the caller.
//!
//! Checking and consuming are separate steps so a caller can reject an
//! exhausted request early but only spend budget once the request is known
//! to be valid. [`RateLimiter::try_acquire`] does both at once.
//!
//! # Examples
//!
//! ```
//! use std::time::Instant;
//! use command_dispatch_core::*;
//!
//! let now = Instant::now();
//! let mut limiter = RateLimiter::new_at(
//!     RateLimitConfig { enabled: true, max_commands_per_second: 2, max_commands_per_minute: 100 },
//!     now,
//! );
//!
//! assert!(limiter.try_acquire("ping", now).is_ok());
//! assert!(limiter.try_acquire("ping", now).is_ok());
//! let err = limiter.try_acquire("ping", now).unwrap_err();
//! assert_eq!(err.limit_type, LimitType::Second);
//! assert!(err.retry_after_ms > 0);
//! ```

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// How long history entries are retained for per-command windows.
pub const HISTORY_RETENTION: Duration = Duration::from_secs(60);

const SECOND: Duration = Duration::from_secs(1);
const MINUTE: Duration = Duration::from_secs(60);

/// Window that was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitType {
    Second,
    Minute,
}

impl LimitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Second => "second",
            Self::Minute => "minute",
        }
    }
}

impl fmt::Display for LimitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when an execution is not admitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rate limit exceeded for '{command}' (per {limit_type}), retry after {retry_after_ms}ms")]
pub struct RateLimitError {
    /// Command that was rejected
    pub command: String,
    /// Suggested wait before retrying, always positive
    pub retry_after_ms: u64,
    /// Window that was exceeded
    pub limit_type: LimitType,
}

/// Global limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// When `false`, every execution is admitted and no state is touched.
    pub enabled: bool,
    /// Capacity of the per-second bucket.
    pub max_commands_per_second: u32,
    /// Capacity of the per-minute bucket.
    pub max_commands_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_commands_per_second: 10,
            max_commands_per_minute: 100,
        }
    }
}

/// Stricter limits for a single command, enforced over sliding windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandRateLimit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_per_second: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_per_minute: Option<u32>,
}

/// Read-only view of the limiter, with refill projected to the snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitStatus {
    pub enabled: bool,
    pub tokens_per_second: u32,
    pub max_commands_per_second: u32,
    pub tokens_per_minute: u32,
    pub max_commands_per_minute: u32,
    /// History entries inside the retention window
    pub recent_commands: usize,
    pub whitelist: Vec<String>,
    pub command_limits: BTreeMap<String, CommandRateLimit>,
}

#[derive(Debug, Clone)]
struct Bucket {
    tokens: u32,
    capacity: u32,
    unit: Duration,
    last_refill: Instant,
}

impl Bucket {
    fn full(capacity: u32, unit: Duration, now: Instant) -> Self {
        Self {
            tokens: capacity,
            capacity,
            unit,
            last_refill: now,
        }
    }

    /// Adds `capacity` tokens per whole elapsed unit and advances the refill
    /// mark by whole units only, so fractional time carries over.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let units = elapsed.as_nanos() / self.unit.as_nanos();
        if units == 0 {
            return;
        }

        let added = u64::try_from(units)
            .unwrap_or(u64::MAX)
            .saturating_mul(u64::from(self.capacity));
        let tokens = u64::from(self.tokens).saturating_add(added);
        self.tokens = tokens.min(u64::from(self.capacity)) as u32;

        let units = u32::try_from(units).unwrap_or(u32::MAX);
        self.last_refill = self
            .last_refill
            .checked_add(self.unit.saturating_mul(units))
            .unwrap_or(now);
    }

    /// Time until the next whole unit completes.
    fn retry_after(&self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.unit.saturating_sub(elapsed)
    }
}

/// Token-bucket limiter with per-command sliding windows.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    enabled: bool,
    second: Bucket,
    minute: Bucket,
    /// `(command, admitted_at)` in admission order
    history: VecDeque<(String, Instant)>,
    whitelist: BTreeSet<String>,
    command_limits: BTreeMap<String, CommandRateLimit>,
}

impl RateLimiter {
    /// Creates a limiter with full buckets.
    pub fn new(config: RateLimitConfig) -> Self {
        Self::new_at(config, Instant::now())
    }

    /// Creates a limiter with full buckets, refill clocks starting at `now`.
    pub fn new_at(config: RateLimitConfig, now: Instant) -> Self {
        Self {
            enabled: config.enabled,
            second: Bucket::full(config.max_commands_per_second, SECOND, now),
            minute: Bucket::full(config.max_commands_per_minute, MINUTE, now),
            history: VecDeque::new(),
            whitelist: BTreeSet::new(),
            command_limits: BTreeMap::new(),
        }
    }

    /// Replaces the global limits. Both buckets restart full at the new
    /// capacities.
    pub fn set_rate_limit(&mut self, config: RateLimitConfig, now: Instant) {
        self.enabled = config.enabled;
        self.second = Bucket::full(config.max_commands_per_second, SECOND, now);
        self.minute = Bucket::full(config.max_commands_per_minute, MINUTE, now);
    }

    /// Toggles limiting without touching capacities.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current global limits.
    pub fn config(&self) -> RateLimitConfig {
        RateLimitConfig {
            enabled: self.enabled,
            max_commands_per_second: self.second.capacity,
            max_commands_per_minute: self.minute.capacity,
        }
    }

    /// Installs a stricter limit for one command.
    pub fn set_command_rate_limit(&mut self, command: impl Into<String>, limit: CommandRateLimit) {
        self.command_limits.insert(command.into(), limit);
    }

    /// Removes a per-command limit. Returns `true` if one existed.
    pub fn remove_command_rate_limit(&mut self, command: &str) -> bool {
        self.command_limits.remove(command).is_some()
    }

    /// Exempts commands from all limiting.
    pub fn add_to_whitelist<I, S>(&mut self, commands: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist.extend(commands.into_iter().map(Into::into));
    }

    /// Returns `true` if the command was whitelisted.
    pub fn remove_from_whitelist(&mut self, command: &str) -> bool {
        self.whitelist.remove(command)
    }

    pub fn is_whitelisted(&self, command: &str) -> bool {
        self.whitelist.contains(command)
    }

    /// Decides whether `command` may run now, without spending budget.
    ///
    /// Refills both buckets and prunes expired history first. On rejection
    /// nothing else changes.
    pub fn check(&mut self, command: &str, now: Instant) -> Result<(), RateLimitError> {
        if !self.enabled || self.whitelist.contains(command) {
            return Ok(());
        }

        self.prune(now);
        self.second.refill(now);
        self.minute.refill(now);

        if let Some(limit) = self.command_limits.get(command).copied() {
            self.check_command_window(command, limit, now)?;
        }

        for (bucket, limit_type) in [
            (&self.second, LimitType::Second),
            (&self.minute, LimitType::Minute),
        ] {
            if bucket.tokens == 0 {
                let err = reject(command, bucket.retry_after(now), limit_type);
                debug!(command, limit = %limit_type, retry_after_ms = err.retry_after_ms, "global bucket exhausted");
                return Err(err);
            }
        }

        Ok(())
    }

    /// Spends one token from each bucket and records the admission.
    ///
    /// Call only after a successful [`check`](Self::check) at the same
    /// instant.
    pub fn consume(&mut self, command: &str, now: Instant) {
        if !self.enabled || self.whitelist.contains(command) {
            return;
        }
        self.second.tokens = self.second.tokens.saturating_sub(1);
        self.minute.tokens = self.minute.tokens.saturating_sub(1);
        self.history.push_back((command.to_string(), now));
    }

    /// [`check`](Self::check) followed by [`consume`](Self::consume).
    pub fn try_acquire(&mut self, command: &str, now: Instant) -> Result<(), RateLimitError> {
        self.check(command, now)?;
        self.consume(command, now);
        Ok(())
    }

    /// Snapshot with refill projected to `now`; does not mutate.
    pub fn status(&self, now: Instant) -> RateLimitStatus {
        let mut second = self.second.clone();
        let mut minute = self.minute.clone();
        second.refill(now);
        minute.refill(now);

        let cutoff = now.checked_sub(HISTORY_RETENTION);
        let recent_commands = self
            .history
            .iter()
            .filter(|(_, at)| cutoff.is_none_or(|c| *at > c))
            .count();

        RateLimitStatus {
            enabled: self.enabled,
            tokens_per_second: second.tokens,
            max_commands_per_second: second.capacity,
            tokens_per_minute: minute.tokens,
            max_commands_per_minute: minute.capacity,
            recent_commands,
            whitelist: self.whitelist.iter().cloned().collect(),
            command_limits: self.command_limits.clone(),
        }
    }

    /// Drops history entries older than the retention window.
    ///
    /// Runs at the start of every check rather than on a timer; entries are
    /// admission-ordered so only the front needs inspecting.
    fn prune(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(HISTORY_RETENTION) else {
            return;
        };
        while self.history.front().is_some_and(|(_, at)| *at <= cutoff) {
            self.history.pop_front();
        }
    }

    fn check_command_window(
        &self,
        command: &str,
        limit: CommandRateLimit,
        now: Instant,
    ) -> Result<(), RateLimitError> {
        let windows = [
            (limit.max_per_second, SECOND, LimitType::Second),
            (limit.max_per_minute, MINUTE, LimitType::Minute),
        ];

        for (max, window, limit_type) in windows {
            let Some(max) = max else { continue };

            let mut in_window = self
                .history
                .iter()
                .filter(|(name, at)| name == command && now.saturating_duration_since(*at) < window)
                .map(|(_, at)| *at);

            let Some(oldest) = in_window.next() else {
                if max == 0 {
                    return Err(reject(command, window, limit_type));
                }
                continue;
            };
            let count = 1 + in_window.count();

            if count >= max as usize {
                let retry = window.saturating_sub(now.saturating_duration_since(oldest));
                let err = reject(command, retry, limit_type);
                debug!(command, limit = %limit_type, count, retry_after_ms = err.retry_after_ms, "per-command window exceeded");
                return Err(err);
            }
        }

        Ok(())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

fn reject(command: &str, retry_after: Duration, limit_type: LimitType) -> RateLimitError {
    RateLimitError {
        command: command.to_string(),
        // Round up so callers never retry a hair too early
        retry_after_ms: retry_after.as_micros().div_ceil(1000).max(1) as u64,
        limit_type,
    }
}
