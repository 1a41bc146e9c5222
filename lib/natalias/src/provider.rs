// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Providers let the engine run in different contexts by plugging in
//! implementations of the few services it needs from its host: a way
//! to log and a way to tell the time. If something does not have at
//! least two obvious implementations, it does not need to be a
//! provider.

use crate::time::Moment;
use core::fmt;
use core::fmt::Display;
use std::time::Instant;

/// The set of all host-specific providers required by an engine
/// instance.
pub struct Providers {
    pub log: Box<dyn LogProvider>,
    pub clock: Box<dyn ClockProvider>,
}

impl Default for Providers {
    fn default() -> Self {
        Self { log: Box::new(NullLog), clock: Box::new(SystemClock::new()) }
    }
}

/// A logging provider provides the means to log messages to some
/// destination based on the context in which the engine is running.
///
/// For example, in a unit test this could map to `println!`. In a
/// daemon it would map to the daemon's structured logger.
pub trait LogProvider: Send + Sync {
    /// Log a message at the specified level.
    fn log(&self, level: LogLevel, msg: &str);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogLevel {
    Note,
    Warn,
    Error,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let level_s = match self {
            Self::Note => "[NOTE]",
            Self::Warn => "[WARN]",
            Self::Error => "[ERROR]",
        };
        write!(f, "{level_s}")
    }
}

#[derive(Clone, Copy)]
pub struct PrintlnLog;

impl LogProvider for PrintlnLog {
    fn log(&self, level: LogLevel, msg: &str) {
        println!("{level} {msg}");
    }
}

/// Discard everything.
#[derive(Clone, Copy)]
pub struct NullLog;

impl LogProvider for NullLog {
    fn log(&self, _level: LogLevel, _msg: &str) {}
}

/// A source of [`Moment`]s.
pub trait ClockProvider: Send + Sync {
    fn now(&self) -> Moment;
}

/// Monotonic time since the clock was created.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockProvider for SystemClock {
    fn now(&self) -> Moment {
        let millis = u64::try_from(self.origin.elapsed().as_millis())
            .unwrap_or(u64::MAX);
        Moment::from_millis(millis)
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[cfg(any(feature = "test-help", test))]
#[derive(Clone, Default)]
pub struct ManualClock {
    millis: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

#[cfg(any(feature = "test-help", test))]
impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: core::time::Duration) {
        let by = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.millis.fetch_add(by, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(core::time::Duration::from_secs(secs));
    }
}

#[cfg(any(feature = "test-help", test))]
impl ClockProvider for ManualClock {
    fn now(&self) -> Moment {
        Moment::from_millis(
            self.millis.load(std::sync::atomic::Ordering::SeqCst),
        )
    }
}

/// Collects log lines so tests can look at them.
#[cfg(any(feature = "test-help", test))]
#[derive(Clone, Default)]
pub struct CaptureLog {
    lines: std::sync::Arc<std::sync::Mutex<Vec<(LogLevel, String)>>>,
}

#[cfg(any(feature = "test-help", test))]
impl CaptureLog {
    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        match self.lines.lock() {
            Ok(l) => l.clone(),
            Err(p) => p.into_inner().clone(),
        }
    }
}

#[cfg(any(feature = "test-help", test))]
impl LogProvider for CaptureLog {
    fn log(&self, level: LogLevel, msg: &str) {
        let mut lines = match self.lines.lock() {
            Ok(l) => l,
            Err(p) => p.into_inner(),
        };
        lines.push((level, msg.to_string()));
    }
}
