//! Explicit operation context, replacing the source's process-wide
//! singletons (console, shell options, instance pool) — design note §9.

use std::sync::Arc;
use std::time::Duration;

/// Severity of a structured message routed to the console collaborator
/// (spec.md §7: warnings/notes do not affect return values).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Warning,
    Note,
    Info,
}

/// Console rendering is an external collaborator (spec.md §1's
/// "out of scope" list); this crate only needs a narrow sink contract.
pub trait ConsoleSink: Send + Sync {
    fn print(&self, level: MessageLevel, message: &str);
}

/// A sink that forwards every message to `tracing`, used when no CLI
/// console is attached (e.g. library/test usage).
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingConsoleSink;

impl ConsoleSink for TracingConsoleSink {
    fn print(&self, level: MessageLevel, message: &str) {
        match level {
            MessageLevel::Warning => tracing::warn!(target: "console", "{message}"),
            MessageLevel::Note => tracing::info!(target: "console", "{message}"),
            MessageLevel::Info => tracing::debug!(target: "console", "{message}"),
        }
    }
}

/// Configurable timeouts (spec.md §5).
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// `dba.restartWaitTimeout`: how long to wait for a server restart
    /// after clone provisioning.
    pub restart_wait: Duration,
    /// `recovery_start_timeout`: how long to wait for distributed
    /// recovery to begin (default 30s).
    pub recovery_start: Duration,
    /// Operation-specific GTID-sync timeout.
    pub gtid_sync: Duration,
    /// Poll interval for the background recovery/clone monitor (≤1 Hz).
    pub monitor_poll_interval: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            restart_wait: Duration::from_secs(5 * 60),
            recovery_start: Duration::from_secs(30),
            gtid_sync: Duration::from_secs(10 * 60),
            monitor_poll_interval: Duration::from_secs(1),
        }
    }
}

/// Bag of console sink, resolved timeouts, and pool handle threaded
/// through every public operation (design note §9, "Global state").
#[derive(Clone)]
pub struct OperationContext {
    pub console: Arc<dyn ConsoleSink>,
    pub timeouts: Timeouts,
    pub interactive: bool,
    pub dry_run: bool,
}

impl OperationContext {
    pub fn builder() -> OperationContextBuilder {
        OperationContextBuilder::default()
    }

    pub fn note(&self, message: impl AsRef<str>) {
        self.console.print(MessageLevel::Note, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.console.print(MessageLevel::Warning, message.as_ref());
    }
}

#[derive(Clone)]
pub struct OperationContextBuilder {
    console: Option<Arc<dyn ConsoleSink>>,
    timeouts: Timeouts,
    interactive: bool,
    dry_run: bool,
}

impl Default for OperationContextBuilder {
    fn default() -> Self {
        Self {
            console: None,
            timeouts: Timeouts::default(),
            interactive: false,
            dry_run: false,
        }
    }
}

impl OperationContextBuilder {
    pub fn console(mut self, console: Arc<dyn ConsoleSink>) -> Self {
        self.console = Some(console);
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn build(self) -> OperationContext {
        OperationContext {
            console: self.console.unwrap_or_else(|| Arc::new(TracingConsoleSink)),
            timeouts: self.timeouts,
            interactive: self.interactive,
            dry_run: self.dry_run,
        }
    }

    /// Read timeouts from environment variables, mirroring the teacher's
    /// `EnterpriseClient::from_env` (`REDIS_ENTERPRISE_*`).
    pub fn from_env(mut self) -> Self {
        use std::env;

        fn secs_from(var: &str) -> Option<Duration> {
            env::var(var).ok()?.parse::<u64>().ok().map(Duration::from_secs)
        }

        let mut timeouts = self.timeouts;
        if let Some(d) = secs_from("MYSQLADMIN_RESTART_WAIT_TIMEOUT") {
            timeouts.restart_wait = d;
        }
        if let Some(d) = secs_from("MYSQLADMIN_RECOVERY_TIMEOUT") {
            timeouts.recovery_start = d;
        }
        if let Some(d) = secs_from("MYSQLADMIN_GTID_SYNC_TIMEOUT") {
            timeouts.gtid_sync = d;
        }
        self.timeouts = timeouts;
        self
    }
}
