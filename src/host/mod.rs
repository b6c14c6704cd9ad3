//! Host operations capability
//!
//! The step executor never touches the OS directly: process spawning,
//! the persistent environment store, the registry, and service control
//! all go through the [`HostOps`] trait. Production binds to real system
//! tools ([`system::SystemHost`]); tests bind to an in-memory fake
//! ([`fake::FakeHost`]) so step semantics can be verified without a real
//! machine.

pub mod fake;
pub mod system;

use crate::error::{Result, SetupError};
use std::path::Path;

/// Captured result of a spawned process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Whether the process exited with a success status.
    pub success: bool,
    /// Exit code (None if terminated by signal).
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr, for diagnostics.
    pub output: String,
}

impl ProcessOutput {
    /// Exit code for messages, -1 when killed by a signal.
    pub fn code(&self) -> i32 {
        self.exit_code.unwrap_or(-1)
    }
}

/// Root hive of a registry key path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryRoot {
    LocalMachine,
    CurrentUser,
    ClassesRoot,
}

impl RegistryRoot {
    /// Parse a root hive prefix. Both the short and the long spelling are
    /// accepted, case-insensitively.
    pub fn parse(prefix: &str) -> Result<Self> {
        match prefix.to_ascii_uppercase().as_str() {
            "HKLM" | "HKEY_LOCAL_MACHINE" => Ok(Self::LocalMachine),
            "HKCU" | "HKEY_CURRENT_USER" => Ok(Self::CurrentUser),
            "HKCR" | "HKEY_CLASSES_ROOT" => Ok(Self::ClassesRoot),
            _ => Err(SetupError::step(format!("unknown registry root: {}", prefix))),
        }
    }

    /// Short hive name as understood by the registry tooling.
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::LocalMachine => "HKLM",
            Self::CurrentUser => "HKCU",
            Self::ClassesRoot => "HKCR",
        }
    }
}

/// Verb for service control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceVerb {
    Start,
    Stop,
}

impl ServiceVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

/// Injected capability for every OS action family a step can need.
pub trait HostOps: Send + Sync {
    /// Spawn a process, block until exit, capture combined output.
    /// `Err` means the process could not be launched at all.
    fn run(&self, program: &str, args: &[String], cwd: Option<&Path>) -> Result<ProcessOutput>;

    /// Look up a process-environment variable (used for expansion).
    fn env_var(&self, name: &str) -> Option<String>;

    /// Read a variable from the persistent machine environment store.
    /// `Ok(None)` when the variable is not set.
    fn read_persistent_env(&self, name: &str) -> Result<Option<String>>;

    /// Write a variable to the persistent machine environment store
    /// (expandable value semantics).
    fn write_persistent_env(&self, name: &str, value: &str) -> Result<()>;

    /// Broadcast a system-wide environment-change notification.
    /// Best-effort; never fails the step.
    fn broadcast_env_change(&self);

    /// Create/open a registry key and set a named string value.
    fn set_registry_value(
        &self,
        root: RegistryRoot,
        key_path: &str,
        name: &str,
        value: &str,
    ) -> Result<()>;

    /// Start or stop a named system service.
    fn control_service(&self, verb: ServiceVerb, name: &str) -> Result<ProcessOutput>;

    /// Expand environment-variable references in a value using
    /// [`HostOps::env_var`].
    fn expand(&self, value: &str) -> String {
        expand_with(value, &|name| self.env_var(name))
    }
}

/// Expand `%NAME%`, `$NAME`, and `${NAME}` references.
///
/// `$`-style references to undefined variables expand to nothing;
/// `%NAME%` is left verbatim when the variable is undefined, matching the
/// command processor.
pub fn expand_with(value: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '%' => {
                if let Some(end) = value[i + 1..].find('%') {
                    let name = &value[i + 1..i + 1 + end];
                    if !name.is_empty() {
                        match lookup(name) {
                            Some(v) => out.push_str(&v),
                            None => {
                                out.push('%');
                                out.push_str(name);
                                out.push('%');
                            }
                        }
                        // Skip the name plus the closing '%'.
                        for _ in 0..name.chars().count() + 1 {
                            chars.next();
                        }
                        continue;
                    }
                }
                out.push('%');
            }
            '$' => {
                if let Some(&(_, '{')) = chars.peek() {
                    if let Some(end) = value[i + 2..].find('}') {
                        let name = &value[i + 2..i + 2 + end];
                        if let Some(v) = lookup(name) {
                            out.push_str(&v);
                        }
                        for _ in 0..name.chars().count() + 2 {
                            chars.next();
                        }
                        continue;
                    }
                    out.push('$');
                    continue;
                }
                let rest = &value[i + 1..];
                let len = rest
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                    .count();
                if len == 0 {
                    out.push('$');
                    continue;
                }
                let name: String = rest.chars().take(len).collect();
                if let Some(v) = lookup(&name) {
                    out.push_str(&v);
                }
                for _ in 0..len {
                    chars.next();
                }
            }
            _ => out.push(c),
        }
    }

    out
}
