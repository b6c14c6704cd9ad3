//! In-memory host for tests
//!
//! Records every host action and lets tests script failures, so the step
//! executor and engine can be exercised without touching a real machine.

use super::{HostOps, ProcessOutput, RegistryRoot, ServiceVerb};
use crate::error::{Result, SetupError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// One recorded process spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRecord {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl SpawnRecord {
    /// Flat command line used for failure matching.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Scriptable in-memory [`HostOps`] implementation.
#[derive(Debug, Default)]
pub struct FakeHost {
    env: HashMap<String, String>,
    fail_patterns: Vec<String>,
    launch_error_patterns: Vec<String>,
    pub spawns: Mutex<Vec<SpawnRecord>>,
    pub persistent_env: Mutex<HashMap<String, String>>,
    pub registry: Mutex<HashMap<String, String>>,
    pub service_calls: Mutex<Vec<(ServiceVerb, String)>>,
    failing_services: Vec<String>,
    broadcasts: AtomicUsize,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a process-environment variable for expansion.
    pub fn with_env(mut self, name: &str, value: &str) -> Self {
        self.env.insert(name.to_string(), value.to_string());
        self
    }

    /// Seed a persistent machine environment variable.
    pub fn with_persistent_env(self, name: &str, value: &str) -> Self {
        self.persistent_env
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
        self
    }

    /// Any spawn whose command line contains `pattern` exits non-zero.
    pub fn fail_commands_matching(mut self, pattern: &str) -> Self {
        self.fail_patterns.push(pattern.to_string());
        self
    }

    /// Any spawn whose command line contains `pattern` fails to launch.
    pub fn refuse_commands_matching(mut self, pattern: &str) -> Self {
        self.launch_error_patterns.push(pattern.to_string());
        self
    }

    /// Service control of `name` reports a non-zero exit.
    pub fn fail_service(mut self, name: &str) -> Self {
        self.failing_services.push(name.to_string());
        self
    }

    /// Number of environment-change broadcasts observed.
    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.load(Ordering::SeqCst)
    }

    /// Snapshot of recorded spawn command lines.
    pub fn spawned_command_lines(&self) -> Vec<String> {
        self.spawns
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.command_line())
            .collect()
    }

    /// Read a recorded registry value (`ROOT\key\name`).
    pub fn registry_value(&self, root: RegistryRoot, key_path: &str, name: &str) -> Option<String> {
        self.registry
            .lock()
            .unwrap()
            .get(&registry_slot(root, key_path, name))
            .cloned()
    }
}

fn registry_slot(root: RegistryRoot, key_path: &str, name: &str) -> String {
    format!(r"{}\{}\{}", root.short_name(), key_path, name)
}

impl HostOps for FakeHost {
    fn run(&self, program: &str, args: &[String], cwd: Option<&Path>) -> Result<ProcessOutput> {
        let record = SpawnRecord {
            program: program.to_string(),
            args: args.to_vec(),
            cwd: cwd.map(Path::to_path_buf),
        };
        let line = record.command_line();
        self.spawns.lock().unwrap().push(record);

        if self.launch_error_patterns.iter().any(|p| line.contains(p)) {
            return Err(SetupError::host(format!("cannot launch {}: simulated", program)));
        }
        if self.fail_patterns.iter().any(|p| line.contains(p)) {
            return Ok(ProcessOutput {
                success: false,
                exit_code: Some(1),
                output: format!("simulated failure: {}", line),
            });
        }
        Ok(ProcessOutput {
            success: true,
            exit_code: Some(0),
            output: String::from("ok"),
        })
    }

    fn env_var(&self, name: &str) -> Option<String> {
        self.env.get(name).cloned()
    }

    fn read_persistent_env(&self, name: &str) -> Result<Option<String>> {
        Ok(self.persistent_env.lock().unwrap().get(name).cloned())
    }

    fn write_persistent_env(&self, name: &str, value: &str) -> Result<()> {
        self.persistent_env
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn broadcast_env_change(&self) {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);
    }

    fn set_registry_value(
        &self,
        root: RegistryRoot,
        key_path: &str,
        name: &str,
        value: &str,
    ) -> Result<()> {
        self.registry
            .lock()
            .unwrap()
            .insert(registry_slot(root, key_path, name), value.to_string());
        Ok(())
    }

    fn control_service(&self, verb: ServiceVerb, name: &str) -> Result<ProcessOutput> {
        self.service_calls
            .lock()
            .unwrap()
            .push((verb, name.to_string()));
        if self.failing_services.iter().any(|s| s == name) {
            return Ok(ProcessOutput {
                success: false,
                exit_code: Some(1060),
                output: format!("simulated service failure: {}", name),
            });
        }
        Ok(ProcessOutput {
            success: true,
            exit_code: Some(0),
            output: String::from("ok"),
        })
    }
}
