//! Production host bindings
//!
//! Binds [`HostOps`] to the real machine by spawning the system tools the
//! actions map to (`reg.exe` for the registry and persistent environment,
//! `sc.exe` for services, PowerShell for the environment-change
//! broadcast) and folding captured output into the result.

use super::{HostOps, ProcessOutput, RegistryRoot, ServiceVerb};
use crate::error::{Result, SetupError};
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

/// Registry key backing the persistent machine environment store.
const ENVIRONMENT_KEY: &str = r"HKLM\SYSTEM\CurrentControlSet\Control\Session Manager\Environment";

/// PowerShell snippet broadcasting WM_SETTINGCHANGE("Environment") to all
/// top-level windows so new consoles observe the updated store.
const BROADCAST_COMMAND: &str = concat!(
    "Add-Type -Namespace Win32 -Name NativeMethods -MemberDefinition ",
    "'[DllImport(\"user32.dll\", SetLastError = true, CharSet = CharSet.Auto)] ",
    "public static extern IntPtr SendMessageTimeout(IntPtr hWnd, uint Msg, UIntPtr wParam, ",
    "string lParam, uint fuFlags, uint uTimeout, out UIntPtr lpdwResult);'; ",
    "$result = [UIntPtr]::Zero; ",
    "[Win32.NativeMethods]::SendMessageTimeout([IntPtr]0xFFFF, 0x1A, [UIntPtr]::Zero, ",
    "\"Environment\", 2, 5000, [ref]$result)"
);

/// [`HostOps`] implementation bound to real OS commands.
#[derive(Debug, Default)]
pub struct SystemHost;

impl SystemHost {
    pub fn new() -> Self {
        Self
    }
}

impl HostOps for SystemHost {
    fn run(&self, program: &str, args: &[String], cwd: Option<&Path>) -> Result<ProcessOutput> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        debug!("spawning {} {:?} (cwd={:?})", program, args, cwd);
        let output = cmd
            .output()
            .map_err(|e| SetupError::host(format!("cannot launch {}: {}", program, e)))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(ProcessOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            output: combined,
        })
    }

    fn env_var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn read_persistent_env(&self, name: &str) -> Result<Option<String>> {
        let args = vec![
            "query".to_string(),
            ENVIRONMENT_KEY.to_string(),
            "/v".to_string(),
            name.to_string(),
        ];
        let result = self.run("reg.exe", &args, None)?;
        if !result.success {
            // reg query exits non-zero when the value does not exist.
            debug!("persistent variable {} not found: {}", name, result.output.trim());
            return Ok(None);
        }
        Ok(parse_reg_query_value(&result.output, name))
    }

    fn write_persistent_env(&self, name: &str, value: &str) -> Result<()> {
        let args = vec![
            "add".to_string(),
            ENVIRONMENT_KEY.to_string(),
            "/v".to_string(),
            name.to_string(),
            "/t".to_string(),
            "REG_EXPAND_SZ".to_string(),
            "/d".to_string(),
            value.to_string(),
            "/f".to_string(),
        ];
        let result = self.run("reg.exe", &args, None)?;
        if !result.success {
            return Err(SetupError::host(format!(
                "cannot set persistent variable {}: exit code {}\nOutput: {}",
                name,
                result.code(),
                result.output
            )));
        }
        Ok(())
    }

    fn broadcast_env_change(&self) {
        let args = vec![
            "-NoProfile".to_string(),
            "-NonInteractive".to_string(),
            "-Command".to_string(),
            BROADCAST_COMMAND.to_string(),
        ];
        match self.run("powershell.exe", &args, None) {
            Ok(result) if !result.success => {
                warn!("environment change broadcast failed: {}", result.output.trim());
            }
            Ok(_) => debug!("environment change broadcast sent"),
            Err(e) => warn!("environment change broadcast failed: {}", e),
        }
    }

    fn set_registry_value(
        &self,
        root: RegistryRoot,
        key_path: &str,
        name: &str,
        value: &str,
    ) -> Result<()> {
        let full_key = format!(r"{}\{}", root.short_name(), key_path);
        let args = vec![
            "add".to_string(),
            full_key.clone(),
            "/v".to_string(),
            name.to_string(),
            "/t".to_string(),
            "REG_SZ".to_string(),
            "/d".to_string(),
            value.to_string(),
            "/f".to_string(),
        ];
        let result = self.run("reg.exe", &args, None)?;
        if !result.success {
            return Err(SetupError::host(format!(
                "cannot set {}\\{}: exit code {}\nOutput: {}",
                full_key,
                name,
                result.code(),
                result.output
            )));
        }
        Ok(())
    }

    fn control_service(&self, verb: ServiceVerb, name: &str) -> Result<ProcessOutput> {
        let args = vec![verb.as_str().to_string(), name.to_string()];
        self.run("sc.exe", &args, None)
    }
}

/// Pull the data column out of `reg query /v` output. The value line has
/// the shape `    <name>    REG_SZ    <data>`; data may contain spaces.
fn parse_reg_query_value(output: &str, name: &str) -> Option<String> {
    for line in output.lines() {
        let trimmed = line.trim();
        if !trimmed
            .to_ascii_lowercase()
            .starts_with(&name.to_ascii_lowercase())
        {
            continue;
        }
        for reg_type in ["REG_EXPAND_SZ", "REG_SZ"] {
            if let Some(idx) = trimmed.find(reg_type) {
                return Some(trimmed[idx + reg_type.len()..].trim().to_string());
            }
        }
    }
    None
}
