//! Step executor
//!
//! Dispatches one typed step to the corresponding OS-level action through
//! the injected host capability and reports success or a descriptive
//! failure. The executor knows nothing about sibling steps, module
//! weights, or overall progress; every action is synchronous and blocks
//! the calling thread for its full duration. No step type retries — the
//! retry/fallback pattern belongs to configuration resolution only.

use crate::error::{Result, SetupError};
use crate::host::{HostOps, ProcessOutput, RegistryRoot, ServiceVerb};
use crate::manifest::Step;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Execute exactly one OS-level action for `step`, with `work_dir` as the
/// module's extracted file tree.
pub fn execute_step(step: &Step, work_dir: &Path, host: &dyn HostOps) -> Result<()> {
    match step {
        Step::Exe { file, args } => run_exe(file, args, work_dir, host),
        Step::Msi { file, args } => run_msi(file, args, work_dir, host),
        Step::Powershell { command } => run_powershell_command(command, host),
        Step::PowershellScript { file } => run_powershell_script(file, work_dir, host),
        Step::PowershellModule { value, command } => run_powershell_module(value, command, host),
        Step::Batch { file } => run_batch(file, work_dir, host),
        Step::EnvPath { value, action } => set_env_path(value, action, host),
        Step::EnvSet { variable, value } => set_env_variable(variable, value, host),
        Step::ShellConfig { target, content } => configure_shell(target, content, host),
        Step::Registry {
            key,
            variable,
            value,
        } => set_registry(key, variable, value, host),
        Step::Copy { file, dest } => copy_file(file, dest, work_dir, host),
        Step::Service { action, value } => manage_service(action, value, host),
        Step::Verify { command } => verify_install(command, host),
    }
}

/// Split a raw argument string on whitespace.
fn parse_args(args: &str) -> Vec<String> {
    args.split_whitespace().map(str::to_string).collect()
}

/// Fold a finished process into success or a step error that embeds the
/// captured combined output.
fn ensure_success(result: ProcessOutput, context: &str) -> Result<()> {
    if result.success {
        Ok(())
    } else {
        Err(SetupError::step(format!(
            "{} failed: exit code {}\nOutput: {}",
            context,
            result.code(),
            result.output
        )))
    }
}

fn run_exe(file: &str, args: &str, work_dir: &Path, host: &dyn HostOps) -> Result<()> {
    let exe_path = work_dir.join(file);
    let result = host.run(
        &exe_path.to_string_lossy(),
        &parse_args(args),
        Some(work_dir),
    )?;
    ensure_success(result, &format!("execution of {}", file))
}

fn run_msi(file: &str, args: &str, work_dir: &Path, host: &dyn HostOps) -> Result<()> {
    let msi_path = work_dir.join(file);
    let mut msi_args = vec!["/i".to_string(), msi_path.to_string_lossy().into_owned()];
    msi_args.extend(parse_args(args));
    let result = host.run("msiexec.exe", &msi_args, Some(work_dir))?;
    ensure_success(result, &format!("MSI install of {}", file))
}

fn powershell_args(tail: &[&str]) -> Vec<String> {
    let mut args = vec![
        "-NoProfile".to_string(),
        "-NonInteractive".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
    ];
    args.extend(tail.iter().map(|s| s.to_string()));
    args
}

fn run_powershell_command(command: &str, host: &dyn HostOps) -> Result<()> {
    let result = host.run("powershell.exe", &powershell_args(&["-Command", command]), None)?;
    ensure_success(result, "PowerShell command")
}

fn run_powershell_script(file: &str, work_dir: &Path, host: &dyn HostOps) -> Result<()> {
    let script_path = work_dir.join(file);
    let result = host.run(
        "powershell.exe",
        &powershell_args(&["-File", &script_path.to_string_lossy()]),
        Some(work_dir),
    )?;
    ensure_success(result, &format!("PowerShell script {}", file))
}

fn run_powershell_module(value: &str, command: &str, host: &dyn HostOps) -> Result<()> {
    // A caller-supplied command overrides the default machine-wide install.
    let install_cmd = if command.is_empty() {
        format!(
            "Install-Module -Name {} -Force -AllowClobber -Scope AllUsers",
            value
        )
    } else {
        command.to_string()
    };
    let result = host.run(
        "powershell.exe",
        &powershell_args(&["-Command", &install_cmd]),
        None,
    )?;
    ensure_success(result, &format!("PowerShell module install of {}", value))
}

fn run_batch(file: &str, work_dir: &Path, host: &dyn HostOps) -> Result<()> {
    let bat_path = work_dir.join(file);
    let args = vec!["/C".to_string(), bat_path.to_string_lossy().into_owned()];
    let result = host.run("cmd.exe", &args, Some(work_dir))?;
    ensure_success(result, &format!("batch script {}", file))
}

fn set_env_path(value: &str, action: &str, host: &dyn HostOps) -> Result<()> {
    let current = host.read_persistent_env("Path")?.unwrap_or_default();
    let expanded = host.expand(value);

    // Case-insensitive containment check: already on PATH means no-op.
    if current.to_lowercase().contains(&expanded.to_lowercase()) {
        debug!("PATH already contains {}, skipping", expanded);
        return Ok(());
    }

    let new_path = if current.is_empty() {
        expanded
    } else {
        match action {
            "prepend" => format!("{};{}", expanded, current),
            // append is the default for any other verb
            _ => format!("{};{}", current, expanded),
        }
    };

    host.write_persistent_env("Path", &new_path)?;
    host.broadcast_env_change();
    Ok(())
}

fn set_env_variable(variable: &str, value: &str, host: &dyn HostOps) -> Result<()> {
    let expanded = host.expand(value);
    host.write_persistent_env(variable, &expanded)?;
    host.broadcast_env_change();
    Ok(())
}

fn configure_shell(target: &str, content: &str, host: &dyn HostOps) -> Result<()> {
    let profile_path = match target {
        "powershell_profile" => powershell_profile_path(host)?,
        _ => {
            return Err(SetupError::step(format!(
                "unknown shell config target: {}",
                target
            )))
        }
    };

    if let Some(parent) = profile_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            SetupError::step(format!(
                "cannot create profile directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let existing = fs::read_to_string(&profile_path).unwrap_or_default();
    if existing.contains(content) {
        debug!("shell profile already contains block, skipping");
        return Ok(());
    }

    let mut updated = existing;
    if !updated.is_empty() {
        updated.push('\n');
    }
    updated.push_str(content);

    fs::write(&profile_path, updated).map_err(|e| {
        SetupError::step(format!(
            "cannot write shell profile {}: {}",
            profile_path.display(),
            e
        ))
    })
}

/// PowerShell 7 machine profile when present, Windows PowerShell 5.1
/// otherwise.
fn powershell_profile_path(host: &dyn HostOps) -> Result<PathBuf> {
    if let Some(program_files) = host.env_var("ProgramFiles") {
        let pwsh_dir = Path::new(&program_files).join("PowerShell").join("7");
        if pwsh_dir.is_dir() {
            return Ok(pwsh_dir.join("profile.ps1"));
        }
    }
    let windir = host
        .env_var("WINDIR")
        .ok_or_else(|| SetupError::step("cannot locate shell profile: WINDIR not set"))?;
    Ok(Path::new(&windir)
        .join("System32")
        .join("WindowsPowerShell")
        .join("v1.0")
        .join("profile.ps1"))
}

fn set_registry(key: &str, variable: &str, value: &str, host: &dyn HostOps) -> Result<()> {
    let (prefix, key_path) = key
        .split_once('\\')
        .ok_or_else(|| SetupError::step(format!("invalid registry key: {}", key)))?;
    let root = RegistryRoot::parse(prefix)?;
    host.set_registry_value(root, key_path, variable, value)
}

fn copy_file(file: &str, dest: &str, work_dir: &Path, host: &dyn HostOps) -> Result<()> {
    let source = work_dir.join(file);
    let dest = PathBuf::from(host.expand(dest));

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            SetupError::step(format!(
                "cannot create destination directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let data = fs::read(&source)
        .map_err(|e| SetupError::step(format!("cannot read source {}: {}", source.display(), e)))?;
    fs::write(&dest, data)
        .map_err(|e| SetupError::step(format!("cannot copy to {}: {}", dest.display(), e)))
}

fn manage_service(action: &str, name: &str, host: &dyn HostOps) -> Result<()> {
    let result = match action {
        "start" => host.control_service(ServiceVerb::Start, name)?,
        "stop" => host.control_service(ServiceVerb::Stop, name)?,
        "restart" => {
            // Stop failure is ignored: the service may not be running.
            let _ = host.control_service(ServiceVerb::Stop, name);
            host.control_service(ServiceVerb::Start, name)?
        }
        _ => {
            return Err(SetupError::step(format!(
                "unknown service action: {}",
                action
            )))
        }
    };
    ensure_success(result, &format!("service control of {}", name))
}

fn verify_install(command: &str, host: &dyn HostOps) -> Result<()> {
    let args = vec!["/C".to_string(), command.to_string()];
    let result = host.run("cmd.exe", &args, None)?;
    ensure_success(result, &format!("verification ({})", command))
}
