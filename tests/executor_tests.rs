//! Step executor tests against the in-memory host
//!
//! Each step type maps to a specific host action; these tests pin the
//! exact command lines, environment writes, and registry slots.

use setupforge::executor::execute_step;
use setupforge::host::fake::FakeHost;
use setupforge::host::{RegistryRoot, ServiceVerb};
use setupforge::manifest::Step;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_exe_step_runs_from_work_dir() {
    let work = TempDir::new().unwrap();
    let host = FakeHost::new();
    let step = Step::Exe {
        file: "setup.exe".into(),
        args: "/S /norestart".into(),
    };

    execute_step(&step, work.path(), &host).unwrap();

    let spawns = host.spawns.lock().unwrap();
    assert_eq!(spawns.len(), 1);
    assert_eq!(
        spawns[0].program,
        work.path().join("setup.exe").to_string_lossy()
    );
    assert_eq!(spawns[0].args, vec!["/S", "/norestart"]);
    assert_eq!(spawns[0].cwd.as_deref(), Some(work.path()));
}

#[test]
fn test_msi_step_invokes_msiexec_with_install_flag() {
    let work = TempDir::new().unwrap();
    let host = FakeHost::new();
    let step = Step::Msi {
        file: "tool.msi".into(),
        args: "/qn".into(),
    };

    execute_step(&step, work.path(), &host).unwrap();

    let spawns = host.spawns.lock().unwrap();
    assert_eq!(spawns[0].program, "msiexec.exe");
    assert_eq!(spawns[0].args[0], "/i");
    assert!(spawns[0].args[1].ends_with("tool.msi"));
    assert_eq!(spawns[0].args[2], "/qn");
}

#[test]
fn test_powershell_command_uses_noninteractive_flags() {
    let work = TempDir::new().unwrap();
    let host = FakeHost::new();
    let step = Step::Powershell {
        command: "Write-Output ready".into(),
    };

    execute_step(&step, work.path(), &host).unwrap();

    let line = host.spawned_command_lines().remove(0);
    assert!(line.starts_with("powershell.exe"));
    assert!(line.contains("-NoProfile"));
    assert!(line.contains("-NonInteractive"));
    assert!(line.contains("-ExecutionPolicy Bypass"));
    assert!(line.contains("-Command Write-Output ready"));
}

#[test]
fn test_powershell_module_default_install_command() {
    let work = TempDir::new().unwrap();
    let host = FakeHost::new();
    let step = Step::PowershellModule {
        value: "PSReadLine".into(),
        command: String::new(),
    };

    execute_step(&step, work.path(), &host).unwrap();

    let line = host.spawned_command_lines().remove(0);
    assert!(line.contains("Install-Module -Name PSReadLine -Force -AllowClobber -Scope AllUsers"));
}

#[test]
fn test_powershell_module_custom_command_wins() {
    let work = TempDir::new().unwrap();
    let host = FakeHost::new();
    let step = Step::PowershellModule {
        value: "PSReadLine".into(),
        command: "Import-Module PSReadLine".into(),
    };

    execute_step(&step, work.path(), &host).unwrap();

    let line = host.spawned_command_lines().remove(0);
    assert!(line.contains("Import-Module PSReadLine"));
    assert!(!line.contains("Install-Module"));
}

#[test]
fn test_batch_step_runs_through_cmd() {
    let work = TempDir::new().unwrap();
    let host = FakeHost::new();
    let step = Step::Batch {
        file: "post.bat".into(),
    };

    execute_step(&step, work.path(), &host).unwrap();

    let spawns = host.spawns.lock().unwrap();
    assert_eq!(spawns[0].program, "cmd.exe");
    assert_eq!(spawns[0].args[0], "/C");
    assert!(spawns[0].args[1].ends_with("post.bat"));
}

#[test]
fn test_env_path_appends_by_default() {
    let host = FakeHost::new().with_persistent_env("Path", r"C:\Windows");
    let step = Step::EnvPath {
        value: r"C:\Tools\bin".into(),
        action: String::new(),
    };

    execute_step(&step, TempDir::new().unwrap().path(), &host).unwrap();

    assert_eq!(
        host.persistent_env.lock().unwrap().get("Path").unwrap(),
        r"C:\Windows;C:\Tools\bin"
    );
    assert_eq!(host.broadcast_count(), 1);
}

#[test]
fn test_env_path_prepend() {
    let host = FakeHost::new().with_persistent_env("Path", r"C:\Windows");
    let step = Step::EnvPath {
        value: r"C:\Tools\bin".into(),
        action: "prepend".into(),
    };

    execute_step(&step, TempDir::new().unwrap().path(), &host).unwrap();

    assert_eq!(
        host.persistent_env.lock().unwrap().get("Path").unwrap(),
        r"C:\Tools\bin;C:\Windows"
    );
}

#[test]
fn test_env_path_skips_when_already_present() {
    let host = FakeHost::new().with_persistent_env("Path", r"C:\Windows;c:\tools\BIN");
    let step = Step::EnvPath {
        value: r"C:\Tools\bin".into(),
        action: String::new(),
    };

    execute_step(&step, TempDir::new().unwrap().path(), &host).unwrap();

    // Case differs but the entry is already there: nothing written.
    assert_eq!(
        host.persistent_env.lock().unwrap().get("Path").unwrap(),
        r"C:\Windows;c:\tools\BIN"
    );
    assert_eq!(host.broadcast_count(), 0);
}

#[test]
fn test_env_path_expands_variables_before_writing() {
    let host = FakeHost::new()
        .with_env("LOCALAPPDATA", r"C:\Users\svc\AppData\Local")
        .with_persistent_env("Path", r"C:\Windows");
    let step = Step::EnvPath {
        value: r"%LOCALAPPDATA%\Programs\bin".into(),
        action: String::new(),
    };

    execute_step(&step, TempDir::new().unwrap().path(), &host).unwrap();

    assert_eq!(
        host.persistent_env.lock().unwrap().get("Path").unwrap(),
        r"C:\Windows;C:\Users\svc\AppData\Local\Programs\bin"
    );
}

#[test]
fn test_env_set_writes_and_broadcasts() {
    let host = FakeHost::new().with_env("ProgramData", r"C:\ProgramData");
    let step = Step::EnvSet {
        variable: "TOOL_HOME".into(),
        value: r"%ProgramData%\tool".into(),
    };

    execute_step(&step, TempDir::new().unwrap().path(), &host).unwrap();

    assert_eq!(
        host.persistent_env.lock().unwrap().get("TOOL_HOME").unwrap(),
        r"C:\ProgramData\tool"
    );
    assert_eq!(host.broadcast_count(), 1);
}

#[test]
fn test_shell_config_appends_once() {
    let windir = TempDir::new().unwrap();
    let host = FakeHost::new().with_env("WINDIR", &windir.path().to_string_lossy());
    let step = Step::ShellConfig {
        target: "powershell_profile".into(),
        content: "Import-Module Posh".into(),
    };
    let profile = windir
        .path()
        .join("System32")
        .join("WindowsPowerShell")
        .join("v1.0")
        .join("profile.ps1");

    execute_step(&step, TempDir::new().unwrap().path(), &host).unwrap();
    assert_eq!(fs::read_to_string(&profile).unwrap(), "Import-Module Posh");

    // Second application is a no-op.
    execute_step(&step, TempDir::new().unwrap().path(), &host).unwrap();
    assert_eq!(fs::read_to_string(&profile).unwrap(), "Import-Module Posh");
}

#[test]
fn test_shell_config_unknown_target_fails() {
    let host = FakeHost::new();
    let step = Step::ShellConfig {
        target: "bashrc".into(),
        content: "alias ll='ls -l'".into(),
    };
    let err = execute_step(&step, TempDir::new().unwrap().path(), &host).unwrap_err();
    assert!(err.to_string().contains("unknown shell config target"));
}

#[test]
fn test_registry_step_records_value_under_parsed_root() {
    let host = FakeHost::new();
    let step = Step::Registry {
        key: r"HKEY_LOCAL_MACHINE\SOFTWARE\Acme".into(),
        variable: "InstallDir".into(),
        value: r"C:\Acme".into(),
    };

    execute_step(&step, TempDir::new().unwrap().path(), &host).unwrap();

    assert_eq!(
        host.registry_value(RegistryRoot::LocalMachine, r"SOFTWARE\Acme", "InstallDir"),
        Some(r"C:\Acme".to_string())
    );
}

#[test]
fn test_copy_step_expands_destination() {
    let work = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();
    fs::write(work.path().join("settings.ini"), "key=value").unwrap();
    let host = FakeHost::new().with_env("APPDIR", &target.path().to_string_lossy());
    let step = Step::Copy {
        file: "settings.ini".into(),
        dest: "%APPDIR%/conf/settings.ini".into(),
    };

    execute_step(&step, work.path(), &host).unwrap();

    let copied = target.path().join("conf").join("settings.ini");
    assert_eq!(fs::read_to_string(copied).unwrap(), "key=value");
}

#[test]
fn test_copy_step_missing_source_fails() {
    let work = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();
    let host = FakeHost::new().with_env("APPDIR", &target.path().to_string_lossy());
    let step = Step::Copy {
        file: "absent.ini".into(),
        dest: "%APPDIR%/absent.ini".into(),
    };

    let err = execute_step(&step, work.path(), &host).unwrap_err();
    assert!(err.to_string().contains("cannot read source"));
}

#[test]
fn test_service_restart_stops_then_starts() {
    let host = FakeHost::new();
    let step = Step::Service {
        action: "restart".into(),
        value: "Spooler".into(),
    };

    execute_step(&step, TempDir::new().unwrap().path(), &host).unwrap();

    let calls = host.service_calls.lock().unwrap();
    assert_eq!(
        *calls,
        vec![
            (ServiceVerb::Stop, "Spooler".to_string()),
            (ServiceVerb::Start, "Spooler".to_string()),
        ]
    );
}

#[test]
fn test_service_start_failure_is_reported() {
    let host = FakeHost::new().fail_service("Spooler");
    let step = Step::Service {
        action: "start".into(),
        value: "Spooler".into(),
    };

    let err = execute_step(&step, TempDir::new().unwrap().path(), &host).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("service control of Spooler"));
    assert!(msg.contains("exit code 1060"));
}

#[test]
fn test_verify_failure_embeds_captured_output() {
    let host = FakeHost::new().fail_commands_matching("where git");
    let step = Step::Verify {
        command: "where git".into(),
    };

    let err = execute_step(&step, TempDir::new().unwrap().path(), &host).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("verification (where git)"));
    assert!(msg.contains("exit code 1"));
    assert!(msg.contains("simulated failure"));
}

#[test]
fn test_launch_error_surfaces_as_host_error() {
    let host = FakeHost::new().refuse_commands_matching("setup.exe");
    let work = TempDir::new().unwrap();
    let step = Step::Exe {
        file: "setup.exe".into(),
        args: String::new(),
    };

    let err = execute_step(&step, work.path(), &host).unwrap_err();
    assert!(err.to_string().contains("cannot launch"));
}
