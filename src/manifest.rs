//! Module manifest data model and loaders
//!
//! The bundle carries an order list (`order.json`) plus one command
//! descriptor per module folder (`<folder>/command.json`). This module
//! replaces stringly-typed step dispatch with a closed tagged enum:
//! an unknown step type fails at parse time and every dispatch site is
//! an exhaustive match.

use crate::bundle::Bundle;
use crate::error::{Result, SetupError};
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};
use tracing::debug;

/// Install order: the sequence of module folder identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub order: Vec<String>,
}

/// One typed OS-level action within a module's install sequence.
///
/// The `type` discriminator in `command.json` selects the variant; each
/// variant carries only the fields relevant to its action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[derive(IntoStaticStr)]
#[serde(tag = "type", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Step {
    /// Launch a bundled executable with whitespace-separated arguments.
    Exe {
        file: String,
        #[serde(default)]
        args: String,
    },
    /// Install a bundled MSI package via the system installer service.
    Msi {
        file: String,
        #[serde(default)]
        args: String,
    },
    /// Run an inline PowerShell command string.
    Powershell { command: String },
    /// Run a bundled PowerShell script file.
    PowershellScript { file: String },
    /// Install a named PowerShell module machine-wide, or run a
    /// caller-supplied command instead when one is given.
    PowershellModule {
        #[serde(default)]
        value: String,
        #[serde(default)]
        command: String,
    },
    /// Run a bundled batch file via the command processor.
    Batch { file: String },
    /// Append or prepend a value to the persistent machine PATH.
    EnvPath {
        value: String,
        #[serde(default)]
        action: String,
    },
    /// Write a named persistent machine environment variable.
    EnvSet { variable: String, value: String },
    /// Append a content block to a shell profile file, once.
    ShellConfig { target: String, content: String },
    /// Set a named string value under a root-hive-prefixed registry key.
    Registry {
        key: String,
        variable: String,
        value: String,
    },
    /// Copy a bundled file to an expanded destination path.
    Copy { file: String, dest: String },
    /// Start, stop, or restart a named system service.
    Service { action: String, value: String },
    /// Run an arbitrary shell command and require a success exit.
    Verify { command: String },
}

impl Step {
    /// Discriminator string as it appears in the manifest.
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}

/// Per-module install descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub weight: u32,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Lifecycle state of a module during a run. Transitions are one-way:
/// pending → installing → completed | error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ModuleState {
    #[default]
    Pending,
    Installing,
    Completed,
    Error,
}

/// Runtime module entity: folder identity plus descriptor plus mutable
/// state. Mutated only by the engine inside its own run loop.
#[derive(Debug, Clone)]
pub struct Module {
    pub folder_name: String,
    pub command: Command,
    pub state: ModuleState,
    pub error: Option<String>,
}

impl Module {
    /// Snapshot for the presentation boundary.
    pub fn to_status(&self) -> ModuleStatus {
        ModuleStatus {
            folder_name: self.folder_name.clone(),
            name: self.command.name.clone(),
            description: self.command.description.clone(),
            weight: self.command.weight,
            status: self.state,
            error: self.error.clone(),
        }
    }
}

/// Serializable per-module status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStatus {
    pub folder_name: String,
    pub name: String,
    pub description: String,
    pub weight: u32,
    pub status: ModuleState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Read and parse the bundle's order list.
pub fn load_order(bundle: &dyn Bundle) -> Result<Order> {
    let data = bundle
        .read("order.json")
        .map_err(|e| SetupError::manifest(format!("cannot read order.json: {}", e)))?;
    serde_json::from_slice(&data)
        .map_err(|e| SetupError::manifest(format!("cannot parse order.json: {}", e)))
}

/// Build the ordered runtime module list for the active module set.
///
/// Folders in the order list that are not active are skipped before their
/// descriptor is read; a missing or malformed `command.json` for any
/// active folder is fatal, before any step executes.
pub fn load_modules(
    bundle: &dyn Bundle,
    order: &Order,
    active: &[String],
) -> Result<Vec<Module>> {
    let mut modules = Vec::with_capacity(order.order.len());

    for folder in &order.order {
        if !active.iter().any(|name| name == folder) {
            debug!("module {} not in active set, skipping", folder);
            continue;
        }

        let cmd_path = format!("{}/command.json", folder);
        let data = bundle
            .read(&cmd_path)
            .map_err(|e| SetupError::manifest(format!("cannot read {}: {}", cmd_path, e)))?;
        let command: Command = serde_json::from_slice(&data)
            .map_err(|e| SetupError::manifest(format!("cannot parse {}: {}", cmd_path, e)))?;

        modules.push(Module {
            folder_name: folder.clone(),
            command,
            state: ModuleState::Pending,
            error: None,
        });
    }

    Ok(modules)
}

/// Sum of all module weights.
pub fn total_weight(modules: &[Module]) -> u64 {
    modules.iter().map(|m| m.command.weight as u64).sum()
}
