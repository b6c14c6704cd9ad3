//! Active-module catalog
//!
//! Transforms the persisted setup configuration into the ordered list of
//! active module names the engine will install. This list only gates
//! *whether* a module installs; the order/command manifest (see
//! [`crate::manifest`]) defines *how* it installs — the two are never
//! conflated.
//!
//! Validation failure of a remotely fetched configuration triggers one
//! retry against the embedded copy. That is the system's sole
//! consistency-recovery mechanism beyond the byte-level fallback already
//! applied by the resolver.

use crate::bundle::Bundle;
use crate::error::{Result, SetupError};
use crate::resolver::{self, Provenance, SETUP_FILE_NAME};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Persisted setup configuration: the structured format written to the
/// Working Root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupConfig {
    pub modules: Option<Vec<ModuleEntry>>,
}

/// One module entry. An absent activation flag means active; an explicit
/// `false` deactivates the entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl ModuleEntry {
    fn is_active(&self) -> bool {
        self.active.unwrap_or(true)
    }
}

/// Parse and validate a setup configuration payload, returning the
/// ordered active module names.
pub fn parse_active_modules(data: &[u8]) -> Result<Vec<String>> {
    let config: SetupConfig = serde_json::from_slice(data)
        .map_err(|e| SetupError::validation(format!("cannot parse setup configuration: {}", e)))?;

    let entries = match config.modules {
        Some(entries) if !entries.is_empty() => entries,
        Some(_) => {
            return Err(SetupError::validation(
                "setup configuration declares no modules",
            ))
        }
        None => {
            return Err(SetupError::validation(
                "setup configuration is missing the modules property",
            ))
        }
    };

    let mut active = Vec::with_capacity(entries.len());
    for entry in &entries {
        let name = entry.name.trim();
        if name.is_empty() {
            return Err(SetupError::validation("module entry has a blank name"));
        }
        if !entry.is_active() {
            debug!("module {} is inactive, skipping", name);
            continue;
        }
        if active.iter().any(|existing: &String| existing == name) {
            return Err(SetupError::validation(format!(
                "duplicate module name: {}",
                name
            )));
        }
        active.push(name.to_string());
    }

    if active.is_empty() {
        return Err(SetupError::validation(
            "no active module in setup configuration",
        ));
    }

    Ok(active)
}

/// Read and validate the setup configuration persisted in the Working
/// Root.
pub fn load_active_modules(root: &Path) -> Result<Vec<String>> {
    let path = root.join(SETUP_FILE_NAME);
    let data = fs::read(&path).map_err(|e| {
        SetupError::config(format!("cannot read {}: {}", path.display(), e))
    })?;
    parse_active_modules(&data)
}

/// Validate the working copy, recovering once via the embedded
/// configuration when the failing copy came from a remote fetch.
///
/// When provenance is already [`Provenance::Embedded`] there is no second
/// fallback and the failure propagates unchanged.
pub fn resolve_active_modules(
    bundle: &dyn Bundle,
    root: &Path,
    provenance: Provenance,
) -> Result<Vec<String>> {
    match load_active_modules(root) {
        Ok(active) => {
            info!("{} active modules validated", active.len());
            Ok(active)
        }
        Err(e) if provenance == Provenance::Remote => {
            warn!(
                "remote setup configuration failed validation ({}), retrying with embedded copy",
                e
            );
            resolver::restore_embedded(bundle, root)?;
            let active = load_active_modules(root)?;
            info!(
                "{} active modules validated from embedded fallback",
                active.len()
            );
            Ok(active)
        }
        Err(e) => Err(e),
    }
}
