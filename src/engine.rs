//! Deployment engine
//!
//! Drives the install sequence: for each active module in order —
//! extract, run steps in order, cleanup — while aggregating events for
//! the presentation layer. Module state transitions are one-directional
//! (pending → installing → completed | error) with no retry; the first
//! step failure aborts the entire run. Only one run may be active on an
//! engine at a time.

use crate::bundle::Bundle;
use crate::error::{Result, SetupError};
use crate::executor::execute_step;
use crate::extract::{cleanup_module, extract_module};
use crate::host::HostOps;
use crate::manifest::{self, Command, Module, ModuleState, ModuleStatus, Order};
use crate::progress::{ProgressCalculator, ProgressInfo};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Named event delivered to the presentation boundary.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum Event {
    /// Human-readable label of the action about to run.
    Step(String),
    /// Weighted progress record.
    Progress(ProgressInfo),
    /// Status snapshot of every module.
    Modules(Vec<ModuleStatus>),
    /// All modules completed.
    Complete,
    /// The run failed and will not continue.
    Fatal(String),
}

/// Receiver for engine events. Implementations must not block: the
/// engine emits from its single driving thread.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Sink that drops every event (headless/validation use).
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}

// Resets the run guard on every exit path.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The run driver: owns the module list and its state for one process
/// lifetime.
pub struct Engine {
    bundle: Arc<dyn Bundle>,
    order: Order,
    modules: Mutex<Vec<Module>>,
    progress: ProgressCalculator,
    host: Arc<dyn HostOps>,
    sink: Arc<dyn EventSink>,
    running: AtomicBool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("order", &self.order)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Load the order list and the command descriptor of every active
    /// module. Fails before any step executes when a descriptor is
    /// missing or malformed.
    pub fn new(
        bundle: Arc<dyn Bundle>,
        host: Arc<dyn HostOps>,
        sink: Arc<dyn EventSink>,
        active: &[String],
    ) -> Result<Self> {
        let order = manifest::load_order(bundle.as_ref())?;
        let modules = manifest::load_modules(bundle.as_ref(), &order, active)?;
        let progress = ProgressCalculator::new(&modules);

        Ok(Self {
            bundle,
            order,
            modules: Mutex::new(modules),
            progress,
            host,
            sink,
            running: AtomicBool::new(false),
        })
    }

    pub fn order(&self) -> &Order {
        &self.order
    }

    /// Status snapshots of all modules, in install order.
    pub fn module_statuses(&self) -> Vec<ModuleStatus> {
        self.modules
            .lock()
            .unwrap()
            .iter()
            .map(Module::to_status)
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Execute the full install sequence. A second call while a run is
    /// active is rejected immediately, not queued.
    pub fn run(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SetupError::engine("installation already in progress"));
        }
        let _guard = RunGuard(&self.running);

        let count = self.modules.lock().unwrap().len();
        for index in 0..count {
            self.install_module(index)?;
        }

        info!("all modules completed");
        self.emit(Event::Complete);
        Ok(())
    }

    /// Install the module at `index`: extract, run its steps in order,
    /// clean up. Any failure marks the module, cleans up, and aborts the
    /// run — later modules are never attempted.
    fn install_module(&self, index: usize) -> Result<()> {
        let (folder_name, command) = {
            let mut modules = self.modules.lock().unwrap();
            let module = &mut modules[index];
            module.state = ModuleState::Installing;
            (module.folder_name.clone(), module.command.clone())
        };
        let total_steps = command.steps.len();

        info!("installing module {} ({})", folder_name, command.name);
        self.emit_progress(index, 0, total_steps, &command);
        self.emit_statuses();

        let work_dir = match extract_module(self.bundle.as_ref(), &folder_name) {
            Ok(dir) => dir,
            Err(e) => {
                error!("extraction of module {} failed: {}", folder_name, e);
                self.mark_error(index, e.to_string());
                self.emit_statuses();
                return Err(SetupError::extract(format!(
                    "module {}: {}",
                    folder_name, e
                )));
            }
        };

        for (step_index, step) in command.steps.iter().enumerate() {
            self.emit_progress(index, step_index, total_steps, &command);
            self.emit(Event::Step(format!("{}: {}", command.name, step.kind())));

            if let Err(e) = execute_step(step, &work_dir, self.host.as_ref()) {
                let message = format!("Step {} ({}): {}", step_index + 1, step.kind(), e);
                error!("module {} failed: {}", folder_name, message);
                self.mark_error(index, message);
                self.emit_statuses();
                self.cleanup(&folder_name);
                return Err(SetupError::step(format!(
                    "module {}, step {}: {}",
                    folder_name,
                    step_index + 1,
                    e
                )));
            }
        }

        {
            let mut modules = self.modules.lock().unwrap();
            modules[index].state = ModuleState::Completed;
        }
        self.emit_progress(index, total_steps, total_steps, &command);
        self.emit_statuses();
        self.cleanup(&folder_name);
        info!("module {} completed", folder_name);
        Ok(())
    }

    fn mark_error(&self, index: usize, message: String) {
        let mut modules = self.modules.lock().unwrap();
        modules[index].state = ModuleState::Error;
        modules[index].error = Some(message);
    }

    // Best-effort: a cleanup failure is observable but never run-ending.
    fn cleanup(&self, folder_name: &str) {
        if let Err(e) = cleanup_module(folder_name) {
            warn!("cleanup of module {} failed: {}", folder_name, e);
        }
    }

    fn emit_progress(&self, module_index: usize, step_index: usize, total_steps: usize, command: &Command) {
        let percentage = self.progress.calculate(module_index, step_index, total_steps);
        let current_step = command
            .steps
            .get(step_index)
            .map(|s| s.kind().to_string())
            .unwrap_or_default();

        self.emit(Event::Progress(ProgressInfo {
            percentage,
            current_module: command.name.clone(),
            current_step,
            step_index,
            total_steps,
        }));
    }

    fn emit_statuses(&self) {
        self.emit(Event::Modules(self.module_statuses()));
    }

    fn emit(&self, event: Event) {
        self.sink.emit(event);
    }
}
