//! setupforge library
//!
//! Core of the unattended deployment engine: configuration resolution
//! with a remote/embedded two-tier source, active-module validation,
//! the ordered module/step execution engine, and weighted progress
//! reporting. The presentation layer is an event sink; the OS surface is
//! an injected host capability.

pub mod bundle;
pub mod catalog;
pub mod cli;
pub mod engine;
pub mod error;
pub mod executor;
pub mod extract;
pub mod host;
pub mod logging;
pub mod manifest;
pub mod progress;
pub mod resolver;

// Re-export main types for convenience
pub use bundle::{Bundle, BundleEntry, DirBundle};
pub use catalog::{ModuleEntry, SetupConfig};
pub use engine::{Engine, Event, EventSink, NullSink};
pub use error::{Result, SetupError};
pub use host::fake::FakeHost;
pub use host::system::SystemHost;
pub use host::{HostOps, ProcessOutput, RegistryRoot, ServiceVerb};
pub use manifest::{Command, Module, ModuleState, ModuleStatus, Order, Step};
pub use progress::{ProgressCalculator, ProgressInfo};
pub use resolver::{Fetcher, FetchResponse, HttpFetcher, Provenance};
