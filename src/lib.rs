//! Herakles JVM Top Library
//!
//! Monitoring engine behind the `herakles-jvmtop` console tool. It discovers
//! managed runtime instances, keeps one management connection per instance,
//! batches and memoizes attribute reads per poll cycle, derives CPU and GC
//! load from cumulative counters and ranks instances and threads for display.
//!
//! The transport is abstract: anything implementing [`ConnectionProvider`]
//! and [`DiscoveryProvider`] can feed the engine. The crate ships a scenario
//! replay backend ([`ScenarioBackend`]) that serves both roles.
//!
//! # Usage
//!
//! ```rust
//! use herakles_jvmtop::{Monitor, MonitorOptions, Scenario, ScenarioBackend};
//!
//! let scenario = Scenario::from_yaml("instances: [{ pid: 4711, display_name: com.example.App }]")
//!     .unwrap();
//! let backend = ScenarioBackend::new(scenario);
//!
//! let mut monitor = Monitor::new(
//!     Box::new(backend.clone()),
//!     Box::new(backend.clone()),
//!     MonitorOptions::default(),
//! );
//!
//! for row in monitor.cycle().unwrap() {
//!     println!("{} {} {}", row.id, row.display_name, row.state);
//! }
//! backend.tick();
//! ```

pub mod beans;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod ranking;
pub mod registry;
pub mod scenario;
pub mod session;
pub mod snapshot;
pub mod state;
pub mod version;

// Re-export main types for convenience
pub use connection::{AttributeSource, ConnectionProvider, Endpoint, ManagementConnection};
pub use discovery::{DiscoveryAdapter, DiscoveryProvider, InstanceId, VmDescriptor};
pub use error::{ConnectionError, MonitorError};
pub use metrics::{calc_load, InstanceRow, MetricsSnapshot, TrackedVm};
pub use monitor::{DetailCycle, DetailMonitor, DetailReport, Monitor, MonitorOptions, PublishedRows};
pub use ranking::{rank_threads, SortOrder, ThreadRanking, ThreadReport, ThreadRow};
pub use registry::SessionRegistry;
pub use scenario::{Scenario, ScenarioBackend};
pub use state::{ConnectionState, SessionEvent, MAX_UPDATE_ERRORS};
