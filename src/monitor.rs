//! Poll-cycle drivers.
//!
//! `Monitor` tracks every discovered instance for the overview; `DetailMonitor`
//! follows one instance and adds the thread table. Both publish their latest
//! rows into a shared handle at the end of each cycle so a shutdown hook can
//! print a final reading.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use crate::beans::ThreadingBean;
use crate::connection::ConnectionProvider;
use crate::discovery::{DiscoveryAdapter, DiscoveryProvider, InstanceId, VmDescriptor};
use crate::error::MonitorError;
use crate::metrics::{InstanceRow, TrackedVm};
use crate::ranking::{SortOrder, ThreadReport, ThreadTracker};
use crate::registry::SessionRegistry;
use crate::state::ConnectionState;

/// Rows of the most recent completed cycle.
pub type PublishedRows = Arc<Mutex<Vec<InstanceRow>>>;

pub fn read_published(rows: &PublishedRows) -> Vec<InstanceRow> {
    rows.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

fn publish(handle: &PublishedRows, rows: Vec<InstanceRow>) {
    *handle.lock().unwrap_or_else(PoisonError::into_inner) = rows;
}

#[derive(Debug, Clone, Copy)]
pub struct MonitorOptions {
    pub sort_order: SortOrder,
    /// Scan for new instances every N cycles.
    pub scan_interval: u32,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            sort_order: SortOrder::Cpu,
            scan_interval: 1,
        }
    }
}

/// Overview over all discovered instances.
pub struct Monitor {
    discovery: Box<dyn DiscoveryProvider>,
    provider: Box<dyn ConnectionProvider>,
    adapter: DiscoveryAdapter,
    registry: SessionRegistry,
    tracked: Vec<TrackedVm>,
    sort_order: SortOrder,
    published: PublishedRows,
}

impl Monitor {
    pub fn new(
        discovery: Box<dyn DiscoveryProvider>,
        provider: Box<dyn ConnectionProvider>,
        options: MonitorOptions,
    ) -> Self {
        Self {
            discovery,
            provider,
            adapter: DiscoveryAdapter::new(options.scan_interval),
            registry: SessionRegistry::new(),
            tracked: Vec::new(),
            sort_order: options.sort_order,
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle to the rows published at the end of each cycle.
    pub fn published(&self) -> PublishedRows {
        Arc::clone(&self.published)
    }

    pub fn tracked(&self) -> &[TrackedVm] {
        &self.tracked
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Runs one poll cycle and returns the sorted rows.
    ///
    /// Per-instance failures end up in that instance's state; only a failing
    /// discovery provider aborts the cycle.
    pub fn cycle(&mut self) -> Result<Vec<InstanceRow>, MonitorError> {
        let added = self.adapter.poll(self.discovery.as_mut())?;
        for descriptor in added {
            self.track(descriptor);
        }

        for vm in &mut self.tracked {
            if let Err(e) = vm.update() {
                debug!("{}", e);
            }
        }

        self.sort_order.sort(&mut self.tracked);
        let rows: Vec<InstanceRow> = self.tracked.iter().map(TrackedVm::row).collect();
        publish(&self.published, rows.clone());
        Ok(rows)
    }

    fn track(&mut self, descriptor: VmDescriptor) {
        if self.tracked.iter().any(|vm| vm.id() == descriptor.id) {
            debug!("Instance {} reappeared, keeping its session", descriptor.id);
            return;
        }
        let vm = TrackedVm::attach(descriptor, &mut self.registry, self.provider.as_ref());
        info!("Tracking instance {} ({})", vm.id(), vm.state());
        self.tracked.push(vm);
    }

    /// Closes all sessions.
    pub fn shutdown(&mut self) {
        self.registry.close_all();
    }
}

/// Everything the single-instance view shows.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailReport {
    pub row: InstanceRow,
    /// First word of the launch command.
    pub main_class: Option<String>,
    pub arguments: Vec<String>,
    pub input_arguments: Vec<String>,
    pub vendor: Option<String>,
    pub vm_name: Option<String>,
    pub java_version: Option<String>,
    pub peak_thread_count: i64,
    pub total_started_thread_count: i64,
    /// Empty unless threads were requested.
    pub threads: ThreadReport,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetailCycle {
    Report(Box<DetailReport>),
    /// Attached, but this cycle's reads failed.
    FetchFailed,
    /// Never attached or detached for good.
    NotAttached,
}

/// Follows a single instance.
pub struct DetailMonitor {
    registry: SessionRegistry,
    vm: TrackedVm,
    tracker: ThreadTracker,
    thread_limit: Option<usize>,
    with_threads: bool,
    published: PublishedRows,
}

impl DetailMonitor {
    /// Looks up `id` through discovery and attaches to it. An instance that
    /// discovery does not list is treated as not attachable.
    pub fn open(
        id: InstanceId,
        discovery: &mut dyn DiscoveryProvider,
        provider: &dyn ConnectionProvider,
        thread_limit: Option<usize>,
        with_threads: bool,
    ) -> Result<Self, MonitorError> {
        let descriptor = discovery
            .list_visible()?
            .into_iter()
            .find(|vm| vm.id == id)
            .unwrap_or_else(|| {
                debug!("Instance {} is not visible", id);
                VmDescriptor {
                    id,
                    display_name: String::new(),
                    attachable: false,
                    endpoint: crate::connection::Endpoint::Local { pid: id.0 },
                }
            });

        let mut registry = SessionRegistry::new();
        let vm = TrackedVm::attach(descriptor, &mut registry, provider);
        Ok(Self {
            registry,
            vm,
            tracker: ThreadTracker::new(),
            thread_limit,
            with_threads,
            published: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn published(&self) -> PublishedRows {
        Arc::clone(&self.published)
    }

    pub fn vm(&self) -> &TrackedVm {
        &self.vm
    }

    pub fn cycle(&mut self) -> DetailCycle {
        if let Err(e) = self.vm.update() {
            debug!("{}", e);
        }
        publish(&self.published, vec![self.vm.row()]);

        match self.vm.state() {
            ConnectionState::Attached => {}
            ConnectionState::AttachedUpdateError => return DetailCycle::FetchFailed,
            _ => return DetailCycle::NotAttached,
        }

        let metrics = self.vm.metrics().clone();
        let tracker = &mut self.tracker;
        let limit = self.thread_limit;
        let with_threads = self.with_threads;
        let counters = self.vm.with_source(|source| {
            let peak = source.peak_thread_count()?;
            let started = source.total_started_thread_count()?;
            let threads = if with_threads {
                tracker.sample(
                    source,
                    limit,
                    metrics.delta_uptime_ms,
                    metrics.process_cpu_time_ns,
                )?
            } else {
                ThreadReport::default()
            };
            Ok((peak, started, threads))
        });

        let (peak_thread_count, total_started_thread_count, threads) = match counters {
            Some(Ok(counters)) => counters,
            Some(Err(e)) => {
                debug!("Instance {}: thread telemetry failed: {}", self.vm.id(), e);
                return DetailCycle::FetchFailed;
            }
            None => return DetailCycle::NotAttached,
        };

        let properties = self
            .vm
            .runtime()
            .map(|r| r.system_properties.clone())
            .unwrap_or_default();
        let (main_class, arguments) = split_command(properties.get("sun.java.command"));

        DetailCycle::Report(Box::new(DetailReport {
            row: self.vm.row(),
            main_class,
            arguments,
            input_arguments: self
                .vm
                .runtime()
                .map(|r| r.input_arguments.clone())
                .unwrap_or_default(),
            vendor: property(&properties, "java.vendor"),
            vm_name: property(&properties, "java.vm.name"),
            java_version: property(&properties, "java.version"),
            peak_thread_count,
            total_started_thread_count,
            threads,
        }))
    }

    pub fn shutdown(&mut self) {
        self.registry.close_all();
    }
}

fn property(properties: &BTreeMap<String, String>, key: &str) -> Option<String> {
    properties.get(key).cloned()
}

fn split_command(command: Option<&String>) -> (Option<String>, Vec<String>) {
    let Some(command) = command else {
        return (None, Vec::new());
    };
    let mut words = command.split(' ');
    let main_class = words.next().map(str::to_string);
    (main_class, words.map(str::to_string).collect())
}
