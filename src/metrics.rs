//! Metrics engine: per-instance counters, derived loads and the update cycle.
//!
//! CPU and GC load are derived from cumulative counters. Every cycle keeps
//! the current raw values as the baseline for the next one; loads are only
//! recomputed when a usable baseline exists.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::beans::{
    ClassLoadingBean, GarbageCollectorBeans, MemoryBean, OperatingSystemBean, RuntimeBean,
    ThreadingBean,
};
use crate::connection::{ConnectionProvider, MemoryUsage};
use crate::discovery::{InstanceId, VmDescriptor};
use crate::error::{ConnectionError, MonitorError};
use crate::registry::SessionRegistry;
use crate::session::{lock_session, CachedConnection, SharedSession};
use crate::state::{ConnectionState, SessionEvent};
use crate::version;

/// Upper bound applied to a load ratio (before any percent scaling).
pub const MAX_LOAD: f64 = 99.0;

const NANOS_PER_MILLI: i64 = 1_000_000;

/// Ratio of busy time to available time across all processors.
///
/// Returns 0 when nothing was busy or no time elapsed, and never more than
/// `MAX_LOAD`.
pub fn calc_load(elapsed: f64, busy: f64, processors: i64) -> f64 {
    if busy <= 0.0 || elapsed == 0.0 {
        return 0.0;
    }
    MAX_LOAD.min(busy / (elapsed * processors as f64))
}

/// Raw cumulative counters of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    pub uptime_ms: i64,
    pub cpu_time_ns: i64,
    pub gc_time_ms: i64,
}

/// Latest counters and derived rates of one instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_ms: i64,
    pub process_cpu_time_ns: i64,
    pub gc_time_ms: i64,
    pub gc_count: i64,
    pub heap: MemoryUsage,
    pub non_heap: MemoryUsage,
    pub loaded_class_count: i64,
    pub thread_count: i64,
    pub deadlocks_detected: bool,
    pub available_processors: i64,

    pub prev_uptime_ms: i64,
    pub prev_cpu_time_ns: i64,
    pub prev_gc_time_ms: i64,

    pub delta_uptime_ms: i64,
    pub delta_cpu_time_ms: i64,
    pub delta_gc_time_ms: i64,

    pub cpu_load: f64,
    pub gc_load: f64,
    /// Failed update cycles over the session's lifetime.
    pub update_error_count: u32,
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self {
            uptime_ms: 0,
            process_cpu_time_ns: 0,
            gc_time_ms: 0,
            gc_count: 0,
            heap: MemoryUsage::default(),
            non_heap: MemoryUsage::default(),
            loaded_class_count: 0,
            thread_count: 0,
            deadlocks_detected: false,
            available_processors: 1,
            prev_uptime_ms: -1,
            prev_cpu_time_ns: -1,
            prev_gc_time_ms: 0,
            delta_uptime_ms: 0,
            delta_cpu_time_ms: 0,
            delta_gc_time_ms: 0,
            cpu_load: 0.0,
            gc_load: 0.0,
            update_error_count: 0,
        }
    }
}

impl MetricsSnapshot {
    /// Folds a new sample into the snapshot.
    ///
    /// Deltas and loads are recomputed only if the previous uptime and CPU
    /// time are positive and the current GC time is positive. The baseline is
    /// replaced either way.
    pub fn apply_sample(&mut self, sample: RawSample, processors: i64) {
        self.available_processors = processors;
        self.uptime_ms = sample.uptime_ms;
        self.process_cpu_time_ns = sample.cpu_time_ns;
        self.gc_time_ms = sample.gc_time_ms;

        if self.prev_uptime_ms > 0 && self.prev_cpu_time_ns > 0 && sample.gc_time_ms > 0 {
            self.delta_uptime_ms = sample.uptime_ms - self.prev_uptime_ms;
            self.delta_cpu_time_ms = (sample.cpu_time_ns - self.prev_cpu_time_ns) / NANOS_PER_MILLI;
            self.delta_gc_time_ms = sample.gc_time_ms - self.prev_gc_time_ms;
            self.gc_load = calc_load(
                self.delta_cpu_time_ms as f64,
                self.delta_gc_time_ms as f64,
                processors,
            );
            self.cpu_load = calc_load(
                self.delta_uptime_ms as f64,
                self.delta_cpu_time_ms as f64,
                processors,
            );
        }

        self.prev_uptime_ms = sample.uptime_ms;
        self.prev_cpu_time_ns = sample.cpu_time_ns;
        self.prev_gc_time_ms = sample.gc_time_ms;
    }
}

/// Values that do not change while the runtime lives. Fetched once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeInfo {
    pub system_properties: BTreeMap<String, String>,
    pub input_arguments: Vec<String>,
    pub vm_version: String,
    pub os_user: Option<String>,
    pub cpu_in_100ns: bool,
}

impl RuntimeInfo {
    pub fn fetch(source: &mut CachedConnection) -> Result<Self, ConnectionError> {
        let system_properties = source.system_properties()?;
        let input_arguments = source.input_arguments()?;
        Ok(Self {
            vm_version: version::short_version_of(&system_properties),
            os_user: system_properties.get("user.name").cloned(),
            cpu_in_100ns: version::reports_cpu_in_100ns(&system_properties),
            input_arguments,
            system_properties,
        })
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.system_properties.get(key).map(String::as_str)
    }
}

/// Everything a renderer needs for one instance line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceRow {
    pub id: InstanceId,
    pub display_name: String,
    pub state: ConnectionState,
    pub metrics: MetricsSnapshot,
    pub vm_version: Option<String>,
    pub os_user: Option<String>,
}

/// A monitored instance: its session plus the metrics derived from it.
pub struct TrackedVm {
    descriptor: VmDescriptor,
    session: SharedSession,
    metrics: MetricsSnapshot,
    runtime: Option<RuntimeInfo>,
}

impl TrackedVm {
    /// Starts tracking a newly discovered instance.
    ///
    /// Non-attachable instances are marked `ErrorDuringAttach` without any
    /// attempt. A successful attach is followed by a first update so the
    /// baseline exists before the first displayed cycle.
    pub fn attach(
        descriptor: VmDescriptor,
        registry: &mut SessionRegistry,
        provider: &dyn ConnectionProvider,
    ) -> Self {
        let session = registry.attach(descriptor.id, &descriptor.endpoint);
        {
            let mut guard = lock_session(&session);
            if !descriptor.attachable {
                debug!("Instance {} is not attachable", descriptor.id);
                guard.mark_not_attachable();
            } else if let Err(e) = guard.connect(provider) {
                debug!("{}", e);
            }
        }

        let mut vm = Self {
            descriptor,
            session,
            metrics: MetricsSnapshot::default(),
            runtime: None,
        };
        if vm.state() == ConnectionState::Attached {
            if let Err(e) = vm.update() {
                debug!("{}", e);
            }
        }
        vm
    }

    pub fn id(&self) -> InstanceId {
        self.descriptor.id
    }

    pub fn descriptor(&self) -> &VmDescriptor {
        &self.descriptor
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn state(&self) -> ConnectionState {
        lock_session(&self.session).state()
    }

    pub fn metrics(&self) -> &MetricsSnapshot {
        &self.metrics
    }

    pub fn runtime(&self) -> Option<&RuntimeInfo> {
        self.runtime.as_ref()
    }

    /// Runs one update cycle.
    ///
    /// Terminal states return immediately without touching the connection.
    /// A failed cycle is counted; past `MAX_UPDATE_ERRORS` failures the
    /// session is detached. A single unreadable attribute is reported as
    /// `PartialAttributeFailure` but counts like any other failure.
    pub fn update(&mut self) -> Result<(), MonitorError> {
        let id = self.descriptor.id;
        let mut session = lock_session(&self.session);
        if !session.state().is_attached() {
            return Ok(());
        }
        if !session.is_live() {
            return Err(MonitorError::PermanentDetach { id });
        }

        session.flush();
        let lock_usage = session.supports_lock_usage();
        let result = match session.source() {
            Some(source) => sample(&mut self.metrics, &mut self.runtime, source, lock_usage),
            None => Err(ConnectionError::Closed),
        };

        match result {
            Ok(()) => {
                session.apply(SessionEvent::UpdateSucceeded);
                Ok(())
            }
            Err(source) => {
                self.metrics.update_error_count += 1;
                let count = self.metrics.update_error_count;
                let state = session.apply(SessionEvent::UpdateFailed { error_count: count });
                debug!("Instance {}: error during update: {}", id, source);
                if state == ConnectionState::Detached {
                    return Err(MonitorError::PermanentDetach { id });
                }
                match source {
                    ConnectionError::Attribute {
                        object, attribute, ..
                    } => Err(MonitorError::PartialAttributeFailure { object, attribute }),
                    source => Err(MonitorError::TransientUpdateFailure { id, count, source }),
                }
            }
        }
    }

    /// Runs `f` against the cached connection of an attached instance.
    pub fn with_source<R>(
        &self,
        f: impl FnOnce(&mut CachedConnection) -> Result<R, ConnectionError>,
    ) -> Option<Result<R, ConnectionError>> {
        let mut session = lock_session(&self.session);
        if !session.state().is_attached() {
            return None;
        }
        session.source().map(f)
    }

    pub fn row(&self) -> InstanceRow {
        InstanceRow {
            id: self.descriptor.id,
            display_name: self.descriptor.display_name.clone(),
            state: self.state(),
            metrics: self.metrics.clone(),
            vm_version: self.runtime.as_ref().map(|r| r.vm_version.clone()),
            os_user: self.runtime.as_ref().and_then(|r| r.os_user.clone()),
        }
    }
}

/// Reads all counters of one cycle into `metrics`.
fn sample(
    metrics: &mut MetricsSnapshot,
    runtime: &mut Option<RuntimeInfo>,
    source: &mut CachedConnection,
    lock_usage: bool,
) -> Result<(), ConnectionError> {
    let cpu_in_100ns = match runtime {
        Some(info) => info.cpu_in_100ns,
        None => {
            let info = RuntimeInfo::fetch(source)?;
            let scaled = info.cpu_in_100ns;
            *runtime = Some(info);
            scaled
        }
    };

    let processors = source.available_processors()?;
    let uptime_ms = source.uptime()?;
    let mut cpu_time_ns = source.process_cpu_time()?;
    if cpu_in_100ns {
        cpu_time_ns *= 100;
    }

    let mut gc_time_ms = 0;
    let mut gc_count = 0;
    for collector in source.garbage_collectors()? {
        gc_time_ms += source.collection_time(&collector)?;
        gc_count += source.collection_count(&collector)?;
    }

    let heap = source.heap_memory_usage()?;
    let non_heap = source.non_heap_memory_usage()?;

    metrics.apply_sample(
        RawSample {
            uptime_ms,
            cpu_time_ns,
            gc_time_ms,
        },
        processors,
    );
    metrics.gc_count = gc_count;
    metrics.heap = heap;
    metrics.non_heap = non_heap;
    metrics.loaded_class_count = source.total_loaded_class_count()?;
    metrics.thread_count = source.thread_count()?;

    let synchronizer_deadlock = if lock_usage {
        source.find_deadlocked_threads()?
    } else {
        None
    };
    let monitor_deadlock = source.find_monitor_deadlocked_threads()?;
    metrics.deadlocks_detected = [synchronizer_deadlock, monitor_deadlock]
        .iter()
        .any(|ids| ids.as_ref().is_some_and(|ids| !ids.is_empty()));

    Ok(())
}
