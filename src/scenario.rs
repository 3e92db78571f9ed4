//! Scenario replay backend.
//!
//! A scenario file describes runtime instances and the counter samples they
//! report, one sample per cycle. The backend serves both as discovery
//! provider and connection provider, so the whole engine runs against it
//! without a live management transport. Call statistics are kept for every
//! request a connection receives.
//!
//! ```yaml
//! instances:
//!   - pid: 4711
//!     display_name: com.example.Shop --port 8080
//!     available_processors: 2
//!     system_properties:
//!       java.runtime.version: 1.8.0_292-b10
//!       java.vendor: Oracle Corporation
//!     samples:
//!       - { uptime_ms: 1000, cpu_time_ns: 1000000000, gc: [{ name: PS Scavenge, time_ms: 10 }] }
//!       - { uptime_ms: 2000, cpu_time_ns: 2000000000, gc: [{ name: PS Scavenge, time_ms: 20 }] }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::connection::{
    self, AttributeMap, AttributeSource, AttributeValue, ConnectionProvider, Endpoint,
    ManagementConnection, MemoryUsage, ObjectName, ThreadInfo,
};
use crate::discovery::{DiscoveryProvider, InstanceId, VmDescriptor};
use crate::error::{ConnectionError, MonitorError, Result};

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Failed to read scenario file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML scenario: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON scenario: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Duplicate instance pid {0}")]
    DuplicatePid(u32),
}

/// How an attach attempt ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectOutcome {
    #[default]
    Ok,
    /// Peer refuses the connection.
    Refused,
    /// Attach fails for any other reason.
    Error,
    /// Connection opens but is dead right away.
    Dead,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcSample {
    pub name: String,
    #[serde(default)]
    pub time_ms: i64,
    #[serde(default)]
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioThread {
    pub id: i64,
    pub name: String,
    #[serde(default = "default_thread_state")]
    pub state: String,
    #[serde(default)]
    pub cpu_time_ns: i64,
    #[serde(default = "default_lock_owner")]
    pub lock_owner_id: i64,
}

fn default_thread_state() -> String {
    "RUNNABLE".to_string()
}

fn default_lock_owner() -> i64 {
    -1
}

/// Counters an instance reports during one cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Sample {
    pub uptime_ms: i64,
    pub cpu_time_ns: i64,
    pub gc: Vec<GcSample>,
    pub heap: MemoryUsage,
    pub non_heap: MemoryUsage,
    pub loaded_classes: i64,
    /// Defaults to the number of listed threads.
    pub thread_count: Option<i64>,
    pub peak_threads: Option<i64>,
    pub total_started_threads: Option<i64>,
    pub threads: Vec<ScenarioThread>,
    pub deadlocked: Option<Vec<i64>>,
    pub monitor_deadlocked: Option<Vec<i64>>,
    /// Every request in this cycle fails.
    pub fail: bool,
    /// The process is gone from this cycle on.
    pub dead: bool,
    /// Attributes whose reads fail individually.
    pub broken_attributes: Vec<String>,
}

impl Sample {
    fn thread_count(&self) -> i64 {
        self.thread_count.unwrap_or(self.threads.len() as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioInstance {
    pub pid: u32,
    #[serde(default)]
    pub display_name: String,
    #[serde(default = "default_true")]
    pub attachable: bool,
    /// Where the instance is reachable; a local pid endpoint if omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Endpoint>,
    #[serde(default)]
    pub connect: ConnectOutcome,
    /// First cycle in which discovery sees the instance.
    #[serde(default)]
    pub appears_at: u64,
    /// First cycle in which the instance is gone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vanishes_at: Option<u64>,
    #[serde(default = "default_processors")]
    pub available_processors: i64,
    #[serde(default)]
    pub system_properties: BTreeMap<String, String>,
    #[serde(default)]
    pub input_arguments: Vec<String>,
    #[serde(default = "default_true")]
    pub thread_cpu_time_supported: bool,
    #[serde(default = "default_true")]
    pub synchronizer_usage_supported: bool,
    /// One sample per cycle starting at `appears_at`; the last one repeats.
    #[serde(default)]
    pub samples: Vec<Sample>,
}

fn default_true() -> bool {
    true
}

fn default_processors() -> i64 {
    1
}

impl ScenarioInstance {
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
            .clone()
            .unwrap_or(Endpoint::Local { pid: self.pid })
    }

    fn is_visible(&self, cycle: u64) -> bool {
        cycle >= self.appears_at && self.vanishes_at.map_or(true, |end| cycle < end)
    }

    fn sample(&self, cycle: u64) -> Sample {
        if self.samples.is_empty() {
            return Sample::default();
        }
        let idx = (cycle.saturating_sub(self.appears_at) as usize).min(self.samples.len() - 1);
        self.samples[idx].clone()
    }

    fn descriptor(&self) -> VmDescriptor {
        VmDescriptor {
            id: InstanceId(self.pid),
            display_name: self.display_name.clone(),
            attachable: self.attachable,
            endpoint: self.endpoint(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Scenario {
    /// Cycle from which discovery itself fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_fails_at: Option<u64>,
    #[serde(default)]
    pub instances: Vec<ScenarioInstance>,
}

impl Scenario {
    /// Loads a scenario; `.json` files are read as JSON, everything else as YAML.
    pub fn from_file(path: &Path) -> std::result::Result<Self, ScenarioError> {
        let content = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let scenario = if is_json {
            Self::from_json(&content)?
        } else {
            Self::from_yaml(&content)?
        };
        info!(
            "Loaded scenario {} with {} instances",
            path.display(),
            scenario.instances.len()
        );
        Ok(scenario)
    }

    pub fn from_yaml(content: &str) -> std::result::Result<Self, ScenarioError> {
        let scenario: Scenario = serde_yaml::from_str(content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn from_json(content: &str) -> std::result::Result<Self, ScenarioError> {
        let scenario: Scenario = serde_json::from_str(content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> std::result::Result<(), ScenarioError> {
        let mut seen = std::collections::BTreeSet::new();
        for instance in &self.instances {
            if !seen.insert(instance.pid) {
                return Err(ScenarioError::DuplicatePid(instance.pid));
            }
        }
        Ok(())
    }
}

/// Requests served by scenario connections.
#[derive(Debug, Default)]
pub struct ScenarioStats {
    pub connects: AtomicUsize,
    pub batched_reads: AtomicUsize,
    pub single_reads: AtomicUsize,
    pub invocations: AtomicUsize,
    pub queries: AtomicUsize,
    pub liveness_checks: AtomicUsize,
}

impl ScenarioStats {
    pub fn batched_reads(&self) -> usize {
        self.batched_reads.load(Ordering::SeqCst)
    }

    pub fn single_reads(&self) -> usize {
        self.single_reads.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Every request a connection received, liveness checks included.
    pub fn total_requests(&self) -> usize {
        self.batched_reads()
            + self.single_reads()
            + self.invocations.load(Ordering::SeqCst)
            + self.queries.load(Ordering::SeqCst)
            + self.liveness_checks.load(Ordering::SeqCst)
    }
}

struct Shared {
    scenario: Scenario,
    cycle: AtomicU64,
    stats: ScenarioStats,
}

/// Replays a `Scenario`. Clones share the same clock and statistics.
#[derive(Clone)]
pub struct ScenarioBackend {
    shared: Arc<Shared>,
}

impl ScenarioBackend {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            shared: Arc::new(Shared {
                scenario,
                cycle: AtomicU64::new(0),
                stats: ScenarioStats::default(),
            }),
        }
    }

    pub fn from_file(path: &Path) -> std::result::Result<Self, ScenarioError> {
        Ok(Self::new(Scenario::from_file(path)?))
    }

    /// Advances every instance to its next sample.
    pub fn tick(&self) {
        let cycle = self.shared.cycle.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Scenario advanced to cycle {}", cycle);
    }

    pub fn cycle(&self) -> u64 {
        self.shared.cycle.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> &ScenarioStats {
        &self.shared.stats
    }

    pub fn scenario(&self) -> &Scenario {
        &self.shared.scenario
    }
}

impl DiscoveryProvider for ScenarioBackend {
    fn list_visible(&mut self) -> std::result::Result<Vec<VmDescriptor>, MonitorError> {
        let cycle = self.cycle();
        if self
            .shared
            .scenario
            .discovery_fails_at
            .is_some_and(|at| cycle >= at)
        {
            return Err(MonitorError::Discovery(format!(
                "instance listing unavailable at cycle {cycle}"
            )));
        }
        Ok(self
            .shared
            .scenario
            .instances
            .iter()
            .filter(|i| i.is_visible(cycle))
            .map(ScenarioInstance::descriptor)
            .collect())
    }
}

impl ConnectionProvider for ScenarioBackend {
    fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn ManagementConnection>> {
        self.shared.stats.connects.fetch_add(1, Ordering::SeqCst);
        let cycle = self.cycle();
        let name = endpoint.connection_name();

        let index = self
            .shared
            .scenario
            .instances
            .iter()
            .position(|i| i.endpoint() == *endpoint && i.is_visible(cycle))
            .ok_or_else(|| ConnectionError::Io(format!("no such process: {name}")))?;

        let alive = match self.shared.scenario.instances[index].connect {
            ConnectOutcome::Ok => true,
            ConnectOutcome::Dead => false,
            ConnectOutcome::Refused => return Err(ConnectionError::Refused(name)),
            ConnectOutcome::Error => {
                return Err(ConnectionError::Io(format!("attach to {name} failed")))
            }
        };

        Ok(Box::new(ScenarioConnection {
            shared: Arc::clone(&self.shared),
            index,
            alive,
            closed: false,
        }))
    }
}

/// Connection to one scenario instance.
pub struct ScenarioConnection {
    shared: Arc<Shared>,
    index: usize,
    alive: bool,
    closed: bool,
}

impl ScenarioConnection {
    fn instance(&self) -> &ScenarioInstance {
        &self.shared.scenario.instances[self.index]
    }

    fn stats(&self) -> &ScenarioStats {
        &self.shared.stats
    }

    /// Current sample, or the error every request fails with this cycle.
    fn current(&self) -> Result<Sample> {
        if self.closed {
            return Err(ConnectionError::Closed);
        }
        let cycle = self.shared.cycle.load(Ordering::SeqCst);
        let instance = self.instance();
        if !instance.is_visible(cycle) {
            return Err(ConnectionError::Io(format!("process {} is gone", instance.pid)));
        }
        let sample = instance.sample(cycle);
        if sample.fail {
            return Err(ConnectionError::Io(format!(
                "request to {} failed",
                instance.pid
            )));
        }
        Ok(sample)
    }

    fn read(&self, sample: &Sample, object: &ObjectName, name: &str) -> Result<AttributeValue> {
        if sample.broken_attributes.iter().any(|b| b == name) {
            return Err(ConnectionError::Attribute {
                object: object.clone(),
                attribute: name.to_string(),
                reason: "read failed".to_string(),
            });
        }

        let instance = self.instance();
        let missing = || ConnectionError::Attribute {
            object: object.clone(),
            attribute: name.to_string(),
            reason: "no such attribute".to_string(),
        };

        let value = match object.as_str() {
            connection::RUNTIME => match name {
                "Uptime" => AttributeValue::Long(sample.uptime_ms),
                "InputArguments" => AttributeValue::TextArray(instance.input_arguments.clone()),
                "SystemProperties" => {
                    AttributeValue::Properties(instance.system_properties.clone())
                }
                _ => return Err(missing()),
            },
            connection::OPERATING_SYSTEM => match name {
                "AvailableProcessors" => AttributeValue::Long(instance.available_processors),
                "ProcessCpuTime" => AttributeValue::Long(sample.cpu_time_ns),
                _ => return Err(missing()),
            },
            connection::MEMORY => match name {
                "HeapMemoryUsage" => AttributeValue::Usage(sample.heap),
                "NonHeapMemoryUsage" => AttributeValue::Usage(sample.non_heap),
                _ => return Err(missing()),
            },
            connection::CLASS_LOADING => match name {
                "TotalLoadedClassCount" => AttributeValue::Long(sample.loaded_classes),
                _ => return Err(missing()),
            },
            connection::THREADING => match name {
                "ThreadCount" => AttributeValue::Long(sample.thread_count()),
                "PeakThreadCount" => {
                    AttributeValue::Long(sample.peak_threads.unwrap_or(sample.thread_count()))
                }
                "TotalStartedThreadCount" => AttributeValue::Long(
                    sample.total_started_threads.unwrap_or(sample.thread_count()),
                ),
                "AllThreadIds" => {
                    AttributeValue::LongArray(sample.threads.iter().map(|t| t.id).collect())
                }
                "ThreadCpuTimeSupported" => {
                    AttributeValue::Bool(instance.thread_cpu_time_supported)
                }
                "SynchronizerUsageSupported" => {
                    AttributeValue::Bool(instance.synchronizer_usage_supported)
                }
                _ => return Err(missing()),
            },
            _ => {
                let collector = gc_name(object)
                    .and_then(|gc| sample.gc.iter().find(|g| g.name == gc))
                    .ok_or_else(|| ConnectionError::InstanceNotFound(object.clone()))?;
                match name {
                    "CollectionTime" => AttributeValue::Long(collector.time_ms),
                    "CollectionCount" => AttributeValue::Long(collector.count),
                    _ => return Err(missing()),
                }
            }
        };
        Ok(value)
    }

    fn registered_names(&self, sample: &Sample) -> Vec<ObjectName> {
        let mut names = vec![
            ObjectName::memory(),
            ObjectName::runtime(),
            ObjectName::threading(),
            ObjectName::class_loading(),
            ObjectName::operating_system(),
        ];
        names.extend(sample.gc.iter().map(|g| ObjectName::garbage_collector(&g.name)));
        names
    }
}

fn gc_name(object: &ObjectName) -> Option<&str> {
    if object.domain() == "java.lang" && object.key_property("type") == Some("GarbageCollector") {
        object.key_property("name")
    } else {
        None
    }
}

impl AttributeSource for ScenarioConnection {
    fn get_attribute(&mut self, object: &ObjectName, name: &str) -> Result<AttributeValue> {
        self.stats().single_reads.fetch_add(1, Ordering::SeqCst);
        let sample = self.current()?;
        self.read(&sample, object, name)
    }

    fn get_attributes(&mut self, object: &ObjectName, names: &[String]) -> Result<AttributeMap> {
        self.stats().batched_reads.fetch_add(1, Ordering::SeqCst);
        let sample = self.current()?;
        let mut values = AttributeMap::new();
        for name in names {
            match self.read(&sample, object, name) {
                Ok(value) => {
                    values.insert(name.clone(), value);
                }
                Err(ConnectionError::InstanceNotFound(o)) => {
                    return Err(ConnectionError::InstanceNotFound(o))
                }
                Err(e) => debug!("Omitting {} from batched read: {}", name, e),
            }
        }
        Ok(values)
    }

    fn query_names(&mut self, pattern: &ObjectName) -> Result<Vec<ObjectName>> {
        self.stats().queries.fetch_add(1, Ordering::SeqCst);
        let sample = self.current()?;
        Ok(self
            .registered_names(&sample)
            .into_iter()
            .filter(|name| pattern.matches(name))
            .collect())
    }

    fn invoke(
        &mut self,
        object: &ObjectName,
        operation: &str,
        params: &[AttributeValue],
    ) -> Result<AttributeValue> {
        self.stats().invocations.fetch_add(1, Ordering::SeqCst);
        let sample = self.current()?;
        if object.as_str() != connection::THREADING {
            return Err(ConnectionError::UnsupportedOperation {
                object: object.clone(),
                operation: operation.to_string(),
            });
        }

        let tid = || match params.first() {
            Some(AttributeValue::Long(tid)) => Ok(*tid),
            _ => Err(ConnectionError::TypeMismatch(format!("{operation} thread id"))),
        };
        let ids = |ids: &Option<Vec<i64>>| match ids {
            Some(ids) => AttributeValue::LongArray(ids.clone()),
            None => AttributeValue::Null,
        };

        match operation {
            "getThreadCpuTime" => {
                let tid = tid()?;
                let cpu = sample
                    .threads
                    .iter()
                    .find(|t| t.id == tid)
                    .map_or(-1, |t| t.cpu_time_ns);
                Ok(AttributeValue::Long(cpu))
            }
            "getThreadInfo" => {
                let tid = tid()?;
                Ok(sample
                    .threads
                    .iter()
                    .find(|t| t.id == tid)
                    .map_or(AttributeValue::Null, |t| {
                        AttributeValue::Thread(ThreadInfo {
                            thread_id: t.id,
                            thread_name: t.name.clone(),
                            thread_state: t.state.clone(),
                            lock_owner_id: t.lock_owner_id,
                        })
                    }))
            }
            "findDeadlockedThreads" => Ok(ids(&sample.deadlocked)),
            "findMonitorDeadlockedThreads" => Ok(ids(&sample.monitor_deadlocked)),
            _ => Err(ConnectionError::UnsupportedOperation {
                object: object.clone(),
                operation: operation.to_string(),
            }),
        }
    }
}

impl ManagementConnection for ScenarioConnection {
    fn is_alive(&mut self) -> bool {
        self.stats().liveness_checks.fetch_add(1, Ordering::SeqCst);
        if self.closed || !self.alive {
            return false;
        }
        let cycle = self.shared.cycle.load(Ordering::SeqCst);
        let instance = self.instance();
        let alive = instance.is_visible(cycle) && !instance.sample(cycle).dead;
        self.alive = alive;
        alive
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beans::{GarbageCollectorBeans, MemoryBean, RuntimeBean, ThreadingBean};

    const SCENARIO: &str = r#"
instances:
  - pid: 100
    display_name: com.example.Shop --port 8080
    available_processors: 2
    samples:
      - uptime_ms: 1000
        cpu_time_ns: 1000000000
        gc: [{ name: PS Scavenge, time_ms: 10, count: 1 }, { name: PS MarkSweep, time_ms: 5, count: 1 }]
        heap: { init: 0, used: 1048576, committed: 2097152, max: -1 }
        threads:
          - { id: 1, name: main, cpu_time_ns: 500 }
          - { id: 2, name: worker, state: BLOCKED, lock_owner_id: 1 }
      - uptime_ms: 2000
        cpu_time_ns: 2000000000
        broken_attributes: [NonHeapMemoryUsage]
  - pid: 200
    connect: refused
    appears_at: 1
  - pid: 300
    vanishes_at: 1
"#;

    fn backend() -> ScenarioBackend {
        ScenarioBackend::new(Scenario::from_yaml(SCENARIO).unwrap())
    }

    fn open(backend: &ScenarioBackend, pid: u32) -> Result<Box<dyn ManagementConnection>> {
        backend.open(&Endpoint::Local { pid })
    }

    // -------------------------------------------------------------------------
    // Tests for discovery
    // -------------------------------------------------------------------------

    #[test]
    fn test_visibility_windows() {
        let mut backend = backend();
        let pids = |b: &mut ScenarioBackend| -> Vec<u32> {
            b.list_visible().unwrap().iter().map(|d| d.id.0).collect()
        };
        assert_eq!(pids(&mut backend), vec![100, 300]);
        backend.tick();
        assert_eq!(pids(&mut backend), vec![100, 200]);
    }

    #[test]
    fn test_discovery_failure() {
        let mut scenario = Scenario::from_yaml(SCENARIO).unwrap();
        scenario.discovery_fails_at = Some(1);
        let mut backend = ScenarioBackend::new(scenario);
        assert!(backend.list_visible().is_ok());
        backend.tick();
        assert!(backend.list_visible().unwrap_err().is_fatal());
    }

    #[test]
    fn test_duplicate_pid_rejected() {
        let yaml = "instances: [{ pid: 1 }, { pid: 1 }]";
        assert!(matches!(
            Scenario::from_yaml(yaml),
            Err(ScenarioError::DuplicatePid(1))
        ));
    }

    // -------------------------------------------------------------------------
    // Tests for connections
    // -------------------------------------------------------------------------

    #[test]
    fn test_connect_outcomes() {
        let backend = backend();
        assert!(open(&backend, 100).is_ok());
        // Not visible yet.
        assert!(matches!(open(&backend, 200), Err(ConnectionError::Io(_))));
        backend.tick();
        assert!(matches!(open(&backend, 200), Err(e) if e.is_refusal()));
        assert_eq!(backend.stats().connects(), 3);
    }

    #[test]
    fn test_reads_follow_samples() {
        let backend = backend();
        let mut conn = open(&backend, 100).unwrap();

        assert_eq!(conn.uptime().unwrap(), 1000);
        assert_eq!(conn.heap_memory_usage().unwrap().used, 1_048_576);
        let collectors = conn.garbage_collectors().unwrap();
        assert_eq!(collectors.len(), 2);
        assert_eq!(conn.collection_time(&collectors[0]).unwrap(), 10);
        assert_eq!(conn.thread_count().unwrap(), 2);

        let info = conn.thread_info(2).unwrap().unwrap();
        assert_eq!(info.thread_state, "BLOCKED");
        assert_eq!(info.lock_owner_id, 1);
        assert_eq!(conn.thread_info(99).unwrap(), None);
        assert_eq!(conn.find_monitor_deadlocked_threads().unwrap(), None);

        backend.tick();
        assert_eq!(conn.uptime().unwrap(), 2000);
        backend.tick();
        // Last sample repeats.
        assert_eq!(conn.uptime().unwrap(), 2000);
    }

    #[test]
    fn test_broken_attribute_is_omitted_from_batch() {
        let backend = backend();
        backend.tick();
        let mut conn = open(&backend, 100).unwrap();

        let names = vec!["HeapMemoryUsage".to_string(), "NonHeapMemoryUsage".to_string()];
        let values = conn.get_attributes(&ObjectName::memory(), &names).unwrap();
        assert!(values.contains_key("HeapMemoryUsage"));
        assert!(!values.contains_key("NonHeapMemoryUsage"));
        assert!(matches!(
            conn.non_heap_memory_usage(),
            Err(ConnectionError::Attribute { .. })
        ));
    }

    #[test]
    fn test_vanished_instance_is_dead() {
        let backend = backend();
        let mut conn = open(&backend, 300).unwrap();
        assert!(conn.is_alive());
        backend.tick();
        assert!(!conn.is_alive());
        assert!(conn.uptime().is_err());
    }

    #[test]
    fn test_closed_connection_rejects_requests() {
        let backend = backend();
        let mut conn = open(&backend, 100).unwrap();
        conn.close();
        assert!(!conn.is_alive());
        assert_eq!(conn.uptime(), Err(ConnectionError::Closed));
    }

    #[test]
    fn test_json_scenario() {
        let json = r#"{"instances": [{"pid": 5, "connect": "dead"}]}"#;
        let backend = ScenarioBackend::new(Scenario::from_json(json).unwrap());
        let mut conn = open(&backend, 5).unwrap();
        assert!(!conn.is_alive());
    }

    #[test]
    fn test_scenario_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.json");
        std::fs::write(&path, r#"{"instances": [{"pid": 9}]}"#).unwrap();
        let scenario = Scenario::from_file(&path).unwrap();
        assert_eq!(scenario.instances[0].pid, 9);
        assert!(scenario.instances[0].attachable);
    }
}
