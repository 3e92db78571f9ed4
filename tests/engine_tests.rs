//! Integration tests for sessions, the update cycle and the snapshot cache.
//!
//! Every test drives the library through the scenario replay backend and
//! checks the I/O it observed.

use herakles_jvmtop::beans::MemoryBean;
use herakles_jvmtop::connection::ObjectName;
use herakles_jvmtop::session::lock_session;
use herakles_jvmtop::{
    ConnectionState, DiscoveryProvider, Endpoint, InstanceId, MonitorError, Scenario,
    ScenarioBackend, SessionRegistry, TrackedVm, VmDescriptor, MAX_UPDATE_ERRORS,
};

fn backend(yaml: &str) -> ScenarioBackend {
    ScenarioBackend::new(Scenario::from_yaml(yaml).unwrap())
}

fn descriptor(backend: &ScenarioBackend, pid: u32) -> VmDescriptor {
    let mut discovery = backend.clone();
    discovery
        .list_visible()
        .unwrap()
        .into_iter()
        .find(|vm| vm.id == InstanceId(pid))
        .unwrap()
}

fn attach(backend: &ScenarioBackend, registry: &mut SessionRegistry, pid: u32) -> TrackedVm {
    TrackedVm::attach(descriptor(backend, pid), registry, backend)
}

const TWO_CPUS: &str = r#"
instances:
  - pid: 4711
    display_name: com.example.Shop --port 8080
    available_processors: 2
    system_properties:
      java.runtime.version: 1.8.0_292-b10
      java.vendor: Oracle Corporation
      user.name: shop
    samples:
      - uptime_ms: 1000
        cpu_time_ns: 1000000000
        gc: [{ name: PS Scavenge, time_ms: 10, count: 1 }]
        heap: { init: 0, used: 1048576, committed: 2097152, max: 4194304 }
      - uptime_ms: 2000
        cpu_time_ns: 2000000000
        gc: [{ name: PS Scavenge, time_ms: 20, count: 2 }]
        heap: { init: 0, used: 2097152, committed: 2097152, max: 4194304 }
"#;

// -------------------------------------------------------------------------
// Tests for derived loads
// -------------------------------------------------------------------------

#[test]
fn test_cpu_load_from_two_samples() {
    let backend = backend(TWO_CPUS);
    let mut registry = SessionRegistry::new();
    let mut vm = attach(&backend, &mut registry, 4711);

    assert_eq!(vm.state(), ConnectionState::Attached);
    // First sample only sets the baseline
    assert_eq!(vm.metrics().cpu_load, 0.0);
    assert_eq!(vm.metrics().prev_uptime_ms, 1000);

    backend.tick();
    vm.update().unwrap();

    let m = vm.metrics();
    assert_eq!(m.delta_uptime_ms, 1000);
    assert_eq!(m.delta_cpu_time_ms, 1000);
    assert_eq!(m.delta_gc_time_ms, 10);
    assert!((m.cpu_load - 0.5).abs() < 1e-9);
    assert!((m.gc_load - 0.005).abs() < 1e-9);
    assert_eq!(m.gc_count, 2);
    assert_eq!(m.heap.used, 2097152);
    assert_eq!(m.prev_uptime_ms, 2000);
}

#[test]
fn test_j9_cpu_time_is_scaled_to_nanoseconds() {
    let backend = backend(
        r#"
instances:
  - pid: 4712
    available_processors: 1
    system_properties:
      java.vm.name: IBM J9 VM
    samples:
      - uptime_ms: 1000
        cpu_time_ns: 10000000
        gc: [{ name: scavenge, time_ms: 10, count: 1 }]
      - uptime_ms: 2000
        cpu_time_ns: 15000000
        gc: [{ name: scavenge, time_ms: 20, count: 2 }]
"#,
    );
    let mut registry = SessionRegistry::new();
    let mut vm = attach(&backend, &mut registry, 4712);
    assert!(vm.runtime().unwrap().cpu_in_100ns);
    assert_eq!(vm.metrics().process_cpu_time_ns, 1_000_000_000);

    backend.tick();
    vm.update().unwrap();

    let m = vm.metrics();
    assert_eq!(m.process_cpu_time_ns, 1_500_000_000);
    assert_eq!(m.delta_cpu_time_ms, 500);
    assert!((m.cpu_load - 0.5).abs() < 1e-9);
}

#[test]
fn test_runtime_constants_fetched_once() {
    let backend = backend(TWO_CPUS);
    let mut registry = SessionRegistry::new();
    let mut vm = attach(&backend, &mut registry, 4711);

    let runtime = vm.runtime().unwrap().clone();
    assert_eq!(runtime.vm_version, "O8U292");
    assert_eq!(runtime.os_user.as_deref(), Some("shop"));

    backend.tick();
    vm.update().unwrap();
    assert_eq!(vm.runtime(), Some(&runtime));

    let row = vm.row();
    assert_eq!(row.vm_version.as_deref(), Some("O8U292"));
    assert_eq!(row.state, ConnectionState::Attached);
}

// -------------------------------------------------------------------------
// Tests for the attach and error lifecycle
// -------------------------------------------------------------------------

const FAILING: &str = r#"
instances:
  - pid: 10
    samples:
      - { uptime_ms: 1000, cpu_time_ns: 1000000 }
      - { fail: true }
"#;

#[test]
fn test_repeated_failures_detach_permanently() {
    let backend = backend(FAILING);
    let mut registry = SessionRegistry::new();
    let mut vm = attach(&backend, &mut registry, 10);
    assert_eq!(vm.state(), ConnectionState::Attached);

    for count in 1..=MAX_UPDATE_ERRORS {
        backend.tick();
        let err = vm.update().unwrap_err();
        assert!(
            matches!(err, MonitorError::TransientUpdateFailure { count: c, .. } if c == count),
            "unexpected error {err:?}"
        );
        assert_eq!(vm.state(), ConnectionState::AttachedUpdateError);
    }

    backend.tick();
    assert!(matches!(
        vm.update(),
        Err(MonitorError::PermanentDetach { .. })
    ));
    assert_eq!(vm.state(), ConnectionState::Detached);
    assert_eq!(vm.metrics().update_error_count, MAX_UPDATE_ERRORS + 1);

    // Detached sessions never talk to the instance again
    let before = backend.stats().total_requests();
    backend.tick();
    assert!(vm.update().is_ok());
    assert_eq!(backend.stats().total_requests(), before);
    assert_eq!(vm.state(), ConnectionState::Detached);
}

#[test]
fn test_success_clears_error_state_but_not_the_count() {
    let backend = backend(
        r#"
instances:
  - pid: 10
    samples:
      - { uptime_ms: 1000, cpu_time_ns: 1000000 }
      - { fail: true }
      - { uptime_ms: 3000, cpu_time_ns: 2000000 }
"#,
    );
    let mut registry = SessionRegistry::new();
    let mut vm = attach(&backend, &mut registry, 10);

    backend.tick();
    assert!(vm.update().is_err());
    assert_eq!(vm.state(), ConnectionState::AttachedUpdateError);

    backend.tick();
    vm.update().unwrap();
    assert_eq!(vm.state(), ConnectionState::Attached);
    assert_eq!(vm.metrics().update_error_count, 1);
}

#[test]
fn test_dead_connection_detaches_during_attach() {
    let backend = backend("instances: [{ pid: 20, connect: dead }]");
    let mut registry = SessionRegistry::new();
    let vm = attach(&backend, &mut registry, 20);

    assert_eq!(vm.state(), ConnectionState::Detached);
    assert_eq!(backend.stats().batched_reads(), 0);
    assert!(vm.row().state.error_marker().is_some());
}

#[test]
fn test_refused_connection_is_not_retried() {
    let backend = backend("instances: [{ pid: 30, connect: refused }]");
    let mut registry = SessionRegistry::new();
    let mut vm = attach(&backend, &mut registry, 30);
    assert_eq!(vm.state(), ConnectionState::ConnectionRefused);

    let again = lock_session(vm.session()).connect(&backend);
    assert!(matches!(again, Err(MonitorError::ConnectionRefused { .. })));
    assert!(vm.update().is_ok());
    assert_eq!(backend.stats().connects(), 1);
}

#[test]
fn test_attach_error_and_not_attachable() {
    let backend = backend(
        r#"
instances:
  - { pid: 40, connect: error }
  - { pid: 41, attachable: false }
"#,
    );
    let mut registry = SessionRegistry::new();

    let failed = attach(&backend, &mut registry, 40);
    assert_eq!(failed.state(), ConnectionState::ErrorDuringAttach);

    let skipped = attach(&backend, &mut registry, 41);
    assert_eq!(skipped.state(), ConnectionState::ErrorDuringAttach);
    // Only the attachable instance was ever connected
    assert_eq!(backend.stats().connects(), 1);
}

#[test]
fn test_vanishing_instance_detaches() {
    let backend = backend(
        r#"
instances:
  - pid: 50
    vanishes_at: 1
    samples: [{ uptime_ms: 1000, cpu_time_ns: 1000000 }]
"#,
    );
    let mut registry = SessionRegistry::new();
    let mut vm = attach(&backend, &mut registry, 50);
    assert_eq!(vm.state(), ConnectionState::Attached);

    backend.tick();
    assert!(matches!(
        vm.update(),
        Err(MonitorError::PermanentDetach { .. })
    ));
    assert_eq!(vm.state(), ConnectionState::Detached);
}

// -------------------------------------------------------------------------
// Tests for the registry
// -------------------------------------------------------------------------

#[test]
fn test_registry_hands_out_one_session_per_identity() {
    let backend = backend(TWO_CPUS);
    let mut registry = SessionRegistry::new();

    let first = attach(&backend, &mut registry, 4711);
    let second = attach(&backend, &mut registry, 4711);

    assert_eq!(registry.len(), 1);
    assert!(std::sync::Arc::ptr_eq(first.session(), second.session()));
    assert_eq!(backend.stats().connects(), 1);

    assert!(registry.teardown(InstanceId(4711)));
    assert!(registry.is_empty());
    assert_eq!(first.state(), ConnectionState::Detached);
}

// -------------------------------------------------------------------------
// Tests for the snapshot cache
// -------------------------------------------------------------------------

#[test]
fn test_reads_are_memoized_within_a_cycle() {
    let backend = backend(TWO_CPUS);
    let mut registry = SessionRegistry::new();
    let session = registry.attach(InstanceId(4711), &Endpoint::Local { pid: 4711 });
    let mut guard = lock_session(&session);
    guard.connect(&backend).unwrap();

    let before = backend.stats().batched_reads();
    let singles = backend.stats().single_reads();
    {
        let source = guard.source().unwrap();
        let first = source.heap_memory_usage().unwrap();
        let second = source.heap_memory_usage().unwrap();
        assert_eq!(first, second);
        source.non_heap_memory_usage().unwrap();
    }
    // One batch for the heap, one more once non-heap joins the learned set
    assert_eq!(backend.stats().batched_reads(), before + 2);

    guard.flush();
    {
        let source = guard.source().unwrap();
        source.heap_memory_usage().unwrap();
        source.non_heap_memory_usage().unwrap();
        let learned = source.learned_names(&ObjectName::memory()).unwrap();
        assert!(learned.contains("HeapMemoryUsage"));
        assert!(learned.contains("NonHeapMemoryUsage"));
    }
    // After a flush the learned superset comes back in a single batch
    assert_eq!(backend.stats().batched_reads(), before + 3);
    assert_eq!(backend.stats().single_reads(), singles);
}

#[test]
fn test_update_cycles_cost_the_same() {
    let backend = backend(TWO_CPUS);
    let mut registry = SessionRegistry::new();
    let mut vm = attach(&backend, &mut registry, 4711);

    backend.tick();
    let start = backend.stats().total_requests();
    vm.update().unwrap();
    let second_cycle = backend.stats().total_requests() - start;

    let start = backend.stats().total_requests();
    vm.update().unwrap();
    let third_cycle = backend.stats().total_requests() - start;

    assert!(second_cycle > 0);
    assert_eq!(second_cycle, third_cycle);
}

#[test]
fn test_broken_attribute_fails_the_update() {
    let backend = backend(
        r#"
instances:
  - pid: 60
    samples:
      - { uptime_ms: 1000, cpu_time_ns: 1000000 }
      - { uptime_ms: 2000, cpu_time_ns: 2000000, broken_attributes: [HeapMemoryUsage] }
"#,
    );
    let mut registry = SessionRegistry::new();
    let mut vm = attach(&backend, &mut registry, 60);

    backend.tick();
    let err = vm.update().unwrap_err();
    match err {
        MonitorError::PartialAttributeFailure { object, attribute } => {
            assert_eq!(object, ObjectName::memory());
            assert_eq!(attribute, "HeapMemoryUsage");
        }
        other => panic!("unexpected error {other:?}"),
    }
    // The batch omitted it, a direct read surfaced the failure
    assert!(backend.stats().single_reads() >= 1);
    // Counted like any other failed cycle
    assert_eq!(vm.metrics().update_error_count, 1);
    assert_eq!(vm.state(), ConnectionState::AttachedUpdateError);
}

// -------------------------------------------------------------------------
// Tests for deadlock detection
// -------------------------------------------------------------------------

fn deadlocks_after_attach(yaml: &str) -> bool {
    let backend = backend(yaml);
    let mut registry = SessionRegistry::new();
    let vm = attach(&backend, &mut registry, 70);
    assert_eq!(vm.state(), ConnectionState::Attached);
    vm.metrics().deadlocks_detected
}

#[test]
fn test_synchronizer_deadlock_is_detected() {
    assert!(deadlocks_after_attach(
        r#"
instances:
  - pid: 70
    samples:
      - { uptime_ms: 1000, cpu_time_ns: 1000000, deadlocked: [3, 4] }
"#
    ));
}

#[test]
fn test_monitor_deadlock_is_detected() {
    assert!(deadlocks_after_attach(
        r#"
instances:
  - pid: 70
    samples:
      - { uptime_ms: 1000, cpu_time_ns: 1000000, monitor_deadlocked: [3, 4] }
"#
    ));
}

#[test]
fn test_monitor_deadlock_detected_without_synchronizer_usage() {
    assert!(deadlocks_after_attach(
        r#"
instances:
  - pid: 70
    synchronizer_usage_supported: false
    samples:
      - { uptime_ms: 1000, cpu_time_ns: 1000000, monitor_deadlocked: [3, 4] }
"#
    ));
}

#[test]
fn test_synchronizer_deadlock_ignored_without_synchronizer_usage() {
    assert!(!deadlocks_after_attach(
        r#"
instances:
  - pid: 70
    synchronizer_usage_supported: false
    samples:
      - { uptime_ms: 1000, cpu_time_ns: 1000000, deadlocked: [3, 4] }
"#
    ));
}

#[test]
fn test_empty_deadlock_lists_are_not_deadlocks() {
    assert!(!deadlocks_after_attach(
        r#"
instances:
  - pid: 70
    samples:
      - { uptime_ms: 1000, cpu_time_ns: 1000000, deadlocked: [], monitor_deadlocked: [] }
"#
    ));
    assert!(!deadlocks_after_attach(
        r#"
instances:
  - pid: 70
    samples:
      - { uptime_ms: 1000, cpu_time_ns: 1000000 }
"#
    ));
}
