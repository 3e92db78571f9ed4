//! Generate scenario command implementation.
//!
//! Writes a synthetic scenario file that the replay backend can serve:
//! instances with monotonically growing CPU, GC and uptime counters, random
//! heap usage and a pool of threads with individual CPU times.

use herakles_jvmtop::connection::MemoryUsage;
use herakles_jvmtop::scenario::{GcSample, Sample, ScenarioInstance, ScenarioThread};
use herakles_jvmtop::Scenario;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const MB: i64 = 1024 * 1024;

/// Sampling period assumed between two generated samples.
const SAMPLE_PERIOD_MS: i64 = 1000;

const MAIN_CLASSES: &[&str] = &[
    "org.apache.catalina.startup.Bootstrap start",
    "com.example.shop.ShopApplication --server.port=8080",
    "org.elasticsearch.bootstrap.Elasticsearch -d",
    "kafka.Kafka config/server.properties",
    "org.apache.zookeeper.server.quorum.QuorumPeerMain conf/zoo.cfg",
    "com.example.batch.ImportJob --input /data/in",
];

const VM_FLAVOURS: &[(&str, &str, &str)] = &[
    ("Oracle Corporation", "Java HotSpot(TM) 64-Bit Server VM", "1.8.0_292-b10"),
    ("Eclipse Adoptium", "OpenJDK 64-Bit Server VM", "17.0.8+7"),
    ("Azul Systems, Inc.", "OpenJDK 64-Bit Server VM", "11.0.20+8-LTS"),
];

const THREAD_STATES: &[&str] = &["RUNNABLE", "WAITING", "TIMED_WAITING", "BLOCKED"];

/// Generates a synthetic scenario file for testing purposes.
pub fn command_generate_scenario(
    output: PathBuf,
    instances: usize,
    samples: usize,
    threads: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    debug!(
        "Generating scenario: instances={}, samples={}, threads={}, output={}",
        instances,
        samples,
        threads,
        output.display()
    );

    let scenario = generate_scenario(&mut rand::thread_rng(), instances, samples, threads);
    let content = render(&scenario, &output)?;
    fs::write(&output, content)?;

    println!(
        "✅ Generated scenario: {} instances with {} samples in {}",
        scenario.instances.len(),
        samples.max(1),
        output.display()
    );

    Ok(())
}

/// JSON for `.json` targets, YAML otherwise.
fn render(scenario: &Scenario, output: &Path) -> Result<String, Box<dyn std::error::Error>> {
    match output.extension().and_then(|s| s.to_str()) {
        Some("json") => Ok(serde_json::to_string_pretty(scenario)?),
        _ => Ok(serde_yaml::to_string(scenario)?),
    }
}

pub fn generate_scenario(
    rng: &mut impl Rng,
    instances: usize,
    samples: usize,
    threads: usize,
) -> Scenario {
    let mut pid: u32 = 4000;
    let instances = (0..instances)
        .map(|_| {
            pid += rng.gen_range(1..500);
            generate_instance(rng, pid, samples.max(1), threads)
        })
        .collect();

    Scenario {
        discovery_fails_at: None,
        instances,
    }
}

fn generate_instance(rng: &mut impl Rng, pid: u32, samples: usize, threads: usize) -> ScenarioInstance {
    let main_class = MAIN_CLASSES.choose(rng).copied().unwrap_or("Main");
    let (vendor, vm_name, version) = VM_FLAVOURS.choose(rng).copied().unwrap_or(VM_FLAVOURS[0]);
    let processors: i64 = *[1, 2, 4, 8].choose(rng).unwrap_or(&1);

    let mut system_properties = BTreeMap::new();
    system_properties.insert("java.vendor".to_string(), vendor.to_string());
    system_properties.insert("java.vm.name".to_string(), vm_name.to_string());
    system_properties.insert("java.runtime.version".to_string(), version.to_string());
    system_properties.insert("java.version".to_string(), version.to_string());
    system_properties.insert("user.name".to_string(), "app".to_string());
    system_properties.insert("sun.java.command".to_string(), main_class.to_string());

    let heap_max = rng.gen_range(256..4096) * MB;
    let input_arguments = vec![
        format!("-Xmx{}m", heap_max / MB),
        "-XX:+UseG1GC".to_string(),
        format!("-Dapp.instance={}", pid),
    ];

    let mut uptime_ms = rng.gen_range(60_000..86_400_000);
    let mut cpu_time_ns: i64 = rng.gen_range(1..uptime_ms) * 1_000_000;
    let mut gc_time_ms: i64 = rng.gen_range(0..uptime_ms / 100);
    let mut gc_count: i64 = rng.gen_range(0..1000);
    let mut loaded_classes: i64 = rng.gen_range(2_000..20_000);
    let mut thread_cpu: Vec<i64> = (0..threads).map(|_| rng.gen_range(0..cpu_time_ns.max(1))).collect();

    let mut generated = Vec::with_capacity(samples);
    for _ in 0..samples {
        uptime_ms += SAMPLE_PERIOD_MS;
        let busy_ms = rng.gen_range(0..=SAMPLE_PERIOD_MS * processors);
        cpu_time_ns += busy_ms * 1_000_000;
        let gc_ms = rng.gen_range(0..=busy_ms / 10);
        gc_time_ms += gc_ms;
        if gc_ms > 0 {
            gc_count += 1;
        }
        loaded_classes += rng.gen_range(0..5);

        let thread_rows: Vec<ScenarioThread> = thread_cpu
            .iter_mut()
            .enumerate()
            .map(|(i, cpu)| {
                *cpu += rng.gen_range(0..=busy_ms.max(1)) * 1_000_000 / (threads.max(1) as i64);
                ScenarioThread {
                    id: i as i64 + 1,
                    name: format!("worker-{}", i + 1),
                    state: THREAD_STATES.choose(rng).copied().unwrap_or("RUNNABLE").to_string(),
                    cpu_time_ns: *cpu,
                    lock_owner_id: -1,
                }
            })
            .collect();

        generated.push(Sample {
            uptime_ms,
            cpu_time_ns,
            gc: vec![GcSample {
                name: "G1 Young Generation".to_string(),
                time_ms: gc_time_ms,
                count: gc_count,
            }],
            heap: MemoryUsage {
                init: heap_max / 16,
                used: rng.gen_range(MB..heap_max),
                committed: heap_max / 2,
                max: heap_max,
            },
            non_heap: MemoryUsage {
                init: 2 * MB,
                used: rng.gen_range(20 * MB..200 * MB),
                committed: 256 * MB,
                max: -1,
            },
            loaded_classes,
            threads: thread_rows,
            ..Sample::default()
        });
    }

    ScenarioInstance {
        pid,
        display_name: main_class.to_string(),
        attachable: true,
        endpoint: None,
        connect: Default::default(),
        appears_at: 0,
        vanishes_at: None,
        available_processors: processors,
        system_properties,
        input_arguments,
        thread_cpu_time_supported: true,
        synchronizer_usage_supported: true,
        samples: generated,
    }
}
