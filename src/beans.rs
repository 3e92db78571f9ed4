//! Typed views over the platform management objects.
//!
//! Each metrics category gets its own trait. All of them are implemented for
//! every `AttributeSource`, so the same calls work against a raw connection
//! and against the `SnapshotCache` wrapping it.

use std::collections::BTreeMap;

use crate::connection::{AttributeSource, AttributeValue, MemoryUsage, ObjectName, ThreadInfo};
use crate::error::Result;

fn read<S: AttributeSource + ?Sized>(
    source: &mut S,
    object: ObjectName,
    name: &str,
) -> Result<AttributeValue> {
    source.get_attribute(&object, name)
}

pub trait RuntimeBean {
    /// Milliseconds since the runtime started.
    fn uptime(&mut self) -> Result<i64>;
    fn input_arguments(&mut self) -> Result<Vec<String>>;
    fn system_properties(&mut self) -> Result<BTreeMap<String, String>>;
}

impl<T: AttributeSource + ?Sized> RuntimeBean for T {
    fn uptime(&mut self) -> Result<i64> {
        read(self, ObjectName::runtime(), "Uptime")?.as_long("Uptime")
    }

    fn input_arguments(&mut self) -> Result<Vec<String>> {
        read(self, ObjectName::runtime(), "InputArguments")?.into_text_array("InputArguments")
    }

    fn system_properties(&mut self) -> Result<BTreeMap<String, String>> {
        read(self, ObjectName::runtime(), "SystemProperties")?.into_properties("SystemProperties")
    }
}

pub trait OperatingSystemBean {
    fn available_processors(&mut self) -> Result<i64>;
    /// Cumulative CPU time of the monitored process as reported by the
    /// runtime (nanoseconds, except for runtimes using 100ns units).
    fn process_cpu_time(&mut self) -> Result<i64>;
}

impl<T: AttributeSource + ?Sized> OperatingSystemBean for T {
    fn available_processors(&mut self) -> Result<i64> {
        read(self, ObjectName::operating_system(), "AvailableProcessors")?
            .as_long("AvailableProcessors")
    }

    fn process_cpu_time(&mut self) -> Result<i64> {
        read(self, ObjectName::operating_system(), "ProcessCpuTime")?.as_long("ProcessCpuTime")
    }
}

pub trait MemoryBean {
    fn heap_memory_usage(&mut self) -> Result<MemoryUsage>;
    fn non_heap_memory_usage(&mut self) -> Result<MemoryUsage>;
}

impl<T: AttributeSource + ?Sized> MemoryBean for T {
    fn heap_memory_usage(&mut self) -> Result<MemoryUsage> {
        read(self, ObjectName::memory(), "HeapMemoryUsage")?.into_usage("HeapMemoryUsage")
    }

    fn non_heap_memory_usage(&mut self) -> Result<MemoryUsage> {
        read(self, ObjectName::memory(), "NonHeapMemoryUsage")?.into_usage("NonHeapMemoryUsage")
    }
}

pub trait ClassLoadingBean {
    fn total_loaded_class_count(&mut self) -> Result<i64>;
}

impl<T: AttributeSource + ?Sized> ClassLoadingBean for T {
    fn total_loaded_class_count(&mut self) -> Result<i64> {
        read(self, ObjectName::class_loading(), "TotalLoadedClassCount")?
            .as_long("TotalLoadedClassCount")
    }
}

pub trait ThreadingBean {
    fn thread_count(&mut self) -> Result<i64>;
    fn peak_thread_count(&mut self) -> Result<i64>;
    fn total_started_thread_count(&mut self) -> Result<i64>;
    fn all_thread_ids(&mut self) -> Result<Vec<i64>>;
    fn is_thread_cpu_time_supported(&mut self) -> Result<bool>;
    fn is_synchronizer_usage_supported(&mut self) -> Result<bool>;
    /// CPU time of one thread in nanoseconds, -1 if the thread is gone.
    fn thread_cpu_time(&mut self, tid: i64) -> Result<i64>;
    fn thread_info(&mut self, tid: i64) -> Result<Option<ThreadInfo>>;
    /// Threads deadlocked on monitors or ownable synchronizers.
    fn find_deadlocked_threads(&mut self) -> Result<Option<Vec<i64>>>;
    /// Threads deadlocked on object monitors only.
    fn find_monitor_deadlocked_threads(&mut self) -> Result<Option<Vec<i64>>>;
}

impl<T: AttributeSource + ?Sized> ThreadingBean for T {
    fn thread_count(&mut self) -> Result<i64> {
        read(self, ObjectName::threading(), "ThreadCount")?.as_long("ThreadCount")
    }

    fn peak_thread_count(&mut self) -> Result<i64> {
        read(self, ObjectName::threading(), "PeakThreadCount")?.as_long("PeakThreadCount")
    }

    fn total_started_thread_count(&mut self) -> Result<i64> {
        read(self, ObjectName::threading(), "TotalStartedThreadCount")?
            .as_long("TotalStartedThreadCount")
    }

    fn all_thread_ids(&mut self) -> Result<Vec<i64>> {
        Ok(read(self, ObjectName::threading(), "AllThreadIds")?
            .into_long_array("AllThreadIds")?
            .unwrap_or_default())
    }

    fn is_thread_cpu_time_supported(&mut self) -> Result<bool> {
        read(self, ObjectName::threading(), "ThreadCpuTimeSupported")?
            .as_bool("ThreadCpuTimeSupported")
    }

    fn is_synchronizer_usage_supported(&mut self) -> Result<bool> {
        read(self, ObjectName::threading(), "SynchronizerUsageSupported")?
            .as_bool("SynchronizerUsageSupported")
    }

    fn thread_cpu_time(&mut self, tid: i64) -> Result<i64> {
        self.invoke(
            &ObjectName::threading(),
            "getThreadCpuTime",
            &[AttributeValue::Long(tid)],
        )?
        .as_long("getThreadCpuTime")
    }

    fn thread_info(&mut self, tid: i64) -> Result<Option<ThreadInfo>> {
        self.invoke(
            &ObjectName::threading(),
            "getThreadInfo",
            &[AttributeValue::Long(tid)],
        )?
        .into_thread_info("getThreadInfo")
    }

    fn find_deadlocked_threads(&mut self) -> Result<Option<Vec<i64>>> {
        self.invoke(&ObjectName::threading(), "findDeadlockedThreads", &[])?
            .into_long_array("findDeadlockedThreads")
    }

    fn find_monitor_deadlocked_threads(&mut self) -> Result<Option<Vec<i64>>> {
        self.invoke(&ObjectName::threading(), "findMonitorDeadlockedThreads", &[])?
            .into_long_array("findMonitorDeadlockedThreads")
    }
}

pub trait GarbageCollectorBeans {
    fn garbage_collectors(&mut self) -> Result<Vec<ObjectName>>;
    /// Accumulated collection time in milliseconds.
    fn collection_time(&mut self, collector: &ObjectName) -> Result<i64>;
    fn collection_count(&mut self, collector: &ObjectName) -> Result<i64>;
}

impl<T: AttributeSource + ?Sized> GarbageCollectorBeans for T {
    fn garbage_collectors(&mut self) -> Result<Vec<ObjectName>> {
        self.query_names(&ObjectName::garbage_collectors())
    }

    fn collection_time(&mut self, collector: &ObjectName) -> Result<i64> {
        self.get_attribute(collector, "CollectionTime")?
            .as_long("CollectionTime")
    }

    fn collection_count(&mut self, collector: &ObjectName) -> Result<i64> {
        self.get_attribute(collector, "CollectionCount")?
            .as_long("CollectionCount")
    }
}
