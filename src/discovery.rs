//! Discovery of monitorable runtime instances.
//!
//! The provider enumerates what is visible right now; the adapter diffs that
//! against the previous result and hands out only the instances that are new.
//! Instances that vanish are kept by the caller and fail on their own.

use ahash::AHashMap as HashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::connection::Endpoint;
use crate::error::MonitorError;

/// Identity of a monitored instance for the lifetime of the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub u32);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// What the discovery provider knows about an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmDescriptor {
    pub id: InstanceId,
    /// Main class or jar followed by its arguments.
    pub display_name: String,
    /// False if an attach attempt is pointless.
    pub attachable: bool,
    pub endpoint: Endpoint,
}

impl VmDescriptor {
    /// Main class of the display name, keeping at most `width` trailing chars.
    pub fn entry_point(&self, width: usize) -> String {
        let name = self
            .display_name
            .split_once(' ')
            .map_or(self.display_name.as_str(), |(head, _)| head);
        let skip = name.chars().count().saturating_sub(width);
        name.chars().skip(skip).collect()
    }
}

/// Enumerates instances visible to this process.
pub trait DiscoveryProvider {
    fn list_visible(&mut self) -> Result<Vec<VmDescriptor>, MonitorError>;
}

/// Diffs successive discovery results.
pub struct DiscoveryAdapter {
    known: HashMap<InstanceId, VmDescriptor>,
    scan_interval: u32,
    cycle: u64,
}

impl DiscoveryAdapter {
    /// `scan_interval` of N scans every N-th call to `poll`; 0 is treated as 1.
    pub fn new(scan_interval: u32) -> Self {
        Self {
            known: HashMap::new(),
            scan_interval: scan_interval.max(1),
            cycle: 0,
        }
    }

    /// Replaces the known set with `visible` and returns the entries that
    /// were not known before, in provider order.
    pub fn merge_discovered(&mut self, visible: Vec<VmDescriptor>) -> Vec<VmDescriptor> {
        let added: Vec<VmDescriptor> = visible
            .iter()
            .filter(|vm| !self.known.contains_key(&vm.id))
            .cloned()
            .collect();

        self.known = visible.into_iter().map(|vm| (vm.id, vm)).collect();

        if !added.is_empty() {
            debug!("Discovered {} new instances", added.len());
        }
        added
    }

    /// Scans the provider if this cycle is due and merges the result.
    pub fn poll(
        &mut self,
        provider: &mut dyn DiscoveryProvider,
    ) -> Result<Vec<VmDescriptor>, MonitorError> {
        let due = self.cycle % u64::from(self.scan_interval) == 0;
        self.cycle += 1;
        if !due {
            return Ok(Vec::new());
        }
        let visible = provider.list_visible()?;
        Ok(self.merge_discovered(visible))
    }

    pub fn known(&self) -> impl Iterator<Item = &VmDescriptor> {
        self.known.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm(pid: u32) -> VmDescriptor {
        VmDescriptor {
            id: InstanceId(pid),
            display_name: format!("com.example.App{pid} --flag"),
            attachable: true,
            endpoint: Endpoint::Local { pid },
        }
    }

    struct FixedProvider {
        results: Vec<Vec<VmDescriptor>>,
        calls: usize,
    }

    impl DiscoveryProvider for FixedProvider {
        fn list_visible(&mut self) -> Result<Vec<VmDescriptor>, MonitorError> {
            let idx = self.calls.min(self.results.len() - 1);
            self.calls += 1;
            Ok(self.results[idx].clone())
        }
    }

    #[test]
    fn test_merge_returns_only_new_instances() {
        let mut adapter = DiscoveryAdapter::new(1);
        let first = adapter.merge_discovered(vec![vm(1), vm(2)]);
        assert_eq!(first.len(), 2);

        let second = adapter.merge_discovered(vec![vm(2), vm(3)]);
        assert_eq!(second, vec![vm(3)]);
    }

    #[test]
    fn test_known_set_follows_latest_scan() {
        let mut adapter = DiscoveryAdapter::new(1);
        adapter.merge_discovered(vec![vm(1)]);
        adapter.merge_discovered(vec![vm(2)]);
        // 1 vanished and came back: reported as new again.
        assert_eq!(adapter.merge_discovered(vec![vm(1), vm(2)]), vec![vm(1)]);
    }

    #[test]
    fn test_poll_downsamples_scans() {
        let mut provider = FixedProvider {
            results: vec![vec![vm(1)], vec![vm(1), vm(2)]],
            calls: 0,
        };
        let mut adapter = DiscoveryAdapter::new(3);

        assert_eq!(adapter.poll(&mut provider).unwrap().len(), 1);
        assert!(adapter.poll(&mut provider).unwrap().is_empty());
        assert!(adapter.poll(&mut provider).unwrap().is_empty());
        assert_eq!(adapter.poll(&mut provider).unwrap(), vec![vm(2)]);
        assert_eq!(provider.calls, 2);
    }

    #[test]
    fn test_entry_point() {
        let d = vm(7);
        assert_eq!(d.entry_point(15), "om.example.App7");
        assert_eq!(d.entry_point(40), "com.example.App7");
    }
}
