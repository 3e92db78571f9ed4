//! Runtime version helpers derived from system properties.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// Legacy scheme, e.g. `1.7.0_45-b18`.
static LEGACY_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]\.([0-9])\.0_([0-9]+)-.*$").expect("valid regex"));

/// Vendor builds, e.g. `pxa6470sr4fp2-20140419_01`.
static VENDOR_BUILD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^.*-(.*)_.*$").expect("valid regex"));

/// Condensed version label: vendor initial plus major/update, e.g. `O7U45`.
///
/// Falls back to the raw runtime version when no known scheme matches.
pub fn short_version(runtime_version: &str, vendor: &str) -> String {
    let initial: String = vendor.chars().take(1).collect();

    if let Some(caps) = LEGACY_VERSION.captures(runtime_version) {
        return format!("{}{}U{}", initial, &caps[1], &caps[2]);
    }
    if let Some(caps) = VENDOR_BUILD.captures(runtime_version) {
        let build: String = caps[1].chars().skip(2).take(4).collect();
        return format!("{initial}{build}");
    }
    runtime_version.to_string()
}

/// Short version from a system property map.
pub fn short_version_of(properties: &BTreeMap<String, String>) -> String {
    let version = properties
        .get("java.runtime.version")
        .map(String::as_str)
        .unwrap_or_default();
    let vendor = properties
        .get("java.vendor")
        .map(String::as_str)
        .unwrap_or_default();
    short_version(version, vendor)
}

/// J9 runtimes report process CPU time in 100ns units.
pub fn reports_cpu_in_100ns(properties: &BTreeMap<String, String>) -> bool {
    properties
        .get("java.vm.name")
        .is_some_and(|name| name.contains("J9"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_version() {
        assert_eq!(short_version("1.7.0_45-b18", "Oracle Corporation"), "O7U45");
        assert_eq!(short_version("1.8.0_292-b10", "Azul Systems, Inc."), "A8U292");
    }

    #[test]
    fn test_vendor_build() {
        assert_eq!(short_version("pxa6470sr4fp2-20140419_01", "IBM Corporation"), "I1404");
    }

    #[test]
    fn test_unknown_scheme_is_kept() {
        assert_eq!(short_version("17.0.2+8", "Eclipse Adoptium"), "17.0.2+8");
        assert_eq!(short_version("", ""), "");
    }

    #[test]
    fn test_from_properties() {
        let mut props = BTreeMap::new();
        props.insert("java.runtime.version".to_string(), "1.6.0_31-b04".to_string());
        props.insert("java.vendor".to_string(), "Sun Microsystems Inc.".to_string());
        assert_eq!(short_version_of(&props), "S6U31");
        assert!(!reports_cpu_in_100ns(&props));

        props.insert("java.vm.name".to_string(), "IBM J9 VM".to_string());
        assert!(reports_cpu_in_100ns(&props));
    }
}
