//! Host information for the top bar and the `sysinfo` subcommand.
//!
//! Load average comes from /proc/loadavg, kernel and architecture from the
//! uname syscall, processor count from sysconf.

use serde::Serialize;
use std::fs;

/// System load averages for 1, 5, and 15 minute intervals.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LoadAverage {
    pub one_min: f64,
    pub five_min: f64,
    pub fifteen_min: f64,
}

/// Reads load average from /proc/loadavg.
pub fn read_load_average() -> Result<LoadAverage, String> {
    let content = fs::read_to_string("/proc/loadavg")
        .map_err(|e| format!("Failed to read /proc/loadavg: {}", e))?;
    parse_load_average(&content)
}

/// Parses a loadavg line, e.g. "0.00 0.01 0.05 1/234 5678".
pub fn parse_load_average(line: &str) -> Result<LoadAverage, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 3 {
        return Err(format!(
            "Invalid /proc/loadavg format: expected at least 3 fields, got {}",
            parts.len()
        ));
    }

    let one_min = parts[0]
        .parse::<f64>()
        .map_err(|e| format!("Failed to parse 1min load average: {}", e))?;
    let five_min = parts[1]
        .parse::<f64>()
        .map_err(|e| format!("Failed to parse 5min load average: {}", e))?;
    let fifteen_min = parts[2]
        .parse::<f64>()
        .map_err(|e| format!("Failed to parse 15min load average: {}", e))?;

    Ok(LoadAverage {
        one_min,
        five_min,
        fifteen_min,
    })
}

/// Number of online processors, at least 1.
pub fn available_processors() -> usize {
    // SAFETY: sysconf is safe to call with _SC_NPROCESSORS_ONLN
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if n > 0 {
        n as usize
    } else {
        1
    }
}

/// Kernel identification from the uname syscall.
#[derive(Debug, Clone, Serialize)]
pub struct UnameInfo {
    pub sysname: String,
    pub release: String,
    pub version: String,
    pub machine: String,
}

/// Reads system information from uname syscall.
pub fn read_uname_info() -> Result<UnameInfo, String> {
    use std::ffi::CStr;
    use std::mem;

    unsafe {
        // SAFETY: libc::utsname is a C struct with only arrays of i8/c_char
        // which are valid for zeroed memory initialization
        let mut utsname: libc::utsname = mem::zeroed();
        if libc::uname(&mut utsname) == 0 {
            let field = |ptr: *const libc::c_char| CStr::from_ptr(ptr).to_string_lossy().into_owned();
            Ok(UnameInfo {
                sysname: field(utsname.sysname.as_ptr()),
                release: field(utsname.release.as_ptr()),
                version: field(utsname.version.as_ptr()),
                machine: field(utsname.machine.as_ptr()),
            })
        } else {
            Err("Failed to call uname".to_string())
        }
    }
}

/// Reads system uptime in seconds from /proc/uptime.
pub fn read_uptime() -> Result<f64, String> {
    let content = fs::read_to_string("/proc/uptime")
        .map_err(|e| format!("Failed to read /proc/uptime: {}", e))?;

    content
        .split_whitespace()
        .next()
        .ok_or_else(|| "Invalid /proc/uptime format: no fields found".to_string())?
        .parse::<f64>()
        .map_err(|e| format!("Failed to parse uptime: {}", e))
}

/// Everything `sysinfo` prints.
#[derive(Debug, Clone, Serialize)]
pub struct HostInfo {
    pub processors: usize,
    pub uname: Option<UnameInfo>,
    pub load_average: Option<LoadAverage>,
    pub uptime_secs: Option<f64>,
}

pub fn host_info() -> HostInfo {
    HostInfo {
        processors: available_processors(),
        uname: read_uname_info().ok(),
        load_average: read_load_average().ok(),
        uptime_secs: read_uptime().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_load_average() {
        let load = parse_load_average("0.52 0.58 0.59 2/1190 12345").unwrap();
        assert!((load.one_min - 0.52).abs() < 0.001);
        assert!((load.five_min - 0.58).abs() < 0.001);
        assert!((load.fifteen_min - 0.59).abs() < 0.001);
    }

    #[test]
    fn test_parse_load_average_invalid() {
        assert!(parse_load_average("0.52 0.58").is_err());
        assert!(parse_load_average("abc def ghi 1/2 3").is_err());
    }

    #[test]
    fn test_available_processors_positive() {
        assert!(available_processors() >= 1);
    }
}
