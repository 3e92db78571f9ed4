//! Console rendering of the overview, detail and stat views.
//!
//! Views render one frame per iteration into a `String`; the poll loop in
//! `main` decides about clearing, the top bar and pacing.

use anyhow::Result;
use chrono::{DateTime, Local};
use herakles_jvmtop::monitor::{read_published, DetailCycle, DetailReport, PublishedRows};
use herakles_jvmtop::ranking::ThreadReport;
use herakles_jvmtop::{DetailMonitor, InstanceRow, Monitor};
use std::fmt::Write;

use crate::system;

const MAIN_CLASS_WIDTH: usize = 15;
const MAX_ARGS_WIDTH: usize = 67;

/// Bytes as whole megabytes, "n/a" for undefined (negative) values.
pub fn to_mb(bytes: i64) -> String {
    if bytes < 0 {
        return "n/a".to_string();
    }
    format!("{}m", bytes / 1024 / 1024)
}

/// Milliseconds as `HH:MMm`.
pub fn to_hhmm(millis: i64) -> String {
    format!("{:02}:{:02}m", millis / 1000 / 3600, (millis / 1000 / 60) % 60)
}

/// The `length` right-most characters of `s`.
pub fn right_str(s: &str, length: usize) -> String {
    let skip = s.chars().count().saturating_sub(length);
    s.chars().skip(skip).collect()
}

/// The `length` left-most characters of `s`.
pub fn left_str(s: &str, length: usize) -> String {
    s.chars().take(length).collect()
}

fn entry_point(display_name: &str) -> String {
    let name = display_name
        .split_once(' ')
        .map_or(display_name, |(head, _)| head);
    right_str(name, MAIN_CLASS_WIDTH)
}

/// First line of every frame.
pub fn top_bar(now: DateTime<Local>) -> String {
    let (arch, os) = system::read_uname_info()
        .map(|u| (u.machine, format!("{} {}", u.sysname, u.release)))
        .unwrap_or_default();
    let mut bar = format!(
        " JvmTop {} - {}, {:>6}, {:>2} cpus, {:<15.15}",
        env!("CARGO_PKG_VERSION"),
        now.format("%H:%M:%S"),
        arch,
        system::available_processors(),
        os,
    );
    if let Ok(load) = system::read_load_average() {
        let _ = write!(bar, ", load avg {:3.2}", load.one_min);
    }
    bar.push('\n');
    bar
}

/// A frame-producing view driven by the poll loop.
pub trait ConsoleView {
    fn render(&mut self) -> Result<String>;

    /// Set once the view has nothing more to show.
    fn should_exit(&self) -> bool {
        false
    }

    fn wants_top_bar(&self) -> bool {
        true
    }

    fn wants_clearing(&self) -> bool {
        true
    }

    /// Rows of the last completed cycle, read by the shutdown hook.
    fn published(&self) -> PublishedRows;

    fn shutdown(&mut self) {}
}

// -----------------------------------------------------------------------------
// Overview
// -----------------------------------------------------------------------------

pub fn overview_header() -> String {
    format!(
        "{:>5} {:<15.15} {:>5} {:>5} {:>5} {:>5} {:>6} {:>6} {:>5} {:>8} {:>4} {:>2}",
        "PID", "MAIN-CLASS", "HPCUR", "HPMAX", "NHCUR", "NHMAX", "CPU", "GC", "VM", "USERNAME",
        "#T", "DL"
    )
}

pub fn overview_line(row: &InstanceRow) -> String {
    let main_class = entry_point(&row.display_name);
    if let Some(marker) = row.state.error_marker() {
        return format!("{:>5} {:<25.15} {} ", row.id.0, main_class, marker);
    }

    let m = &row.metrics;
    format!(
        "{:>5} {:<15.15} {:>5} {:>5} {:>5} {:>5} {:>5.2}% {:>5.2}% {:<5.5} {:>8.8} {:>4} {:>2.2}",
        row.id.0,
        main_class,
        to_mb(m.heap.used),
        to_mb(m.heap.max),
        to_mb(m.non_heap.used),
        to_mb(m.non_heap.max),
        m.cpu_load * 100.0,
        m.gc_load * 100.0,
        row.vm_version.as_deref().unwrap_or_default(),
        row.os_user.as_deref().unwrap_or_default(),
        m.thread_count,
        if m.deadlocks_detected { "!D" } else { "" },
    )
}

/// Header plus one line per row.
pub fn overview_frame(rows: &[InstanceRow]) -> String {
    let mut out = overview_header();
    out.push('\n');
    for row in rows {
        out.push_str(&overview_line(row));
        out.push('\n');
    }
    out
}

pub struct OverviewView {
    monitor: Monitor,
}

impl OverviewView {
    pub fn new(monitor: Monitor) -> Self {
        Self { monitor }
    }
}

impl ConsoleView for OverviewView {
    fn render(&mut self) -> Result<String> {
        let rows = self.monitor.cycle()?;
        Ok(overview_frame(&rows))
    }

    fn published(&self) -> PublishedRows {
        self.monitor.published()
    }

    fn shutdown(&mut self) {
        self.monitor.shutdown();
    }
}

// -----------------------------------------------------------------------------
// Detail
// -----------------------------------------------------------------------------

pub fn detail_frame(report: &DetailReport, thread_name_width: usize, thread_limit: Option<usize>) -> String {
    let mut out = String::new();
    let row = &report.row;
    let m = &row.metrics;

    match &report.main_class {
        Some(main_class) => {
            let _ = writeln!(out, " PID {}: {} ", row.id, main_class);
            let args = report.arguments.join(" ");
            if args.chars().count() > MAX_ARGS_WIDTH {
                let _ = writeln!(out, " ARGS: {}[...]", left_str(&args, MAX_ARGS_WIDTH));
            } else {
                let _ = writeln!(out, " ARGS: {}", args);
            }
        }
        None => {
            let _ = writeln!(out, " PID {}: ", row.id);
            let _ = writeln!(out, " ARGS: [UNKNOWN] ");
        }
    }

    let _ = writeln!(out, " VMARGS: \n {}", report.input_arguments.join("\n "));
    let _ = writeln!(
        out,
        " VM: {} {} {}",
        report.vendor.as_deref().unwrap_or_default(),
        report.vm_name.as_deref().unwrap_or_default(),
        report.java_version.as_deref().unwrap_or_default()
    );
    let _ = writeln!(
        out,
        " UP: {:<7} #THR: {:<4} #THRPEAK: {:<4} #THRCREATED: {:<4} USER: {:<12}",
        to_hhmm(m.uptime_ms),
        m.thread_count,
        report.peak_thread_count,
        report.total_started_thread_count,
        row.os_user.as_deref().unwrap_or_default()
    );
    let _ = writeln!(
        out,
        " GC-Time: {:<7}  #GC-Runs: {:<8}  #TotalLoadedClasses: {:<8}",
        to_hhmm(m.gc_time_ms),
        m.gc_count,
        m.loaded_class_count
    );
    let _ = writeln!(
        out,
        " CPU: {:>5.2}% GC: {:>5.2}% HEAP:{:>5} /{:>5} NONHEAP:{:>5} /{:>5}",
        m.cpu_load * 100.0,
        m.gc_load * 100.0,
        to_mb(m.heap.used),
        to_mb(m.heap.max),
        to_mb(m.non_heap.used),
        to_mb(m.non_heap.max)
    );
    out.push('\n');
    out.push_str(&thread_table(&report.threads, thread_name_width, thread_limit));
    out
}

pub fn thread_table(threads: &ThreadReport, width: usize, limit: Option<usize>) -> String {
    let mut out = format!(
        " {:>6} {:<width$}  {:>13} {:>8}    {:>8} {:>5} \n",
        "TID", "NAME", "STATE", "CPU", "TOTALCPU", "BLOCKEDBY"
    );

    if !threads.cpu_time_supported {
        out.push_str("\n -Thread CPU telemetries are not available on the monitored jvm/platform-\n");
        return out;
    }

    for t in &threads.rows {
        let blocked_by = t.blocked_by.map(|id| id.to_string()).unwrap_or_default();
        let _ = writeln!(
            out,
            " {:>6} {:<width$}  {:>13} {:>5.2}%    {:>5.2}% {:>5} ",
            t.tid,
            left_str(&t.name, width),
            t.state,
            t.cpu_percent,
            t.total_cpu_percent,
            blocked_by
        );
    }

    if let (true, Some(limit)) = (threads.truncated, limit) {
        let _ = writeln!(
            out,
            " Note: Only top {} threads (according cpu load) are shown!",
            limit
        );
    }
    out
}

pub struct DetailView {
    monitor: DetailMonitor,
    thread_name_width: usize,
    thread_limit: Option<usize>,
    exit: bool,
}

impl DetailView {
    pub fn new(monitor: DetailMonitor, thread_name_width: usize, thread_limit: Option<usize>) -> Self {
        Self {
            monitor,
            thread_name_width,
            thread_limit,
            exit: false,
        }
    }
}

impl ConsoleView for DetailView {
    fn render(&mut self) -> Result<String> {
        match self.monitor.cycle() {
            DetailCycle::Report(report) => Ok(detail_frame(
                &report,
                self.thread_name_width,
                self.thread_limit,
            )),
            DetailCycle::FetchFailed => {
                self.exit = true;
                Ok("ERROR: Could not fetch telemetries - Process terminated?\n".to_string())
            }
            DetailCycle::NotAttached => {
                self.exit = true;
                Ok("ERROR: Could not attach to process.\n".to_string())
            }
        }
    }

    fn should_exit(&self) -> bool {
        self.exit
    }

    fn published(&self) -> PublishedRows {
        self.monitor.published()
    }

    fn shutdown(&mut self) {
        self.monitor.shutdown();
    }
}

// -----------------------------------------------------------------------------
// Stat
// -----------------------------------------------------------------------------

pub fn stat_line(row: &InstanceRow) -> String {
    let m = &row.metrics;
    format!(
        "{:>5} {:>5} {:>5.2}% {:>5.2}% {:>4} {:>2.2}",
        row.id.0,
        to_mb(m.heap.used),
        m.cpu_load * 100.0,
        m.gc_load * 100.0,
        m.thread_count,
        if m.deadlocks_detected { "!D" } else { "" },
    )
}

/// One line per iteration, no clearing, no top bar.
pub struct StatView {
    monitor: DetailMonitor,
    exit: bool,
}

impl StatView {
    pub fn new(monitor: DetailMonitor) -> Self {
        Self {
            monitor,
            exit: false,
        }
    }
}

impl ConsoleView for StatView {
    fn render(&mut self) -> Result<String> {
        match self.monitor.cycle() {
            DetailCycle::Report(report) => Ok(format!("{}\n", stat_line(&report.row))),
            DetailCycle::FetchFailed => {
                self.exit = true;
                Ok("ERROR: Could not fetch telemetries - Process terminated.\n".to_string())
            }
            DetailCycle::NotAttached => {
                self.exit = true;
                Ok("ERROR: Could not attach to process.\n".to_string())
            }
        }
    }

    fn should_exit(&self) -> bool {
        self.exit
    }

    fn wants_top_bar(&self) -> bool {
        false
    }

    fn wants_clearing(&self) -> bool {
        false
    }

    fn published(&self) -> PublishedRows {
        self.monitor.published()
    }

    fn shutdown(&mut self) {
        self.monitor.shutdown();
    }
}

/// Last reading printed by the shutdown hook.
pub fn final_reading(published: &PublishedRows) -> String {
    let rows = read_published(published);
    if rows.is_empty() {
        return String::new();
    }
    format!("\n{}", overview_frame(&rows))
}
