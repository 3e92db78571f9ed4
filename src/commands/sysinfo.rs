//! Sysinfo command implementation.

use crate::system::host_info;

/// Prints the host information the top bar is built from.
pub fn command_sysinfo() -> Result<(), Box<dyn std::error::Error>> {
    let info = host_info();

    println!("🖥️  Host information");
    println!("===================");
    println!("Processors: {}", info.processors);
    match &info.uname {
        Some(uname) => println!(
            "Kernel:     {} {} ({})",
            uname.sysname, uname.release, uname.machine
        ),
        None => println!("Kernel:     unknown"),
    }
    match &info.load_average {
        Some(load) => println!(
            "Load:       {:.2} {:.2} {:.2}",
            load.one_min, load.five_min, load.fifteen_min
        ),
        None => println!("Load:       unavailable"),
    }
    if let Some(uptime) = info.uptime_secs {
        println!("Uptime:     {:.0}s", uptime);
    }

    Ok(())
}
