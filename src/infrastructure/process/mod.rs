//! OS process adapters: spawning through tokio and introspection through sysinfo.

pub mod launcher;
pub mod sysinfo_probe;

pub use launcher::TokioProcessLauncher;
pub use sysinfo_probe::SysinfoProbe;
