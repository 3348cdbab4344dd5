//! # Headroom
//!
//! Headroom runs a single command inside its own cgroup v2 group and keeps
//! adjusting that group's limits so a fixed fraction of the machine stays
//! free for everything else.
//!
//! ## Features
//!
//! - **Memory**: `memory.max` follows machine-wide available memory
//! - **CPU**: `cpu.max` follows idle CPU time between ticks
//! - **Disk I/O**: `io.max` byte rates per physical disk, against a one-time benchmark
//!
//! ## Usage
//!
//! ```no_run
//! use headroom::runtime::{GovernorConfig, Launcher};
//!
//! # async fn example() -> headroom_common::HeadroomResult<()> {
//! let launcher = Launcher::new(GovernorConfig::default().with_skip_benchmark(true));
//! let exit_code = launcher.run(&["make".to_string(), "-j8".to_string()]).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod benchmark;
pub mod cgroup;
pub mod cli;
pub mod device;
pub mod estimator;
pub mod governor;
pub mod runtime;
pub mod system;

pub use governor::{MonitorLoop, ResourceGovernor};
pub use runtime::Launcher;
