//! Emulator for a two-processor sprite console: a main Z80 and a Z80 that
//! acts as the picture processor, sharing table RAM and driven by one beam.

pub mod bus;
pub mod config;
pub mod cpu;
pub mod cpu_bus;
pub mod debug_flags;
pub mod debugger;
pub mod demo;
pub mod display;
pub mod error;
pub mod instrumentation;
pub mod machine;
pub mod memory;
pub mod ppu;
pub mod rom;
pub mod scheduler;
pub mod snapshot;
#[cfg(feature = "window")]
pub mod window;

pub use config::Profile;
pub use error::{Anomaly, EmuError};
pub use machine::Machine;
