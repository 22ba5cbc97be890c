//! Driver interface for the ax_sys / ax_engine NPU libraries.
//!
//! [`Driver`] is the seam the runtime calls through; [`AxDriver`] binds the
//! vendor shared libraries at run time with `libloading`.

pub mod config;
pub mod driver;
pub mod dynamic;
pub mod error;
pub mod ffi;

pub use config::*;
pub use driver::*;
pub use dynamic::AxDriver;
pub use error::{check, DriverError, DriverResult};
