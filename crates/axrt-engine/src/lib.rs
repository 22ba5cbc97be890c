//! Session lifecycle and I/O buffer management over the ax_engine NPU driver.
//!
//! A [`Device`] brings the driver up once; each [`Session`] loads one compiled
//! model, checks it against the device's VNPU partitioning, allocates one
//! cache-coherent buffer per input and output sized for the largest shape
//! group, and runs inference through those buffers.

pub mod backend;
pub mod compat;
pub mod device;
pub mod error;
pub mod io;
pub mod memory;
pub mod metadata;
pub mod model;
pub mod session;

pub use backend::AxEngineBackend;
pub use compat::{check_compatibility, is_allowed, ModelPartition};
pub use device::Device;
pub use error::{Error, Result};
pub use io::{IoBufferEntry, IoBufferSet};
pub use memory::{Allocator, DeviceMemoryRegion, ALLOC_ALIGN, ALLOC_TOKEN};
pub use metadata::{pivot_groups, IoMetadata};
pub use model::CompiledModel;
pub use session::{Session, SessionOptions, TensorInfo};

pub use axrt_sys::{ChipType, DriverConfig, VnpuMode};
