use std::fmt;

use crate::ffi::{AxEngineIo, AxEngineIoBuffer};
use crate::DriverResult;

/// Accelerator generation, told apart by which engine symbols the driver exports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChipType {
    /// Two-core family: models compiled for the full or half NPU.
    Mc20e,
    /// Three-core family: single, dual or triple core models.
    Mc50,
    /// Single-core family; only one model partition type exists.
    M57h,
}

impl ChipType {
    /// Feature-detects the chip. The driver has no chip-id query, so the newest
    /// symbol missing decides the generation.
    pub fn probe(has_set_affinity: bool, has_total_ops: bool) -> Self {
        if !has_set_affinity {
            ChipType::M57h
        } else if !has_total_ops {
            ChipType::Mc50
        } else {
            ChipType::Mc20e
        }
    }
}

impl fmt::Display for ChipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChipType::Mc20e => "MC20E",
            ChipType::Mc50 => "MC50",
            ChipType::M57h => "M57H",
        };
        f.write_str(name)
    }
}

/// Virtual-NPU partitioning the engine was brought up with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VnpuMode {
    Disabled,
    Enabled,
    BigLittle,
    LittleBig,
}

impl VnpuMode {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(VnpuMode::Disabled),
            1 => Some(VnpuMode::Enabled),
            2 => Some(VnpuMode::BigLittle),
            3 => Some(VnpuMode::LittleBig),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            VnpuMode::Disabled => 0,
            VnpuMode::Enabled => 1,
            VnpuMode::BigLittle => 2,
            VnpuMode::LittleBig => 3,
        }
    }
}

impl fmt::Display for VnpuMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VnpuMode::Disabled => "DISABLED",
            VnpuMode::Enabled => "ENABLED",
            VnpuMode::BigLittle => "BIG_LITTLE",
            VnpuMode::LittleBig => "LITTLE_BIG",
        };
        f.write_str(name)
    }
}

/// Opaque native model handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawHandle(pub usize);

/// Opaque native execution context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawContext(pub usize);

/// One tensor record as the driver reports it for a single shape group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawTensorMeta {
    pub name: String,
    pub shape: Vec<i32>,
    pub layout: i32,
    pub data_type: i32,
    pub size: u32,
}

/// All tensor records for one shape group, copied out of driver memory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawIoInfo {
    pub inputs: Vec<RawTensorMeta>,
    pub outputs: Vec<RawTensorMeta>,
    pub max_batch_size: u32,
}

/// A device buffer as it is handed to the run call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IoBufferRef {
    pub phys: u64,
    pub virt: usize,
    pub size: u32,
}

/// Owns the native run descriptor together with the buffer arrays it points into.
pub struct IoDescriptor {
    inputs: Vec<AxEngineIoBuffer>,
    outputs: Vec<AxEngineIoBuffer>,
    raw: AxEngineIo,
}

impl IoDescriptor {
    pub fn new(inputs: &[IoBufferRef], outputs: &[IoBufferRef]) -> Self {
        let convert = |buffers: &[IoBufferRef]| {
            buffers
                .iter()
                .map(|b| AxEngineIoBuffer::new(b.phys, b.virt, b.size))
                .collect::<Vec<_>>()
        };
        Self {
            inputs: convert(inputs),
            outputs: convert(outputs),
            // Zero batch size and no io setting select the model's compiled defaults.
            raw: AxEngineIo::default(),
        }
    }

    pub fn inputs(&self) -> &[AxEngineIoBuffer] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[AxEngineIoBuffer] {
        &self.outputs
    }

    /// Pointer for the native run call, valid while `self` is borrowed.
    pub fn as_raw_mut(&mut self) -> *mut AxEngineIo {
        self.raw.inputs = self.inputs.as_mut_ptr();
        self.raw.input_size = self.inputs.len() as u32;
        self.raw.outputs = self.outputs.as_mut_ptr();
        self.raw.output_size = self.outputs.len() as u32;
        &mut self.raw
    }
}

/// The native accelerator interface.
///
/// Every call that can fail reports a [`crate::DriverError`] carrying the
/// native status; callers translate those into their own error taxonomy.
pub trait Driver: Send + Sync {
    fn sys_init(&self) -> DriverResult<()>;
    fn sys_deinit(&self) -> DriverResult<()>;
    fn engine_init(&self, mode: VnpuMode) -> DriverResult<()>;
    fn engine_deinit(&self) -> DriverResult<()>;

    fn chip_type(&self) -> ChipType;
    fn vnpu_mode(&self) -> DriverResult<VnpuMode>;
    fn engine_version(&self) -> String;

    /// Returns `(physical, virtual)` addresses of the new region.
    fn mem_alloc(&self, size: u32, align: u32, token: &str, cached: bool)
        -> DriverResult<(u64, usize)>;
    fn mem_free(&self, phys: u64, virt: usize) -> DriverResult<()>;
    fn flush_cache(&self, phys: u64, virt: usize, size: u32) -> DriverResult<()>;
    fn invalidate_cache(&self, phys: u64, virt: usize, size: u32) -> DriverResult<()>;

    /// Raw core-partition type the model blob was compiled for.
    fn model_type(&self, model: &[u8]) -> DriverResult<i32>;
    fn create_handle(&self, model: &[u8], name: &str, npu_set: u32) -> DriverResult<RawHandle>;
    fn create_context(&self, handle: RawHandle) -> DriverResult<RawContext>;
    fn destroy_handle(&self, handle: RawHandle) -> DriverResult<()>;
    fn tool_version(&self, handle: RawHandle) -> String;

    /// `Ok(None)` when the driver predates multi-group models.
    fn group_count(&self, handle: RawHandle) -> DriverResult<Option<u32>>;
    fn io_info(&self, handle: RawHandle) -> DriverResult<RawIoInfo>;
    fn group_io_info(&self, handle: RawHandle, index: u32) -> DriverResult<RawIoInfo>;

    fn run_sync(
        &self,
        handle: RawHandle,
        context: RawContext,
        io: &mut IoDescriptor,
    ) -> DriverResult<()>;
    fn run_group_sync(
        &self,
        handle: RawHandle,
        context: RawContext,
        index: u32,
        io: &mut IoDescriptor,
    ) -> DriverResult<()>;
}
