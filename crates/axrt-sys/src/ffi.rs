//! `#[repr(C)]` mirrors of the ax_engine structures.
//!
//! Field order, widths and reserved tails follow the vendor headers exactly;
//! the reserved tails differ between 32-bit and 64-bit targets.

use std::ffi::{c_char, c_void};

pub type AxS32 = i32;
pub type AxHandle = *mut c_void;
pub type AxContext = *mut c_void;

pub const AX_ENGINE_DT_UNKNOWN: i32 = 0;
pub const AX_ENGINE_DT_UINT8: i32 = 1;
pub const AX_ENGINE_DT_UINT16: i32 = 2;
pub const AX_ENGINE_DT_FLOAT32: i32 = 3;
pub const AX_ENGINE_DT_SINT16: i32 = 4;
pub const AX_ENGINE_DT_SINT8: i32 = 5;
pub const AX_ENGINE_DT_SINT32: i32 = 6;
pub const AX_ENGINE_DT_UINT32: i32 = 7;
pub const AX_ENGINE_DT_FLOAT64: i32 = 8;
pub const AX_ENGINE_DT_BFLOAT16: i32 = 9;

pub const AX_ENGINE_TENSOR_LAYOUT_UNKNOWN: i32 = 0;
pub const AX_ENGINE_TENSOR_LAYOUT_NHWC: i32 = 1;
pub const AX_ENGINE_TENSOR_LAYOUT_NCHW: i32 = 2;

#[cfg(target_pointer_width = "64")]
mod reserved {
    pub const META: usize = 9;
    pub const IO_INFO: usize = 11;
    pub const IO_BUFFER: usize = 11;
    pub const IO: usize = 11;
}

#[cfg(not(target_pointer_width = "64"))]
mod reserved {
    pub const META: usize = 11;
    pub const IO_INFO: usize = 13;
    pub const IO_BUFFER: usize = 13;
    pub const IO: usize = 13;
}

/// `AX_ENGINE_NPU_ATTR_T`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct AxEngineNpuAttr {
    pub hard_mode: i32,
    pub reserve: [u32; 8],
}

/// `AX_ENGINE_HANDLE_EXTRA_T`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct AxEngineHandleExtra {
    pub npu_set: u32,
    pub name: *const c_char,
    pub reserve: [u32; 8],
}

/// `AX_ENGINE_IOMETA_EX_T`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct AxEngineIoMetaEx {
    pub color_space: i32,
    pub reserved: [u64; 18],
}

/// `AX_ENGINE_IO_SETTING_T`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct AxEngineIoSetting {
    pub wbt_index: u32,
    pub reserved: [u64; 7],
}

/// `AX_ENGINE_IOMETA_T`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct AxEngineIoMeta {
    pub name: *const c_char,
    pub shape: *const i32,
    pub shape_size: u8,
    pub layout: i32,
    pub memory_type: i32,
    pub data_type: i32,
    pub extra_meta: *const AxEngineIoMetaEx,
    pub size: u32,
    pub quantization_value: u32,
    pub stride: *const i32,
    pub reserved: [u64; reserved::META],
}

/// `AX_ENGINE_IO_INFO_T`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct AxEngineIoInfo {
    pub inputs: *const AxEngineIoMeta,
    pub input_size: u32,
    pub outputs: *const AxEngineIoMeta,
    pub output_size: u32,
    pub max_batch_size: u32,
    pub dynamic_batch_size: i32,
    pub reserved: [u64; reserved::IO_INFO],
}

/// `AX_ENGINE_IO_BUFFER_T`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct AxEngineIoBuffer {
    pub phy_addr: u64,
    pub vir_addr: *mut c_void,
    pub size: u32,
    pub stride: *mut i32,
    pub stride_size: u8,
    pub reserved: [u64; reserved::IO_BUFFER],
}

impl AxEngineIoBuffer {
    pub fn new(phy_addr: u64, vir_addr: usize, size: u32) -> Self {
        Self {
            phy_addr,
            vir_addr: vir_addr as *mut c_void,
            size,
            stride: std::ptr::null_mut(),
            stride_size: 0,
            reserved: [0; reserved::IO_BUFFER],
        }
    }
}

/// `AX_ENGINE_IO_T`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct AxEngineIo {
    pub inputs: *mut AxEngineIoBuffer,
    pub input_size: u32,
    pub outputs: *mut AxEngineIoBuffer,
    pub output_size: u32,
    pub batch_size: u32,
    pub io_setting: *mut AxEngineIoSetting,
    #[cfg(target_pointer_width = "64")]
    pub parallel_run: u32,
    pub reserved: [u64; reserved::IO],
}

impl Default for AxEngineIo {
    fn default() -> Self {
        Self {
            inputs: std::ptr::null_mut(),
            input_size: 0,
            outputs: std::ptr::null_mut(),
            output_size: 0,
            batch_size: 0,
            io_setting: std::ptr::null_mut(),
            #[cfg(target_pointer_width = "64")]
            parallel_run: 0,
            reserved: [0; reserved::IO],
        }
    }
}

pub type SysInitFn = unsafe extern "C" fn() -> AxS32;
pub type SysMemAllocFn =
    unsafe extern "C" fn(*mut u64, *mut *mut c_void, u32, u32, *const c_char) -> AxS32;
pub type SysMemFreeFn = unsafe extern "C" fn(u64, *mut c_void) -> AxS32;
pub type SysCacheFn = unsafe extern "C" fn(u64, *mut c_void, u32) -> AxS32;

pub type EngineInitFn = unsafe extern "C" fn(*mut AxEngineNpuAttr) -> AxS32;
pub type EngineDeinitFn = unsafe extern "C" fn() -> AxS32;
pub type EngineGetVersionFn = unsafe extern "C" fn() -> *const c_char;
pub type EngineGetVnpuAttrFn = unsafe extern "C" fn(*mut AxEngineNpuAttr) -> AxS32;
pub type EngineGetModelTypeFn = unsafe extern "C" fn(*const c_void, u32, *mut i32) -> AxS32;
pub type EngineCreateHandleFn =
    unsafe extern "C" fn(*mut AxHandle, *const c_void, u32, *mut AxEngineHandleExtra) -> AxS32;
pub type EngineCreateContextFn = unsafe extern "C" fn(AxHandle, *mut AxContext) -> AxS32;
pub type EngineDestroyHandleFn = unsafe extern "C" fn(AxHandle) -> AxS32;
pub type EngineGetToolsVersionFn = unsafe extern "C" fn(AxHandle) -> *const c_char;
pub type EngineGetIoInfoFn = unsafe extern "C" fn(AxHandle, *mut *mut AxEngineIoInfo) -> AxS32;
pub type EngineGetGroupCountFn = unsafe extern "C" fn(AxHandle, *mut u32) -> AxS32;
pub type EngineGetGroupIoInfoFn =
    unsafe extern "C" fn(AxHandle, u32, *mut *mut AxEngineIoInfo) -> AxS32;
pub type EngineRunSyncFn = unsafe extern "C" fn(AxHandle, AxContext, *mut AxEngineIo) -> AxS32;
pub type EngineRunGroupSyncFn =
    unsafe extern "C" fn(AxHandle, AxContext, u32, *mut AxEngineIo) -> AxS32;
