use std::ffi::{c_char, c_void, CStr, CString};

use libloading::Library;
use tracing::debug;

use crate::error::check;
use crate::ffi::*;
use crate::{
    ChipType, Driver, DriverConfig, DriverError, DriverResult, IoDescriptor, RawContext,
    RawHandle, RawIoInfo, RawTensorMeta, VnpuMode,
};

struct SysFns {
    init: SysInitFn,
    deinit: SysInitFn,
    mem_alloc: SysMemAllocFn,
    mem_alloc_cached: SysMemAllocFn,
    mem_free: SysMemFreeFn,
    flush: SysCacheFn,
    invalidate: SysCacheFn,
}

struct EngineFns {
    init: EngineInitFn,
    deinit: EngineDeinitFn,
    create_handle: EngineCreateHandleFn,
    create_context: EngineCreateContextFn,
    destroy_handle: EngineDestroyHandleFn,
    get_io_info: EngineGetIoInfoFn,
    run_sync: EngineRunSyncFn,
    get_version: Option<EngineGetVersionFn>,
    get_vnpu_attr: Option<EngineGetVnpuAttrFn>,
    get_model_type: Option<EngineGetModelTypeFn>,
    get_tools_version: Option<EngineGetToolsVersionFn>,
    get_group_count: Option<EngineGetGroupCountFn>,
    get_group_io_info: Option<EngineGetGroupIoInfoFn>,
    run_group_sync: Option<EngineRunGroupSyncFn>,
}

/// Driver bound to the vendor `ax_sys` and `ax_engine` shared libraries.
pub struct AxDriver {
    sys: SysFns,
    engine: EngineFns,
    chip: ChipType,
    // The function pointers above stay valid only while these are loaded.
    _sys_lib: Library,
    _engine_lib: Library,
}

impl AxDriver {
    pub fn load(config: &DriverConfig) -> DriverResult<Self> {
        let sys_lib = open_library(&config.sys_library)?;
        let engine_lib = open_library(&config.engine_library)?;

        let sys = SysFns {
            init: required(&sys_lib, "AX_SYS_Init")?,
            deinit: required(&sys_lib, "AX_SYS_Deinit")?,
            mem_alloc: required(&sys_lib, "AX_SYS_MemAlloc")?,
            mem_alloc_cached: required(&sys_lib, "AX_SYS_MemAllocCached")?,
            mem_free: required(&sys_lib, "AX_SYS_MemFree")?,
            flush: required(&sys_lib, "AX_SYS_MflushCache")?,
            invalidate: required(&sys_lib, "AX_SYS_MinvalidateCache")?,
        };

        let engine = EngineFns {
            init: required(&engine_lib, "AX_ENGINE_Init")?,
            deinit: required(&engine_lib, "AX_ENGINE_Deinit")?,
            create_handle: required(&engine_lib, "AX_ENGINE_CreateHandleV2")?,
            create_context: required(&engine_lib, "AX_ENGINE_CreateContextV2")?,
            destroy_handle: required(&engine_lib, "AX_ENGINE_DestroyHandle")?,
            get_io_info: required(&engine_lib, "AX_ENGINE_GetIOInfo")?,
            run_sync: required(&engine_lib, "AX_ENGINE_RunSyncV2")?,
            get_version: optional(&engine_lib, "AX_ENGINE_GetVersion"),
            get_vnpu_attr: optional(&engine_lib, "AX_ENGINE_GetVNPUAttr"),
            get_model_type: optional(&engine_lib, "AX_ENGINE_GetModelType"),
            get_tools_version: optional(&engine_lib, "AX_ENGINE_GetModelToolsVersion"),
            get_group_count: optional(&engine_lib, "AX_ENGINE_GetGroupIOInfoCount"),
            get_group_io_info: optional(&engine_lib, "AX_ENGINE_GetGroupIOInfo"),
            run_group_sync: optional(&engine_lib, "AX_ENGINE_RunGroupIOSync"),
        };

        let chip = ChipType::probe(
            has_symbol(&engine_lib, "AX_ENGINE_SetAffinity"),
            has_symbol(&engine_lib, "AX_ENGINE_GetTotalOps"),
        );

        debug!(
            sys = %config.sys_library,
            engine = %config.engine_library,
            %chip,
            "ax driver libraries loaded"
        );

        Ok(Self {
            sys,
            engine,
            chip,
            _sys_lib: sys_lib,
            _engine_lib: engine_lib,
        })
    }
}

fn open_library(name: &str) -> DriverResult<Library> {
    // SAFETY: loading the vendor library runs only its own initializers.
    unsafe { Library::new(name) }.map_err(|source| DriverError::LibraryLoad {
        library: name.to_string(),
        source,
    })
}

fn required<T: Copy>(lib: &Library, name: &'static str) -> DriverResult<T> {
    // SAFETY: T is the function signature declared for `name` in the vendor headers.
    let symbol = unsafe { lib.get::<T>(name.as_bytes()) }
        .map_err(|_| DriverError::MissingSymbol(name))?;
    Ok(*symbol)
}

fn optional<T: Copy>(lib: &Library, name: &'static str) -> Option<T> {
    let symbol = required(lib, name).ok();
    if symbol.is_none() {
        debug!(symbol = name, "optional ax_engine symbol not exported");
    }
    symbol
}

fn has_symbol(lib: &Library, name: &'static str) -> bool {
    // SAFETY: only the symbol address is inspected, it is never called.
    unsafe { lib.get::<*const c_void>(name.as_bytes()) }.is_ok()
}

fn model_len(call: &'static str, model: &[u8]) -> DriverResult<u32> {
    u32::try_from(model.len()).map_err(|_| DriverError::InvalidData {
        call,
        reason: format!("model blob of {} bytes exceeds u32", model.len()),
    })
}

fn owned_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: the driver returns NUL-terminated static strings.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// Copies one group's tensor records out of driver-owned memory.
///
/// # Safety
/// `info` must be null or point at a live `AX_ENGINE_IO_INFO_T`.
unsafe fn read_io_info(call: &'static str, info: *const AxEngineIoInfo) -> DriverResult<RawIoInfo> {
    if info.is_null() {
        return Err(DriverError::InvalidData {
            call,
            reason: "null io info".to_string(),
        });
    }
    // SAFETY: checked non-null above; the caller guarantees it is live.
    let info = unsafe { &*info };
    // SAFETY: the arrays and their counts come from the same driver record.
    let (inputs, outputs) = unsafe {
        (
            read_metas(call, info.inputs, info.input_size)?,
            read_metas(call, info.outputs, info.output_size)?,
        )
    };
    Ok(RawIoInfo {
        inputs,
        outputs,
        max_batch_size: info.max_batch_size,
    })
}

unsafe fn read_metas(
    call: &'static str,
    metas: *const AxEngineIoMeta,
    count: u32,
) -> DriverResult<Vec<RawTensorMeta>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    if metas.is_null() {
        return Err(DriverError::InvalidData {
            call,
            reason: format!("null tensor array with {count} entries"),
        });
    }
    // SAFETY: the driver reports `count` contiguous records at `metas`.
    let metas = unsafe { std::slice::from_raw_parts(metas, count as usize) };
    Ok(metas
        .iter()
        .map(|meta| {
            let shape = if meta.shape.is_null() || meta.shape_size == 0 {
                Vec::new()
            } else {
                // SAFETY: `shape_size` dims live at `shape`.
                unsafe { std::slice::from_raw_parts(meta.shape, meta.shape_size as usize) }
                    .to_vec()
            };
            RawTensorMeta {
                name: owned_string(meta.name),
                shape,
                layout: meta.layout,
                data_type: meta.data_type,
                size: meta.size,
            }
        })
        .collect())
}

impl Driver for AxDriver {
    fn sys_init(&self) -> DriverResult<()> {
        // SAFETY: no arguments; the vendor call is safe to invoke once per process.
        check("AX_SYS_Init", unsafe { (self.sys.init)() })
    }

    fn sys_deinit(&self) -> DriverResult<()> {
        // SAFETY: paired with a successful `sys_init`.
        check("AX_SYS_Deinit", unsafe { (self.sys.deinit)() })
    }

    fn engine_init(&self, mode: VnpuMode) -> DriverResult<()> {
        let mut attr = AxEngineNpuAttr {
            hard_mode: mode.as_raw(),
            ..AxEngineNpuAttr::default()
        };
        // SAFETY: `attr` outlives the call.
        check("AX_ENGINE_Init", unsafe { (self.engine.init)(&mut attr) })
    }

    fn engine_deinit(&self) -> DriverResult<()> {
        // SAFETY: paired with a successful `engine_init`.
        check("AX_ENGINE_Deinit", unsafe { (self.engine.deinit)() })
    }

    fn chip_type(&self) -> ChipType {
        self.chip
    }

    fn vnpu_mode(&self) -> DriverResult<VnpuMode> {
        let get = self
            .engine
            .get_vnpu_attr
            .ok_or(DriverError::MissingSymbol("AX_ENGINE_GetVNPUAttr"))?;
        let mut attr = AxEngineNpuAttr::default();
        // SAFETY: `attr` outlives the call.
        check("AX_ENGINE_GetVNPUAttr", unsafe { get(&mut attr) })?;
        VnpuMode::from_raw(attr.hard_mode).ok_or_else(|| DriverError::InvalidData {
            call: "AX_ENGINE_GetVNPUAttr",
            reason: format!("unknown vnpu mode {}", attr.hard_mode),
        })
    }

    fn engine_version(&self) -> String {
        match self.engine.get_version {
            // SAFETY: returns a static string owned by the library.
            Some(get) => owned_string(unsafe { get() }),
            None => String::new(),
        }
    }

    fn mem_alloc(
        &self,
        size: u32,
        align: u32,
        token: &str,
        cached: bool,
    ) -> DriverResult<(u64, usize)> {
        let token = CString::new(token).map_err(|_| DriverError::InvalidData {
            call: "AX_SYS_MemAlloc",
            reason: "allocator token contains NUL".to_string(),
        })?;
        let (call, alloc) = if cached {
            ("AX_SYS_MemAllocCached", self.sys.mem_alloc_cached)
        } else {
            ("AX_SYS_MemAlloc", self.sys.mem_alloc)
        };
        let mut phys = 0u64;
        let mut virt: *mut c_void = std::ptr::null_mut();
        // SAFETY: out-pointers and the token outlive the call.
        check(call, unsafe {
            alloc(&mut phys, &mut virt, size, align, token.as_ptr())
        })?;
        Ok((phys, virt as usize))
    }

    fn mem_free(&self, phys: u64, virt: usize) -> DriverResult<()> {
        // SAFETY: the pair came from `mem_alloc` and is freed once by the owner.
        check("AX_SYS_MemFree", unsafe {
            (self.sys.mem_free)(phys, virt as *mut c_void)
        })
    }

    fn flush_cache(&self, phys: u64, virt: usize, size: u32) -> DriverResult<()> {
        // SAFETY: `size` never exceeds the region allocated at `phys`/`virt`.
        check("AX_SYS_MflushCache", unsafe {
            (self.sys.flush)(phys, virt as *mut c_void, size)
        })
    }

    fn invalidate_cache(&self, phys: u64, virt: usize, size: u32) -> DriverResult<()> {
        // SAFETY: `size` never exceeds the region allocated at `phys`/`virt`.
        check("AX_SYS_MinvalidateCache", unsafe {
            (self.sys.invalidate)(phys, virt as *mut c_void, size)
        })
    }

    fn model_type(&self, model: &[u8]) -> DriverResult<i32> {
        let get = self
            .engine
            .get_model_type
            .ok_or(DriverError::MissingSymbol("AX_ENGINE_GetModelType"))?;
        let len = model_len("AX_ENGINE_GetModelType", model)?;
        let mut raw = 0i32;
        // SAFETY: the blob is only read for the duration of the call.
        check("AX_ENGINE_GetModelType", unsafe {
            get(model.as_ptr().cast(), len, &mut raw)
        })?;
        Ok(raw)
    }

    fn create_handle(&self, model: &[u8], name: &str, npu_set: u32) -> DriverResult<RawHandle> {
        let len = model_len("AX_ENGINE_CreateHandleV2", model)?;
        let name = CString::new(name).map_err(|_| DriverError::InvalidData {
            call: "AX_ENGINE_CreateHandleV2",
            reason: "handle name contains NUL".to_string(),
        })?;
        let mut extra = AxEngineHandleExtra {
            npu_set,
            name: name.as_ptr(),
            reserve: [0; 8],
        };
        let mut handle: AxHandle = std::ptr::null_mut();
        // SAFETY: blob, name and extra outlive the call; the caller keeps the blob
        // alive for as long as the handle exists.
        check("AX_ENGINE_CreateHandleV2", unsafe {
            (self.engine.create_handle)(&mut handle, model.as_ptr().cast(), len, &mut extra)
        })?;
        Ok(RawHandle(handle as usize))
    }

    fn create_context(&self, handle: RawHandle) -> DriverResult<RawContext> {
        let mut context: AxContext = std::ptr::null_mut();
        // SAFETY: `handle` is a live handle from `create_handle`.
        check("AX_ENGINE_CreateContextV2", unsafe {
            (self.engine.create_context)(handle.0 as AxHandle, &mut context)
        })?;
        Ok(RawContext(context as usize))
    }

    fn destroy_handle(&self, handle: RawHandle) -> DriverResult<()> {
        // SAFETY: the owner destroys each handle exactly once.
        check("AX_ENGINE_DestroyHandle", unsafe {
            (self.engine.destroy_handle)(handle.0 as AxHandle)
        })
    }

    fn tool_version(&self, handle: RawHandle) -> String {
        match self.engine.get_tools_version {
            // SAFETY: `handle` is live; the string is owned by the handle.
            Some(get) => owned_string(unsafe { get(handle.0 as AxHandle) }),
            None => String::new(),
        }
    }

    fn group_count(&self, handle: RawHandle) -> DriverResult<Option<u32>> {
        let Some(get) = self.engine.get_group_count else {
            return Ok(None);
        };
        let mut count = 0u32;
        // SAFETY: `handle` is live and `count` outlives the call.
        check("AX_ENGINE_GetGroupIOInfoCount", unsafe {
            get(handle.0 as AxHandle, &mut count)
        })?;
        Ok(Some(count))
    }

    fn io_info(&self, handle: RawHandle) -> DriverResult<RawIoInfo> {
        let mut info: *mut AxEngineIoInfo = std::ptr::null_mut();
        // SAFETY: `handle` is live; `info` receives a pointer owned by the handle.
        check("AX_ENGINE_GetIOInfo", unsafe {
            (self.engine.get_io_info)(handle.0 as AxHandle, &mut info)
        })?;
        // SAFETY: on success the driver filled `info` with a live record.
        unsafe { read_io_info("AX_ENGINE_GetIOInfo", info) }
    }

    fn group_io_info(&self, handle: RawHandle, index: u32) -> DriverResult<RawIoInfo> {
        let get = self
            .engine
            .get_group_io_info
            .ok_or(DriverError::MissingSymbol("AX_ENGINE_GetGroupIOInfo"))?;
        let mut info: *mut AxEngineIoInfo = std::ptr::null_mut();
        // SAFETY: `handle` is live; `info` receives a pointer owned by the handle.
        check("AX_ENGINE_GetGroupIOInfo", unsafe {
            get(handle.0 as AxHandle, index, &mut info)
        })?;
        // SAFETY: on success the driver filled `info` with a live record.
        unsafe { read_io_info("AX_ENGINE_GetGroupIOInfo", info) }
    }

    fn run_sync(
        &self,
        handle: RawHandle,
        context: RawContext,
        io: &mut IoDescriptor,
    ) -> DriverResult<()> {
        // SAFETY: handle/context are live and `io` points at allocated device buffers.
        check("AX_ENGINE_RunSyncV2", unsafe {
            (self.engine.run_sync)(
                handle.0 as AxHandle,
                context.0 as AxContext,
                io.as_raw_mut(),
            )
        })
    }

    fn run_group_sync(
        &self,
        handle: RawHandle,
        context: RawContext,
        index: u32,
        io: &mut IoDescriptor,
    ) -> DriverResult<()> {
        let run = self
            .engine
            .run_group_sync
            .ok_or(DriverError::MissingSymbol("AX_ENGINE_RunGroupIOSync"))?;
        // SAFETY: handle/context are live and `io` points at allocated device buffers.
        check("AX_ENGINE_RunGroupIOSync", unsafe {
            run(
                handle.0 as AxHandle,
                context.0 as AxContext,
                index,
                io.as_raw_mut(),
            )
        })
    }
}
