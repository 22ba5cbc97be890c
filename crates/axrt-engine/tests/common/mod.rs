#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use axrt_engine::Device;
use axrt_sys::ffi::*;
use axrt_sys::{
    ChipType, Driver, DriverError, DriverResult, IoDescriptor, RawContext, RawHandle, RawIoInfo,
    RawTensorMeta, VnpuMode,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    SysInit,
    SysDeinit,
    EngineInit(VnpuMode),
    EngineDeinit,
    Alloc {
        size: u32,
        align: u32,
        token: String,
        cached: bool,
    },
    Free {
        phys: u64,
    },
    Flush {
        phys: u64,
        size: u32,
    },
    Invalidate {
        phys: u64,
        size: u32,
    },
    ModelType,
    CreateHandle {
        name: String,
        npu_set: u32,
    },
    CreateContext,
    DestroyHandle,
    GroupCount,
    IoInfo,
    GroupIoInfo(u32),
    RunSync,
    RunGroupSync(u32),
}

#[derive(Clone, Debug)]
pub struct FakeConfig {
    pub chip: ChipType,
    /// `None` makes the vnpu query fail.
    pub vnpu: Option<VnpuMode>,
    pub model_type: i32,
    /// Makes the model type query fail, as on drivers without it.
    pub fail_model_type: bool,
    pub groups: Vec<RawIoInfo>,
    /// `false` behaves like a driver without the group-count symbol.
    pub reports_groups: bool,
    /// Zero-based index of the allocation that fails.
    pub fail_alloc_at: Option<usize>,
    pub fail_engine_init: bool,
    pub fail_context: bool,
    pub fail_group_count: bool,
    pub fail_io_info: bool,
    pub fail_run: bool,
}

impl FakeConfig {
    /// A healthy three-core chip with vnpu disabled and a single-core model.
    pub fn new(groups: Vec<RawIoInfo>) -> Self {
        Self {
            chip: ChipType::Mc50,
            vnpu: Some(VnpuMode::Disabled),
            model_type: 0,
            fail_model_type: false,
            groups,
            reports_groups: true,
            fail_alloc_at: None,
            fail_engine_init: false,
            fail_context: false,
            fail_group_count: false,
            fail_io_info: false,
            fail_run: false,
        }
    }
}

struct Block {
    virt: usize,
    memory: Box<[u8]>,
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    memory: HashMap<u64, Block>,
    next_phys: u64,
    allocations: usize,
    invalid_frees: usize,
    live_handles: usize,
    fail_run: bool,
}

/// Host-memory stand-in for the NPU driver.
///
/// "Device" memory is plain heap memory. A run copies the first input's bytes
/// into every output and fills the remainder with `group + 1`.
pub struct FakeDriver {
    config: FakeConfig,
    state: Mutex<State>,
}

impl FakeDriver {
    pub fn new(groups: Vec<RawIoInfo>) -> Self {
        Self::with_config(FakeConfig::new(groups))
    }

    pub fn with_config(config: FakeConfig) -> Self {
        let state = State {
            next_phys: 0x1000_0000,
            fail_run: config.fail_run,
            ..State::default()
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn record(&self, call: Call) {
        self.state().calls.push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn live_allocations(&self) -> usize {
        self.state().memory.len()
    }

    pub fn invalid_frees(&self) -> usize {
        self.state().invalid_frees
    }

    pub fn live_handles(&self) -> usize {
        self.state().live_handles
    }

    pub fn set_fail_run(&self, fail: bool) {
        self.state().fail_run = fail;
    }

    /// Bytes currently held in the region at `phys`.
    pub fn memory(&self, phys: u64) -> Option<Vec<u8>> {
        self.state().memory.get(&phys).map(|b| b.memory.to_vec())
    }

    /// Simulates a device write into the region at `phys`.
    pub fn device_write(&self, phys: u64, data: &[u8]) {
        let mut state = self.state();
        let block = state.memory.get_mut(&phys).unwrap();
        block.memory[..data.len()].copy_from_slice(data);
    }

    fn status(call: &'static str) -> DriverError {
        DriverError::Status { call, code: -1 }
    }

    fn execute(&self, group: u32, io: &IoDescriptor) {
        let mut state = self.state();
        let source = io
            .inputs()
            .first()
            .and_then(|input| state.memory.get(&input.phy_addr))
            .map(|block| block.memory.to_vec())
            .unwrap_or_default();

        for output in io.outputs() {
            let block = state.memory.get_mut(&output.phy_addr).unwrap();
            assert_eq!(block.virt, output.vir_addr as usize);
            let len = (output.size as usize).min(block.memory.len());
            let copied = source.len().min(len);
            block.memory[..copied].copy_from_slice(&source[..copied]);
            block.memory[copied..len].fill(group as u8 + 1);
        }
    }
}

impl Driver for FakeDriver {
    fn sys_init(&self) -> DriverResult<()> {
        self.record(Call::SysInit);
        Ok(())
    }

    fn sys_deinit(&self) -> DriverResult<()> {
        self.record(Call::SysDeinit);
        Ok(())
    }

    fn engine_init(&self, mode: VnpuMode) -> DriverResult<()> {
        self.record(Call::EngineInit(mode));
        if self.config.fail_engine_init {
            return Err(Self::status("AX_ENGINE_Init"));
        }
        Ok(())
    }

    fn engine_deinit(&self) -> DriverResult<()> {
        self.record(Call::EngineDeinit);
        Ok(())
    }

    fn chip_type(&self) -> ChipType {
        self.config.chip
    }

    fn vnpu_mode(&self) -> DriverResult<VnpuMode> {
        self.config
            .vnpu
            .ok_or_else(|| Self::status("AX_ENGINE_GetVNPUAttr"))
    }

    fn engine_version(&self) -> String {
        "fake-engine 1.0".to_string()
    }

    fn mem_alloc(
        &self,
        size: u32,
        align: u32,
        token: &str,
        cached: bool,
    ) -> DriverResult<(u64, usize)> {
        let mut state = self.state();
        state.calls.push(Call::Alloc {
            size,
            align,
            token: token.to_string(),
            cached,
        });
        let index = state.allocations;
        state.allocations += 1;
        if self.config.fail_alloc_at == Some(index) {
            return Err(Self::status("AX_SYS_MemAllocCached"));
        }

        let memory = vec![0u8; size.max(1) as usize].into_boxed_slice();
        let virt = memory.as_ptr() as usize;
        let phys = state.next_phys;
        state.next_phys += u64::from(size.max(1)).next_multiple_of(u64::from(align));
        state.memory.insert(phys, Block { virt, memory });
        Ok((phys, virt))
    }

    fn mem_free(&self, phys: u64, virt: usize) -> DriverResult<()> {
        let mut state = self.state();
        state.calls.push(Call::Free { phys });
        match state.memory.remove(&phys) {
            Some(block) if block.virt == virt => Ok(()),
            _ => {
                state.invalid_frees += 1;
                Err(Self::status("AX_SYS_MemFree"))
            }
        }
    }

    fn flush_cache(&self, phys: u64, _virt: usize, size: u32) -> DriverResult<()> {
        self.record(Call::Flush { phys, size });
        Ok(())
    }

    fn invalidate_cache(&self, phys: u64, _virt: usize, size: u32) -> DriverResult<()> {
        self.record(Call::Invalidate { phys, size });
        Ok(())
    }

    fn model_type(&self, _model: &[u8]) -> DriverResult<i32> {
        self.record(Call::ModelType);
        if self.config.fail_model_type {
            return Err(DriverError::MissingSymbol("AX_ENGINE_GetModelType"));
        }
        Ok(self.config.model_type)
    }

    fn create_handle(&self, _model: &[u8], name: &str, npu_set: u32) -> DriverResult<RawHandle> {
        let mut state = self.state();
        state.calls.push(Call::CreateHandle {
            name: name.to_string(),
            npu_set,
        });
        state.live_handles += 1;
        Ok(RawHandle(0xa000))
    }

    fn create_context(&self, _handle: RawHandle) -> DriverResult<RawContext> {
        self.record(Call::CreateContext);
        if self.config.fail_context {
            return Err(Self::status("AX_ENGINE_CreateContextV2"));
        }
        Ok(RawContext(0xc000))
    }

    fn destroy_handle(&self, _handle: RawHandle) -> DriverResult<()> {
        let mut state = self.state();
        state.calls.push(Call::DestroyHandle);
        state.live_handles -= 1;
        Ok(())
    }

    fn tool_version(&self, _handle: RawHandle) -> String {
        "fake-pulsar 2.0".to_string()
    }

    fn group_count(&self, _handle: RawHandle) -> DriverResult<Option<u32>> {
        self.record(Call::GroupCount);
        if !self.config.reports_groups {
            return Ok(None);
        }
        if self.config.fail_group_count {
            return Err(Self::status("AX_ENGINE_GetGroupIOInfoCount"));
        }
        Ok(Some(self.config.groups.len() as u32))
    }

    fn io_info(&self, _handle: RawHandle) -> DriverResult<RawIoInfo> {
        self.record(Call::IoInfo);
        if self.config.fail_io_info {
            return Err(Self::status("AX_ENGINE_GetIOInfo"));
        }
        Ok(self.config.groups[0].clone())
    }

    fn group_io_info(&self, _handle: RawHandle, index: u32) -> DriverResult<RawIoInfo> {
        self.record(Call::GroupIoInfo(index));
        if self.config.fail_io_info {
            return Err(Self::status("AX_ENGINE_GetGroupIOInfo"));
        }
        Ok(self.config.groups[index as usize].clone())
    }

    fn run_sync(
        &self,
        _handle: RawHandle,
        _context: RawContext,
        io: &mut IoDescriptor,
    ) -> DriverResult<()> {
        self.record(Call::RunSync);
        if self.state().fail_run {
            return Err(Self::status("AX_ENGINE_RunSyncV2"));
        }
        self.execute(0, io);
        Ok(())
    }

    fn run_group_sync(
        &self,
        _handle: RawHandle,
        _context: RawContext,
        index: u32,
        io: &mut IoDescriptor,
    ) -> DriverResult<()> {
        self.record(Call::RunGroupSync(index));
        if self.state().fail_run {
            return Err(Self::status("AX_ENGINE_RunGroupIOSync"));
        }
        self.execute(index, io);
        Ok(())
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn element_size(data_type: i32) -> i32 {
    match data_type {
        AX_ENGINE_DT_UINT8 | AX_ENGINE_DT_SINT8 => 1,
        AX_ENGINE_DT_UINT16 | AX_ENGINE_DT_SINT16 | AX_ENGINE_DT_BFLOAT16 => 2,
        _ => 4,
    }
}

pub fn tensor(name: &str, shape: &[i32], data_type: i32) -> RawTensorMeta {
    let numel: i32 = shape.iter().product();
    RawTensorMeta {
        name: name.to_string(),
        shape: shape.to_vec(),
        layout: AX_ENGINE_TENSOR_LAYOUT_NCHW,
        data_type,
        size: (numel * element_size(data_type)) as u32,
    }
}

pub fn group(inputs: Vec<RawTensorMeta>, outputs: Vec<RawTensorMeta>) -> RawIoInfo {
    RawIoInfo {
        inputs,
        outputs,
        max_batch_size: 1,
    }
}

/// `x: f32[1,3,224,224] -> y: f32[1,1000]`, one shape group.
pub fn classifier() -> Vec<RawIoInfo> {
    vec![group(
        vec![tensor("x", &[1, 3, 224, 224], AX_ENGINE_DT_FLOAT32)],
        vec![tensor("y", &[1, 1000], AX_ENGINE_DT_FLOAT32)],
    )]
}

/// Three shape groups of `x: f32[1,n] -> y: f32[1,n], len: i32[1]` with n = 4, 8, 2.
pub fn multi_group() -> Vec<RawIoInfo> {
    [4, 8, 2]
        .into_iter()
        .map(|n| {
            group(
                vec![tensor("x", &[1, n], AX_ENGINE_DT_FLOAT32)],
                vec![
                    tensor("y", &[1, n], AX_ENGINE_DT_FLOAT32),
                    tensor("len", &[1], AX_ENGINE_DT_SINT32),
                ],
            )
        })
        .collect()
}

/// `a: u8[4], b: u8[4] -> first: u8[4], second: u8[2], third: u8[3]`.
pub fn three_outputs() -> Vec<RawIoInfo> {
    vec![group(
        vec![
            tensor("a", &[4], AX_ENGINE_DT_UINT8),
            tensor("b", &[4], AX_ENGINE_DT_UINT8),
        ],
        vec![
            tensor("first", &[4], AX_ENGINE_DT_UINT8),
            tensor("second", &[2], AX_ENGINE_DT_UINT8),
            tensor("third", &[3], AX_ENGINE_DT_UINT8),
        ],
    )]
}

pub fn device(fake: &Arc<FakeDriver>) -> Arc<Device> {
    init_tracing();
    let driver: Arc<dyn Driver> = fake.clone();
    Device::acquire(driver).unwrap()
}

pub const MODEL_BLOB: &[u8] = b"axmodel-bytes";
