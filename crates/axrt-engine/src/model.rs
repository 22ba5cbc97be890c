use std::sync::Arc;

use axrt_core::ModelSpec;
use axrt_sys::{ChipType, Driver, IoDescriptor, RawContext, RawHandle, RawIoInfo};
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::compat::{check_compatibility, ModelPartition};
use crate::metadata::pivot_groups;
use crate::{Device, Error, Result, SessionOptions};

/// Owns one native model handle and its execution context.
///
/// Dropping destroys the handle exactly once.
struct ModelHandle {
    device: Arc<Device>,
    handle: RawHandle,
    context: RawContext,
}

impl Drop for ModelHandle {
    fn drop(&mut self) {
        if let Err(err) = self.device.driver().destroy_handle(self.handle) {
            warn!(error = %err, "failed to destroy model handle");
        }
    }
}

/// A model loaded onto the NPU, with its per-group io metadata.
pub struct CompiledModel {
    handle: ModelHandle,
    partition: ModelPartition,
    tool_version: String,
    spec: ModelSpec,
    // The driver may read the blob for as long as the handle lives.
    _blob: Bytes,
}

impl CompiledModel {
    pub fn load(device: &Arc<Device>, blob: Bytes, options: &SessionOptions) -> Result<Self> {
        let driver = device.driver();

        let partition = resolve_partition(device, &blob)?;
        info!("model type: {partition} ({})", partition.describe());

        let raw = driver
            .create_handle(&blob, &options.handle_name, options.npu_set)
            .map_err(Error::ModelLoad)?;
        let context = match driver.create_context(raw) {
            Ok(context) => context,
            Err(source) => {
                if let Err(err) = driver.destroy_handle(raw) {
                    warn!(error = %err, "failed to destroy model handle after context failure");
                }
                return Err(Error::ModelLoad(source));
            }
        };
        let handle = ModelHandle {
            device: Arc::clone(device),
            handle: raw,
            context,
        };

        let tool_version = driver.tool_version(raw);
        info!(%tool_version, "compiler version");

        let groups = query_groups(driver, raw)?;
        let io = pivot_groups(&groups)?;
        let group_count = groups.len();
        debug!(
            group_count,
            inputs = io.inputs.len(),
            outputs = io.outputs.len(),
            "model io metadata"
        );

        Ok(Self {
            handle,
            partition,
            tool_version,
            spec: ModelSpec {
                inputs: io.inputs,
                outputs: io.outputs,
                group_count,
            },
            _blob: blob,
        })
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn group_count(&self) -> usize {
        self.spec.group_count
    }

    pub fn partition(&self) -> ModelPartition {
        self.partition
    }

    pub fn tool_version(&self) -> &str {
        &self.tool_version
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.handle.device
    }

    /// Runs synchronously. Group 0 always goes through the unindexed entry point;
    /// any other group through the indexed one.
    pub(crate) fn execute(&self, group: usize, io: &mut IoDescriptor) -> Result<()> {
        let driver = self.handle.device.driver();
        let (handle, context) = (self.handle.handle, self.handle.context);

        let result = if group == 0 {
            debug!("dispatching unindexed run");
            driver.run_sync(handle, context, io)
        } else {
            let index = u32::try_from(group).map_err(|_| Error::ShapeGroup {
                requested: group,
                count: self.spec.group_count,
            })?;
            debug!(group = index, "dispatching group run");
            driver.run_group_sync(handle, context, index, io)
        };

        result.map_err(|source| Error::Execution { group, source })
    }
}

/// Reads the blob's core partition and checks it against the device's vnpu mode.
///
/// The single-core chip runs every model on its one core, so a failed query or
/// an unexpected raw value there is logged and read as single.
fn resolve_partition(device: &Device, blob: &[u8]) -> Result<ModelPartition> {
    let (chip, mode) = (device.chip_type(), device.vnpu_mode());
    let raw = device.driver().model_type(blob);

    if chip == ChipType::M57h {
        match raw {
            Ok(0) => {}
            Ok(raw) => warn!(raw, %chip, "unexpected model type, loading as single core"),
            Err(err) => warn!(error = %err, %chip, "model type unavailable, loading as single core"),
        }
        return Ok(ModelPartition::Single);
    }

    let raw = raw.map_err(Error::ModelLoad)?;
    let partition =
        ModelPartition::from_raw(chip, raw).ok_or(Error::UnknownPartition { chip, mode, raw })?;
    check_compatibility(chip, mode, partition)?;
    Ok(partition)
}

/// One raw record per shape group, in group order.
fn query_groups(driver: &dyn Driver, handle: RawHandle) -> Result<Vec<RawIoInfo>> {
    let count = match driver.group_count(handle) {
        Ok(Some(0)) => return Err(Error::metadata("model reports zero shape groups")),
        Ok(Some(count)) => count,
        Ok(None) => {
            warn!("driver does not report shape groups, treating model as single-group");
            1
        }
        Err(source) => return Err(Error::metadata_driver("shape group count", source)),
    };

    if count == 1 {
        let info = driver
            .io_info(handle)
            .map_err(|source| Error::metadata_driver("io info", source))?;
        return Ok(vec![info]);
    }

    (0..count)
        .map(|index| {
            driver.group_io_info(handle, index).map_err(|source| {
                Error::metadata_driver(format!("io info for shape group {index}"), source)
            })
        })
        .collect()
}
