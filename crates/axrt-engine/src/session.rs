use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use axrt_core::{DType, IOName, ModelSpec, Shape, Tensor, TensorDescriptor};
use axrt_sys::{ChipType, VnpuMode};
use bytes::Bytes;
use tracing::{debug, info};

use crate::compat::ModelPartition;
use crate::io::IoBufferSet;
use crate::memory::Allocator;
use crate::model::CompiledModel;
use crate::{Device, Error, Result};

/// Options passed through to native handle creation.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Name tag the driver records for the handle.
    pub handle_name: String,
    /// NPU-set mask the handle may run on.
    pub npu_set: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            handle_name: "AxrtEngine".to_string(),
            npu_set: 1,
        }
    }
}

/// One tensor's view in a single shape group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TensorInfo<'a> {
    pub name: &'a str,
    pub shape: &'a Shape,
    pub dtype: DType,
}

/// A loaded model plus the device buffers it runs from.
///
/// `run` takes `&self`; calls are serialized on an internal lock because every
/// call writes the same device buffers.
pub struct Session {
    // Declared before `model` so buffers are freed before the handle is destroyed.
    io: Mutex<IoBufferSet>,
    model: CompiledModel,
    model_name: Option<String>,
}

impl Session {
    pub fn from_path(device: &Arc<Device>, path: impl AsRef<Path>) -> Result<Self> {
        Self::from_path_with(device, path, &SessionOptions::default())
    }

    pub fn from_path_with(
        device: &Arc<Device>,
        path: impl AsRef<Path>,
        options: &SessionOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        let blob = std::fs::read(path).map_err(|source| Error::ModelRead {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned());
        Self::build(device, Bytes::from(blob), name, options)
    }

    pub fn from_bytes(device: &Arc<Device>, blob: impl Into<Bytes>) -> Result<Self> {
        Self::from_bytes_with(device, blob, &SessionOptions::default())
    }

    pub fn from_bytes_with(
        device: &Arc<Device>,
        blob: impl Into<Bytes>,
        options: &SessionOptions,
    ) -> Result<Self> {
        Self::build(device, blob.into(), None, options)
    }

    fn build(
        device: &Arc<Device>,
        blob: Bytes,
        model_name: Option<String>,
        options: &SessionOptions,
    ) -> Result<Self> {
        let model = CompiledModel::load(device, blob, options)?;
        let spec = model.spec();
        let io = IoBufferSet::create(Allocator::new(Arc::clone(device)), &spec.inputs, &spec.outputs)?;

        info!(
            model = model_name.as_deref().unwrap_or("<bytes>"),
            groups = spec.group_count,
            "session ready"
        );
        Ok(Self {
            io: Mutex::new(io),
            model,
            model_name,
        })
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    pub fn chip_type(&self) -> ChipType {
        self.model.device().chip_type()
    }

    pub fn vnpu_mode(&self) -> VnpuMode {
        self.model.device().vnpu_mode()
    }

    pub fn partition(&self) -> ModelPartition {
        self.model.partition()
    }

    pub fn tool_version(&self) -> &str {
        self.model.tool_version()
    }

    pub fn group_count(&self) -> usize {
        self.model.group_count()
    }

    pub fn spec(&self) -> &ModelSpec {
        self.model.spec()
    }

    pub fn inputs(&self) -> &[TensorDescriptor] {
        &self.model.spec().inputs
    }

    pub fn outputs(&self) -> &[TensorDescriptor] {
        &self.model.spec().outputs
    }

    pub fn inputs_for(&self, group: usize) -> Result<Vec<TensorInfo<'_>>> {
        self.group_view(&self.model.spec().inputs, group)
    }

    pub fn outputs_for(&self, group: usize) -> Result<Vec<TensorInfo<'_>>> {
        self.group_view(&self.model.spec().outputs, group)
    }

    fn group_view<'a>(
        &self,
        descs: &'a [TensorDescriptor],
        group: usize,
    ) -> Result<Vec<TensorInfo<'a>>> {
        self.check_group(group)?;
        descs
            .iter()
            .map(|desc| {
                Ok(TensorInfo {
                    name: desc.name.as_str(),
                    shape: desc.shape(group).ok_or_else(|| self.group_error(group))?,
                    dtype: desc.dtype,
                })
            })
            .collect()
    }

    fn group_error(&self, group: usize) -> Error {
        Error::ShapeGroup {
            requested: group,
            count: self.group_count(),
        }
    }

    fn check_group(&self, group: usize) -> Result<()> {
        if group < self.group_count() {
            Ok(())
        } else {
            Err(self.group_error(group))
        }
    }

    /// Runs the model at `shape_group`.
    ///
    /// An empty `output_names` selects every output. Results follow declared
    /// output order, not request order.
    pub fn run(
        &self,
        output_names: &[&str],
        input_feed: &[(&str, &Tensor)],
        shape_group: usize,
    ) -> Result<Vec<Tensor>> {
        Ok(self
            .run_named(output_names, input_feed, shape_group)?
            .into_iter()
            .map(|(_, tensor)| tensor)
            .collect())
    }

    pub fn run_named(
        &self,
        output_names: &[&str],
        input_feed: &[(&str, &Tensor)],
        shape_group: usize,
    ) -> Result<Vec<(IOName, Tensor)>> {
        let spec = self.model.spec();
        self.check_group(shape_group)?;

        let mut feeds = Vec::with_capacity(input_feed.len());
        for (name, tensor) in input_feed {
            let (index, desc) = spec
                .input(name)
                .ok_or_else(|| Error::InputName(name.to_string()))?;
            feeds.push((index, desc, *tensor));
        }

        let mut selected = vec![output_names.is_empty(); spec.outputs.len()];
        for name in output_names {
            let (index, _) = spec
                .output(name)
                .ok_or_else(|| Error::OutputName(name.to_string()))?;
            selected[index] = true;
        }

        let mut staged = Vec::with_capacity(feeds.len());
        for (index, desc, tensor) in feeds {
            let expected = desc
                .shape(shape_group)
                .ok_or_else(|| self.group_error(shape_group))?;
            if tensor.shape() != expected || tensor.dtype() != desc.dtype {
                return Err(Error::ShapeMismatch {
                    name: desc.name.0.clone(),
                    expected_shape: expected.clone(),
                    expected_dtype: desc.dtype,
                    actual_shape: tensor.shape().clone(),
                    actual_dtype: tensor.dtype(),
                });
            }

            let data = tensor
                .contiguous_bytes()
                .map_err(|err| Error::InvalidInput {
                    name: desc.name.0.clone(),
                    reason: err.to_string(),
                })?;
            if data.len() != tensor.byte_len() {
                return Err(Error::InvalidInput {
                    name: desc.name.0.clone(),
                    reason: format!(
                        "holds {} bytes, shape {} needs {}",
                        data.len(),
                        tensor.shape(),
                        tensor.byte_len()
                    ),
                });
            }
            staged.push((index, data));
        }

        let io = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        let allocator = io.allocator();

        for (index, data) in &staged {
            allocator.upload(&io.inputs()[*index].region, data)?;
        }

        let mut descriptor = io.descriptor();
        self.model.execute(shape_group, &mut descriptor)?;

        let mut outputs = Vec::with_capacity(spec.outputs.len());
        for ((desc, entry), wanted) in spec.outputs.iter().zip(io.outputs()).zip(&selected) {
            if !*wanted {
                allocator.invalidate(&entry.region, entry.region.byte_size())?;
                continue;
            }
            let shape = desc
                .shape(shape_group)
                .ok_or_else(|| self.group_error(shape_group))?
                .clone();
            let len = shape.numel() * desc.dtype.size_bytes();
            let bytes = allocator.download(&entry.region, len)?;
            outputs.push((
                desc.name.clone(),
                Tensor::from_cpu_bytes(desc.dtype, shape, bytes),
            ));
        }

        debug!(
            group = shape_group,
            outputs = outputs.len(),
            "run complete"
        );
        Ok(outputs)
    }
}
