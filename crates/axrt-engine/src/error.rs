use axrt_core::{DType, Shape};
use axrt_sys::{ChipType, DriverError, VnpuMode};
use thiserror::Error;

use crate::ModelPartition;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to bring up the NPU driver ({stage})")]
    DriverInit {
        stage: &'static str,
        #[source]
        source: DriverError,
    },

    #[error("model type {partition} is not allowed when vnpu is inited as {mode} on {chip}")]
    Compatibility {
        chip: ChipType,
        mode: VnpuMode,
        partition: ModelPartition,
    },

    #[error("model type {raw} is not allowed when vnpu is inited as {mode} on {chip}")]
    UnknownPartition {
        chip: ChipType,
        mode: VnpuMode,
        raw: i32,
    },

    #[error("failed to read model file {path}")]
    ModelRead {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load model")]
    ModelLoad(#[source] DriverError),

    #[error("failed to query model io metadata: {reason}")]
    MetadataQuery {
        reason: String,
        #[source]
        source: Option<DriverError>,
    },

    #[error("failed to allocate {size} bytes of device memory")]
    Allocation {
        size: u32,
        #[source]
        source: DriverError,
    },

    #[error("{len} bytes do not fit a device region of {size} bytes")]
    RegionOverflow { len: usize, size: u32 },

    #[error("cache {op} of {size} bytes failed")]
    Cache {
        op: &'static str,
        size: u32,
        #[source]
        source: DriverError,
    },

    #[error("unknown input name '{0}'")]
    InputName(String),

    #[error("unknown output name '{0}'")]
    OutputName(String),

    #[error(
        "model input '{name}' expects shape {expected_shape} and dtype {expected_dtype}, \
         got shape {actual_shape} and dtype {actual_dtype}"
    )]
    ShapeMismatch {
        name: String,
        expected_shape: Shape,
        expected_dtype: DType,
        actual_shape: Shape,
        actual_dtype: DType,
    },

    #[error("shape group {requested} out of range, model has {count} group(s)")]
    ShapeGroup { requested: usize, count: usize },

    #[error("input '{name}': {reason}")]
    InvalidInput { name: String, reason: String },

    #[error("failed to run model on shape group {group}")]
    Execution {
        group: usize,
        #[source]
        source: DriverError,
    },
}

impl Error {
    pub(crate) fn metadata(reason: impl Into<String>) -> Self {
        Error::MetadataQuery {
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn metadata_driver(reason: impl Into<String>, source: DriverError) -> Self {
        Error::MetadataQuery {
            reason: reason.into(),
            source: Some(source),
        }
    }

    /// Per-call failures leave the session usable; everything else is fatal for it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InputName(_)
                | Error::OutputName(_)
                | Error::ShapeMismatch { .. }
                | Error::ShapeGroup { .. }
                | Error::InvalidInput { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
