//! Group-major driver records to tensor-major descriptors.
//!
//! The driver answers one query per shape group, each listing every tensor.
//! Callers want one descriptor per tensor listing every group, so the raw
//! records are gathered first and pivoted here without touching the device.

use axrt_core::{DType, GroupShape, IOName, Layout, Shape, TensorDescriptor};
use axrt_sys::ffi::*;
use axrt_sys::{RawIoInfo, RawTensorMeta};
use tracing::warn;

use crate::{Error, Result};

#[derive(Clone, Debug)]
pub struct IoMetadata {
    pub inputs: Vec<TensorDescriptor>,
    pub outputs: Vec<TensorDescriptor>,
}

impl IoMetadata {
    pub fn group_count(&self) -> usize {
        self.inputs
            .first()
            .or(self.outputs.first())
            .map_or(1, TensorDescriptor::group_count)
    }
}

pub fn dtype_from_raw(raw: i32) -> Option<DType> {
    match raw {
        AX_ENGINE_DT_UINT8 => Some(DType::U8),
        AX_ENGINE_DT_SINT8 => Some(DType::I8),
        AX_ENGINE_DT_UINT16 => Some(DType::U16),
        AX_ENGINE_DT_SINT16 => Some(DType::I16),
        AX_ENGINE_DT_UINT32 => Some(DType::U32),
        AX_ENGINE_DT_SINT32 => Some(DType::I32),
        AX_ENGINE_DT_FLOAT32 => Some(DType::F32),
        AX_ENGINE_DT_BFLOAT16 => Some(DType::BF16),
        _ => None,
    }
}

pub fn layout_from_raw(raw: i32) -> Layout {
    match raw {
        AX_ENGINE_TENSOR_LAYOUT_UNKNOWN => Layout::Unknown,
        AX_ENGINE_TENSOR_LAYOUT_NHWC => Layout::Nhwc,
        AX_ENGINE_TENSOR_LAYOUT_NCHW => Layout::Nchw,
        other => Layout::Other(other),
    }
}

fn shape_from_raw(name: &str, dims: &[i32]) -> Result<Shape> {
    let dims = dims
        .iter()
        .map(|&d| {
            usize::try_from(d)
                .map_err(|_| Error::metadata(format!("tensor '{name}' has negative dim {d}")))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Shape::from_slice(&dims))
}

/// Pivots per-group records (indexed by group) into per-tensor descriptors.
///
/// Name, dtype and layout come from group 0; every group contributes its own
/// shape and byte size.
pub fn pivot_groups(groups: &[RawIoInfo]) -> Result<IoMetadata> {
    if groups.is_empty() {
        return Err(Error::metadata("model reported no shape groups"));
    }
    Ok(IoMetadata {
        inputs: pivot_side("input", groups, |g| &g.inputs)?,
        outputs: pivot_side("output", groups, |g| &g.outputs)?,
    })
}

fn pivot_side(
    kind: &str,
    groups: &[RawIoInfo],
    select: impl Fn(&RawIoInfo) -> &[RawTensorMeta],
) -> Result<Vec<TensorDescriptor>> {
    let first = select(&groups[0]);
    for (index, group) in groups.iter().enumerate().skip(1) {
        let count = select(group).len();
        if count != first.len() {
            return Err(Error::metadata(format!(
                "shape group {index} declares {count} {kind}s, group 0 declares {}",
                first.len()
            )));
        }
    }

    first
        .iter()
        .enumerate()
        .map(|(position, meta)| {
            let dtype = dtype_from_raw(meta.data_type).ok_or_else(|| {
                Error::metadata(format!(
                    "{kind} '{}' has unsupported data type {}",
                    meta.name, meta.data_type
                ))
            })?;

            let shapes = groups
                .iter()
                .enumerate()
                .map(|(index, group)| {
                    let record = &select(group)[position];
                    if record.name != meta.name {
                        warn!(
                            group = index,
                            expected = %meta.name,
                            found = %record.name,
                            "{kind} name differs between shape groups"
                        );
                    }
                    Ok(GroupShape {
                        shape: shape_from_raw(&meta.name, &record.shape)?,
                        byte_size: record.size,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(TensorDescriptor {
                name: IOName(meta.name.clone()),
                dtype,
                layout: layout_from_raw(meta.layout),
                groups: shapes,
            })
        })
        .collect()
}
