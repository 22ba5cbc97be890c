use std::fmt;

use anyhow::{bail, ensure, Context, Result};
use bytes::Bytes;
use smallvec::{smallvec, SmallVec};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    BF16,
}

impl DType {
    pub fn size_bytes(self) -> usize {
        match self {
            DType::U8 | DType::I8 => 1,
            DType::U16 | DType::I16 | DType::BF16 => 2,
            DType::U32 | DType::I32 | DType::F32 => 4,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::U8 => "uint8",
            DType::I8 => "int8",
            DType::U16 => "uint16",
            DType::I16 => "int16",
            DType::U32 => "uint32",
            DType::I32 => "int32",
            DType::F32 => "float32",
            DType::BF16 => "bfloat16",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }
    pub fn rank(&self) -> usize {
        self.0.len()
    }
    pub fn numel(&self) -> usize {
        self.0.iter().product::<usize>()
    }
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Row-major element strides.
    pub fn contiguous_strides(&self) -> SmallVec<[usize; 6]> {
        let mut strides: SmallVec<[usize; 6]> = smallvec![1; self.rank()];
        for axis in (0..self.rank().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * self.0[axis + 1];
        }
        strides
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0.as_slice())
    }
}

#[derive(Clone, Debug)]
pub struct TensorDesc {
    pub dtype: DType,
    pub shape: Shape,
    /// Element strides; `None` means row-major contiguous.
    pub strides: Option<SmallVec<[usize; 6]>>,
}

/// A host tensor. Storage is reference counted, so clones are cheap.
#[derive(Clone, Debug)]
pub struct Tensor {
    pub desc: TensorDesc,
    pub data: Bytes,
}

impl Tensor {
    pub fn from_cpu_bytes(dtype: DType, shape: Shape, bytes: Bytes) -> Self {
        Self {
            desc: TensorDesc {
                dtype,
                shape,
                strides: None,
            },
            data: bytes,
        }
    }

    /// Wraps a strided view over `bytes`. Strides are counted in elements.
    pub fn from_strided(
        dtype: DType,
        shape: Shape,
        strides: &[usize],
        bytes: Bytes,
    ) -> Result<Self> {
        let needed = strided_extent(dtype, &shape, strides)?;
        ensure!(
            bytes.len() >= needed,
            "strided view needs {needed} bytes, storage has {}",
            bytes.len()
        );
        Ok(Self {
            desc: TensorDesc {
                dtype,
                shape,
                strides: Some(strides.iter().copied().collect()),
            },
            data: bytes,
        })
    }

    pub fn zeros(dtype: DType, shape: Shape) -> Self {
        let len = shape.numel() * dtype.size_bytes();
        Self::from_cpu_bytes(dtype, shape, Bytes::from(vec![0u8; len]))
    }

    pub fn from_f32(shape: Shape, values: &[f32]) -> Result<Self> {
        ensure!(
            values.len() == shape.numel(),
            "expected {} values for shape {shape}, got {}",
            shape.numel(),
            values.len()
        );
        let bytes = values
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect::<Vec<u8>>();
        Ok(Self::from_cpu_bytes(DType::F32, shape, Bytes::from(bytes)))
    }

    pub fn dtype(&self) -> DType {
        self.desc.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.desc.shape
    }

    /// Byte length of the logical (dense) tensor.
    pub fn byte_len(&self) -> usize {
        self.desc.shape.numel() * self.desc.dtype.size_bytes()
    }

    pub fn is_contiguous(&self) -> bool {
        match &self.desc.strides {
            None => true,
            Some(strides) => *strides == self.desc.shape.contiguous_strides(),
        }
    }

    /// Dense row-major bytes, gathering a copy when the tensor is strided.
    ///
    /// Fails when the strides reach past the end of the storage.
    pub fn contiguous_bytes(&self) -> Result<Bytes> {
        match &self.desc.strides {
            Some(strides) if !self.is_contiguous() => self.gather(strides),
            _ => Ok(self.data.slice(..self.byte_len().min(self.data.len()))),
        }
    }

    fn gather(&self, strides: &[usize]) -> Result<Bytes> {
        let needed = strided_extent(self.desc.dtype, &self.desc.shape, strides)?;
        ensure!(
            self.data.len() >= needed,
            "strided view needs {needed} bytes, storage has {}",
            self.data.len()
        );

        let esize = self.desc.dtype.size_bytes();
        let dims = self.desc.shape.dims();
        let numel = self.desc.shape.numel();
        let mut out = Vec::with_capacity(numel * esize);
        let mut index: SmallVec<[usize; 6]> = smallvec![0; dims.len()];

        for _ in 0..numel {
            let offset = index
                .iter()
                .zip(strides)
                .map(|(i, s)| i * s)
                .sum::<usize>()
                * esize;
            out.extend_from_slice(&self.data[offset..offset + esize]);

            for axis in (0..dims.len()).rev() {
                index[axis] += 1;
                if index[axis] < dims[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }

        Ok(Bytes::from(out))
    }

    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        let bytes = self.contiguous_bytes()?;
        match self.desc.dtype {
            DType::F32 => {
                ensure!(
                    bytes.len().is_multiple_of(4),
                    "f32 tensor has invalid byte length"
                );
                Ok(bytes
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect())
            }
            DType::BF16 => {
                ensure!(
                    bytes.len().is_multiple_of(2),
                    "bf16 tensor has invalid byte length"
                );
                Ok(bytes
                    .chunks_exact(2)
                    .map(|b| half::bf16::from_le_bytes([b[0], b[1]]).to_f32())
                    .collect())
            }
            other => bail!("cannot read {other} tensor as f32"),
        }
    }
}

/// Bytes a strided view touches, from the start of storage to its last element.
fn strided_extent(dtype: DType, shape: &Shape, strides: &[usize]) -> Result<usize> {
    ensure!(
        strides.len() == shape.rank(),
        "stride rank {} does not match shape rank {}",
        strides.len(),
        shape.rank()
    );
    if shape.0.contains(&0) {
        return Ok(0);
    }
    let last = shape
        .0
        .iter()
        .zip(strides)
        .try_fold(0usize, |acc, (dim, stride)| {
            (dim - 1).checked_mul(*stride)?.checked_add(acc)
        })
        .context("strided view offset overflows usize")?;
    last.checked_add(1)
        .and_then(|n| n.checked_mul(dtype.size_bytes()))
        .context("strided view size overflows usize")
}
