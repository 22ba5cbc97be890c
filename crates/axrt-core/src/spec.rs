use std::fmt;

use crate::{DType, Shape};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IOName(pub String);

impl IOName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IOName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IOName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    Unknown,
    Nhwc,
    Nchw,
    Other(i32),
}

/// The concrete shape a tensor takes in one shape group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupShape {
    pub shape: Shape,
    pub byte_size: u32,
}

/// One declared input or output, with one concrete shape per shape group.
///
/// Name, dtype and layout are the same in every group; only the shape and the
/// byte size the driver reports vary.
#[derive(Clone, Debug)]
pub struct TensorDescriptor {
    pub name: IOName,
    pub dtype: DType,
    pub layout: Layout,
    pub groups: Vec<GroupShape>,
}

impl TensorDescriptor {
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn shape(&self, group: usize) -> Option<&Shape> {
        self.groups.get(group).map(|g| &g.shape)
    }

    pub fn byte_size(&self, group: usize) -> Option<u32> {
        self.groups.get(group).map(|g| g.byte_size)
    }

    /// Largest byte size over every group; one buffer of this size serves them all.
    pub fn max_byte_size(&self) -> u32 {
        self.groups.iter().map(|g| g.byte_size).max().unwrap_or(0)
    }
}

#[derive(Clone, Debug)]
pub struct ModelSpec {
    pub inputs: Vec<TensorDescriptor>,
    pub outputs: Vec<TensorDescriptor>,
    pub group_count: usize,
}

impl ModelSpec {
    pub fn input(&self, name: &str) -> Option<(usize, &TensorDescriptor)> {
        self.inputs
            .iter()
            .enumerate()
            .find(|(_, desc)| desc.name.as_str() == name)
    }

    pub fn output(&self, name: &str) -> Option<(usize, &TensorDescriptor)> {
        self.outputs
            .iter()
            .enumerate()
            .find(|(_, desc)| desc.name.as_str() == name)
    }
}
