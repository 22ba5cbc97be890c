use axrt_core::TensorDescriptor;
use axrt_sys::IoDescriptor;
use tracing::{debug, warn};

use crate::memory::{Allocator, DeviceMemoryRegion};
use crate::Result;

#[derive(Clone, Copy, Debug)]
pub struct IoBufferEntry {
    pub region: DeviceMemoryRegion,
    /// Largest byte size the tensor takes in any shape group.
    pub declared_max_size: u32,
}

/// One cached device region per declared input and output.
///
/// Buffers are sized once for the largest shape group and reused by every run.
/// Dropping the set frees every region that is still allocated.
#[derive(Debug)]
pub struct IoBufferSet {
    allocator: Allocator,
    inputs: Vec<IoBufferEntry>,
    outputs: Vec<IoBufferEntry>,
}

impl IoBufferSet {
    /// Allocates every buffer, or none: a failed allocation frees the ones
    /// already made before the error is returned.
    pub fn create(
        allocator: Allocator,
        inputs: &[TensorDescriptor],
        outputs: &[TensorDescriptor],
    ) -> Result<Self> {
        let mut set = Self {
            allocator,
            inputs: Vec::with_capacity(inputs.len()),
            outputs: Vec::with_capacity(outputs.len()),
        };

        for desc in inputs {
            let entry = set.allocate_entry(desc)?;
            set.inputs.push(entry);
        }
        for desc in outputs {
            let entry = set.allocate_entry(desc)?;
            set.outputs.push(entry);
        }

        debug!(
            inputs = set.inputs.len(),
            outputs = set.outputs.len(),
            "io buffer set created"
        );
        Ok(set)
    }

    fn allocate_entry(&self, desc: &TensorDescriptor) -> Result<IoBufferEntry> {
        let declared_max_size = desc.max_byte_size();
        let region = self.allocator.allocate(declared_max_size, true)?;
        Ok(IoBufferEntry {
            region,
            declared_max_size,
        })
    }

    pub fn inputs(&self) -> &[IoBufferEntry] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[IoBufferEntry] {
        &self.outputs
    }

    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    /// Native run descriptor over every buffer, inputs then outputs in declared order.
    pub fn descriptor(&self) -> IoDescriptor {
        let inputs = self
            .inputs
            .iter()
            .map(|e| e.region.as_io_buffer())
            .collect::<Vec<_>>();
        let outputs = self
            .outputs
            .iter()
            .map(|e| e.region.as_io_buffer())
            .collect::<Vec<_>>();
        IoDescriptor::new(&inputs, &outputs)
    }

    pub fn is_destroyed(&self) -> bool {
        self.inputs
            .iter()
            .chain(&self.outputs)
            .all(|e| !e.region.is_allocated())
    }

    /// Frees every region still allocated. Safe to call more than once.
    pub fn destroy(&mut self) {
        let allocator = &self.allocator;
        for entry in self.inputs.iter_mut().chain(self.outputs.iter_mut()) {
            if let Err(err) = allocator.free(&mut entry.region) {
                warn!(error = %err, "failed to free io buffer");
            }
        }
    }
}

impl Drop for IoBufferSet {
    fn drop(&mut self) {
        self.destroy();
    }
}
