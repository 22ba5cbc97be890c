use std::sync::Arc;

use axrt_sys::{DriverError, DriverResult, IoBufferRef};
use bytes::Bytes;
use tracing::debug;

use crate::{Device, Error, Result};

/// Alignment requested for every device allocation.
pub const ALLOC_ALIGN: u32 = 4096;
/// Owner tag the driver records against each allocation.
pub const ALLOC_TOKEN: &str = "AxrtEngine";

/// A (physical, virtual, size) triple handed out by the driver.
///
/// Only [`Allocator`] creates regions, so a non-zero virtual address always
/// names a live mapping of `size` bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceMemoryRegion {
    phys: u64,
    virt: usize,
    size: u32,
}

impl DeviceMemoryRegion {
    pub fn physical_address(&self) -> u64 {
        self.phys
    }

    pub fn virtual_address(&self) -> usize {
        self.virt
    }

    pub fn byte_size(&self) -> u32 {
        self.size
    }

    pub fn is_allocated(&self) -> bool {
        self.virt != 0
    }

    pub(crate) fn as_io_buffer(&self) -> IoBufferRef {
        IoBufferRef {
            phys: self.phys,
            virt: self.virt,
            size: self.size,
        }
    }
}

/// Cache-coherent device memory.
///
/// Host writes must be flushed before the device reads them and device writes
/// invalidated before the host reads them; [`Allocator::upload`] and
/// [`Allocator::download`] pair each copy with the right cache operation.
#[derive(Clone, Debug)]
pub struct Allocator {
    device: Arc<Device>,
}

impl Allocator {
    pub fn new(device: Arc<Device>) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn allocate(&self, size: u32, cached: bool) -> Result<DeviceMemoryRegion> {
        let (phys, virt) = self
            .device
            .driver()
            .mem_alloc(size, ALLOC_ALIGN, ALLOC_TOKEN, cached)
            .map_err(|source| Error::Allocation { size, source })?;

        if virt == 0 {
            return Err(Error::Allocation {
                size,
                source: DriverError::InvalidData {
                    call: "AX_SYS_MemAlloc",
                    reason: "null virtual address".to_string(),
                },
            });
        }

        debug!(size, cached, "device memory allocated");
        Ok(DeviceMemoryRegion { phys, virt, size })
    }

    /// Releases the region and marks it unallocated; freeing twice is a no-op.
    pub fn free(&self, region: &mut DeviceMemoryRegion) -> DriverResult<()> {
        if !region.is_allocated() {
            return Ok(());
        }
        let DeviceMemoryRegion { phys, virt, size } = std::mem::take(region);
        debug!(size, "device memory freed");
        self.device.driver().mem_free(phys, virt)
    }

    pub fn flush(&self, region: &DeviceMemoryRegion, size: u32) -> Result<()> {
        let size = size.min(region.size);
        self.device
            .driver()
            .flush_cache(region.phys, region.virt, size)
            .map_err(|source| Error::Cache {
                op: "flush",
                size,
                source,
            })
    }

    pub fn invalidate(&self, region: &DeviceMemoryRegion, size: u32) -> Result<()> {
        let size = size.min(region.size);
        self.device
            .driver()
            .invalidate_cache(region.phys, region.virt, size)
            .map_err(|source| Error::Cache {
                op: "invalidate",
                size,
                source,
            })
    }

    /// Copies `data` to the start of the region and flushes exactly those bytes.
    pub fn upload(&self, region: &DeviceMemoryRegion, data: &[u8]) -> Result<()> {
        let len = checked_len(region, data.len())?;
        // SAFETY: the region is a live mapping of `region.size` bytes and `len`
        // is within it; host buffers never overlap device mappings.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), region.virt as *mut u8, data.len());
        }
        self.flush(region, len)
    }

    /// Invalidates the whole region, then copies its first `len` bytes out.
    pub fn download(&self, region: &DeviceMemoryRegion, len: usize) -> Result<Bytes> {
        checked_len(region, len)?;
        self.invalidate(region, region.size)?;
        // SAFETY: the region is a live mapping of `region.size` bytes and `len`
        // is within it.
        let bytes = unsafe { std::slice::from_raw_parts(region.virt as *const u8, len) };
        Ok(Bytes::copy_from_slice(bytes))
    }
}

fn checked_len(region: &DeviceMemoryRegion, len: usize) -> Result<u32> {
    if !region.is_allocated() {
        return Err(Error::RegionOverflow {
            len,
            size: 0,
        });
    }
    match u32::try_from(len) {
        Ok(len) if len <= region.size => Ok(len),
        _ => Err(Error::RegionOverflow {
            len,
            size: region.size,
        }),
    }
}
