use std::alloc::Layout;
use std::fmt::Debug;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use crate::error::DeviceError;

/// Raw memory operations a device must provide for [`DeviceBuffer`](super::DeviceBuffer).
///
/// Implementations own nothing on behalf of their callers: every region
/// returned by [`allocate`](DeviceAllocator::allocate) is released by exactly
/// one matching call to [`deallocate`](DeviceAllocator::deallocate) with the
/// same layout.
pub trait DeviceAllocator: Debug + Send + Sync {
    /// Short device name used in diagnostics.
    fn name(&self) -> &str;

    /// Allocate an uninitialised region. `layout.size()` is never zero.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, DeviceError>;

    /// Release a region obtained from [`allocate`](DeviceAllocator::allocate).
    ///
    /// # Safety
    ///
    /// `ptr` must have come from this allocator with the same `layout` and must
    /// not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// Device-to-device copy of `bytes` bytes.
    ///
    /// # Safety
    ///
    /// Both regions must be live allocations of this device, at least `bytes`
    /// long, and must not overlap.
    unsafe fn copy(&self, dst: NonNull<u8>, src: NonNull<u8>, bytes: usize) -> Result<(), DeviceError>;

    /// Host-to-device copy.
    ///
    /// # Safety
    ///
    /// `dst` must be a live allocation of this device of at least `bytes` bytes
    /// and `src` must be valid for reads of `bytes` bytes.
    unsafe fn upload(&self, dst: NonNull<u8>, src: *const u8, bytes: usize) -> Result<(), DeviceError>;

    /// Device-to-host copy.
    ///
    /// # Safety
    ///
    /// `src` must be a live allocation of this device of at least `bytes` bytes
    /// and `dst` must be valid for writes of `bytes` bytes.
    unsafe fn download(&self, dst: *mut u8, src: NonNull<u8>, bytes: usize) -> Result<(), DeviceError>;

    /// Set `bytes` bytes starting at `dst` to zero.
    ///
    /// # Safety
    ///
    /// `dst` must be a live allocation of this device of at least `bytes` bytes.
    unsafe fn fill_zero(&self, dst: NonNull<u8>, bytes: usize) -> Result<(), DeviceError>;

    /// Block until every operation issued to this device has completed.
    fn synchronize(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Bytes currently held by live allocations.
    fn allocated_bytes(&self) -> usize;

    /// Number of successful allocations made over the device's lifetime.
    fn allocation_count(&self) -> usize;
}

/// A device whose memory is ordinary host memory.
///
/// Operations complete before they return, which trivially satisfies stream
/// ordering. An optional byte limit makes exhaustion observable as
/// [`DeviceError::OutOfMemory`] the way a real accelerator reports it.
#[derive(Debug, Default)]
pub struct HostDevice {
    limit: Option<usize>,
    allocated: AtomicUsize,
    allocations: AtomicUsize,
}

impl HostDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host device that refuses to hold more than `bytes` bytes at once.
    pub fn with_limit(bytes: usize) -> Self {
        Self {
            limit: Some(bytes),
            ..Self::default()
        }
    }

    fn reserve(&self, requested: usize) -> Result<(), DeviceError> {
        let Some(limit) = self.limit else {
            self.allocated.fetch_add(requested, Ordering::SeqCst);
            return Ok(());
        };
        self.allocated
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |held| {
                held.checked_add(requested).filter(|total| *total <= limit)
            })
            .map(|_| ())
            .map_err(|held| DeviceError::OutOfMemory {
                requested,
                available: limit.saturating_sub(held),
            })
    }
}

impl DeviceAllocator for HostDevice {
    fn name(&self) -> &str {
        "host"
    }

    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, DeviceError> {
        if layout.size() == 0 {
            return Err(DeviceError::InvalidLayout("zero-sized device allocation".into()));
        }
        self.reserve(layout.size())?;
        // SAFETY: the layout has a non-zero size.
        let ptr = unsafe { std::alloc::alloc(layout) };
        match NonNull::new(ptr) {
            Some(ptr) => {
                self.allocations.fetch_add(1, Ordering::SeqCst);
                Ok(ptr)
            }
            None => {
                self.allocated.fetch_sub(layout.size(), Ordering::SeqCst);
                Err(DeviceError::NullAllocation(layout.size()))
            }
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded from the caller's contract.
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
        self.allocated.fetch_sub(layout.size(), Ordering::SeqCst);
    }

    unsafe fn copy(&self, dst: NonNull<u8>, src: NonNull<u8>, bytes: usize) -> Result<(), DeviceError> {
        // SAFETY: forwarded from the caller's contract.
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), bytes) };
        Ok(())
    }

    unsafe fn upload(&self, dst: NonNull<u8>, src: *const u8, bytes: usize) -> Result<(), DeviceError> {
        // SAFETY: forwarded from the caller's contract.
        unsafe { std::ptr::copy_nonoverlapping(src, dst.as_ptr(), bytes) };
        Ok(())
    }

    unsafe fn download(&self, dst: *mut u8, src: NonNull<u8>, bytes: usize) -> Result<(), DeviceError> {
        // SAFETY: forwarded from the caller's contract.
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), dst, bytes) };
        Ok(())
    }

    unsafe fn fill_zero(&self, dst: NonNull<u8>, bytes: usize) -> Result<(), DeviceError> {
        // SAFETY: forwarded from the caller's contract.
        unsafe { std::ptr::write_bytes(dst.as_ptr(), 0, bytes) };
        Ok(())
    }

    fn allocated_bytes(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    fn allocation_count(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_release_tracks_bytes() {
        let device = HostDevice::new();
        let layout = Layout::array::<f32>(16).unwrap();
        let ptr = device.allocate(layout).unwrap();
        assert_eq!(device.allocated_bytes(), 64);
        assert_eq!(device.allocation_count(), 1);

        unsafe { device.deallocate(ptr, layout) };
        assert_eq!(device.allocated_bytes(), 0);
        assert_eq!(device.allocation_count(), 1);
    }

    #[test]
    fn test_limit_reports_out_of_memory() {
        let device = HostDevice::with_limit(100);
        let small = Layout::array::<u8>(60).unwrap();
        let ptr = device.allocate(small).unwrap();

        let err = device.allocate(small).unwrap_err();
        assert_eq!(err, DeviceError::OutOfMemory { requested: 60, available: 40 });
        assert_eq!(device.allocated_bytes(), 60);

        unsafe { device.deallocate(ptr, small) };
        let ptr = device.allocate(small).unwrap();
        unsafe { device.deallocate(ptr, small) };
    }

    #[test]
    fn test_zero_sized_allocation_is_rejected() {
        let device = HostDevice::new();
        let layout = Layout::array::<f32>(0).unwrap();
        assert!(matches!(device.allocate(layout), Err(DeviceError::InvalidLayout(_))));
    }

    #[test]
    fn test_upload_download_round_trip() {
        let device = HostDevice::new();
        let layout = Layout::array::<u8>(4).unwrap();
        let ptr = device.allocate(layout).unwrap();
        let input = [1u8, 2, 3, 4];
        let mut output = [0u8; 4];
        unsafe {
            device.upload(ptr, input.as_ptr(), 4).unwrap();
            device.fill_zero(ptr, 2).unwrap();
            device.download(output.as_mut_ptr(), ptr, 4).unwrap();
            device.deallocate(ptr, layout);
        }
        assert_eq!(output, [0, 0, 3, 4]);
    }
}
