use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;
use crate::error::DeviceError;
use super::allocator::DeviceAllocator;

/// An ordered command queue on one device.
///
/// Work issued through the same stream executes in program order; work on
/// different streams is unordered unless one of them is synchronized. Each
/// pool worker owns its own stream, so tasks never race on a shared one.
///
/// Cloning a stream yields another handle to the same queue.
#[derive(Clone)]
pub struct Stream {
    id: Uuid,
    device: Arc<dyn DeviceAllocator>,
    copies: Arc<AtomicUsize>,
}

impl Stream {
    pub fn new(device: Arc<dyn DeviceAllocator>) -> Self {
        Self {
            id: Uuid::new_v4(),
            device,
            copies: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn device(&self) -> &Arc<dyn DeviceAllocator> {
        &self.device
    }

    /// Number of device-to-device copies issued on this stream so far.
    pub fn copies_issued(&self) -> usize {
        self.copies.load(Ordering::SeqCst)
    }

    /// Wait for everything issued on this stream to complete.
    pub fn synchronize(&self) -> Result<(), DeviceError> {
        self.device.synchronize()
    }

    /// Queue a device-to-device copy.
    ///
    /// # Safety
    ///
    /// See [`DeviceAllocator::copy`].
    pub(crate) unsafe fn copy_async(&self, dst: NonNull<u8>, src: NonNull<u8>, bytes: usize) -> Result<(), DeviceError> {
        if bytes == 0 {
            return Ok(());
        }
        self.copies.fetch_add(1, Ordering::SeqCst);
        // SAFETY: forwarded from the caller's contract.
        unsafe { self.device.copy(dst, src, bytes) }
    }

    /// Queue a zero fill.
    ///
    /// # Safety
    ///
    /// See [`DeviceAllocator::fill_zero`].
    pub(crate) unsafe fn zero_async(&self, dst: NonNull<u8>, bytes: usize) -> Result<(), DeviceError> {
        if bytes == 0 {
            return Ok(());
        }
        // SAFETY: forwarded from the caller's contract.
        unsafe { self.device.fill_zero(dst, bytes) }
    }

    /// Copy host memory in and wait for it to land.
    ///
    /// # Safety
    ///
    /// See [`DeviceAllocator::upload`].
    pub(crate) unsafe fn upload(&self, dst: NonNull<u8>, src: *const u8, bytes: usize) -> Result<(), DeviceError> {
        if bytes == 0 {
            return Ok(());
        }
        // SAFETY: forwarded from the caller's contract.
        unsafe { self.device.upload(dst, src, bytes)? };
        self.synchronize()
    }

    /// Copy device memory out, waiting for prior work on the stream first.
    ///
    /// # Safety
    ///
    /// See [`DeviceAllocator::download`].
    pub(crate) unsafe fn download(&self, dst: *mut u8, src: NonNull<u8>, bytes: usize) -> Result<(), DeviceError> {
        if bytes == 0 {
            return Ok(());
        }
        self.synchronize()?;
        // SAFETY: forwarded from the caller's contract.
        unsafe { self.device.download(dst, src, bytes) }
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("device", &self.device.name())
            .field("copies", &self.copies_issued())
            .finish()
    }
}
