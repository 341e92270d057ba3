use std::alloc::Layout;
use std::fmt;
use std::mem;
use std::ptr::NonNull;
use tracing::{error, trace};
use crate::error::{DeviceError, Error, Result};
use super::element::Element;
use super::shape::Shape;
use super::stream::Stream;

/// A growable, reshapeable 4-D tensor resident on a device.
///
/// The logical [`Shape`] sits on top of a single contiguous allocation of
/// `capacity` elements. Capacity only grows through [`resize`](Self::resize)
/// and only drops back to zero through [`clear`](Self::clear), so buffers
/// that are resized every decoding step settle at their high-water mark and
/// stop reallocating.
///
/// Invariants held after every successful operation:
///
/// * `capacity() >= len()`
/// * the device handle is present iff `capacity() > 0`
/// * `capacity() == 0` implies the shape is all zero
///
/// The buffer is bound to the [`Stream`] it was created on; every copy and
/// fill it issues goes through that stream.
pub struct DeviceBuffer<T: Element> {
    shape: Shape,
    capacity: usize,
    data: Option<NonNull<T>>,
    stream: Stream,
}

// SAFETY: the buffer exclusively owns its allocation; moving it to another
// thread moves that ownership, and shared references only read.
unsafe impl<T: Element> Send for DeviceBuffer<T> {}
unsafe impl<T: Element> Sync for DeviceBuffer<T> {}

impl<T: Element> DeviceBuffer<T> {
    /// An empty buffer: zero capacity, all-zero shape, no allocation.
    pub fn new(stream: &Stream) -> Self {
        Self {
            shape: Shape::default(),
            capacity: 0,
            data: None,
            stream: stream.clone(),
        }
    }

    /// A buffer allocated to exactly `shape.len()` elements, contents undefined.
    pub fn with_shape(stream: &Stream, shape: impl Into<Shape>) -> Result<Self> {
        let mut buffer = Self::new(stream);
        buffer.resize(shape)?;
        Ok(buffer)
    }

    /// A buffer allocated to exactly `shape.len()` elements, all zero.
    pub fn zeroed(stream: &Stream, shape: impl Into<Shape>) -> Result<Self> {
        let mut buffer = Self::new(stream);
        buffer.resize_zeroed(shape)?;
        Ok(buffer)
    }

    /// A buffer of `shape` filled from host memory.
    pub fn from_host(stream: &Stream, shape: impl Into<Shape>, data: &[T]) -> Result<Self> {
        let mut buffer = Self::with_shape(stream, shape)?;
        buffer.copy_from_host(data)?;
        Ok(buffer)
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn rows(&self) -> usize {
        self.shape.rows
    }

    pub fn cols(&self) -> usize {
        self.shape.cols
    }

    pub fn beam(&self) -> usize {
        self.shape.beam
    }

    pub fn batch(&self) -> usize {
        self.shape.batch
    }

    /// Dimension `i` of the logical shape.
    ///
    /// # Panics
    ///
    /// Panics if `i > 3`.
    pub fn dim(&self, i: usize) -> usize {
        match self.shape.dim(i) {
            Some(d) => d,
            None => panic!("dimension index {i} out of range for a 4-D buffer"),
        }
    }

    /// Logical element count.
    pub fn len(&self) -> usize {
        self.shape.len()
    }

    /// Empty iff the logical element count is zero, regardless of capacity.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Physical element count of the backing allocation.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Opaque device handle, `None` while nothing is allocated.
    pub fn handle(&self) -> Option<NonNull<T>> {
        self.data
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    /// Set the logical shape, growing the allocation if it is too small.
    ///
    /// Growth allocates exactly `shape.len()` elements, copies the current
    /// *logical* contents (not the whole old capacity) into the front of the
    /// new region and frees the old one. A shape that fits the current
    /// capacity never reallocates or moves data.
    ///
    /// A shape with zero `rows` or `cols` releases all memory, leaving the
    /// buffer as if [`clear`](Self::clear) had been called. Callers that resize
    /// to `(0, n)` expecting a zero-sized but still allocated buffer lose
    /// their capacity. A zero `beam` or `batch` with non-zero `rows` and
    /// `cols` keeps the allocation; on an unallocated buffer it is a no-op.
    ///
    /// # Parameters
    ///
    /// * `shape` - The new logical shape, as a [`Shape`], `(rows, cols)` or `[usize; 4]`.
    ///
    /// # Returns
    ///
    /// `Ok(())` once the shape is in effect. On error the buffer is unchanged:
    /// [`DeviceError::InvalidLayout`] if the element count overflows, or the
    /// device's allocation or copy failure.
    pub fn resize(&mut self, shape: impl Into<Shape>) -> Result<()> {
        self.resize_inner(shape.into(), false)
    }

    /// Like [`resize`](Self::resize), zero-filling any newly allocated
    /// elements that did not receive old contents.
    pub fn resize_zeroed(&mut self, shape: impl Into<Shape>) -> Result<()> {
        self.resize_inner(shape.into(), true)
    }

    fn resize_inner(&mut self, shape: Shape, zero_fill: bool) -> Result<()> {
        if shape.is_degenerate() {
            self.clear();
            return Ok(());
        }
        let new_len = element_count(shape)?;

        match self.data {
            None if new_len == 0 => return Ok(()),
            None => {
                let ptr = self.allocate(new_len)?;
                if zero_fill {
                    // SAFETY: `ptr` is a fresh region of `new_len` elements.
                    let zeroed = unsafe { self.stream.zero_async(ptr.cast(), Self::bytes(new_len)) };
                    if let Err(err) = zeroed {
                        // SAFETY: allocated above with the same length and never published.
                        unsafe { self.release(ptr, new_len) };
                        return Err(err.into());
                    }
                }
                self.data = Some(ptr);
                self.capacity = new_len;
            }
            Some(old) if new_len > self.capacity => {
                let ptr = self.allocate(new_len)?;
                let kept = self.len();
                // SAFETY: `old` holds at least `kept` elements, `ptr` holds `new_len > kept`.
                let moved = unsafe {
                    let copied = self.stream.copy_async(ptr.cast(), old.cast(), Self::bytes(kept));
                    match (copied, zero_fill) {
                        (Ok(()), true) => self.stream.zero_async(ptr.add(kept).cast(), Self::bytes(new_len - kept)),
                        (result, _) => result,
                    }
                };
                if let Err(err) = moved {
                    // SAFETY: allocated above and never published.
                    unsafe { self.release(ptr, new_len) };
                    return Err(err.into());
                }
                trace!(from = self.capacity, to = new_len, kept, "growing device buffer");
                // SAFETY: `old` was allocated with `self.capacity` elements.
                unsafe { self.release(old, self.capacity) };
                self.data = Some(ptr);
                self.capacity = new_len;
            }
            Some(_) => {}
        }

        self.shape = shape;
        Ok(())
    }

    /// Reinterpret the allocation under a new shape without moving data.
    ///
    /// Fails with [`Error::Capacity`] and leaves the buffer untouched when the
    /// new shape needs more elements than are allocated. Reshaping to the
    /// all-zero shape releases the allocation like [`clear`](Self::clear); any
    /// other zero-element shape keeps it. An unallocated buffer keeps its
    /// all-zero shape under any zero-element reshape.
    pub fn reshape(&mut self, shape: impl Into<Shape>) -> Result<()> {
        let shape = shape.into();
        if shape.is_zero() || (self.data.is_none() && shape.is_empty()) {
            self.clear();
            return Ok(());
        }
        let requested = element_count(shape)?;
        if requested > self.capacity {
            return Err(Error::Capacity {
                requested,
                capacity: self.capacity,
            });
        }
        self.shape = shape;
        Ok(())
    }

    /// View the buffer as a 2-D matrix of `rows * beam * batch` rows.
    ///
    /// An unallocated buffer keeps its all-zero shape.
    pub fn reshape_flatten(&mut self) {
        if self.data.is_some() {
            self.shape = self.shape.flatten();
        }
    }

    /// Release the allocation and reset shape and capacity to zero.
    pub fn clear(&mut self) {
        if let Some(ptr) = self.data.take() {
            // SAFETY: `ptr` was allocated with `self.capacity` elements.
            unsafe { self.release(ptr, self.capacity) };
        }
        self.shape = Shape::default();
        self.capacity = 0;
    }

    /// Deep copy of the logical contents into an allocation of exactly
    /// `len()` elements on the same stream.
    pub fn try_clone(&self) -> Result<Self> {
        let mut copy = Self::new(&self.stream);
        let len = self.len();
        let Some(src) = self.data.filter(|_| len > 0) else {
            return Ok(copy);
        };
        let dst = copy.allocate(len)?;
        // SAFETY: both regions hold at least `len` elements and are distinct.
        if let Err(err) = unsafe { self.stream.copy_async(dst.cast(), src.cast(), Self::bytes(len)) } {
            // SAFETY: allocated above and never published.
            unsafe { copy.release(dst, len) };
            return Err(err.into());
        }
        copy.data = Some(dst);
        copy.capacity = len;
        copy.shape = self.shape;
        Ok(copy)
    }

    /// Replace this buffer's contents with a deep copy of `other`.
    ///
    /// On failure this buffer is left as it was.
    pub fn assign_from(&mut self, other: &Self) -> Result<()> {
        *self = other.try_clone()?;
        Ok(())
    }

    /// Move the allocation and shape out, leaving this buffer empty.
    pub fn take(&mut self) -> Self {
        let empty = Self::new(&self.stream);
        mem::replace(self, empty)
    }

    /// Upload `data` into the front of the allocation.
    pub fn copy_from_host(&mut self, data: &[T]) -> Result<()> {
        if data.len() > self.capacity {
            return Err(Error::Capacity {
                requested: data.len(),
                capacity: self.capacity,
            });
        }
        let Some(dst) = self.data.filter(|_| !data.is_empty()) else {
            return Ok(());
        };
        // SAFETY: the region holds at least `data.len()` elements.
        unsafe { self.stream.upload(dst.cast(), data.as_ptr().cast(), Self::bytes(data.len()))? };
        Ok(())
    }

    /// Download the logical contents, waiting for queued work on the stream.
    pub fn copy_to_host(&self) -> Result<Vec<T>> {
        let len = self.len();
        let mut out = vec![T::default(); len];
        if let Some(src) = self.data.filter(|_| len > 0) {
            // SAFETY: `out` and the region both hold `len` elements.
            unsafe { self.stream.download(out.as_mut_ptr().cast(), src.cast(), Self::bytes(len))? };
        }
        Ok(out)
    }

    /// Sum of all logical elements. Downloads the whole buffer; diagnostics only.
    pub fn sum(&self) -> Result<f64> {
        Ok(self.copy_to_host()?.into_iter().map(Element::to_f64).sum())
    }

    /// Shape, handle and capacity; with `detailed`, also size and sum.
    pub fn debug(&self, detailed: bool) -> Result<String> {
        let mut out = format!("{} {:?} {}", self.shape, self.data, self.capacity);
        if detailed {
            out.push_str(&format!(" size={} sum={}", self.len(), self.sum()?));
        }
        Ok(out)
    }

    #[inline]
    fn bytes(len: usize) -> usize {
        len * mem::size_of::<T>()
    }

    fn allocate(&self, len: usize) -> std::result::Result<NonNull<T>, DeviceError> {
        let layout = Layout::array::<T>(len)?;
        Ok(self.stream.device().allocate(layout)?.cast())
    }

    /// # Safety
    ///
    /// `ptr` must come from [`allocate`](Self::allocate) with the same `len`.
    unsafe fn release(&self, ptr: NonNull<T>, len: usize) {
        // Frees are ordered after any copy still reading from the region.
        if let Err(err) = self.stream.synchronize() {
            error!(%err, "device synchronize failed before free");
        }
        match Layout::array::<T>(len) {
            // SAFETY: forwarded from the caller's contract.
            Ok(layout) => unsafe { self.stream.device().deallocate(ptr.cast(), layout) },
            Err(err) => error!(%err, len, "leaking device region with unrepresentable layout"),
        }
    }
}

fn element_count(shape: Shape) -> Result<usize> {
    shape
        .checked_len()
        .ok_or_else(|| DeviceError::InvalidLayout(format!("element count of {shape} overflows")).into())
}

impl<T: Element> Drop for DeviceBuffer<T> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: Element> fmt::Debug for DeviceBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("shape", &self.shape)
            .field("capacity", &self.capacity)
            .field("handle", &self.data)
            .finish()
    }
}

/// Float buffer, the common case for activations.
pub type Matrix = DeviceBuffer<f32>;

/// Integer buffer, used for token ids and lengths.
pub type IMatrix = DeviceBuffer<u32>;
