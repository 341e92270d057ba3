//! # Device memory
//!
//! Accelerator-resident storage for the numeric state of a translation.
//!
//! * [`DeviceAllocator`] is the raw memory interface a device provides;
//!   [`HostDevice`] implements it over host memory.
//! * [`Stream`] is an ordered command queue on one device. The worker pool
//!   gives each worker its own stream.
//! * [`DeviceBuffer`] is the growable 4-D tensor built on both, generic over
//!   its [`Element`] type.

mod allocator;
mod buffer;
mod element;
mod shape;
mod stream;

pub use allocator::{DeviceAllocator, HostDevice};
pub use buffer::{DeviceBuffer, IMatrix, Matrix};
pub use element::Element;
pub use shape::Shape;
pub use stream::Stream;
