use std::fmt::Debug;

/// A scalar type that may live in a [`DeviceBuffer`](super::DeviceBuffer).
///
/// Buffers are plain-old-data regions: elements are copied bytewise between
/// regions and a zero-filled region must be a valid value of the type.
pub trait Element: Copy + Default + Debug + Send + Sync + 'static {
    /// Widen to `f64`, used by the diagnostic sum.
    fn to_f64(self) -> f64;
}

macro_rules! impl_element {
    ($($t:ty),*) => {
        $(
            impl Element for $t {
                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_element!(f32, f64, i32, u32, i64, u8);
