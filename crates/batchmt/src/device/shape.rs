use std::fmt;

/// Logical 4-D shape of a device buffer: rows, cols, beam, batch.
///
/// The names are positional only; the buffer attaches no meaning to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    pub rows: usize,
    pub cols: usize,
    pub beam: usize,
    pub batch: usize,
}

impl Shape {
    /// A 2-D shape; beam and batch default to 1.
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols, beam: 1, batch: 1 }
    }

    pub const fn new4(rows: usize, cols: usize, beam: usize, batch: usize) -> Self {
        Self { rows, cols, beam, batch }
    }

    pub const fn with_beam(self, beam: usize) -> Self {
        Self { beam, ..self }
    }

    pub const fn with_batch(self, batch: usize) -> Self {
        Self { batch, ..self }
    }

    /// Element count `rows * cols * beam * batch`.
    ///
    /// Only for shapes already known to fit, such as a buffer's current
    /// shape. Use [`checked_len`](Self::checked_len) on caller input.
    pub const fn len(&self) -> usize {
        self.rows * self.cols * self.beam * self.batch
    }

    /// Element count, `None` if it does not fit in `usize`.
    pub const fn checked_len(&self) -> Option<usize> {
        let Some(plane) = self.rows.checked_mul(self.cols) else {
            return None;
        };
        let Some(beams) = plane.checked_mul(self.beam) else {
            return None;
        };
        beams.checked_mul(self.batch)
    }

    /// Whether any dimension is zero.
    pub const fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0 || self.beam == 0 || self.batch == 0
    }

    /// Whether `rows` or `cols` is zero, the shapes that make a resize clear.
    pub const fn is_degenerate(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// Whether every dimension is zero, the shape of an unallocated buffer.
    pub const fn is_zero(&self) -> bool {
        self.rows == 0 && self.cols == 0 && self.beam == 0 && self.batch == 0
    }

    /// Fold beam and batch into rows.
    pub const fn flatten(&self) -> Self {
        Self::new(self.rows * self.beam * self.batch, self.cols)
    }

    /// Dimension by position, `None` past the fourth.
    pub const fn dim(&self, i: usize) -> Option<usize> {
        match i {
            0 => Some(self.rows),
            1 => Some(self.cols),
            2 => Some(self.beam),
            3 => Some(self.batch),
            _ => None,
        }
    }
}

impl From<(usize, usize)> for Shape {
    fn from((rows, cols): (usize, usize)) -> Self {
        Self::new(rows, cols)
    }
}

impl From<[usize; 4]> for Shape {
    fn from([rows, cols, beam, batch]: [usize; 4]) -> Self {
        Self::new4(rows, cols, beam, batch)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}x{}", self.rows, self.cols, self.beam, self.batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_dimensional_defaults() {
        let shape = Shape::new(3, 4);
        assert_eq!(shape, Shape::new4(3, 4, 1, 1));
        assert_eq!(shape.len(), 12);
        assert!(!shape.is_zero());
    }

    #[test]
    fn test_flatten_folds_trailing_dims_into_rows() {
        let shape = Shape::new4(2, 8, 3, 5).flatten();
        assert_eq!(shape, Shape::new4(30, 8, 1, 1));
    }

    #[test]
    fn test_zero_dimension_empties_but_is_not_zero_shape() {
        let shape = Shape::new(0, 5);
        assert!(shape.is_empty());
        assert!(!shape.is_zero());
        assert!(Shape::default().is_zero());
    }

    #[test]
    fn test_checked_len_catches_overflow() {
        assert_eq!(Shape::new4(2, 3, 4, 5).checked_len(), Some(120));
        assert_eq!(Shape::new(usize::MAX, 2).checked_len(), None);
        assert_eq!(Shape::new4(1 << 20, 1 << 20, 1 << 20, 1 << 20).checked_len(), None);
        assert!(Shape::new4(usize::MAX, usize::MAX, 0, 1).is_empty());
    }

    #[test]
    fn test_degenerate_only_on_rows_or_cols() {
        assert!(Shape::new(0, 5).is_degenerate());
        assert!(Shape::new(5, 0).is_degenerate());
        assert!(!Shape::new4(2, 3, 0, 1).is_degenerate());
        assert!(Shape::new4(2, 3, 0, 1).is_empty());
    }

    #[test]
    fn test_dim_and_display() {
        let shape: Shape = [1, 2, 3, 4].into();
        assert_eq!(shape.dim(2), Some(3));
        assert_eq!(shape.dim(4), None);
        assert_eq!(shape.to_string(), "1x2x3x4");
    }
}
