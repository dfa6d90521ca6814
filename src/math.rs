
//! Simple math utilities.

/// Simple two-dimensional vector of any numerical type,
/// with the row (vertical) component first.
/// Supports only few mathematical operations
/// as this is used mainly as data struct.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RowCol<T> {

    /// Vertical component, the number of rows.
    pub rows: T,

    /// Horizontal component, the number of columns.
    pub cols: T,
}

impl<T> RowCol<T> {

    /// Create a new value from its row and column component.
    pub fn new(rows: T, cols: T) -> Self {
        RowCol { rows, cols }
    }

    /// Maps all components of this vector to a new type, yielding a vector of that new type.
    pub fn map<B>(self, map: impl Fn(T) -> B) -> RowCol<B> {
        RowCol { rows: map(self.rows), cols: map(self.cols) }
    }

    /// Seeing this vector as a dimension or size (rows and columns),
    /// this returns the area that this dimensions contains (`rows * cols`).
    pub fn area(self) -> T where T: std::ops::Mul<T, Output = T> {
        self.rows * self.cols
    }
}

impl<T: std::ops::Mul<T>> std::ops::Mul<RowCol<T>> for RowCol<T> {
    type Output = RowCol<T::Output>;
    fn mul(self, other: RowCol<T>) -> Self::Output {
        RowCol { rows: self.rows * other.rows, cols: self.cols * other.cols }
    }
}

impl<T> From<(T, T)> for RowCol<T> {
    fn from((rows, cols): (T, T)) -> Self { RowCol { rows, cols } }
}

impl<T> From<RowCol<T>> for (T, T) {
    fn from(value: RowCol<T>) -> Self { (value.rows, value.cols) }
}


/// Round up or down in specific calculations.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RoundingMode {

    /// Round down.
    Down,

    /// Round up.
    Up,
}

impl RoundingMode {
    pub(crate) fn divide(self, dividend: usize, divisor: usize) -> usize {
        match self {
            RoundingMode::Up => (dividend + divisor - 1) / divisor, // only works for positive numbers
            RoundingMode::Down => dividend / divisor,
        }
    }
}
