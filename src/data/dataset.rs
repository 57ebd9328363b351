use ndarray::{Array2, ArrayView2, Axis};

use crate::{FedErr, Result};

/// A minimal in-memory supervised dataset, one example per row.
#[derive(Debug, Clone)]
pub struct Dataset {
    x: Array2<f32>,
    y: Array2<f32>,
}

impl Dataset {
    /// Creates a new dataset from a flat row-major buffer where each row holds `x_size` inputs
    /// followed by `y_size` outputs.
    ///
    /// # Arguments
    /// * `data` - The flat buffer.
    /// * `x_size` - The amount of input values per row.
    /// * `y_size` - The amount of output values per row.
    ///
    /// # Returns
    /// An error if the sizes are zero or the buffer isn't made of whole rows.
    pub fn new(data: Vec<f32>, x_size: usize, y_size: usize) -> Result<Self> {
        let row = x_size + y_size;
        if x_size == 0 || y_size == 0 {
            return Err(FedErr::Data(format!(
                "rows need at least one input and one output, got x_size={x_size} y_size={y_size}"
            )));
        }

        if data.len() % row != 0 {
            return Err(FedErr::Data(format!(
                "a buffer of {} values can't be split into rows of {row}",
                data.len()
            )));
        }

        let full = Array2::from_shape_vec((data.len() / row, row), data)?;
        let (x, y) = full.view().split_at(Axis(1), x_size);

        Ok(Self {
            x: x.to_owned(),
            y: y.to_owned(),
        })
    }

    /// Creates a new dataset from already split inputs and outputs.
    ///
    /// # Returns
    /// An error if the row counts differ.
    pub fn from_arrays(x: Array2<f32>, y: Array2<f32>) -> Result<Self> {
        if x.nrows() != y.nrows() {
            return Err(FedErr::SizeMismatch {
                what: "label rows",
                got: y.nrows(),
                expected: x.nrows(),
            });
        }

        Ok(Self { x, y })
    }

    /// The amount of examples.
    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn x_size(&self) -> usize {
        self.x.ncols()
    }

    pub fn y_size(&self) -> usize {
        self.y.ncols()
    }

    pub fn x(&self) -> ArrayView2<'_, f32> {
        self.x.view()
    }

    pub fn y(&self) -> ArrayView2<'_, f32> {
        self.y.view()
    }

    /// Gathers the given rows into an owned batch.
    pub fn select(&self, rows: &[usize]) -> (Array2<f32>, Array2<f32>) {
        (self.x.select(Axis(0), rows), self.y.select(Axis(0), rows))
    }

    /// Copies a contiguous range of rows into a new dataset.
    pub fn slice_rows(&self, start: usize, end: usize) -> Self {
        Self {
            x: self.x.slice(ndarray::s![start..end, ..]).to_owned(),
            y: self.y.slice(ndarray::s![start..end, ..]).to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn splits_inputs_and_outputs() {
        let ds = Dataset::new(vec![0., 1., 10., 2., 3., 20.], 2, 1).unwrap();

        assert_eq!(ds.len(), 2);
        assert_eq!(ds.x(), array![[0.0f32, 1.], [2., 3.]]);
        assert_eq!(ds.y(), array![[10.0f32], [20.]]);
    }

    #[test]
    fn partial_rows_are_rejected() {
        assert!(matches!(
            Dataset::new(vec![0.; 5], 1, 1),
            Err(FedErr::Data(_))
        ));
    }

    #[test]
    fn select_gathers_rows() {
        let ds = Dataset::new((0..6).map(|i| i as f32).collect(), 1, 1).unwrap();
        let (x, y) = ds.select(&[2, 0]);

        assert_eq!(x, array![[4.0f32], [0.]]);
        assert_eq!(y, array![[5.0f32], [1.]]);
    }
}
