use std::ops::Range;

use ndarray::{ArrayViewD, ArrayViewMutD, IxDyn};

use crate::{FedErr, Result};

/// Name and shape of a single parameter tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorSpec {
    pub name: String,
    pub shape: Vec<usize>,
}

impl TensorSpec {
    pub fn new(name: impl Into<String>, shape: &[usize]) -> Self {
        Self {
            name: name.into(),
            shape: shape.to_vec(),
        }
    }

    /// The amount of scalars this tensor holds.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Maps a flat parameter buffer into named tensors, the "offsets + shapes" mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamLayout {
    specs: Vec<TensorSpec>,
    ranges: Vec<Range<usize>>,
    size: usize,
}

impl ParamLayout {
    /// Creates a new `ParamLayout`, tensors are laid out contiguously in the given order.
    ///
    /// # Arguments
    /// * `specs` - The tensors' names and shapes.
    pub fn new<I>(specs: I) -> Self
    where
        I: IntoIterator<Item = TensorSpec>,
    {
        let specs: Vec<_> = specs.into_iter().collect();
        let mut ranges = Vec::with_capacity(specs.len());
        let mut offset = 0;

        for spec in &specs {
            let end = offset + spec.len();
            ranges.push(offset..end);
            offset = end;
        }

        Self {
            specs,
            ranges,
            size: offset,
        }
    }

    /// The total amount of scalars in the layout.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The amount of tensors in the layout.
    pub fn count(&self) -> usize {
        self.specs.len()
    }

    pub fn specs(&self) -> &[TensorSpec] {
        &self.specs
    }

    /// The range of the flat buffer that belongs to the `idx`-th tensor.
    pub fn range(&self, idx: usize) -> Range<usize> {
        self.ranges[idx].clone()
    }

    /// Checks that `other` describes exactly the same tensors as `self`.
    ///
    /// # Returns
    /// A `SizeMismatch` if the tensor count differs or a `ShapeMismatch` naming the first
    /// tensor that differs.
    pub fn check_compatible(&self, other: &ParamLayout) -> Result<()> {
        if self.count() != other.count() {
            return Err(FedErr::SizeMismatch {
                what: "parameter tensors",
                got: other.count(),
                expected: self.count(),
            });
        }

        for (expected, got) in self.specs.iter().zip(&other.specs) {
            if expected != got {
                return Err(FedErr::ShapeMismatch {
                    tensor: expected.name.clone(),
                    got: got.shape.clone(),
                    expected: expected.shape.clone(),
                });
            }
        }

        Ok(())
    }
}

/// An ordered sequence of named parameter tensors backed by one flat buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSet {
    layout: ParamLayout,
    data: Vec<f32>,
}

impl ParamSet {
    /// Creates a zeroed `ParamSet` for the given layout.
    pub fn zeros(layout: ParamLayout) -> Self {
        let data = vec![0.0; layout.size()];
        Self { layout, data }
    }

    /// Creates a `ParamSet` from an existing flat buffer.
    ///
    /// # Returns
    /// A `SizeMismatch` error if the buffer doesn't match the layout's size.
    pub fn from_vec(layout: ParamLayout, data: Vec<f32>) -> Result<Self> {
        if data.len() != layout.size() {
            return Err(FedErr::SizeMismatch {
                what: "parameter buffer",
                got: data.len(),
                expected: layout.size(),
            });
        }

        Ok(Self { layout, data })
    }

    pub fn layout(&self) -> &ParamLayout {
        &self.layout
    }

    /// The total amount of scalars.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Returns a view of the `idx`-th tensor with its declared shape.
    pub fn tensor(&self, idx: usize) -> ArrayViewD<'_, f32> {
        let spec = &self.layout.specs[idx];
        let raw = &self.data[self.layout.range(idx)];
        // The layout guarantees the range length equals the shape's product.
        ArrayViewD::from_shape(IxDyn(&spec.shape), raw).expect("layout range matches shape")
    }

    /// Returns a mutable view of the `idx`-th tensor with its declared shape.
    pub fn tensor_mut(&mut self, idx: usize) -> ArrayViewMutD<'_, f32> {
        let range = self.layout.range(idx);
        let spec = &self.layout.specs[idx];
        ArrayViewMutD::from_shape(IxDyn(&spec.shape), &mut self.data[range])
            .expect("layout range matches shape")
    }

    /// Looks a tensor up by name.
    pub fn named(&self, name: &str) -> Option<ArrayViewD<'_, f32>> {
        let idx = self.layout.specs.iter().position(|s| s.name == name)?;
        Some(self.tensor(idx))
    }

    /// Iterates the tensors in order along with their specs.
    pub fn iter(&self) -> impl Iterator<Item = (&TensorSpec, ArrayViewD<'_, f32>)> {
        (0..self.layout.count()).map(move |i| (&self.layout.specs[i], self.tensor(i)))
    }

    /// Overwrites every parameter with the corresponding one in `other`.
    ///
    /// # Returns
    /// An error if the layouts differ, in which case nothing is written.
    pub fn assign(&mut self, other: &ParamSet) -> Result<()> {
        self.layout.check_compatible(&other.layout)?;
        self.data.copy_from_slice(&other.data);
        Ok(())
    }

    /// The L2 norm of the whole buffer.
    pub fn l2_norm(&self) -> f64 {
        l2_norm(&self.data)
    }
}

/// L2 norm of a flat buffer, accumulated in `f64`.
pub fn l2_norm(values: &[f32]) -> f64 {
    values
        .iter()
        .map(|&v| (v as f64) * (v as f64))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> ParamLayout {
        ParamLayout::new([
            TensorSpec::new("dense0.weight", &[2, 3]),
            TensorSpec::new("dense0.bias", &[3]),
        ])
    }

    #[test]
    fn layout_ranges_are_contiguous() {
        let layout = layout();
        assert_eq!(layout.size(), 9);
        assert_eq!(layout.range(0), 0..6);
        assert_eq!(layout.range(1), 6..9);
    }

    #[test]
    fn tensors_are_viewed_with_their_shapes() {
        let data = (0..9).map(|i| i as f32).collect();
        let params = ParamSet::from_vec(layout(), data).unwrap();

        let w = params.tensor(0);
        assert_eq!(w.shape(), &[2, 3]);
        assert_eq!(w[[1, 0]], 3.0);

        let b = params.named("dense0.bias").unwrap();
        assert_eq!(b.shape(), &[3]);
        assert_eq!(b[[2]], 8.0);
    }

    #[test]
    fn assign_overwrites_every_parameter() {
        let mut local = ParamSet::zeros(layout());
        let global = ParamSet::from_vec(layout(), vec![1.5; 9]).unwrap();

        local.assign(&global).unwrap();
        assert_eq!(local, global);
    }

    #[test]
    fn assign_rejects_other_shapes() {
        let mut local = ParamSet::zeros(layout());
        let other = ParamSet::zeros(ParamLayout::new([
            TensorSpec::new("dense0.weight", &[3, 2]),
            TensorSpec::new("dense0.bias", &[3]),
        ]));

        let err = local.assign(&other).unwrap_err();
        assert!(matches!(err, FedErr::ShapeMismatch { ref tensor, .. } if tensor == "dense0.weight"));
        assert!(local.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn from_vec_checks_size() {
        let err = ParamSet::from_vec(layout(), vec![0.0; 4]).unwrap_err();
        assert!(matches!(
            err,
            FedErr::SizeMismatch {
                got: 4,
                expected: 9,
                ..
            }
        ));
    }

    #[test]
    fn l2_norm_of_buffer() {
        let params = ParamSet::from_vec(
            ParamLayout::new([TensorSpec::new("w", &[2])]),
            vec![3.0, 4.0],
        )
        .unwrap();
        assert!((params.l2_norm() - 5.0).abs() < 1e-12);
    }
}
