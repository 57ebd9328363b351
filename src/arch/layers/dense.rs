use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis};

use crate::{
    arch::{activations::ActFn, TensorSpec},
    FedErr, Result,
};

/// A fully connected layer, `a = act(x·W + b)`.
///
/// The layer holds no parameters, they're handed in as a flat slice laid out as the weights
/// (row major, `dim.0 × dim.1`) followed by the biases (`dim.1`).
#[derive(Clone, Copy, Debug)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
}

impl Dense {
    /// Returns a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The input and output sizes.
    /// * `act_fn` - An optional activation applied to the weighted sums.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self { dim, act_fn }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        (self.dim.0 + 1) * self.dim.1
    }

    /// The weight and bias tensors of this layer when it's the `idx`-th one in a model.
    pub fn specs(&self, idx: usize) -> [TensorSpec; 2] {
        [
            TensorSpec::new(format!("dense{idx}.weight"), &[self.dim.0, self.dim.1]),
            TensorSpec::new(format!("dense{idx}.bias"), &[self.dim.1]),
        ]
    }

    /// Makes a forward pass through the layer.
    ///
    /// # Arguments
    /// * `params` - The layer's parameters.
    /// * `x` - The input batch, one example per row.
    ///
    /// # Returns
    /// The weighted sums and the activations.
    pub fn forward(
        &self,
        params: &[f32],
        x: ArrayView2<f32>,
    ) -> Result<(Array2<f32>, Array2<f32>)> {
        if x.ncols() != self.dim.0 {
            return Err(FedErr::SizeMismatch {
                what: "layer input",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;
        let z = x.dot(&w) + &b;

        let a = match &self.act_fn {
            Some(act_fn) => z.mapv(|z| act_fn.f(z)),
            None => z.clone(),
        };

        Ok((z, a))
    }

    /// Makes a backward pass through the layer, writing the parameter gradient in `grad`.
    ///
    /// # Arguments
    /// * `params` - The layer's parameters.
    /// * `grad` - Where to write the gradient of this layer's parameters.
    /// * `x` - The input received on the forward pass.
    /// * `z` - The weighted sums computed on the forward pass.
    /// * `d` - The derivative of the loss with respect to this layer's output.
    ///
    /// # Returns
    /// The derivative of the loss with respect to this layer's input.
    pub fn backward(
        &self,
        params: &[f32],
        grad: &mut [f32],
        x: ArrayView2<f32>,
        z: ArrayView2<f32>,
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        if let Some(act_fn) = &self.act_fn {
            d.zip_mut_with(&z, |d, &z| *d *= act_fn.df(z));
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        dw.assign(&x.t().dot(&d));
        db.assign(&d.sum_axis(Axis(0)));

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w.t()))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len("layer parameters", params.len())?;

        let w_size = self.size() - self.dim.1;
        let weights = ArrayView2::from_shape(self.dim, &params[..w_size])?;
        let biases = ArrayView1::from_shape(self.dim.1, &params[w_size..])?;
        Ok((weights, biases))
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len("layer gradient", grad.len())?;

        let w_size = self.size() - self.dim.1;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw)?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw)?;
        Ok((dw, db))
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        if got != self.size() {
            return Err(FedErr::SizeMismatch {
                what,
                got,
                expected: self.size(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn forward_is_affine_without_activation() {
        let layer = Dense::new((2, 1), None);
        // w = [2, 3], b = [1]
        let params = [2.0, 3.0, 1.0];
        let x = array![[1.0f32, 1.0], [0.0, 2.0]];

        let (z, a) = layer.forward(&params, x.view()).unwrap();
        assert_eq!(z, array![[6.0f32], [7.0]]);
        assert_eq!(a, z);
    }

    #[test]
    fn backward_writes_weight_and_bias_gradients() {
        let layer = Dense::new((2, 1), None);
        let params = [2.0, 3.0, 1.0];
        let x = array![[1.0f32, 2.0]];
        let (z, _) = layer.forward(&params, x.view()).unwrap();

        let mut grad = [0.0; 3];
        let dx = layer
            .backward(&params, &mut grad, x.view(), z.view(), array![[0.5f32]])
            .unwrap();

        assert_eq!(grad, [0.5, 1.0, 0.5]);
        assert_eq!(dx, array![[1.0f32, 1.5]]);
    }

    #[test]
    fn forward_rejects_wrong_input_width() {
        let layer = Dense::new((3, 1), None);
        let err = layer
            .forward(&[0.0; 4], array![[1.0f32, 2.0]].view())
            .unwrap_err();
        assert!(matches!(
            err,
            FedErr::SizeMismatch {
                got: 2,
                expected: 3,
                ..
            }
        ));
    }
}
