use std::ops::Range;

use ndarray::{s, Array2, ArrayView2};
use rand::Rng;
use rayon::prelude::*;

use super::{layers::Dense, loss::LossFn, Model, ParamInit, ParamLayout, ParamSet};
use crate::{FedErr, Result};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
#[derive(Debug, Clone)]
pub struct Sequential {
    layers: Vec<Dense>,
    params: ParamSet,
}

impl Sequential {
    /// Creates a new `Sequential` with every parameter set to zero.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance or an error if there are no layers or two consecutive
    /// layers don't fit together.
    pub fn new<I>(layers: I) -> Result<Self>
    where
        I: IntoIterator<Item = Dense>,
    {
        let layers: Vec<_> = layers.into_iter().collect();
        if layers.is_empty() {
            return Err(FedErr::InvalidConfig(
                "a sequential model needs at least one layer".into(),
            ));
        }

        for (i, pair) in layers.windows(2).enumerate() {
            let (out, next_in) = (pair[0].dim().1, pair[1].dim().0);
            if out != next_in {
                return Err(FedErr::InvalidConfig(format!(
                    "layer {i} outputs {out} values but layer {} expects {next_in}",
                    i + 1
                )));
            }
        }

        let layout = ParamLayout::new(
            layers
                .iter()
                .enumerate()
                .flat_map(|(i, layer)| layer.specs(i)),
        );

        Ok(Self {
            layers,
            params: ParamSet::zeros(layout),
        })
    }

    /// Initializes the parameters of every layer.
    ///
    /// # Arguments
    /// * `init` - The initialization strategy.
    /// * `rng` - A random number generator.
    pub fn init<R: Rng>(&mut self, init: ParamInit, rng: &mut R) -> Result<()> {
        for i in 0..self.layers.len() {
            let (fan_in, fan_out) = self.layers[i].dim();
            let w = self.params.layout().range(2 * i);
            let b = self.params.layout().range(2 * i + 1);
            let data = self.params.as_mut_slice();

            init.fill_weights(&mut data[w], fan_in, fan_out, rng)?;
            data[b].fill(init.bias());
        }

        Ok(())
    }

    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }

    /// The slice of the flat buffer holding the `idx`-th layer's weights and biases.
    fn layer_range(&self, idx: usize) -> Range<usize> {
        let layout = self.params.layout();
        layout.range(2 * idx).start..layout.range(2 * idx + 1).end
    }

    /// Forwards and backpropagates a single example.
    ///
    /// # Returns
    /// The example's loss and its gradient.
    fn example_grad<L: LossFn>(
        &self,
        x: ArrayView2<f32>,
        y: ArrayView2<f32>,
        loss_fn: &L,
    ) -> Result<(f32, Vec<f32>)> {
        let params = self.params.as_slice();
        let mut inputs = Vec::with_capacity(self.layers.len());
        let mut zs = Vec::with_capacity(self.layers.len());
        let mut a = x.to_owned();

        for (i, layer) in self.layers.iter().enumerate() {
            let (z, next) = layer.forward(&params[self.layer_range(i)], a.view())?;
            inputs.push(a);
            zs.push(z);
            a = next;
        }

        if a.dim() != y.dim() {
            return Err(FedErr::SizeMismatch {
                what: "labels",
                got: y.ncols(),
                expected: a.ncols(),
            });
        }

        let loss = loss_fn.loss(a.view(), y);
        let mut d = loss_fn.loss_prime(a.view(), y);
        let mut grad = vec![0.0; params.len()];

        for (i, layer) in self.layers.iter().enumerate().rev() {
            let range = self.layer_range(i);
            d = layer.backward(
                &params[range.clone()],
                &mut grad[range],
                inputs[i].view(),
                zs[i].view(),
                d,
            )?;
        }

        Ok((loss, grad))
    }
}

impl Model for Sequential {
    fn params(&self) -> &ParamSet {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamSet {
        &mut self.params
    }

    fn forward(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let params = self.params.as_slice();
        let mut a = x.to_owned();

        for (i, layer) in self.layers.iter().enumerate() {
            let (_, next) = layer.forward(&params[self.layer_range(i)], a.view())?;
            a = next;
        }

        Ok(a)
    }

    // Each row is backpropagated on its own so that every example gets its own gradient,
    // rows are independent so they're spread over the rayon pool.
    fn per_example_grads<L: LossFn>(
        &self,
        x: ArrayView2<f32>,
        y: ArrayView2<f32>,
        loss_fn: &L,
    ) -> Result<(f32, Vec<Vec<f32>>)> {
        if x.nrows() != y.nrows() {
            return Err(FedErr::SizeMismatch {
                what: "label rows",
                got: y.nrows(),
                expected: x.nrows(),
            });
        }

        if x.nrows() == 0 {
            return Err(FedErr::Data("empty batch".into()));
        }

        let per_example = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let xi = x.slice(s![i..i + 1, ..]);
                let yi = y.slice(s![i..i + 1, ..]);
                self.example_grad(xi, yi, loss_fn)
            })
            .collect::<Result<Vec<_>>>()?;

        let n = per_example.len() as f32;
        let (losses, grads): (Vec<f32>, Vec<Vec<f32>>) = per_example.into_iter().unzip();
        let loss = losses.iter().sum::<f32>() / n;

        Ok((loss, grads))
    }
}
