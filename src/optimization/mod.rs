mod adam;
mod clipping;
mod dp;
mod gradient_descent;
mod gradient_descent_with_momentum;
mod optimizer;

pub use adam::Adam;
pub use clipping::{clip_l2, ClipReport};
pub use dp::{DpOptimizer, DpSgdConfig, StepStats};
pub use gradient_descent::GradientDescent;
pub use gradient_descent_with_momentum::GradientDescentWithMomentum;
pub use optimizer::Optimizer;
