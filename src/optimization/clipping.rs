use crate::arch::l2_norm;

/// What happened to a single gradient when it was clipped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipReport {
    pub norm_before: f64,
    pub norm_after: f64,
    pub clipped: bool,
}

/// Rescales `grad` in place so that its L2 norm is at most `max_norm`.
///
/// Gradients already inside the ball are left untouched.
pub fn clip_l2(grad: &mut [f32], max_norm: f64) -> ClipReport {
    let norm = l2_norm(grad);

    if norm <= max_norm {
        return ClipReport {
            norm_before: norm,
            norm_after: norm,
            clipped: false,
        };
    }

    let scale = max_norm / norm;
    grad.iter_mut().for_each(|g| *g = (*g as f64 * scale) as f32);

    ClipReport {
        norm_before: norm,
        norm_after: l2_norm(grad),
        clipped: true,
    }
}
