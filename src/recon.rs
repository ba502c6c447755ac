//! Accelerated Proximal Gradient Reconstruction
//!
//! Drives the FISTA iteration for the TV-regularized reconstruction
//! problem
//! ```math
//! \mathrm{arg}\!\min_{x \geq 0} \| M \odot (A x - g) \|_2^2 + \lambda \, \mathrm{TV}(x)
//! ```
//! where $`A`$ is a [`ForwardProjector`], $`g`$ the measured projection
//! data and $`M`$ an optional projection-domain mask.
//!
//! Algorithm
//! ---------
//! ```math
//! \begin{aligned}
//! v_i &= s_i - \eta \nabla f(s_i) \\
//! x_{i+1} &= \max\!\left(\mathrm{prox}_{\eta\lambda \mathrm{TV}}(v_i),\, 0\right) \\
//! t_{i+1} &= \frac{1 + \sqrt{1 + 4 t_i^2}}{2} \\
//! s_{i+1} &= x_{i+1} + \frac{t_i - 1}{t_{i+1}} (x_{i+1} - x_i)
//! \end{aligned}
//! ```
//! The data-fidelity gradient is obtained through the projector's
//! vector-Jacobian product, so the solver never differentiates anything
//! itself. Iteration stops when the loss falls below `stop_criterion`
//! relative to the first iteration's loss, or after `iter_count`
//! iterations — whichever comes first.
//!
//! References
//! ----------
//! \[BT09\]: Beck, Teboulle, "Fast Gradient-Based Algorithms for
//!          Constrained Total Variation Image Denoising and Deblurring
//!          Problems", IEEE TIP 18(11), 2009

use std::error::Error;
use std::fmt;

use ndarray::prelude::*;
use ndarray::NdFloat;
use num_traits::Float;

use crate::projector::ForwardProjector;
use crate::tv::TvProx;

/// Solver configuration, fixed for the duration of a run.
#[derive(Clone, Copy, Debug)]
pub struct ReconConfig<S> {
    /// Gradient step size.
    pub learning_rate: S,
    /// TV regularization strength.
    pub lambda: S,
    /// Maximum number of outer iterations.
    pub iter_count: usize,
    /// Stop when loss / first-iteration loss falls below this.
    pub stop_criterion: S,
    /// Emit a snapshot every this many iterations (0 disables snapshots).
    pub save_freq: usize,
    /// Inner dual-ascent iterations per TV proximal step.
    pub tv_inner_iters: usize,
}

impl<S: NdFloat> Default for ReconConfig<S> {
    fn default() -> ReconConfig<S> {
        ReconConfig {
            learning_rate: S::from(0.01).unwrap(),
            lambda: S::from(1e-4).unwrap(),
            iter_count: 2000,
            stop_criterion: S::from(1e-7).unwrap(),
            save_freq: 10,
            tv_inner_iters: 10,
        }
    }
}

/// Per-iteration state handed to the monitor callback.
pub struct IterationReport<'a, S> {
    /// Zero-based iteration index.
    pub iter: usize,
    pub iter_count: usize,
    /// Mean squared error between masked predicted and measured data.
    pub loss: S,
    /// Loss normalized by the first iteration's loss.
    pub loss_ratio: S,
    /// l2 norm of the data-fidelity gradient.
    pub grad_norm: S,
    /// Largest pixel value of the current estimate.
    pub img_max: S,
    /// The current image estimate.
    pub image: ArrayView2<'a, S>,
}

/// Reconstruction failure.
///
/// Shape mismatches are configuration errors and are raised before the
/// first iteration; a non-finite loss or gradient is unrecoverable
/// numerical divergence and aborts the run wherever it happens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconError {
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },
    NonFinite {
        iter: usize,
    },
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconError::ShapeMismatch {
                what,
                expected,
                found,
            } => write!(
                f,
                "{} has shape {}x{} but {}x{} is required",
                what, found.0, found.1, expected.0, expected.1
            ),
            ReconError::NonFinite { iter } => {
                write!(f, "non-finite loss or gradient at iteration {}", iter)
            }
        }
    }
}

impl Error for ReconError {}

fn check_shape(
    what: &'static str,
    expected: (usize, usize),
    found: (usize, usize),
) -> Result<(), ReconError> {
    if expected == found {
        Ok(())
    } else {
        Err(ReconError::ShapeMismatch {
            what,
            expected,
            found,
        })
    }
}

/// Reconstruct an image from measured projection data.
///
/// Parameters
/// ----------
/// - __projector:__ forward model supplying `forward` and `vjp`
/// - __g:__         measured projection data, shape `projection_dim()`
/// - __g_mask:__    optional projection-domain weights, same shape as `g`;
///                   masked-out entries contribute nothing to loss or
///                   gradient
/// - __f_init:__    initial image estimate (image prior or zeros)
/// - __f_fov:__     optional field-of-view mask, multiplied into the final
///                   image only
/// - __config:__    see [`ReconConfig`]
/// - __monitor:__   evaluated with an [`IterationReport`] after every
///                   iteration; return `true` to terminate early
/// - __snapshot:__  evaluated with `(iter, estimate)` every
///                   `config.save_freq` iterations, for diagnostic
///                   persistence
///
/// Exhausting `iter_count` without meeting the stop criterion is not an
/// error; the current estimate is returned either way.
#[allow(clippy::too_many_arguments)]
pub fn reconstruct<S, P>(
    projector: &P,
    g: ArrayView2<S>,
    g_mask: Option<ArrayView2<S>>,
    f_init: ArrayView2<S>,
    f_fov: Option<ArrayView2<S>>,
    config: &ReconConfig<S>,
    mut monitor: impl FnMut(&IterationReport<S>) -> bool,
    mut snapshot: impl FnMut(usize, ArrayView2<S>),
) -> Result<Array2<S>, ReconError>
where
    S: NdFloat,
    P: ForwardProjector<Elem = S>,
{
    check_shape("projection data", projector.projection_dim(), g.dim())?;
    check_shape("initial image", projector.image_dim(), f_init.dim())?;
    if let Some(m) = &g_mask {
        check_shape("projection mask", g.dim(), m.dim())?;
    }
    if let Some(m) = &f_fov {
        check_shape("field-of-view mask", f_init.dim(), m.dim())?;
    }

    let (h, w) = f_init.dim();
    let tv = TvProx::new(config.lambda).with_inner_iters(config.tv_inner_iters);

    // masked measured data is fixed, so mask it once up front
    let g_masked = match &g_mask {
        Some(m) => &g * m,
        None => g.to_owned(),
    };
    let nobs = S::from(g.len()).unwrap();

    let mut x = f_init.to_owned();
    let mut s = x.clone();
    let mut p = TvProx::zero_dual(h, w);
    let mut t = S::one();
    let mut first_loss = S::one();

    let two = S::from(2.).unwrap();
    let four = S::from(4.).unwrap();

    for iter in 0..config.iter_count {
        // data-fidelity loss and its gradient at the lookahead point
        let mut g_pred = projector.forward(s.view());
        if let Some(m) = &g_mask {
            g_pred.zip_mut_with(m, |gp, &wt| *gp = *gp * wt);
        }
        let residual = &g_pred - &g_masked;
        let loss = residual.fold(S::zero(), |acc, &r| acc + r * r) / nobs;
        // VJP of the summed squared residual; the 1/N of the reported
        // mean folds into the learning rate
        let upstream = residual * two;
        let grad = projector.vjp(s.view(), upstream.view());
        let grad_norm = Float::sqrt(grad.fold(S::zero(), |acc, &d| acc + d * d));
        if !loss.is_finite() || !grad_norm.is_finite() {
            return Err(ReconError::NonFinite { iter });
        }

        // gradient step, proximal step, non-negativity clamp
        let v = &s - &(grad * config.learning_rate);
        let (mut x_next, p_next) = tv.prox(v.view(), config.learning_rate, p);
        p = p_next;
        x_next.mapv_inplace(|a| a.max(S::zero()));

        // momentum
        let t_next = (S::one() + Float::sqrt(S::one() + four * t * t)) / two;
        let beta = (t - S::one()) / t_next;
        s = &x_next + &((&x_next - &x) * beta);
        t = t_next;
        x = x_next;

        if iter == 0 {
            // an exactly-zero baseline would make every later ratio NaN;
            // a zero first loss means we are already converged
            first_loss = if loss > S::zero() { loss } else { S::one() };
        }
        let loss_ratio = loss / first_loss;
        let img_max = x.fold(S::zero(), |acc, &a| acc.max(a));

        let report = IterationReport {
            iter,
            iter_count: config.iter_count,
            loss,
            loss_ratio,
            grad_norm,
            img_max,
            image: x.view(),
        };
        if monitor(&report) {
            break;
        }
        if loss_ratio < config.stop_criterion {
            break;
        }
        if config.save_freq > 0 && iter % config.save_freq == 0 {
            snapshot(iter, x.view());
        }
    }

    if let Some(m) = &f_fov {
        x.zip_mut_with(m, |xi, &wt| *xi = *xi * wt);
    }
    Ok(x)
}
