//! The `ndarray-recon` crate reconstructs cross-sectional images from
//! computed-tomography projection (sinogram) data stored in `ndarray`s.
//!
//! The reconstruction is posed as a regularized least-squares problem
//! ```math
//! \hat{x} = \mathrm{arg}\!\min_{x \geq 0} \| A x - g \|_2^2 + \lambda \, \mathrm{TV}(x)
//! ```
//! and solved by accelerated proximal gradient descent (FISTA) with a
//! total-variation proximal step.
//!
//! The forward projector $`A`$ is an external collaborator: anything
//! implementing [`projector::ForwardProjector`] — i.e. exposing a forward
//! projection and its vector-Jacobian product — can drive the solver.
//! Reference operators for testing and for dense system matrices are
//! provided, but the projection mathematics of a real scanner geometry is
//! out of scope here.
//!
//! A goal of this crate is to provide iterative reconstruction on par
//! with the solver loops of tomography toolkits in other languages, such
//! as TIGRE or ASTRA for Python/MATLAB, for workflows that live in the
//! Rust/ndarray ecosystem.

#![cfg_attr(all(rustc_nightly, test), feature(test))]
#[cfg(all(rustc_nightly, test))]
extern crate test;

pub mod fov;
pub mod io;
pub mod projector;
pub mod recon;
pub mod tv;
