//! Forward-Projection Operators and their Adjoints
//!
//! The solver in [`crate::recon`] is generic over the tomographic forward
//! model. A projector maps an image (attenuation map) to simulated
//! projection data, and — because the solver descends through it — must
//! also pull a projection-domain residual back into the image domain.
//! That second half is deliberately an explicit vector-Jacobian product
//! rather than an autodiff graph: implementations stay free to compute it
//! however they like (matched adjoint, unmatched backprojector, GPU
//! kernels), and the solver stays independent of any autodiff runtime.

use std::marker::PhantomData;

use ndarray::prelude::*;
use ndarray::NdFloat;

/// A differentiable forward-projection operator.
///
/// Arrays crossing this trait are host-resident; if an implementation
/// evaluates on an accelerator, it owns the transfers on both sides.
pub trait ForwardProjector {
    type Elem: NdFloat;

    /// Image shape (height, width) this operator projects from.
    ///
    /// Only used to size initial estimates; not part of the algorithm.
    fn image_dim(&self) -> (usize, usize);

    /// Projection shape (views, detector width) this operator produces.
    fn projection_dim(&self) -> (usize, usize);

    /// Simulate projection data from an image estimate.
    fn forward(&self, image: ArrayView2<Self::Elem>) -> Array2<Self::Elem>;

    /// Vector-Jacobian product: pull `upstream` (a residual in the
    /// projection domain) back through the linearization of `forward` at
    /// `image`, yielding an image-domain gradient.
    ///
    /// Linear operators ignore `image`; it is the linearization point for
    /// those that need one.
    fn vjp(
        &self,
        image: ArrayView2<Self::Elem>,
        upstream: ArrayView2<Self::Elem>,
    ) -> Array2<Self::Elem>;
}

/// The identity "projector": image and projection domains coincide.
///
/// Useful as a reference operator — with it, reconstruction degenerates to
/// TV-regularized denoising and the solver can be checked against known
/// least-squares behavior.
pub struct Identity<A> {
    dim: (usize, usize),
    phantom: PhantomData<*const A>,
}

impl<A> Identity<A> {
    #[must_use]
    pub fn new(height: usize, width: usize) -> Identity<A> {
        Identity {
            dim: (height, width),
            phantom: PhantomData,
        }
    }
}

impl<A: NdFloat> ForwardProjector for Identity<A> {
    type Elem = A;

    fn image_dim(&self) -> (usize, usize) {
        self.dim
    }

    fn projection_dim(&self) -> (usize, usize) {
        self.dim
    }

    #[inline]
    fn forward(&self, image: ArrayView2<A>) -> Array2<A> {
        image.to_owned()
    }

    #[inline]
    fn vjp(&self, _image: ArrayView2<A>, upstream: ArrayView2<A>) -> Array2<A> {
        upstream.to_owned()
    }
}

/// Dense system-matrix projector.
///
/// Row `v * detector_width + d` of the matrix holds the intersection
/// weights of the ray reaching detector `d` at view `v`; columns index
/// image pixels in row-major order. `forward` is `A·vec(x)`, `vjp` is the
/// matched adjoint `Aᵀ·vec(r)`.
///
/// This is how an externally computed geometry (e.g. exported by a
/// projector library) binds to the solver without this crate knowing any
/// scanner mathematics.
pub struct MatrixProjector<A> {
    matrix: Array2<A>,
    image_dim: (usize, usize),
    projection_dim: (usize, usize),
}

impl<A: NdFloat> MatrixProjector<A> {
    /// Panics if the matrix dimensions are inconsistent with the given
    /// image and projection shapes.
    #[must_use]
    pub fn new(
        matrix: Array2<A>,
        image_dim: (usize, usize),
        projection_dim: (usize, usize),
    ) -> MatrixProjector<A> {
        let (rows, cols) = matrix.dim();
        assert_eq!(
            rows,
            projection_dim.0 * projection_dim.1,
            "system matrix has {} rows but the projection holds {}x{} values",
            rows,
            projection_dim.0,
            projection_dim.1,
        );
        assert_eq!(
            cols,
            image_dim.0 * image_dim.1,
            "system matrix has {} columns but the image holds {}x{} pixels",
            cols,
            image_dim.0,
            image_dim.1,
        );
        MatrixProjector {
            matrix,
            image_dim,
            projection_dim,
        }
    }
}

impl<A: NdFloat> ForwardProjector for MatrixProjector<A> {
    type Elem = A;

    fn image_dim(&self) -> (usize, usize) {
        self.image_dim
    }

    fn projection_dim(&self) -> (usize, usize) {
        self.projection_dim
    }

    fn forward(&self, image: ArrayView2<A>) -> Array2<A> {
        let flat = Array1::from_iter(image.iter().copied());
        self.matrix
            .dot(&flat)
            .into_shape(self.projection_dim)
            .unwrap()
    }

    fn vjp(&self, _image: ArrayView2<A>, upstream: ArrayView2<A>) -> Array2<A> {
        let flat = Array1::from_iter(upstream.iter().copied());
        self.matrix.t().dot(&flat).into_shape(self.image_dim).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn identity() {
        let eye = Identity::new(2, 2);
        let x = array![[1., 2.], [3., 4.]];

        assert!(eye.forward(x.view()) == x);
        assert!(eye.vjp(x.view(), x.view()) == x);
        assert_eq!(eye.image_dim(), eye.projection_dim());
    }

    #[test]
    fn matrix_forward_matches_dot() {
        // 2 views x 1 detector, 1x2 image
        let a = array![[1., 2.], [3., 4.]];
        let proj = MatrixProjector::new(a, (1, 2), (2, 1));
        let x = array![[5., 6.]];

        let g = proj.forward(x.view());
        assert_abs_diff_eq!(g, array![[17.], [39.]]);
    }

    #[test]
    fn matrix_vjp_is_adjoint() {
        // <A x, y> == <x, A^T y> for arbitrary x, y
        let a = array![[1., -2., 0.], [0.5, 3., -1.], [2., 2., 2.], [0., 1., 4.]];
        let proj = MatrixProjector::new(a, (1, 3), (2, 2));
        let x = array![[0.3, -1.2, 2.5]];
        let y = array![[1., 2.], [-3., 0.5]];

        let ax_y = (&proj.forward(x.view()) * &y).sum();
        let x_aty = (&x * &proj.vjp(x.view(), y.view())).sum();
        assert_abs_diff_eq!(ax_y, x_aty, epsilon = 1e-12);
    }

    #[test]
    #[should_panic]
    fn matrix_shape_mismatch_panics() {
        let a = Array2::<f32>::zeros((4, 3));
        let _ = MatrixProjector::new(a, (2, 2), (2, 2));
    }
}
