//! Field-of-View Masks
//!
//! A scanner only sweeps a circular region of the image plane; pixels
//! outside of it are never crossed by a measured ray and should not be
//! reported in the final image.

use ndarray::prelude::*;
use ndarray::NdFloat;

/// Binary mask of the largest circle inscribed in an `(height, width)`
/// image: 1 inside, 0 outside.
///
/// The centre sits between pixels at `(height/2 - 0.5, width/2 - 0.5)`,
/// so even-sized images get a symmetric mask.
pub fn circular_mask<S: NdFloat>(height: usize, width: usize) -> Array2<S> {
    let ci = (height / 2) as f64 - 0.5;
    let cj = (width / 2) as f64 - 0.5;
    let radius = ci
        .min(cj)
        .min(height as f64 - 1.0 - ci)
        .min(width as f64 - 1.0 - cj);

    Array2::from_shape_fn((height, width), |(i, j)| {
        let d = ((i as f64 - ci).powi(2) + (j as f64 - cj).powi(2)).sqrt();
        if d <= radius {
            S::one()
        } else {
            S::zero()
        }
    })
}
