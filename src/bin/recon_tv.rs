use std::fs::create_dir_all;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use ndarray::Array2;

use ndarray_recon::fov::circular_mask;
use ndarray_recon::io::{load_array2, save_array2, save_png};
use ndarray_recon::projector::{ForwardProjector, MatrixProjector};
use ndarray_recon::recon::{reconstruct, ReconConfig};

/// Iterative CT reconstruction from sinogram data (FISTA + total
/// variation).
///
/// Expected `.npy` inputs: the measured sinogram (views x detectors) and
/// a dense system matrix ((views*detectors) x (size*size)) describing the
/// scanner geometry, e.g. exported from a projector library.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the measured projection data (.npy, views x detectors)
    #[arg(long)]
    projections: PathBuf,

    /// Path to the dense system matrix (.npy)
    #[arg(long)]
    system_matrix: PathBuf,

    /// Side length of the reconstructed image; inferred from the system
    /// matrix column count when omitted
    #[arg(long)]
    size: Option<usize>,

    /// Image prior used as the initial estimate (.npy); zeros if omitted
    #[arg(long)]
    init: Option<PathBuf>,

    /// Projection-domain mask (.npy, same shape as the projections)
    #[arg(long)]
    mask: Option<PathBuf>,

    /// Restrict the final image to the circular scanner field of view
    #[arg(long)]
    use_fov: bool,

    /// Directory for intermediate and final outputs
    #[arg(long, default_value = "out")]
    output_dir: PathBuf,

    /// Maximum number of iterations
    #[arg(long, default_value_t = 2000)]
    iterations: usize,

    /// Gradient step size
    #[arg(long, default_value_t = 0.01)]
    learning_rate: f32,

    /// TV regularization strength
    #[arg(long, default_value_t = 1e-4)]
    lambda: f32,

    /// Stop when the loss, normalized to the first iteration, falls
    /// below this
    #[arg(long, default_value_t = 1e-7)]
    stop_criterion: f32,

    /// Write a diagnostic PNG every this many iterations (0 disables)
    #[arg(long, default_value_t = 10)]
    save_freq: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let g = load_array2(&args.projections)?;
    let (views, dets) = g.dim();

    let matrix = load_array2(&args.system_matrix)?;
    let n = match args.size {
        Some(n) => n,
        None => {
            let n = (matrix.ncols() as f64).sqrt() as usize;
            if n * n != matrix.ncols() {
                bail!(
                    "system matrix has {} columns, which is not a square image; pass --size",
                    matrix.ncols()
                );
            }
            n
        }
    };
    if matrix.nrows() != views * dets {
        bail!(
            "system matrix has {} rows but the sinogram holds {}x{} values",
            matrix.nrows(),
            views,
            dets
        );
    }
    let projector = MatrixProjector::new(matrix, (n, n), (views, dets));

    let f_init = match &args.init {
        Some(path) => load_array2(path)?,
        None => {
            let (h, w) = projector.image_dim();
            Array2::zeros((h, w))
        }
    };
    let g_mask = args.mask.as_ref().map(|p| load_array2(p)).transpose()?;
    let f_fov = if args.use_fov {
        println!("field of view masking is used");
        Some(circular_mask(n, n))
    } else {
        None
    };

    println!(
        "projection loaded: {} views x {} detectors, image {}x{}",
        views, dets, n, n
    );
    create_dir_all(&args.output_dir)?;

    let config = ReconConfig {
        learning_rate: args.learning_rate,
        lambda: args.lambda,
        iter_count: args.iterations,
        stop_criterion: args.stop_criterion,
        save_freq: args.save_freq,
        tv_inner_iters: 10,
    };

    let f_final = reconstruct(
        &projector,
        g.view(),
        g_mask.as_ref().map(|m| m.view()),
        f_init.view(),
        f_fov.as_ref().map(|m| m.view()),
        &config,
        |r| {
            println!(
                "[{}/{}] loss {:.9} grad_norm {:.9} img_max {:.4}",
                r.iter, r.iter_count, r.loss_ratio, r.grad_norm, r.img_max
            );
            false
        },
        |iter, img| {
            // diagnostics are best-effort; a failed write should not kill
            // a long-running reconstruction
            let path = args.output_dir.join(format!("recon_{:07}.png", iter));
            if let Err(e) = save_png(&path, img) {
                eprintln!("snapshot failed: {:#}", e);
            }
        },
    )?;

    let npy_path = args.output_dir.join("recon_TV.npy");
    save_array2(&npy_path, &f_final)?;
    save_png(&args.output_dir.join("recon_TV.png"), f_final.view())?;
    println!("reconstruction written to {}", npy_path.display());

    Ok(())
}
