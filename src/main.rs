use clap::Parser;
use multigrain::geometry::Geometry;
use multigrain::problem::build_hierarchy;
use multigrain::solver::cg::{cg, CgData};
use multigrain::solver::comm::CommunicationBackend;
#[cfg(not(feature = "distributed"))]
use multigrain::solver::comm::SingleProcessComm;
#[cfg(feature = "distributed")]
use multigrain::solver::comm_mpi::MpiComm;
use multigrain::solver::kernels::max_abs_diff;
use multigrain::stats::SolveStats;
use multigrain::verification::verify_cg;
use std::time::Instant;

/// Multigrid-preconditioned conjugate gradient benchmark
#[derive(Parser)]
#[command(name = "multigrain", version)]
struct Cli {
    /// Local grid points per rank along x
    #[arg(long, default_value_t = 32)]
    nx: usize,

    /// Local grid points per rank along y
    #[arg(long, default_value_t = 32)]
    ny: usize,

    /// Local grid points per rank along z
    #[arg(long, default_value_t = 32)]
    nz: usize,

    /// Multigrid levels, including the finest grid
    #[arg(long, default_value_t = 4)]
    levels: usize,

    /// Maximum CG iterations per solve
    #[arg(long, default_value_t = 50)]
    max_iter: usize,

    /// Convergence tolerance on the scaled residual (0 runs all iterations)
    #[arg(long, default_value_t = 0.0)]
    tolerance: f64,

    /// Run unpreconditioned CG instead of the multigrid-preconditioned solve
    #[arg(long)]
    no_preconditioning: bool,

    /// Skip the acceptance check before the timed solve
    #[arg(long)]
    skip_verification: bool,

    /// Print kernel timing stats to stderr
    #[arg(long)]
    stats: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    #[cfg(feature = "distributed")]
    let _universe = mpi::initialize().expect("MPI init failed");
    #[cfg(feature = "distributed")]
    let comm = MpiComm::new();
    #[cfg(not(feature = "distributed"))]
    let comm = SingleProcessComm;
    let comm: &dyn CommunicationBackend = &comm;
    let rank0 = comm.rank() == 0;

    let geometry = Geometry::new(
        comm.num_ranks(),
        comm.rank(),
        cli.nx,
        cli.ny,
        cli.nz,
        None,
    )
    .unwrap_or_else(|e| {
        eprintln!("Geometry error: {e}");
        std::process::exit(1);
    });

    if rank0 {
        eprintln!(
            "multigrain: {}x{}x{} local grid on {} rank(s) ({}x{}x{} process grid), {} level(s)",
            cli.nx, cli.ny, cli.nz, geometry.size, geometry.npx, geometry.npy, geometry.npz,
            cli.levels
        );
    }

    let setup_start = Instant::now();
    let mut setup = build_hierarchy(geometry, cli.levels).unwrap_or_else(|e| {
        eprintln!("Problem setup error: {e}");
        std::process::exit(1);
    });
    if rank0 {
        eprintln!("setup: {:.3}s", setup_start.elapsed().as_secs_f64());
    }

    let mut data = CgData::new(setup.hierarchy.fine());
    let mut x = vec![0.0; setup.hierarchy.fine().local_cols];

    if !cli.skip_verification {
        let outcome = verify_cg(&mut setup, &mut data, &mut x, comm).unwrap_or_else(|e| {
            eprintln!("Verification error: {e}");
            std::process::exit(1);
        });
        if rank0 {
            eprintln!(
                "verification: {} pass, {} fail (worst {} unpreconditioned / {} preconditioned iterations)",
                outcome.pass_count,
                outcome.fail_count,
                outcome.max_iters_unpreconditioned,
                outcome.max_iters_preconditioned
            );
        }
        if !outcome.passed() {
            eprintln!("Verification failed");
            std::process::exit(1);
        }
    }

    // Timed solve from a zero guess.
    x.fill(0.0);
    let mut stats = SolveStats::new();
    comm.barrier();
    let solve_start = Instant::now();
    let result = cg(
        &mut setup.hierarchy,
        &mut data,
        &setup.b,
        &mut x,
        cli.max_iter,
        cli.tolerance,
        !cli.no_preconditioning,
        comm,
        &mut stats,
    )
    .unwrap_or_else(|e| {
        eprintln!("Solve error: {e}");
        std::process::exit(1);
    });
    let elapsed = solve_start.elapsed();

    let nrow = setup.hierarchy.fine().local_rows;
    let error = max_abs_diff(nrow, &x, &setup.x_exact, comm);

    if rank0 {
        println!("iterations:       {}", result.iterations);
        println!("residual norm:    {:.6e}", result.normr);
        println!(
            "scaled residual:  {:.6e}",
            result.normr / result.normr0
        );
        println!("solution error:   {:.6e}", error);
        println!("solve time:       {:.3}s", elapsed.as_secs_f64());
    }

    if cli.stats && rank0 {
        stats.display();
    }
}
