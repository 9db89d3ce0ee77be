use std::f64::consts::TAU;
use std::time::Instant;

use clap::Parser;
use guided_projection::constraints::CoherentLength;
use guided_projection::core::ConstraintStrategy;
use guided_projection::energies::Fairness;
use guided_projection::{
    GuidedProjection, GuidedProjectionConfig, ProjectionResult, VariableSetHandle, init_logger,
};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "guided_projection_demo")]
#[command(about = "Project a noisy closed polyline onto equal edge lengths with fairness")]
struct Args {
    /// Number of points on the ring
    #[arg(short = 'n', long, default_value = "32")]
    points: usize,

    /// Radius of the unperturbed ring
    #[arg(short, long, default_value = "1.0")]
    radius: f64,

    /// Amplitude of the deterministic perturbation applied to each point
    #[arg(long, default_value = "0.05")]
    noise: f64,

    /// Target edge length as a fraction of the unperturbed edge length
    #[arg(long, default_value = "1.0")]
    length_scale: f64,

    /// Weight of the fairness energies
    #[arg(short, long, default_value = "0.01")]
    fairness_weight: f64,

    /// Maximum number of iterations
    #[arg(short, long, default_value = "100")]
    max_iterations: usize,

    /// Merit tolerance
    #[arg(short, long, default_value = "1e-12")]
    tolerance: f64,

    /// Damping weight; 0 disables the damping rows
    #[arg(long, default_value = "1e-6")]
    regularization: f64,

    /// Globalize constraint and energy sets on a single thread
    #[arg(long)]
    serial: bool,

    /// Print every point after the solve
    #[arg(short, long)]
    verbose: bool,
}

fn ring_point(args: &Args, i: usize) -> [f64; 3] {
    let angle = TAU * i as f64 / args.points as f64;
    let wobble = args.noise * (7.3 * i as f64).sin();
    let lift = args.noise * (3.1 * i as f64).cos();
    [
        (args.radius + wobble) * angle.cos(),
        (args.radius + wobble) * angle.sin(),
        lift,
    ]
}

fn build(args: &Args) -> ProjectionResult<(GuidedProjection, VariableSetHandle)> {
    let config = GuidedProjectionConfig::new()
        .with_max_iterations(args.max_iterations)
        .with_tolerance(args.tolerance)
        .with_regularization(args.regularization)
        .with_parallel(!args.serial);
    let mut solver = GuidedProjection::with_config(config);

    let n = args.points;
    let points = solver.register_variable_set(n, 3)?;
    let lengths = solver.register_variable_set(n, 1)?;

    let edge_length = args.length_scale * 2.0 * args.radius * (TAU / (2.0 * n as f64)).sin();
    for i in 0..n {
        solver.set_variable_value(points.at(i), &ring_point(args, i))?;
        solver.set_variable_value(lengths.at(i), &[edge_length])?;
        solver.fix_variable(lengths.at(i))?;
    }

    let coherent = solver.add_constraint_set(
        "edge length",
        ConstraintStrategy::quadratic(CoherentLength::new()),
    );
    for i in 0..n {
        solver.add_constraint(
            coherent,
            &[points.at(i), points.at((i + 1) % n), lengths.at(i)],
            None,
            1.0,
        )?;
    }

    for component in 0..3 {
        let fairness = solver.add_energy_set(
            format!("fairness {}", ["x", "y", "z"][component]),
            Fairness::new(3, component)?,
        );
        for i in 0..n {
            solver.add_energy(
                fairness,
                &[points.at(i), points.at((i + 1) % n), points.at((i + 2) % n)],
                args.fairness_weight,
            )?;
        }
    }

    Ok((solver, points))
}

fn run(args: &Args) -> ProjectionResult<()> {
    let setup_start = Instant::now();
    let (mut solver, points) = build(args)?;
    info!(
        "Built ring with {} points, {} constraints, {} energies in {:.2}ms",
        args.points,
        solver.problem().num_constraints(),
        solver.problem().num_energies(),
        setup_start.elapsed().as_secs_f64() * 1000.0
    );

    let outcome = solver.solve()?;
    info!("{}", outcome);

    if args.verbose {
        for i in 0..args.points {
            let p = solver.variable_value(points.at(i))?;
            info!("p{:<4} {:>10.6} {:>10.6} {:>10.6}", i, p[0], p[1], p[2]);
        }
    }
    Ok(())
}

fn main() {
    init_logger();
    let args = Args::parse();

    if args.points < 3 {
        error!("A ring needs at least 3 points, got {}", args.points);
        std::process::exit(1);
    }

    if let Err(e) = run(&args) {
        error!("{}", e);
        std::process::exit(1);
    }
}
