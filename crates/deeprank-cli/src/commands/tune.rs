use crate::cli::TuneArgs;
use crate::error::{CliError, Result};
use deeprank::engine::mapping::accel::{self, BlockShape};
use tracing::info;

pub fn run(args: TuneArgs) -> Result<()> {
    let candidates = args
        .blocks
        .iter()
        .map(|b| b.parse::<BlockShape>().map_err(CliError::Argument))
        .collect::<Result<Vec<_>>>()?;

    let status = accel::detect_accelerator();
    info!(?status, "Accelerator status");
    if let accel::AcceleratorStatus::Unavailable { reason } = &status {
        println!("Note: blocks run one at a time ({}).", reason);
    }

    println!(
        "Timing {} block shape(s) on a {}^3 grid with {} atoms...",
        candidates.len(),
        args.points,
        args.atoms
    );
    let report = accel::tune(&candidates, args.points, args.atoms, args.repeats).ok_or_else(
        || CliError::Argument("at least one block shape and a non-empty grid are required".into()),
    )?;

    for (shape, elapsed) in &report.timings {
        let marker = if *shape == report.best { "*" } else { " " };
        println!(" {} {:>10} {:>10.3} ms", marker, shape.to_string(), elapsed.as_secs_f64() * 1e3);
    }
    println!("Fastest block shape: {}", report.best);
    println!("Set it with `[execution] block = {:?}` or --block {}.", report.best.dims(), report.best);
    Ok(())
}
