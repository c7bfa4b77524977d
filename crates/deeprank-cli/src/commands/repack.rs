use crate::cli::RepackArgs;
use crate::error::Result;
use deeprank::workflows;

pub fn run(args: RepackArgs) -> Result<()> {
    let reclaimed = workflows::repack::run(&args.database)?;
    println!(
        "Repacked {}; reclaimed {} bytes.",
        args.database.display(),
        reclaimed
    );
    Ok(())
}
