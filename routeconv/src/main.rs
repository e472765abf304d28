use clap::Parser;
use routeconv::Args;

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let args = Args::parse();

    let report = routeconv::run(&args)?;
    report.print(std::io::stdout().lock())?;

    let path = report.write_json(&args.subfolder)?;
    log::info!("report written to {}", path.display());

    Ok(())
}
