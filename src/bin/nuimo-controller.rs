use clap::Parser;
use log::{error, info};
use nuimo_controller::{init_logging, run};
use nuimo_controller::cli::Args;
use nuimo_controller::error::AppRunError;

fn main() -> Result<(), AppRunError> {
    let args = Args::parse();

    init_logging(args.verbose);
    info!(concat!("Nuimo Controller ", env!("CARGO_PKG_VERSION")));

    match run(args) {
        Err(err) => {
            error!("{}", err);
            Err(err)
        },
        Ok(_) => Ok(()),
    }
}
