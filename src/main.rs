use clap::Parser;
use ontobundle::{CliArgs, LoggingConfig, init_logging, run_bundle};

fn main() {
    let cli = CliArgs::parse();

    let logging_config = LoggingConfig::from_env();
    let _guard = match init_logging(logging_config, cli.debug) {
        Ok(guard) => guard,
        Err(error) => {
            eprintln!("failed to initialize logging: {error}");
            std::process::exit(1);
        }
    };

    if let Err(error) = run_bundle(&cli) {
        match error.downcast_ref::<ontobundle::BundleError>() {
            Some(bundle_error) if bundle_error.is_validation_failure() => {
                tracing::error!("{bundle_error}");
            }
            _ => tracing::error!("bundle failed: {error:#}"),
        }
        std::process::exit(1);
    }
}
