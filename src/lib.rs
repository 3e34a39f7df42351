//! Declarative packaging and validation pipeline for RDF ontology
//! releases.
//!
//! A bundle file declares variables, tools and an ordered action list; the
//! dispatcher executes the actions strictly in order, resolving file sets,
//! merging and exporting graphs, running SPARQL locally or against remote
//! endpoints, and applying select/ask/construct/shacl validations with
//! configurable abort semantics.

pub mod bundle;
pub mod config;
pub mod error;
pub mod graph;
pub mod logging;
pub mod query;
pub mod render;
pub mod verify;

pub use bundle::BundleSpec;
pub use config::{CliArgs, load_bundle_file};
pub use error::{BundleError, TemplateError};
pub use logging::{LoggingConfig, init_logging};

/// Load the bundle named on the command line and run it.
pub fn run_bundle(args: &CliArgs) -> anyhow::Result<()> {
    let spec = load_bundle_file(&args.bundle)?;
    let overrides = args.variable_overrides();
    bundle::dispatcher::run(&spec, &overrides)?;
    Ok(())
}
