//! Ember CSI Operator - manifest renderer
//!
//! Loads the operator configuration and an `EmberCSI` manifest and prints the
//! Pod templates the reconciler would deploy for it. Nothing is sent to a
//! cluster.

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ember_csi_operator::{
    pod_template, DeploymentMode, EmberCSI, Error, OperatorConfig, Result,
};
use kube::CustomResourceExt;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Ember CSI Operator - render driver Pod templates for an EmberCSI resource
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Operator configuration file (sidecar table)
    #[arg(
        long,
        env = "EMBER_OPERATOR_CONFIG",
        default_value = "/etc/ember-csi-operator/config.yml"
    )]
    config: PathBuf,

    /// Cluster identifier (e.g. k8s-1.13, ocp-3.11)
    #[arg(long, env = "EMBER_OPERATOR_CLUSTER", default_value = "default")]
    cluster: String,

    /// EmberCSI manifest to render
    #[arg(long, required_unless_present = "print_crd")]
    instance: Option<PathBuf>,

    /// Deployment mode to render (controller or node); both when omitted
    #[arg(long)]
    mode: Option<DeploymentMode>,

    /// Print the EmberCSI CRD and exit
    #[arg(long)]
    print_crd: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

fn main() {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    if let Err(e) = run(&args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    if args.print_crd {
        print!("{}", serde_yaml::to_string(&EmberCSI::crd())?);
        return Ok(());
    }

    info!("Starting Ember CSI Operator renderer");
    info!("  Version: {}", ember_csi_operator::VERSION);
    info!("  Config: {}", args.config.display());
    info!("  Cluster: {}", args.cluster);

    let config = OperatorConfig::load(&args.config)?;
    let ctx = config.resolve(&args.cluster)?;

    let instance_path = args
        .instance
        .as_ref()
        .ok_or_else(|| Error::Configuration("--instance is required".to_string()))?;
    let ecsi: EmberCSI = serde_yaml::from_str(&std::fs::read_to_string(instance_path)?)?;

    let modes = match args.mode {
        Some(mode) => vec![mode],
        None => DeploymentMode::ALL.to_vec(),
    };

    for mode in modes {
        info!("Rendering {} workload for {}", mode, ecsi.instance_name());
        let template = pod_template(&ecsi, mode, &ctx)?;
        println!("---");
        println!("# {} {}", ecsi.instance_name(), mode);
        print!("{}", serde_yaml::to_string(&template)?);
    }

    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // Logs go to stderr so stdout stays valid YAML
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
