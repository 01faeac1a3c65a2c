use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info};
use merkle_distributor::{
    config::Config,
    files::{load_allocations, TreeDocument},
    merkle,
    utils::hash_to_hex,
    AllocationValidator, DistributorError,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Validate an allocation file and build its Merkle tree", long_about = None)]
struct Args {
    /// CSV (`address,amount`) or JSON allocation file
    #[arg(short, long)]
    allocations: PathBuf,

    #[arg(short, long, default_value = "tree.json")]
    output: PathBuf,

    /// TOML configuration; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };
    debug!("Using configuration: {config:?}");

    println!("Loading allocations from: {}", args.allocations.display());
    let inputs = load_allocations(&args.allocations, &config.input)?;
    info!("Loaded {} allocation entries", inputs.len());

    println!("Validating {} entries...", inputs.len());
    let validator = AllocationValidator::new(config.validation.clone());
    let validated = match validator.validated(&inputs) {
        Ok(validated) => validated,
        Err(DistributorError::Validation(report)) => {
            error!("Allocation file rejected with {} issues", report.issues.len());
            println!("\n✗ Validation FAILED:");
            for issue in &report.issues {
                println!("  - {issue}");
            }
            return Err(anyhow::anyhow!(
                "{} validation issues in {}",
                report.issues.len(),
                args.allocations.display()
            ));
        }
        Err(e) => return Err(e).context("Allocation list failed validation"),
    };

    println!("Building Merkle tree...");
    let built = merkle::build(validated.as_slice()).context("Allocation list is empty")?;
    let document = TreeDocument::from_built(&built)?;

    println!("Writing tree to: {}", args.output.display());
    document.save_to_file(&args.output)?;

    info!("Tree written to {}", args.output.display());
    println!("\n✓ Merkle tree built");
    println!("  Root: {}", hash_to_hex(&document.root));
    println!("  Recipients: {}", document.total_recipients);
    println!("  Total amount: {}", document.total_amount);
    println!("  Depth: {}", document.depth);

    Ok(())
}
