use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use merkle_distributor::{
    files::ClaimEntry,
    leaf::encode_leaf,
    utils::{hash_from_hex, hash_to_hex},
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Check a claim proof the way the on-chain verifier does", long_about = None)]
struct Args {
    /// JSON claim with `index`, `address`, `amount`, `proof` and `root`
    #[arg(short, long)]
    claim_file: PathBuf,

    /// Root committed on-chain; when given the claim's own root must match it
    #[arg(short, long)]
    expected_root: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    println!("Loading claim from: {}", args.claim_file.display());
    let claim = ClaimEntry::load(&args.claim_file)?;

    if let Some(expected) = &args.expected_root {
        let expected = hash_from_hex(expected).context("Invalid expected root")?;
        if expected != claim.root {
            error!(
                "Claim root {} does not match expected root {}",
                hash_to_hex(&claim.root),
                hash_to_hex(&expected)
            );
            return Err(anyhow::anyhow!("Claim was issued for a different root"));
        }
    }

    println!("Claim details:");
    println!("  Address: {}", claim.address);
    println!("  Amount: {}", claim.amount);
    println!("  Index: {}", claim.index);
    println!(
        "  Leaf: {}",
        hash_to_hex(&encode_leaf(claim.index, &claim.address, claim.amount))
    );
    println!("  Root: {}", hash_to_hex(&claim.root));
    println!("  Proof length: {}", claim.proof.len());

    if claim.verify() {
        info!("Claim verification PASSED for {}", claim.address);
        println!("\n✓ Claim verification PASSED!");
        Ok(())
    } else {
        error!("Claim verification FAILED for {}", claim.address);
        println!("\n✗ Claim verification FAILED!");
        Err(anyhow::anyhow!("Claim proof does not reach the root"))
    }
}
