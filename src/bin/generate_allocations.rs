use anyhow::{Context, Result};
use clap::Parser;
use rand::Rng;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Write a random allocation CSV for testing", long_about = None)]
struct Args {
    #[arg(short = 'n', long, default_value_t = 1000)]
    count: usize,

    #[arg(short, long, default_value = "allocations.csv")]
    output: PathBuf,

    /// Amounts are drawn uniformly from `1..=max_amount`
    #[arg(short, long, default_value_t = 1_000_000)]
    max_amount: u64,
}

fn generate_random_addresses(count: usize, rng: &mut impl Rng) -> Vec<String> {
    let mut seen = HashSet::with_capacity(count);
    while seen.len() < count {
        let bytes: [u8; 20] = rng.gen();
        seen.insert(format!("0x{}", hex::encode(bytes)));
    }
    seen.into_iter().collect()
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.max_amount == 0 {
        return Err(anyhow::anyhow!("--max-amount must be at least 1"));
    }

    let mut rng = rand::thread_rng();
    println!("Generating {} random allocations...", args.count);
    let addresses = generate_random_addresses(args.count, &mut rng);

    println!("Writing allocations to {}...", args.output.display());
    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "address,amount")?;
    let mut total: u128 = 0;
    for address in &addresses {
        let amount = rng.gen_range(1..=args.max_amount);
        total += u128::from(amount);
        writeln!(writer, "{address},{amount}")?;
    }
    writer.flush().context("Failed to flush allocation file")?;

    println!("Successfully generated {} allocations", addresses.len());
    println!("Total amount: {total}");
    Ok(())
}
