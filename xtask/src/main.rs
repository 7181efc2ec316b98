use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run tests with different feature combinations
    TestFeatures,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::TestFeatures => test_features(),
    }
}

fn test_features() -> Result<()> {
    // Every variant is selected at runtime, only the optional features are combined
    let feature_sets: [&[&str]; 7] = [
        &[],
        &["async"],
        &["log"],
        &["serde"],
        &["std"],
        &["async", "log"],
        &["async", "serde", "std"],
    ];

    for features in feature_sets {
        if features.is_empty() {
            println!("Testing without optional features");
        } else {
            println!("Testing with {}", features.join(" and "));
        }
        run_test(features)?;
    }

    println!("All tests passed!");
    Ok(())
}

fn run_test(features: &[&str]) -> Result<()> {
    let features_arg = features.join(",");
    println!("Running tests with features: {}", features_arg);

    let status = Command::new("cargo")
        .args([
            "test",
            "--package",
            "sen6x-driver",
            "--no-default-features",
            "--lib",
            "--features",
            &features_arg,
        ])
        .status()
        .context("Failed to execute cargo test")?;

    if !status.success() {
        anyhow::bail!("Tests failed with features: {}", features_arg);
    }

    Ok(())
}
