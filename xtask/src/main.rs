//! Build automation tasks for the dbpool workspace.
//!
//! Run with `cargo xtask <command>`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use xshell::{Shell, cmd};

#[derive(Parser)]
#[command(name = "xtask", about = "Build automation for dbpool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all checks (format, lint, test)
    Ci,
    /// Run cargo fmt --check
    Fmt,
    /// Run clippy on every target
    Clippy,
    /// Run all tests
    Test,
    /// Run the ignored mixed-load stress test
    Stress,
    /// Fuzz the DSN parser (requires cargo-fuzz and nightly)
    Fuzz {
        /// Seconds to run for
        #[arg(long, default_value_t = 60)]
        seconds: u32,
    },
    /// Run the registry benchmarks
    Bench,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    // Change to workspace root
    let workspace_root = workspace_root()?;
    sh.change_dir(&workspace_root);

    match cli.command {
        Command::Ci => {
            println!("Running CI checks...");
            fmt(&sh)?;
            clippy(&sh)?;
            test(&sh)?;
            println!("All CI checks passed!");
        }
        Command::Fmt => fmt(&sh)?,
        Command::Clippy => clippy(&sh)?,
        Command::Test => test(&sh)?,
        Command::Stress => stress(&sh)?,
        Command::Fuzz { seconds } => fuzz(&sh, seconds)?,
        Command::Bench => bench(&sh)?,
    }

    Ok(())
}

fn workspace_root() -> Result<PathBuf> {
    let output = std::process::Command::new("cargo")
        .args(["locate-project", "--workspace", "--message-format=plain"])
        .output()
        .context("failed to run cargo locate-project")?;

    let path = String::from_utf8(output.stdout)
        .context("invalid UTF-8 in cargo output")?
        .trim()
        .to_string();

    Ok(PathBuf::from(path)
        .parent()
        .context("failed to get workspace root")?
        .to_path_buf())
}

fn fmt(sh: &Shell) -> Result<()> {
    println!("Checking formatting...");
    cmd!(sh, "cargo fmt --all -- --check").run()?;
    println!("Formatting check passed.");
    Ok(())
}

fn clippy(sh: &Shell) -> Result<()> {
    println!("Running clippy...");
    cmd!(sh, "cargo clippy --workspace --all-targets -- -D warnings").run()?;
    println!("Clippy check passed.");
    Ok(())
}

fn test(sh: &Shell) -> Result<()> {
    println!("Running tests...");
    cmd!(sh, "cargo test --workspace").run()?;
    println!("All tests passed.");
    Ok(())
}

fn stress(sh: &Shell) -> Result<()> {
    println!("Running stress test...");
    cmd!(
        sh,
        "cargo test --release -p dbpool-backend --test stress -- --ignored --nocapture"
    )
    .run()?;
    println!("Stress test passed.");
    Ok(())
}

fn fuzz(sh: &Shell, seconds: u32) -> Result<()> {
    println!("Fuzzing DSN parser for {seconds}s...");
    let max_time = format!("-max_total_time={seconds}");
    sh.change_dir("fuzz");
    cmd!(sh, "cargo +nightly fuzz run parse_dsn -- {max_time}").run()?;
    Ok(())
}

fn bench(sh: &Shell) -> Result<()> {
    println!("Running benchmarks...");
    cmd!(sh, "cargo bench -p dbpool-core").run()?;
    Ok(())
}
