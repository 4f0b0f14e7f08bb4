use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Automation tasks for hsmc")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run CI checks: build, lint and test the whole workspace
    Ci,
    /// Run all tests
    Test,
    /// Run benchmarks
    Bench {
        /// Only check that the benchmarks compile
        #[arg(long)]
        smoke: bool,
    },
    /// Generate C, Python and Rust sources for a machine document
    Generate {
        /// Machine document
        input: PathBuf,
        /// Directory receiving the generated files
        #[arg(long, default_value = "target/generated")]
        out_dir: PathBuf,
    },
}

const CRATES: [&str; 5] = ["hsmc-core", "hsmc-macro", "hsmc-cli", "hsmc-tests", "hsmc"];

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ci => run_ci(),
        Commands::Test => run_tests(),
        Commands::Bench { smoke } => run_benchmarks(smoke),
        Commands::Generate { input, out_dir } => generate(&input, &out_dir),
    }
}

fn run_ci() -> Result<()> {
    println!("Running CI...");
    run_command(&["cargo", "fmt", "--all", "--check"])?;
    run_command(&["cargo", "check", "--workspace", "--all-targets"])?;
    run_command(&[
        "cargo",
        "clippy",
        "--workspace",
        "--all-targets",
        "--",
        "-D",
        "warnings",
    ])?;
    // Without the optional features the core must still build on its own.
    run_command(&["cargo", "check", "-p", "hsmc-core", "--no-default-features"])?;
    run_tests()?;
    run_benchmarks(true)?;
    println!("✓ CI passed");
    Ok(())
}

fn run_tests() -> Result<()> {
    println!("Running all tests...");
    for krate in CRATES {
        run_command(&["cargo", "test", "-p", krate])?;
        println!("  ✓ {krate}");
    }
    println!("✓ All tests passed");
    Ok(())
}

fn run_benchmarks(smoke: bool) -> Result<()> {
    if smoke {
        println!("Running benchmarks in smoke mode...");
        run_command(&["cargo", "check", "-p", "hsmc-bench", "--benches"])?;
        println!("✓ Benchmarks compile successfully");
    } else {
        println!("Running full benchmarks...");
        run_command(&["cargo", "bench", "-p", "hsmc-bench"])?;
        println!("✓ Benchmarks completed");
    }
    Ok(())
}

fn generate(input: &std::path::Path, out_dir: &std::path::Path) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    let stem = input
        .file_stem()
        .context("input has no file name")?
        .to_string_lossy()
        .into_owned();
    let input = input.to_string_lossy();

    for (target, file) in [
        ("c", stem.clone()),
        ("python", format!("{stem}.py")),
        ("rust", format!("{stem}.rs")),
    ] {
        let output = out_dir.join(file);
        let output = output.to_string_lossy();
        run_command(&[
            "cargo", "run", "-q", "-p", "hsmc-cli", "--", "compile", &input, "--target", target,
            "--output", &output,
        ])?;
        println!("✓ {target}: {output}");
    }
    Ok(())
}

fn run_command(args: &[&str]) -> Result<()> {
    let (program, rest) = args.split_first().context("empty command")?;
    let output = Command::new(program).args(rest).output()?;

    if !output.status.success() {
        anyhow::bail!(
            "Command failed: {}\nstdout: {}\nstderr: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }

    Ok(())
}
