//! `hsmc`: compiles JSON machine documents into C, Python or Rust source.
//!
//! ```text
//! hsmc compile machine.json --target c --output out/machine
//! hsmc table machine.json
//! ```
//!
//! Logs go to stderr and are filtered with `RUST_LOG`.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hsmc_core::emit::{self, EmitOptions, Language, c};
use hsmc_core::{Compiled, TableDump, compile, document};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hsmc")]
#[command(about = "Compiles hierarchical state machines into flat dispatch code")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate source code for a machine document
    Compile {
        /// Machine document, or `-` to read stdin
        input: PathBuf,
        /// Output language: c, python or rust
        #[arg(long, short)]
        target: Language,
        /// Identifier prefix of generated items (defaults to the machine name)
        #[arg(long)]
        prefix: Option<String>,
        /// Output file; for C, `<output>.h` and `<output>.c` are written
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Print the resolved dispatch table as JSON
    Table {
        /// Machine document, or `-` to read stdin
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    run(cli.command)
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Compile {
            input,
            target,
            prefix,
            output,
        } => {
            let machine = load(&input)?;
            let options = match prefix {
                Some(prefix) => EmitOptions::with_prefix(prefix)?,
                None => EmitOptions::default(),
            };
            match (target, output) {
                (Language::C, Some(output)) => write_c(&machine, &options, &output),
                (language, output) => {
                    let text = emit::emit(language, &machine, &options);
                    write_output(output.as_deref(), &text)
                }
            }
        }
        Commands::Table { input } => {
            let machine = load(&input)?;
            let json = serde_json::to_string_pretty(&TableDump::new(&machine))
                .context("serializing dispatch table")?;
            write_output(None, &format!("{json}\n"))
        }
    }
}

fn load(input: &Path) -> Result<Compiled> {
    let text = if input == Path::new("-") {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("reading machine document from stdin")?;
        text
    } else {
        fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?
    };
    debug!(bytes = text.len(), "read machine document");

    let ir = document::from_str(&text).with_context(|| format!("loading {}", input.display()))?;
    let machine = compile(&ir).with_context(|| format!("compiling machine '{}'", ir.name))?;
    info!(
        machine = machine.name(),
        states = machine.tree().len(),
        events = machine.events().len(),
        callbacks = machine.callbacks().len(),
        "compiled"
    );
    Ok(machine)
}

/// Writes the header and source next to each other: `out/m` becomes
/// `out/m.h` and `out/m.c`.
fn write_c(machine: &Compiled, options: &EmitOptions, output: &Path) -> Result<()> {
    let rendered = c::render(machine, options);
    for (extension, text) in [("h", &rendered.header), ("c", &rendered.source)] {
        let path = output.with_extension(extension);
        fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "wrote");
    }
    Ok(())
}

fn write_output(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "wrote");
        }
        None => io::stdout()
            .lock()
            .write_all(text.as_bytes())
            .context("writing to stdout")?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    const DOOR: &str = r#"{
        "name": "door",
        "initial": "closed",
        "states": [
            { "state": "closed", "transitions": [{ "event": "open", "next": "opened" }] },
            { "state": "opened", "transitions": [{ "event": "close", "next": "closed" }] }
        ]
    }"#;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn compile_arguments_parse() {
        let cli = Cli::try_parse_from([
            "hsmc", "compile", "m.json", "--target", "py", "--prefix", "door", "-o", "m.py",
        ])
        .unwrap();
        let Commands::Compile {
            input,
            target,
            prefix,
            output,
        } = cli.command
        else {
            panic!("expected compile");
        };
        assert_eq!(input, PathBuf::from("m.json"));
        assert_eq!(target, Language::Python);
        assert_eq!(prefix.as_deref(), Some("door"));
        assert_eq!(output, Some(PathBuf::from("m.py")));

        assert!(Cli::try_parse_from(["hsmc", "compile", "m.json", "--target", "go"]).is_err());
    }

    #[test]
    fn c_target_writes_header_and_source() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("door.json");
        fs::write(&input, DOOR).unwrap();
        let output = dir.path().join("door");

        run(Commands::Compile {
            input,
            target: Language::C,
            prefix: Some("gate".to_string()),
            output: Some(output.clone()),
        })
        .unwrap();

        let header = fs::read_to_string(output.with_extension("h")).unwrap();
        let source = fs::read_to_string(output.with_extension("c")).unwrap();
        assert!(header.starts_with("#ifndef GATE_H"));
        assert!(source.contains("void gate_inject_open(gate_t * fsm, void * arg)"));
    }

    #[test]
    fn invalid_documents_report_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.json");
        fs::write(&input, "{ \"name\": ").unwrap();
        let err = load(&input).unwrap_err();
        assert!(format!("{err:#}").contains("broken.json"));
    }
}
