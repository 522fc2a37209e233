use std::path::{Path, PathBuf};
use std::process;

use carshare_core::executor::{Executor, Scenario, SimulationResult};
use carshare_core::program::{self, Artifact, ProgramKind};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

/// carshare — car-sharing trip contract tooling
///
/// Compile the contract's programs and simulate calls against it.
#[derive(Parser)]
#[command(name = "carshare", version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile both programs and write the .teal artifacts
    Compile {
        /// Directory to write the artifacts into
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print one compiled program to stdout
    Show {
        #[arg(value_enum)]
        program: ProgramArg,
    },

    /// Compute the SHA-256 digest of both artifacts
    Hash {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a JSON call scenario against a fresh local ledger
    Simulate {
        /// JSON scenario string
        #[arg(long, conflicts_with = "file")]
        input: Option<String>,
        /// Path to a JSON scenario file
        #[arg(long)]
        file: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version information
    Version,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgramArg {
    Approval,
    ClearState,
}

impl From<ProgramArg> for ProgramKind {
    fn from(arg: ProgramArg) -> Self {
        match arg {
            ProgramArg::Approval => ProgramKind::Approval,
            ProgramArg::ClearState => ProgramKind::ClearState,
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match cli.command {
        Commands::Compile { out_dir, json } => cmd_compile(&out_dir, json),
        Commands::Show { program } => cmd_show(program.into()),
        Commands::Hash { json } => cmd_hash(json),
        Commands::Simulate { input, file, json } => cmd_simulate(input, file, json),
        Commands::Version => {
            println!(
                "carshare {} (carshare-core {})",
                env!("CARGO_PKG_VERSION"),
                env!("CARGO_PKG_VERSION")
            );
            println!("Target: TEAL v{}", carshare_core::teal::DEFAULT_VERSION);
            0
        }
    };

    process::exit(exit_code);
}

fn fail(message: impl std::fmt::Display) -> i32 {
    eprintln!("{} {}", "error:".red().bold(), message);
    2
}

fn cmd_compile(out_dir: &Path, json: bool) -> i32 {
    let written = match program::write_artifacts(out_dir) {
        Ok(written) => written,
        Err(e) => return fail(e),
    };

    if json {
        let entries: Vec<serde_json::Value> = written
            .iter()
            .map(|(path, artifact)| {
                serde_json::json!({
                    "path": path.display().to_string(),
                    "sha256": artifact.digest,
                })
            })
            .collect();
        println!("{}", serde_json::json!({ "artifacts": entries }));
    } else {
        for (path, _) in &written {
            println!("{} {}", "wrote".green().bold(), path.display());
        }
    }
    0
}

fn cmd_show(kind: ProgramKind) -> i32 {
    match program::compile_program(kind) {
        Ok(text) => {
            println!("{}", text);
            0
        }
        Err(e) => fail(e),
    }
}

fn cmd_hash(json: bool) -> i32 {
    let artifacts: Vec<Artifact> = match program::build_artifacts() {
        Ok(artifacts) => artifacts,
        Err(e) => return fail(e),
    };
    if json {
        match serde_json::to_string_pretty(&artifacts) {
            Ok(text) => println!("{}", text),
            Err(e) => return fail(e),
        }
    } else {
        for artifact in &artifacts {
            println!("{}  {}", artifact.digest, artifact.file_name);
        }
    }
    0
}

fn cmd_simulate(input: Option<String>, file: Option<PathBuf>, json: bool) -> i32 {
    let text = match (input, file) {
        (Some(input), _) => input,
        (None, Some(path)) => match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => return fail(format!("cannot read {}: {}", path.display(), e)),
        },
        (None, None) => return fail("simulate needs --input or --file"),
    };

    let scenario = match Scenario::from_json(&text) {
        Ok(scenario) => scenario,
        Err(e) => return fail(e),
    };
    let mut executor = match Executor::new(scenario.config) {
        Ok(executor) => executor,
        Err(e) => return fail(e),
    };
    let result = executor.run(&scenario.calls);

    if json {
        match serde_json::to_string_pretty(&result) {
            Ok(text) => println!("{}", text),
            Err(e) => return fail(e),
        }
    } else {
        print_simulation(&result);
    }

    if result.success {
        0
    } else {
        1
    }
}

fn print_simulation(result: &SimulationResult) {
    for (i, call) in result.calls.iter().enumerate() {
        if call.approved {
            println!("{:>3} {} {}", i, "approved".green().bold(), call.operation);
        } else {
            let reason = call.error.as_deref().unwrap_or("rejected");
            println!(
                "{:>3} {} {}: {}",
                i,
                "failed".red().bold(),
                call.operation,
                reason
            );
        }
    }

    match result.app_id {
        Some(id) => println!("\napplication {}", id),
        None => println!("\nno live application"),
    }
    for (key, value) in result.final_state.global.iter() {
        println!("  {} = {}", key, value);
    }
    for (account, store) in &result.final_state.local {
        println!("  local {}", account);
        for (key, value) in store.iter() {
            println!("    {} = {}", key, value);
        }
    }

    if result.success {
        println!("\n{}", "all calls approved".green());
    } else if let Some(error) = &result.error {
        eprintln!("{} {}", "first failure:".red().bold(), error);
    }
}
