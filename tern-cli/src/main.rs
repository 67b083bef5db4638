//! Tern CLI Tool
//!
//! Command-line interface for versioning SQL changesets. The pending changeset
//! is written by hand in `setup.sql` and `teardown.sql`; `tern apply` runs it,
//! records it and saves it into the changeset directory.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::path::PathBuf;
use std::process;
use tern::adapter::{self, Adapter};
use tern::{Diff, Tern, TernConfig};
use tern_cli::pending::{self, PendingChangeset};
use tern_cli::{plan, Action};

#[derive(Parser)]
#[command(name = "tern")]
#[command(about = "Version control for SQL changesets")]
#[command(version = "0.1.0")]
struct Cli {
    /// Config file path (defaults to tern.toml, which may be absent)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PendingArgs {
    /// File holding the setup SQL
    #[arg(long, default_value = pending::DEFAULT_SETUP)]
    setup: PathBuf,

    /// File holding the teardown SQL
    #[arg(long, default_value = pending::DEFAULT_TEARDOWN)]
    teardown: PathBuf,
}

impl PendingArgs {
    fn pending(&self) -> PendingChangeset {
        PendingChangeset::new(&self.setup, &self.teardown)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create the tracking table
    Init,

    /// Run the pending changeset in a transaction that is rolled back
    Test {
        #[command(flatten)]
        pending: PendingArgs,
    },

    /// Apply the pending changeset and save it into the changeset directory
    Apply {
        #[command(flatten)]
        pending: PendingArgs,
    },

    /// Bring the database in sync with the changeset directory
    Update {
        /// Show what would be executed without running it
        #[arg(long)]
        dry_run: bool,
    },

    /// Show how the database differs from the changeset directory
    Diff,

    /// Revert one applied changeset and delete its file
    Revert {
        /// Hex hash of the changeset
        hash: String,
    },

    /// Report changeset files whose names do not match their content
    Validate,
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(&cli) {
        Ok(()) => {
            if !cli.quiet {
                println!("{}", "✅ Success".green());
            }
        }
        Err(e) => {
            eprintln!("{} {:#}", "❌ Error:".red().bold(), e);
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = TernConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let mut adapter = adapter::create_adapter(&config.adapter).context("Failed to set up the database adapter")?;

    if let Commands::Init = cli.command {
        return handle_init(&config, &mut adapter);
    }

    let mut tern = Tern::new(adapter, &config.directory)?;
    match &cli.command {
        Commands::Init => Ok(()),
        Commands::Test { pending } => handle_test(&mut tern, &pending.pending()),
        Commands::Apply { pending } => handle_apply(&mut tern, &pending.pending()),
        Commands::Update { dry_run } => handle_update(&mut tern, *dry_run),
        Commands::Diff => handle_diff(&mut tern),
        Commands::Revert { hash } => handle_revert(&mut tern, hash),
        Commands::Validate => handle_validate(&tern),
    }
}

fn handle_init(config: &TernConfig, adapter: &mut Box<dyn Adapter>) -> Result<()> {
    fs::create_dir_all(&config.directory)
        .with_context(|| format!("Failed to create changeset directory {}", config.directory.display()))?;

    println!("Initializing...");
    Tern::initialize(adapter)?;
    println!("Created tracking table '{}'", adapter.table().bold());
    Ok(())
}

fn handle_test(tern: &mut Tern<Box<dyn Adapter>>, pending: &PendingChangeset) -> Result<()> {
    let changeset = pending.load()?;
    println!("Testing...");
    tern.test(&changeset)?;
    Ok(())
}

fn handle_apply(tern: &mut Tern<Box<dyn Adapter>>, pending: &PendingChangeset) -> Result<()> {
    let mut changeset = pending.load()?;

    // Make sure it works
    tern.test(&changeset).context("The pending changeset failed its test run")?;

    // Make sure we're up-to-date
    if !tern.diff()?.is_in_sync() {
        bail!("Database and changeset directory are in different states; run `tern update` first");
    }

    let path = tern.apply(&mut changeset)?;
    pending.clear()?;
    println!("Saved {}", path.display().to_string().bold());
    Ok(())
}

fn print_steps(diff: &Diff) -> Result<()> {
    for step in plan(diff)? {
        let line = step.to_string();
        match step.action {
            Action::Revert => println!("  {}", line.red()),
            Action::Apply => println!("  {}", line.green()),
        }
    }
    Ok(())
}

fn handle_update(tern: &mut Tern<Box<dyn Adapter>>, dry_run: bool) -> Result<()> {
    if dry_run {
        let diff = tern.diff()?;
        if diff.is_in_sync() {
            println!("Database is up to date");
            return Ok(());
        }
        println!("Would run {} step(s):", diff.len());
        return print_steps(&diff);
    }

    println!("Updating...");
    let diff = tern.update()?;
    if diff.is_in_sync() {
        println!("Database is up to date");
    } else {
        println!("Ran {} step(s):", diff.len());
        print_steps(&diff)?;
    }
    Ok(())
}

fn handle_diff(tern: &mut Tern<Box<dyn Adapter>>) -> Result<()> {
    let diff = tern.diff()?;
    if diff.is_in_sync() {
        println!("Database and changeset directory are in sync");
        return Ok(());
    }
    println!(
        "{} to revert, {} to apply",
        diff.to_teardown.len().to_string().red(),
        diff.to_apply.len().to_string().green()
    );
    print_steps(&diff)
}

fn handle_revert(tern: &mut Tern<Box<dyn Adapter>>, hash: &str) -> Result<()> {
    let hash = hash.trim().to_lowercase();
    let changeset = tern.find_applied(&hash)?;
    let removed = tern.revert(&changeset)?;
    println!("Reverted {}", hash.bold());
    if !removed {
        println!("No changeset file for {hash} was found in {}", tern.directory().display());
    }
    Ok(())
}

fn handle_validate(tern: &Tern<Box<dyn Adapter>>) -> Result<()> {
    println!("Validating changeset files...");
    let mismatched = tern.validate()?;
    if mismatched.is_empty() {
        println!("All changeset files match their content");
        return Ok(());
    }
    for path in &mismatched {
        println!("  {} {}", "✗".red(), path.display());
    }
    bail!("{} changeset file(s) do not match their content hash", mismatched.len())
}
