use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "seedforge",
    about = "Create relational fixtures from trait-based factory definitions",
    version,
    after_help = "Examples:\n  seedforge check\n  seedforge build User --count 3\n  seedforge build Writer --config fixtures --output writer.json\n  seedforge create Writer --db sqlite://dev.db"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate records without touching a database and print them as JSON
    Build(BuildArgs),

    /// Insert records into a database and print them as JSON
    Create(CreateArgs),

    /// Validate seedforge.toml and list the public traits per factory
    Check(CheckArgs),
}

#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Public trait to build records from
    #[arg(value_name = "TRAIT")]
    pub trait_name: String,

    /// Number of records
    #[arg(long, default_value = "1")]
    pub count: usize,

    /// Directory containing seedforge.toml
    #[arg(long, default_value = ".")]
    pub config: PathBuf,

    /// Write the JSON here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct CreateArgs {
    /// Public trait to create records from
    #[arg(value_name = "TRAIT")]
    pub trait_name: String,

    /// Number of records
    #[arg(long, default_value = "1")]
    pub count: usize,

    /// Database connection URL (postgres://, sqlite:)
    /// Falls back to DATABASE_URL env var or .env file
    #[arg(long, env = "DATABASE_URL")]
    pub db: Option<String>,

    /// Directory containing seedforge.toml
    #[arg(long, default_value = ".")]
    pub config: PathBuf,

    /// Write the JSON here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Directory containing seedforge.toml
    #[arg(long, default_value = ".")]
    pub config: PathBuf,
}
