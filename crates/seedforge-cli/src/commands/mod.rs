pub mod build;
pub mod check;
pub mod create;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};

use seedforge_core::config::{self, FixtureConfig};
use seedforge_core::output::json::write_json;
use seedforge_core::Batch;

/// Registry name used for configs loaded by the CLI.
pub const REGISTRY_NAME: &str = "seedforge";

/// Load and validate `seedforge.toml` from `dir`. A missing file is an error.
pub fn load_config(dir: &Path) -> Result<FixtureConfig> {
    match config::read_config(dir)? {
        Some(config) => Ok(config),
        None => bail!(
            "No {} found in {}. Create one or pass --config <DIR>.",
            config::CONFIG_FILE_NAME,
            dir.display()
        ),
    }
}

/// Print `batch` as JSON to `output`, or to stdout.
pub fn emit(batch: &Batch, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            write_json(&mut writer, batch)?;
            writer
                .flush()
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Wrote {} record(s) to {}", batch.len(), path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            write_json(&mut lock, batch)?;
        }
    }
    Ok(())
}
