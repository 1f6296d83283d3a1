use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use seedforge_sql::{sanitize_url, SqlDriver};

use crate::args::CreateArgs;
use crate::commands::{emit, load_config, REGISTRY_NAME};

/// Insert records through the SQL driver and print what was stored.
pub fn run(args: &CreateArgs) -> Result<()> {
    let db_url = args.db.as_deref().context(
        "No database URL. Pass --db or set DATABASE_URL (a .env file works too).",
    )?;
    let config = load_config(&args.config)?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .context("Invalid progress template")?,
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(format!("Connecting to {}...", sanitize_url(db_url)));

    let driver = SqlDriver::connect(db_url)?;
    let registry = config
        .into_registry(REGISTRY_NAME)?
        .with_create_driver(Arc::new(driver));

    pb.set_message(format!(
        "Creating {} '{}' record(s)...",
        args.count, args.trait_name
    ));
    let result = registry.try_create(&args.trait_name, args.count, None);
    pb.finish_and_clear();

    let batch = result.with_context(|| format!("Failed to create '{}'", args.trait_name))?;
    emit(&batch, args.output.as_deref())
}
