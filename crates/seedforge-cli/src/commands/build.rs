use anyhow::{Context, Result};

use crate::args::BuildArgs;
use crate::commands::{emit, load_config, REGISTRY_NAME};

/// Build records through the default build driver and print them.
pub fn run(args: &BuildArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let registry = config.into_registry(REGISTRY_NAME)?;

    let batch = registry
        .try_build(&args.trait_name, args.count, None)
        .with_context(|| format!("Failed to build '{}'", args.trait_name))?;
    tracing::debug!(trait_name = %args.trait_name, records = batch.len(), "built");

    emit(&batch, args.output.as_deref())
}
