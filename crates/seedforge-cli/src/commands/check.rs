use anyhow::{bail, Result};
use comfy_table::{Cell, Table};

use seedforge_core::{DefinitionError, Registry};

use crate::args::CheckArgs;
use crate::commands::{load_config, REGISTRY_NAME};

/// Register every factory without panicking and report definition errors.
///
/// Exit codes:
///   0: all factories registered and every public trait checks out
///   1: definition errors (or error)
pub fn run(args: &CheckArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let mut registry = Registry::new(REGISTRY_NAME);

    let mut errors: Vec<(String, DefinitionError)> = Vec::new();
    for (name, factory) in config.factories()? {
        if let Err(err) = registry.try_add(&name, factory) {
            errors.push((name, err));
        }
    }
    for err in registry.check() {
        errors.push(("-".to_string(), err));
    }

    let mut table = Table::new();
    table.set_header(vec!["Factory", "Entity", "Primary key", "Public traits"]);
    for factory in registry.factories() {
        table.add_row(vec![
            Cell::new(&factory.name),
            Cell::new(&factory.entity),
            Cell::new(factory.primary_key.as_deref().unwrap_or("-")),
            Cell::new(registry.public_traits(&factory.name).join(", ")),
        ]);
    }
    println!("{table}");

    if errors.is_empty() {
        println!("\nNo definition errors.");
        return Ok(());
    }

    eprintln!();
    for (factory, err) in &errors {
        eprintln!("  [{}] {}", factory, err);
    }
    bail!("{} definition error(s)", errors.len());
}
