//! `harbor init`: write a scaffold configuration.

use std::path::Path;

use anyhow::{bail, Context, Result};

use harbor_core::HarborConfig;

pub fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let content = HarborConfig::scaffold().to_toml_string()?;
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    println!("✓ Generated {}", path.display());
    Ok(())
}
