//! `dcm config` – show the config path and the effective configuration.

use anyhow::Result;
use dcm_core::config::DcmConfig;
use std::path::Path;

pub fn run_config(path: &Path, cfg: &DcmConfig) -> Result<()> {
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(cfg)?);
    Ok(())
}
