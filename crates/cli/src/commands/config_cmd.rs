//! `copperkite config` — print the effective configuration.

use anyhow::Result;
use copperkite_config::AgentConfig;

pub fn run() -> Result<()> {
    let config = AgentConfig::load()?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
