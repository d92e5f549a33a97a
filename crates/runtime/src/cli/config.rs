use cs_domain::config::Config;

/// Dump the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &Config, config_path: &str) -> anyhow::Result<()> {
    let output = toml::to_string_pretty(config)?;
    eprintln!("# resolved from {config_path}");
    print!("{output}");
    Ok(())
}
