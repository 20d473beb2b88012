//! `rulebook config`: Configuration management commands.

use rulebook_config::EngineConfig;

pub fn default() -> Result<(), Box<dyn std::error::Error>> {
    print!("{}", EngineConfig::default_toml());
    Ok(())
}

pub fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var("RULEBOOK_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| EngineConfig::config_dir().join("config.toml"));
    println!("{}", config_path.display());
    Ok(())
}
