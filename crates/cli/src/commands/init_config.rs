//! `hivecore init-config`: Write or print the default configuration.

use hivecore_config::HubConfig;

pub fn run(print_only: bool) -> Result<(), Box<dyn std::error::Error>> {
    let default_toml = HubConfig::default_toml();
    if print_only {
        print!("{default_toml}");
        return Ok(());
    }

    let config_dir = HubConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if config_path.exists() {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete it and re-run init-config.");
        return Ok(());
    }

    std::fs::create_dir_all(&config_dir)?;
    std::fs::write(&config_path, &default_toml)?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!("\n📝 Next steps:");
    println!("   1. Set [webhook] api_url and enabled = true to push to a collector");
    println!("   2. Run: hivecore serve");

    Ok(())
}
