//! `smartseva onboard` — First-time setup.

use smartseva_config::AppConfig;

use super::CmdResult;

pub async fn run() -> CmdResult {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");
    let data_dir = AppConfig::data_dir();

    println!("SmartSeva — First-Time Setup");
    println!("============================\n");

    for dir in [&config_dir, &data_dir] {
        if dir.exists() {
            println!("  Directory exists: {}", dir.display());
        } else {
            std::fs::create_dir_all(dir)?;
            println!("  Created {}", dir.display());
        }
    }

    if config_path.exists() {
        println!("\n  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or delete and re-run onboard.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("  Created config.toml at: {}", config_path.display());
    println!("\n  Next steps:");
    println!("   1. Set SMARTSEVA_API_KEY or add api_key to {}", config_path.display());
    println!("   2. Place the document corpus at {}", data_dir.join("corpus.jsonl").display());
    println!("   3. Run: smartseva chat\n");

    Ok(())
}
