//! `smartseva status` — Show configuration and pipeline health.

use smartseva_config::AppConfig;

use super::{CmdResult, Runtime};

pub async fn run() -> CmdResult {
    let runtime = Runtime::load()?;
    let config = &runtime.config;
    let status = runtime.pipeline.get_status();

    println!("SmartSeva Status");
    println!("================");
    println!("  Config dir:    {}", AppConfig::config_dir().display());
    println!("  Provider:      {} ({})", config.default_provider, status.provider);
    println!("  Model:         {}", status.model);
    println!("  Temperature:   {}", config.default_temperature);
    println!("  API key:       {}", if config.has_api_key() { "set" } else { "missing" });
    println!("  Corpus:        {}", config.retrieval.corpus_path().display());
    println!("  Chat history:  {}", runtime.store.path().display());
    println!("  Memory window: {} exchanges", config.memory.window_size);
    println!(
        "  Context:       threshold {}, up to {} documents",
        status.relevance_threshold, status.max_context_documents
    );
    println!();
    println!(
        "  Document store ({}): {}",
        status.store,
        if status.store_available { "available" } else { "unavailable" }
    );
    println!(
        "  Query chain:            {}",
        if status.chain_available { "ready" } else { "not initialized" }
    );

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("\n  No config file — run `smartseva onboard` first");
    }

    Ok(())
}
