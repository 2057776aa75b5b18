//! `parley init`: write a starter config file.

use std::path::Path;

use parley_config::AppConfig;

use super::config_path;

pub async fn run(explicit: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path(explicit);

    if path.exists() && !force {
        println!("⚠️  Config already exists at: {}", path.display());
        println!("   Edit it manually or re-run with --force.");
        return Ok(());
    }

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;

    println!("✅ Created config at: {}", path.display());
    println!("\n📝 Next steps:");
    println!("   1. Add api keys (or set OPENAI_API_KEY / ANTHROPIC_API_KEY)");
    println!("   2. Run: parley check");
    println!("   3. Run: parley chat\n");

    Ok(())
}
