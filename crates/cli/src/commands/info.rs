//! `parley info`: show the effective configuration.

use std::path::Path;

use super::{config_path, load_config};

pub async fn run(explicit: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(explicit)?;

    println!("🗣️  Parley Configuration");
    println!("=========================\n");

    println!("  File:            {}", config_path(explicit).display());
    println!(
        "  Name:            {}",
        config.name.as_deref().unwrap_or("(display name)")
    );
    println!("  Platform:        {}", config.use_platform);
    if let Some(model) = &config.use_model {
        println!("  Model override:  {model}");
    }
    println!("  Reply in thread: {}", config.reply_in_thread);
    println!("  Multi-user:      {}", config.enable_multi_user);
    if config.allowed_users.is_empty() {
        println!("  Allowed users:   everyone");
    } else {
        println!("  Allowed users:   {}", config.allowed_users.join(", "));
    }
    println!("  Extra prompts:   {}", config.additional_prompt.len());
    println!("  Timeout:         {}s", config.request_timeout_secs);

    for (name, backend) in &config.platforms {
        println!("\n  [{name}]");
        for (key, value) in backend.describe() {
            println!("    {key:<22} {value}");
        }
    }
    println!();

    Ok(())
}
