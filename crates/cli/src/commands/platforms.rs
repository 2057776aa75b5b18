//! `parley platforms`: list configured backends.

use std::path::Path;

use super::load_config;

pub async fn run(explicit: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(explicit)?;
    let active = config.resolve(&config.use_platform)?;

    println!("🤖 Configured Platforms");
    println!("=======================\n");
    for selector in config.selectors() {
        let marker = if selector == active.selector { "*" } else { " " };
        println!("  {marker} {selector}");
    }
    println!();
    println!("  Switch in a room with `!ai switch <name>`.");

    Ok(())
}
