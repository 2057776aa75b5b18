//! `parley check`: validate the config and probe every backend.

use std::path::Path;
use std::time::Duration;

use futures::future::join_all;
use parley_providers::BackendRegistry;

use super::{config_path, load_config};

pub async fn run(explicit: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 Parley Check");
    println!("===============\n");

    let mut issues = 0;

    let path = config_path(explicit);
    if path.exists() {
        println!("  ✅ Config file found: {}", path.display());
    } else {
        println!("  ⚠️  No config file at {}, using defaults", path.display());
        issues += 1;
    }

    let config = match load_config(explicit) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ {e}");
            return Err("configuration is invalid".into());
        }
    };

    let registry = BackendRegistry::with_builtin();
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let mut probes = Vec::new();
    for (name, backend_config) in &config.platforms {
        match registry.build(name, backend_config, timeout) {
            Ok(backend) => probes.push(async move {
                let models = backend.list_models().await;
                (name, models)
            }),
            Err(e) => {
                println!("  ❌ {name}: {e}");
                issues += 1;
            }
        }
    }

    for (name, models) in join_all(probes).await {
        if models.is_empty() {
            println!("  ⚠️  {name}: no models reported (unreachable or missing key?)");
            issues += 1;
        } else {
            println!("  ✅ {name}: {} model(s)", models.len());
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
