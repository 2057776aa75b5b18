//! `parley models`: list models offered by a backend.

use std::path::Path;

use parley_providers::{BackendRegistry, DispatchRouter};

use super::load_config;

pub async fn run(
    explicit: Option<&Path>,
    backend: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(explicit)?;
    let router = DispatchRouter::new(&config, &BackendRegistry::with_builtin())?;

    let (name, models) = match backend {
        Some(selector) => {
            let resolved = config.resolve(&selector)?;
            let backend = router
                .backend(&resolved.name)
                .ok_or_else(|| format!("not found platform: {selector}"))?;
            (resolved.selector, backend.list_models().await)
        }
        None => (router.current().selector, router.list_models().await),
    };

    println!("📚 Models on {name}");
    println!();
    if models.is_empty() {
        println!("  (none reported; is the backend reachable?)");
    }
    for model in models {
        println!("  - {model}");
    }

    Ok(())
}
