//! `parley chat`: talk to the assistant in a console room.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use parley_agent::{Outcome, Pipeline};
use parley_core::event::EventBus;
use parley_providers::{BackendRegistry, DispatchRouter};
use parley_rooms::{ConsoleRoom, Outgoing};

use super::load_config;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;

    let events = Arc::new(EventBus::default());
    let router = Arc::new(
        DispatchRouter::new(&config, &BackendRegistry::with_builtin())?.with_events(events.clone()),
    );
    let (console, mut outbox) = ConsoleRoom::new();
    let pipeline = Pipeline::new(&config, console.room(), router.clone(), events).await?;

    let active = router.current();
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║          Parley Console Chat                 ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Assistant: {}", pipeline.bot_name());
    println!("  Platform:  {}", active.selector);
    println!("  Model:     {}", active.model);
    println!();
    println!("  Type your message and press Enter. `!ai` commands work here too.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut inbound = console.start();

    print!("  You > ");
    std::io::stdout().flush()?;

    while let Some(event) = inbound.recv().await {
        eprint!("  ...");
        let outcome = pipeline.handle(&event).await;
        eprint!("\r     \r");

        while let Ok(outgoing) = outbox.try_recv() {
            match outgoing {
                Outgoing::Reply(reply) => {
                    println!();
                    for line in reply.text.lines() {
                        println!("  {} > {line}", pipeline.bot_name());
                    }
                    println!();
                }
                Outgoing::Reaction(reaction) => println!("  {}", reaction.key),
            }
        }
        if outcome == Outcome::Ignored {
            println!("  (no response)");
        }

        print!("  You > ");
        std::io::stdout().flush()?;
    }

    println!();
    println!("  Goodbye! 👋");
    println!();

    Ok(())
}
