mod console;

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use console::Command;
use nupal_chat::config::{ServiceConfig, APP_NAME};
use nupal_chat::remote::HttpConversationService;
use nupal_chat::SyncCoordinator;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = ServiceConfig::from_env()?;
    let user_id = config.resolve_user_id();
    if user_id.is_none() {
        tracing::warn!("No user id configured; conversation list will not load");
    }
    let service = HttpConversationService::new(&config)?;
    let mut sync = SyncCoordinator::new(Arc::new(service), user_id);

    println!("{} ({}) - /help for commands", APP_NAME, config.base_url);
    if let Err(e) = sync.refresh_conversations() {
        println!("{}", e);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(Command::Quit) => break,
                    Ok(command) => match console::execute(&mut sync, command) {
                        Ok(output) => println!("{}", output),
                        Err(e) => println!("{}", e),
                    },
                    Err(e) => println!("{}", e),
                }
            }
            Some(completion) = sync.next_completion(), if sync.has_pending() => {
                let was_loading = sync.is_initial_loading();
                sync.apply(completion);
                if was_loading && !sync.is_initial_loading() {
                    println!("{}", console::render_list(&sync, "", &chrono::Utc::now()));
                } else {
                    println!("{}", console::render_active(&sync));
                }
            }
        }

        for notice in sync.take_notices() {
            println!("{}", console::render_notice(&notice));
        }
    }

    if sync.has_pending() {
        tracing::info!("Exiting with remote calls still in flight");
    }
    Ok(())
}
