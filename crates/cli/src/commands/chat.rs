//! `ironloop chat` — Interactive chat over stdin/stdout.

use ironloop_config::AppConfig;
use ironloop_core::Role;
use ironloop_providers::ChatFactory;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

pub async fn run(
    config: &AppConfig,
    cancel: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let factory = ChatFactory::from_config(config)?;
    let chat = factory.open(cancel, Role::User, 0).await?;

    println!("ironloop chat ({}). Type /quit to exit.\n", factory.backend());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }

        let reply = tokio::select! {
            _ = cancel.cancelled() => break,
            r = async {
                chat.write(line).await?;
                chat.read().await
            } => r?,
        };
        println!("{}\n", reply.trim_end());
    }

    if let Err(e) = chat.close().await {
        tracing::warn!(error = %e, "Couldn't close chat");
    }
    Ok(())
}
