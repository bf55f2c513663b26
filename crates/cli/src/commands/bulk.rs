//! `ironloop bulk` — Run prompt groups from a file.

use ironloop_agent::{FactoryChats, load_groups, run_groups, write_output};
use ironloop_config::AppConfig;
use ironloop_core::Role;
use ironloop_providers::ChatFactory;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub async fn run(
    config: &AppConfig,
    cancel: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let input = config
        .bulk
        .input
        .as_deref()
        .ok_or("bulk mode needs an input file (--input or bulk.input)")?;
    let output = config
        .bulk
        .output
        .as_deref()
        .ok_or("bulk mode needs an output file (--bulk-output or bulk.output)")?;

    let groups = load_groups(input)?;
    info!(groups = groups.len(), input = %input.display(), "Loaded bulk input");

    let factory = Arc::new(ChatFactory::from_config(config)?);
    let source = FactoryChats::new(factory, Role::System, 1);
    let results = run_groups(cancel, &source, &groups).await?;

    write_output(output, &results)?;
    println!("Wrote {} group(s) to {}", results.len(), output.display());
    Ok(())
}
