use anyhow::{Context, Result};

use trailgain::config::Config;
use trailgain::workers::build_group;

use super::Runtime;

/// Run a single cycle of one worker and print its report
pub async fn run_once(config: &Config, worker: &str) -> Result<()> {
    let runtime = Runtime::build(config)?;
    let group = build_group(config, &runtime.stores, runtime.client, runtime.broker);

    let target = group.get(worker).with_context(|| {
        format!(
            "Unknown worker '{worker}', expected one of: {}",
            group.names().join(", ")
        )
    })?;

    let report = target.run_once().await?;

    println!("Worker '{worker}' finished one cycle");
    println!("  processed: {}", report.processed);
    println!("  skipped:   {}", report.skipped);
    println!("  failed:    {}", report.failed);
    Ok(())
}
