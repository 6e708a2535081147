use anyhow::{Context, Result};

use voyager::config::Config;
use voyager::coordinator::{CoordinatorClient, InjectRequest, InjectTarget};

/// Inject targets into a running coordinator, bypassing the capacity cap
pub async fn inject(config: Config, target_ids: Vec<String>, priority: Option<i64>) -> Result<()> {
    if target_ids.is_empty() {
        anyhow::bail!("No target ids given");
    }

    let client = CoordinatorClient::new(config.client_config())
        .context("Failed to create coordinator client")?;

    let request = InjectRequest {
        targets: target_ids
            .into_iter()
            .map(|id| InjectTarget {
                priority,
                ..InjectTarget::new(id)
            })
            .collect(),
    };

    let ack = client.inject(&request).await.context("Injection failed")?;

    println!(
        "Admitted {}, already known {}, rejected {}",
        ack.summary.admitted, ack.summary.skipped, ack.summary.rejected
    );
    for outcome in &ack.outcomes {
        println!("  {:<40} {}", outcome.target_id.as_str(), outcome.outcome.as_str());
    }
    Ok(())
}

/// Print frontier statistics
pub async fn stats(config: Config) -> Result<()> {
    let client = CoordinatorClient::new(config.client_config())
        .context("Failed to create coordinator client")?;

    let (stats, uptime_secs) = client.stats().await.context("Failed to fetch stats")?;

    println!("Frontier Statistics");
    println!("===================");
    println!("  Total:        {}", stats.records.total);
    println!("  Pending:      {}", stats.records.pending);
    println!("  In Progress:  {}", stats.records.in_progress);
    println!("  Done:         {}", stats.records.done);
    println!("  Claims:       {}", stats.claims);
    println!("  Conflicts:    {}", stats.conflicts);
    println!("  Empty Answers: {}", stats.empty_responses);
    println!("  Uptime:       {uptime_secs}s");
    Ok(())
}
