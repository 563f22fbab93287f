//! `dcm simulate` – run a scripted scenario on a virtual clock.

use crate::cli::scenario::{self, SimReport};
use anyhow::Result;
use dcm_core::config::DcmConfig;
use std::path::Path;

pub async fn run_simulate(cfg: DcmConfig, path: &Path, json: bool) -> Result<()> {
    let scenario = scenario::load(path)?;
    // Paused clocks need a current-thread runtime of their own.
    let report = tokio::task::spawn_blocking(move || -> Result<SimReport> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()?;
        rt.block_on(scenario::run(scenario, cfg))
    })
    .await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for e in &report.events {
        let who = e
            .consumer
            .map(|c| format!("consumer {c}"))
            .unwrap_or_else(|| "-".to_string());
        println!("{:>9} ms  {:<12} {}", e.at_ms, who, e.event);
    }
    println!();
    println!("setup calls: {}", report.setup_calls);
    if report.statuses.is_empty() {
        println!("No connections.");
        return Ok(());
    }
    println!(
        "{:<4} {:<14} {:<8} {:<16} {:<9} {:<8} {}",
        "ID", "STATE", "BEARER", "APN", "CONSUMERS", "ATTEMPTS", "CAUSE"
    );
    for s in &report.statuses {
        println!(
            "{:<4} {:<14} {:<8} {:<16} {:<9} {:<8} {}",
            s.id.to_string(),
            s.state.to_string(),
            s.bearer.map(|b| b.to_string()).unwrap_or_else(|| "-".to_string()),
            s.apn.as_deref().unwrap_or("-"),
            s.consumers,
            s.attempts,
            s.cause
        );
    }
    Ok(())
}
