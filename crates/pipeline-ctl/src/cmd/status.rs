//! Pipeline status command.

use anyhow::Result;
use serde::Deserialize;

use pipeline_core::PipelineState;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
struct StatusResponse {
    pipeline: String,
    uptime_secs: u64,
    state: PipelineState,
    packets: u64,
    faults: u64,
    chunks_received: u64,
    installs: u64,
    install_failures: u64,
    fragments_executed: u64,
    tables: Vec<String>,
}

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Pipeline Status");
    println!("═══════════════════════════════════════");
    println!("  Pipeline          : {}", resp.pipeline);
    println!("  State             : {:?}", resp.state);
    println!("  Uptime            : {}s", resp.uptime_secs);
    println!("  Packets           : {}", resp.packets);
    println!("  Script faults     : {}", resp.faults);
    println!("  Chunks received   : {}", resp.chunks_received);
    println!("  Installs          : {}", resp.installs);
    println!("  Install failures  : {}", resp.install_failures);
    println!("  Fragments run     : {}", resp.fragments_executed);

    if resp.tables.is_empty() {
        println!("\n  No tables registered.");
    } else {
        println!("\n  Tables:");
        for name in &resp.tables {
            println!("  • {}", name);
        }
    }

    Ok(())
}
