//! Packet injection command: hands one parsed key to the pipeline through
//! the upcall socket and prints the verdict.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;

use pipeline_core::{ParsedKey, Verdict};

const VERDICT_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn cmd_inject(upcall: &str, key_path: Option<&str>) -> Result<()> {
    let key: ParsedKey = match key_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path))?;
            serde_json::from_str(&text).with_context(|| format!("{} is not a packet key", path))?
        }
        None => ParsedKey::default(),
    };

    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    socket
        .connect(upcall)
        .await
        .with_context(|| format!("failed to reach pipelined upcall at {}", upcall))?;
    socket.send(&serde_json::to_vec(&key)?).await?;

    let mut buf = vec![0u8; 64 * 1024];
    let len = tokio::time::timeout(VERDICT_TIMEOUT, socket.recv(&mut buf))
        .await
        .context("timed out waiting for a verdict; is the upcall enabled?")??;
    let verdict: Verdict = serde_json::from_slice(&buf[..len]).context("failed to parse verdict")?;

    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}
