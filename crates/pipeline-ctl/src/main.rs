//! pipeline-ctl: command-line interface for the pipeline daemon.

use anyhow::{Context, Result};

use pipeline_core::config::PipelinedConfig;

mod cmd;

fn print_usage() {
    println!("Usage: pipeline-ctl [--control <addr>] [--upcall <addr>] [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status                               Show pipeline state and counters");
    println!("  upload <file>...                     Upload Lua scripts and install them");
    println!("  inject [<key.json>]                  Run one packet key through the pipeline");
    println!();
    println!("Options:");
    println!("  --control <addr>  Control channel address (default: from config)");
    println!("  --upcall <addr>   Packet upcall address (default: from config)");
    println!("  --port <port>     Status endpoint port (default: from config)");
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = PipelinedConfig::load().unwrap_or_default();

    // Parse options
    let mut port = config.api.port;
    let mut control = config.control.listen_addr.clone();
    let mut upcall = config.upcall.listen_addr.clone();
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                port = args.get(i)
                    .context("--port requires a value")?
                    .parse()
                    .context("--port must be a number")?;
            }
            "--control" => {
                i += 1;
                control = args.get(i).context("--control requires a value")?.clone();
            }
            "--upcall" => {
                i += 1;
                upcall = args.get(i).context("--upcall requires a value")?.clone();
            }
            other => remaining.push(other),
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | []                => cmd::status::cmd_status(port).await,
        ["upload", files @ ..]         => {
            let files: Vec<String> = files.iter().map(|f| f.to_string()).collect();
            cmd::upload::cmd_upload(&control, &files).await
        }
        ["inject"]                     => cmd::inject::cmd_inject(&upcall, None).await,
        ["inject", key]                => cmd::inject::cmd_inject(&upcall, Some(*key)).await,
        ["help"] | ["--help"] | ["-h"] => { print_usage(); Ok(()) }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
