//! Script upload command.
//!
//! Every file travels as exactly one `bsn_lua_upload` fragment named after
//! the file, since the daemon compiles each fragment as its own chunk. All
//! fragments but the very last carry the MORE flag, so the daemon installs
//! the whole batch at once. A barrier follows; its reply means
//! the install finished, an error reply before it means it failed.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use pipeline_core::wire::{self, HEADER_LEN, LUA_UPLOAD_MORE, MAX_UPLOAD_DATA, MessageBody};

const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// One source file to upload.
pub struct Script {
    pub name: String,
    pub source: Vec<u8>,
}

impl Script {
    pub fn read(path: &Path) -> Result<Self> {
        let source =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { name, source })
    }
}

/// Encode one upload message per script, numbering xids from `first_xid`.
pub fn build_messages(scripts: &[Script], first_xid: u32) -> Result<Vec<Bytes>> {
    if let Some(big) = scripts.iter().find(|s| s.source.len() > MAX_UPLOAD_DATA) {
        bail!(
            "{} is {} bytes; a script must fit in one upload message ({} bytes)",
            big.name,
            big.source.len(),
            MAX_UPLOAD_DATA
        );
    }

    if scripts.is_empty() {
        return Ok(vec![wire::encode_lua_upload(first_xid, 0, "", &[])?]);
    }

    let last = scripts.len() - 1;
    scripts
        .iter()
        .enumerate()
        .map(|(i, script)| -> Result<Bytes> {
            let flags = if i == last { 0 } else { LUA_UPLOAD_MORE };
            Ok(wire::encode_lua_upload(
                first_xid + i as u32,
                flags,
                &script.name,
                &script.source,
            )?)
        })
        .collect()
}

pub async fn cmd_upload(control: &str, paths: &[String]) -> Result<()> {
    let scripts = paths
        .iter()
        .map(|p| Script::read(Path::new(p)))
        .collect::<Result<Vec<_>>>()?;
    let messages = build_messages(&scripts, 1)?;
    let barrier_xid = messages.len() as u32 + 1;

    let mut stream = TcpStream::connect(control)
        .await
        .with_context(|| format!("failed to connect to pipelined at {}; is it running?", control))?;

    let bytes: usize = scripts.iter().map(|s| s.source.len()).sum();
    for frame in &messages {
        stream.write_all(frame).await?;
    }
    stream
        .write_all(&wire::encode_barrier_request(barrier_xid))
        .await?;

    tokio::time::timeout(REPLY_TIMEOUT, wait_for_barrier(&mut stream, barrier_xid))
        .await
        .context("timed out waiting for pipelined")??;

    println!(
        "Uploaded {} file(s), {} bytes in {} message(s).",
        scripts.len(),
        bytes,
        messages.len()
    );
    Ok(())
}

async fn wait_for_barrier(stream: &mut TcpStream, barrier_xid: u32) -> Result<()> {
    loop {
        let mut header = [0u8; HEADER_LEN];
        stream
            .read_exact(&mut header)
            .await
            .context("connection closed before the upload completed")?;
        let len = wire::frame_len(&header).unwrap_or(0).max(HEADER_LEN);
        let mut frame = BytesMut::with_capacity(len);
        frame.extend_from_slice(&header);
        frame.resize(len, 0);
        stream.read_exact(&mut frame[HEADER_LEN..]).await?;

        let msg = wire::decode(frame.freeze())?;
        match msg.body {
            MessageBody::BarrierReply if msg.xid == barrier_xid => return Ok(()),
            MessageBody::Error { err_type, code, .. } => {
                bail!("pipelined rejected the upload (xid {}, type {}, code {}); see the daemon log", msg.xid, err_type, code)
            }
            _ => continue,
        }
    }
}
