//! Packet upcall socket.
//!
//! Each datagram carries one JSON-encoded `ParsedKey`; the reply datagram is
//! the JSON `Verdict` the pipeline produced for it.

use std::sync::Arc;

use anyhow::Result;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc, oneshot};

use pipeline_core::ParsedKey;

use crate::dispatch::Event;

const MAX_DATAGRAM: usize = 64 * 1024;

pub struct UpcallListener {
    socket: Arc<UdpSocket>,
    events: mpsc::UnboundedSender<Event>,
    shutdown: broadcast::Receiver<()>,
}

impl UpcallListener {
    pub fn new(
        socket: UdpSocket,
        events: mpsc::UnboundedSender<Event>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            socket: Arc::new(socket),
            events,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("upcall listener shutting down");
                    return Ok(());
                }

                result = self.socket.recv_from(&mut buf) => {
                    let (len, peer) = match result {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!(error = %e, "recv_from failed");
                            continue;
                        }
                    };
                    let key: ParsedKey = match serde_json::from_slice(&buf[..len]) {
                        Ok(k) => k,
                        Err(e) => {
                            tracing::debug!(%peer, error = %e, "ignoring malformed packet key");
                            continue;
                        }
                    };

                    let (verdict_tx, verdict_rx) = oneshot::channel();
                    if self.events.send(Event::Packet { key, verdict: verdict_tx }).is_err() {
                        tracing::warn!("dispatch thread gone");
                        return Ok(());
                    }

                    let socket = self.socket.clone();
                    tokio::spawn(async move {
                        let Ok(verdict) = verdict_rx.await else {
                            return;
                        };
                        match serde_json::to_vec(&verdict) {
                            Ok(body) => {
                                if let Err(e) = socket.send_to(&body, peer).await {
                                    tracing::debug!(%peer, error = %e, "failed to send verdict");
                                }
                            }
                            Err(e) => tracing::warn!(error = %e, "failed to encode verdict"),
                        }
                    });
                }
            }
        }
    }
}
