//! Control-channel listener.
//!
//! Accepts TCP connections, splits the byte stream into OpenFlow frames by
//! header length and forwards each decoded message to the dispatch thread.
//! Replies come back over a per-connection queue drained by a writer task.
//! A frame that does not decode is answered with BAD_REQUEST/BAD_LEN here,
//! since no pipeline ever sees it.

use std::io::ErrorKind;

use anyhow::Result;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};

use pipeline_core::wire::{self, WireError, HEADER_LEN, OFPBRC_BAD_LEN, OFPET_BAD_REQUEST};
use pipeline_core::ConnectionId;

use crate::dispatch::Event;

pub struct ControlListener {
    listener: TcpListener,
    events: mpsc::UnboundedSender<Event>,
    shutdown: broadcast::Receiver<()>,
    next_id: u32,
}

impl ControlListener {
    pub fn new(
        listener: TcpListener,
        events: mpsc::UnboundedSender<Event>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            listener,
            events,
            shutdown,
            next_id: 1,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("control listener shutting down");
                    return Ok(());
                }

                result = self.listener.accept() => {
                    let (stream, peer) = match result {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let cxn = ConnectionId(self.next_id);
                    self.next_id = self.next_id.wrapping_add(1);
                    tracing::info!(%cxn, %peer, "control connection opened");

                    let events = self.events.clone();
                    tokio::spawn(async move {
                        match serve_connection(stream, cxn, events).await {
                            Ok(()) => tracing::info!(%cxn, "control connection closed"),
                            Err(e) => tracing::warn!(%cxn, error = %e, "control connection failed"),
                        }
                    });
                }
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    cxn: ConnectionId,
    events: mpsc::UnboundedSender<Event>,
) -> Result<()> {
    let (mut rd, mut wr) = stream.into_split();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<Bytes>();

    let writer = tokio::spawn(async move {
        while let Some(frame) = reply_rx.recv().await {
            if let Err(e) = wr.write_all(&frame).await {
                tracing::debug!(%cxn, error = %e, "failed to write reply");
                break;
            }
        }
    });

    let mut header = [0u8; HEADER_LEN];
    loop {
        match rd.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let len = wire::frame_len(&header).unwrap_or(0);
        if len < HEADER_LEN {
            tracing::warn!(%cxn, len, "invalid frame length, closing");
            break;
        }

        let mut frame = BytesMut::with_capacity(len);
        frame.extend_from_slice(&header);
        frame.resize(len, 0);
        rd.read_exact(&mut frame[HEADER_LEN..]).await?;

        let frame = frame.freeze();
        match wire::decode(frame.clone()) {
            Ok(msg) => {
                tracing::trace!(%cxn, xid = msg.xid, msg_type = msg.msg_type, "control message");
                let event = Event::Control {
                    cxn,
                    msg,
                    replies: reply_tx.clone(),
                };
                if events.send(event).is_err() {
                    tracing::warn!(%cxn, "dispatch thread gone");
                    break;
                }
            }
            Err(e @ WireError::UnknownVersion(_)) => {
                tracing::warn!(%cxn, error = %e, "closing connection");
                break;
            }
            Err(e) => {
                tracing::warn!(%cxn, error = %e, "rejecting malformed control message");
                let _ = reply_tx.send(wire::encode_error_for_frame(
                    &frame,
                    OFPET_BAD_REQUEST,
                    OFPBRC_BAD_LEN,
                ));
            }
        }
    }

    drop(reply_tx);
    let _ = writer.await;
    Ok(())
}
