//! The dispatch thread: sole owner of the pipeline.
//!
//! Control messages and packets from every async task are funnelled into one
//! queue and handled in arrival order on a dedicated OS thread, so the
//! pipeline (and the interpreter inside it) is never touched concurrently.

use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use pipeline_core::wire::{
    self, Message, MessageBody, OFPBRC_BAD_EXPERIMENTER, OFPBRC_BAD_TYPE, OFPET_BAD_REQUEST,
};
use pipeline_core::{
    ConnectionId, ListenerResult, ParsedKey, Pipeline, PipelineCounters, PipelineRegistry,
    ReplySink, Verdict,
};

pub enum Event {
    Control {
        cxn: ConnectionId,
        msg: Message,
        /// Frames written back on the originating connection.
        replies: mpsc::UnboundedSender<Bytes>,
    },
    Packet {
        key: ParsedKey,
        verdict: oneshot::Sender<Verdict>,
    },
    Shutdown,
}

pub struct DispatchHandle {
    events: mpsc::UnboundedSender<Event>,
    thread: JoinHandle<()>,
}

impl DispatchHandle {
    pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
        self.events.clone()
    }

    /// Ask the thread to finish the pipeline and wait for it.
    pub async fn shutdown(self) {
        let _ = self.events.send(Event::Shutdown);
        let thread = self.thread;
        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(())) => tracing::info!("dispatch thread stopped"),
            Ok(Err(_)) => tracing::error!("dispatch thread panicked"),
            Err(e) => tracing::error!(error = %e, "failed to join dispatch thread"),
        }
    }
}

/// Start the dispatch thread and initialise the named pipeline on it.
/// Returns once `init` has succeeded; an `init` failure is returned as an
/// error and the thread exits.
pub async fn spawn(
    registry: PipelineRegistry,
    name: String,
    counters: Arc<PipelineCounters>,
) -> Result<DispatchHandle> {
    let (events, rx) = mpsc::unbounded_channel();
    let (ready_tx, ready_rx) = oneshot::channel();

    let thread = std::thread::Builder::new()
        .name("pipeline-dispatch".into())
        .spawn(move || {
            let mut pipeline = match registry.create(&name, counters) {
                Ok(p) => p,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            if let Err(e) = pipeline.init(&name) {
                let _ = ready_tx.send(Err(e));
                return;
            }
            let _ = ready_tx.send(Ok(()));
            run(pipeline, rx);
        })
        .context("failed to spawn dispatch thread")?;

    ready_rx
        .await
        .context("dispatch thread exited during init")??;
    Ok(DispatchHandle { events, thread })
}

fn run(mut pipeline: Box<dyn Pipeline>, mut events: mpsc::UnboundedReceiver<Event>) {
    while let Some(event) = events.blocking_recv() {
        match event {
            Event::Control { cxn, msg, replies } => {
                handle_control(pipeline.as_mut(), cxn, &msg, &replies);
            }
            Event::Packet { key, verdict } => {
                let _ = verdict.send(process(pipeline.as_mut(), &key));
            }
            Event::Shutdown => break,
        }
    }
    tracing::info!("finishing pipeline");
    pipeline.finish();
}

pub(crate) fn process(pipeline: &mut dyn Pipeline, key: &ParsedKey) -> Verdict {
    let mut verdict = Verdict::default();
    if let Err(e) = pipeline.process(key, &mut verdict.stats, &mut verdict.actions) {
        tracing::warn!(error = %e, "pipeline failed to process packet");
    }
    verdict
}

/// Writes error replies onto a connection's outbound queue.
struct ChannelReplies<'a> {
    tx: &'a mpsc::UnboundedSender<Bytes>,
}

impl ReplySink for ChannelReplies<'_> {
    fn send_error_reply(&mut self, cxn: ConnectionId, request: &Message, err_type: u16, code: u16) {
        tracing::debug!(%cxn, xid = request.xid, err_type, code, "sending error reply");
        if self.tx.send(wire::encode_error(request, err_type, code)).is_err() {
            tracing::debug!(%cxn, "connection closed before error reply");
        }
    }
}

/// Offer `msg` to the pipeline, then handle whatever it passes on.
pub(crate) fn handle_control(
    pipeline: &mut dyn Pipeline,
    cxn: ConnectionId,
    msg: &Message,
    replies: &mpsc::UnboundedSender<Bytes>,
) {
    let mut sink = ChannelReplies { tx: replies };
    if pipeline.handle_message(cxn, msg, &mut sink) == ListenerResult::Drop {
        return;
    }

    let reply = match &msg.body {
        MessageBody::EchoRequest(data) => match wire::encode_echo_reply(msg.xid, data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(%cxn, error = %e, "failed to encode echo reply");
                return;
            }
        },
        MessageBody::BarrierRequest => wire::encode_barrier_reply(msg.xid),
        MessageBody::EchoReply(_) | MessageBody::BarrierReply | MessageBody::Error { .. } => {
            tracing::trace!(%cxn, msg_type = msg.msg_type, "ignoring reply message");
            return;
        }
        MessageBody::Experimenter { experimenter, subtype } => {
            tracing::debug!(%cxn, experimenter, subtype, "unsupported experimenter message");
            wire::encode_error(msg, OFPET_BAD_REQUEST, OFPBRC_BAD_EXPERIMENTER)
        }
        MessageBody::LuaUpload(_) => {
            tracing::debug!(%cxn, "Lua upload sent to a pipeline that does not take one");
            wire::encode_error(msg, OFPET_BAD_REQUEST, OFPBRC_BAD_EXPERIMENTER)
        }
        MessageBody::Unknown(msg_type) => {
            tracing::debug!(%cxn, msg_type, "unsupported message type");
            wire::encode_error(msg, OFPET_BAD_REQUEST, OFPBRC_BAD_TYPE)
        }
    };
    let _ = replies.send(reply);
}
