//! Link tasks: the accept loop, one reader per accepted connection and one
//! writer per known peer.

use murmur_transport::{Accepted, Endpoint, Link, LinkSecurity, Listener, TransportError, WireMessage};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::Inbound;

/// Accept connections until `cancel` fires. Dropping the listener unbinds
/// the endpoint and aborts every reader.
pub(super) async fn accept_loop(
    mut listener: Listener,
    security: LinkSecurity,
    events: mpsc::Sender<Inbound>,
    cancel: CancellationToken,
) {
    let mut readers = JoinSet::new();
    let mut next_conn = 0u64;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => {
                    next_conn += 1;
                    readers.spawn(serve_inbound(next_conn, accepted, security.clone(), events.clone()));
                }
                Err(TransportError::Closed) => break,
                Err(e) => tracing::warn!(endpoint = %listener.endpoint(), "accept failed: {e}"),
            },
            Some(_) = readers.join_next() => {}
        }
    }
    tracing::debug!(endpoint = %listener.endpoint(), "listener closed");
}

/// Read one accepted connection. The first message must be `Hello`; it
/// names the peer every later message is attributed to.
async fn serve_inbound(
    conn_id: u64,
    accepted: Accepted,
    security: LinkSecurity,
    events: mpsc::Sender<Inbound>,
) {
    let mut link = match Link::accept(accepted, &security).await {
        Ok(link) => link,
        Err(e) => {
            tracing::debug!(conn = conn_id, "inbound handshake failed: {e}");
            return;
        }
    };

    let hello = match link.recv::<WireMessage>().await {
        Ok(Some(msg)) => msg,
        Ok(None) => return,
        Err(e) => {
            tracing::debug!(conn = conn_id, "inbound read failed: {e}");
            return;
        }
    };
    let WireMessage::Hello { uuid, .. } = &hello else {
        tracing::debug!(conn = conn_id, "expected HELLO, got {}", hello.kind());
        return;
    };
    let from = uuid.clone();
    if events
        .send(Inbound::Message {
            conn_id,
            from: from.clone(),
            msg: hello,
        })
        .await
        .is_err()
    {
        return;
    }

    loop {
        match link.recv::<WireMessage>().await {
            Ok(Some(msg)) => {
                let msg = Inbound::Message {
                    conn_id,
                    from: from.clone(),
                    msg,
                };
                if events.send(msg).await.is_err() {
                    return;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(conn = conn_id, peer = %from, "inbound read failed: {e}");
                break;
            }
        }
    }

    let _ = events.send(Inbound::Closed { conn_id, from }).await;
}

/// Connect to a peer and write every queued message until the queue is
/// dropped. A failed connect, write or remote close is reported as
/// `LinkFailed`.
pub(super) async fn run_outbound(
    uuid: String,
    endpoint: Endpoint,
    security: LinkSecurity,
    link_id: u64,
    mut queue: mpsc::Receiver<WireMessage>,
    events: mpsc::Sender<Inbound>,
) {
    let failed = |reason: String| Inbound::LinkFailed {
        uuid: uuid.clone(),
        link_id,
        reason,
    };

    let mut link = match Link::connect(&endpoint, &security).await {
        Ok(link) => link,
        Err(e) => {
            tracing::debug!(peer = %uuid, %endpoint, "connect failed: {e}");
            let _ = events.send(failed(e.to_string())).await;
            return;
        }
    };

    loop {
        tokio::select! {
            msg = queue.recv() => match msg {
                Some(msg) => {
                    if let Err(e) = link.send(&msg).await {
                        let _ = events.send(failed(format!("write failed: {e}"))).await;
                        return;
                    }
                }
                // peer removed from the roster
                None => return,
            },
            // the listening side never writes after the handshake
            incoming = link.recv::<WireMessage>() => match incoming {
                Ok(Some(msg)) => tracing::debug!(peer = %uuid, "unexpected {} on outbound link", msg.kind()),
                Ok(None) => {
                    let _ = events.send(failed("closed by peer".into())).await;
                    return;
                }
                Err(e) => {
                    let _ = events.send(failed(format!("read failed: {e}"))).await;
                    return;
                }
            },
        }
    }
}
