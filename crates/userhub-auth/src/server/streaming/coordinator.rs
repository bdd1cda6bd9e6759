use super::processor::process_page;
use crate::server::{config::ServerConfig, store::UserStore};
use core::pin::pin;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::{sync::mpsc, time::timeout};
use tokio_util::sync::CancellationToken;
use tonic::Status;
use userhub_core::{Error, pagination::PageDescriptor, proto::Users};

/// Drives one pagination session from its inbound descriptors to its
/// outbound chunks.
///
/// Descriptors are handled one at a time, strictly in arrival order, and each
/// one produces exactly one `Users` chunk on `resp_tx`. The i-th chunk is
/// therefore the answer to the i-th descriptor; nothing else correlates them.
///
/// # Arguments
///
/// - `inbound`: Descriptors from the client, or the error that ended the
///   client's stream.
/// - `store`: Collection to slice. Read per chunk, never snapshotted.
/// - `resp_tx`: Channel feeding the gRPC response stream.
/// - `config`: Server configuration, for the page size limit and idle timeout.
/// - `shutdown`: Cancelled when the service stops.
///
/// # Behavior
///
/// - Returns `Ok(chunks)` when the inbound stream completes. `resp_tx` is
///   dropped on return, which completes the response stream after every chunk
///   already queued.
/// - An inbound error, an invalid descriptor, an idle timeout or a shutdown
///   sends exactly one error to the client and ends the session. No later
///   descriptor is processed.
/// - Waiting for room in a full response buffer also ends on shutdown or
///   after the idle timeout. The error is then only queued if room appeared.
/// - If the client stops listening, returns [`Error::RequestCancelled`]
///   without further work.
pub async fn serve_pages<S>(
    inbound: S,
    store: Arc<UserStore>,
    resp_tx: mpsc::Sender<Result<Users, Status>>,
    config: ServerConfig,
    shutdown: CancellationToken,
) -> userhub_core::Result<u64>
where
    S: Stream<Item = userhub_core::Result<PageDescriptor>>,
{
    let mut inbound = pin!(inbound);
    let mut chunks = 0;

    loop {
        let next = tokio::select! {
            biased;
            () = shutdown.cancelled() => Err(Error::ServiceShutdown),
            () = resp_tx.closed() => return Err(Error::RequestCancelled),
            next = timeout(config.session_timeout, inbound.next()) => match next {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(_) => Err(Error::SessionTimeout),
            },
        };

        let chunk = match next.and_then(|d| process_page(&store, d, config.max_page_size)) {
            Ok(chunk) => chunk,
            Err(e) => {
                // Best effort: the client may already be gone, in which case
                // the original error is still reported upstream.
                if let Err(_e) = resp_tx.send(Err(e.clone().into())).await {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Failed to forward session error: {}", _e);
                }
                return Err(e);
            }
        };

        // A client that stops reading fills the buffer; waiting for room
        // stays bounded by shutdown and the idle timeout.
        let sent = tokio::select! {
            biased;
            () = shutdown.cancelled() => Err(Error::ServiceShutdown),
            sent = timeout(config.session_timeout, resp_tx.send(Ok(chunk))) => match sent {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Client went away after {chunks} chunks");
                    return Err(Error::RequestCancelled);
                }
                Err(_) => Err(Error::SessionTimeout),
            },
        };

        if let Err(e) = sent {
            // The buffer is full, so the error only gets through if the
            // client has made room in the meantime.
            if let Err(_e) = resp_tx.try_send(Err(e.clone().into())) {
                #[cfg(feature = "tracing")]
                tracing::debug!("Stalled client will not see session error: {}", _e);
            }
            return Err(e);
        }
        chunks += 1;
    }

    #[cfg(feature = "tracing")]
    tracing::debug!("Request stream completed after {chunks} chunks");

    Ok(chunks)
}
