//! Output assembler
//!
//! Linearizes the template event stream and the fragment body streams into
//! one ordered byte stream for the client. Inline fragment blocks are
//! drained at their placeholder position, so a fragment that responds
//! early still waits for its turn; async fragments leave a placeholder
//! sentinel behind and are drained in template order once the template has
//! ended. The bounded output channel carries client backpressure: when the
//! client is slow the assembler blocks, which in turn blocks the fragment
//! runtimes on their bounded body channels.

use crate::error::{Result, StitchError};
use crate::metrics::StitchMetrics;
use crate::runtime::FragmentStream;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// One unit of work, in template order
#[derive(Debug)]
pub enum AssemblyItem {
    /// Raw template bytes, forwarded verbatim
    Chunk(Bytes),
    /// A fragment block at its placeholder position
    Fragment(FragmentStream),
}

/// Drain items into the client output channel
///
/// Returns `Ok` when the template and every fragment block have been
/// written, `Err(ClientDisconnect)` when the client stopped reading. On
/// disconnect all remaining fragment receivers are dropped, which the
/// runtimes observe at their next send.
pub async fn assemble(
    mut items: mpsc::UnboundedReceiver<AssemblyItem>,
    out: mpsc::Sender<Bytes>,
    metrics: Arc<StitchMetrics>,
) -> Result<()> {
    let mut parked: Vec<FragmentStream> = Vec::new();

    while let Some(item) = items.recv().await {
        match item {
            AssemblyItem::Chunk(chunk) => {
                send(&out, chunk, &metrics).await?;
            }
            AssemblyItem::Fragment(mut fragment) => {
                if fragment.async_ {
                    if let Some(placeholder) = fragment.placeholder.take() {
                        send(&out, placeholder, &metrics).await?;
                    }
                    parked.push(fragment);
                } else {
                    drain_fragment(&mut fragment, &out, &metrics).await?;
                }
            }
        }
    }

    // Template finished; flush deferred blocks in template order.
    for mut fragment in parked {
        debug!("Flushing async fragment {}", fragment.index);
        drain_fragment(&mut fragment, &out, &metrics).await?;
    }
    Ok(())
}

async fn drain_fragment(
    fragment: &mut FragmentStream,
    out: &mpsc::Sender<Bytes>,
    metrics: &StitchMetrics,
) -> Result<()> {
    while let Some(chunk) = fragment.body.recv().await {
        send(out, chunk, metrics).await?;
    }
    Ok(())
}

async fn send(out: &mpsc::Sender<Bytes>, chunk: Bytes, metrics: &StitchMetrics) -> Result<()> {
    let len = chunk.len() as u64;
    out.send(chunk)
        .await
        .map_err(|_| StitchError::ClientDisconnect)?;
    metrics.record_bytes_to_client(len);
    Ok(())
}
