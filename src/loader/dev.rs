//! Development hot-swap channel.
//!
//! During development a module under edit is served from a well-known local
//! target. The target is fetched once as JSON to seed the first catalog (so
//! the locally-developed module participates even if the host catalog is
//! down), then a websocket is opened against the same target with its scheme
//! rewritten to the socket equivalent. Every inbound message is the JSON
//! metadata of a changed module; messages are consumed by a single task and
//! processed strictly in arrival order — a burst of edits causes a burst of
//! re-setups, mirroring the exact sequence of changes.
//!
//! Unlike regular catalog failures, a failing seed fetch is a hard,
//! developer-facing error.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error};

use crate::error::{AtriumError, AtriumResult};
use crate::host::ModuleHost;
use crate::metadata::ModuleMetadata;

/// Configuration for the hot-swap channel.
#[derive(Debug, Clone)]
pub struct DevChannelOptions {
    /// HTTP target the developed module is served from, e.g.
    /// `http://localhost:1234/my-module`.
    pub target: String,
}

/// Rewrite an HTTP target to its websocket equivalent
/// (`http` → `ws`, `https` → `wss`).
pub fn socket_target(target: &str) -> String {
    target.replacen("http", "ws", 1)
}

/// Fetch the development target once, as the JSON metadata of the developed
/// module. Merged ahead of the host catalog by the caller.
pub async fn seed_catalog(target: &str) -> AtriumResult<ModuleMetadata> {
    let response = reqwest::get(target)
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|err| AtriumError::DevChannel(format!("seed fetch from {target} failed: {err}")))?;

    let meta = response
        .json()
        .await
        .map_err(|err| AtriumError::DevChannel(format!("seed from {target} is not valid metadata: {err}")))?;

    Ok(meta)
}

/// Consume the hot-swap channel until it closes.
///
/// Each message is decoded and handed to [`ModuleHost::hot_swap`], which
/// re-resolves dependencies, re-fetches the module's code bypassing any
/// cache, and re-runs `setup` on a superseding module. The next message is
/// not read until the previous swap has finished.
pub async fn run(host: Arc<ModuleHost>, options: DevChannelOptions) -> AtriumResult<()> {
    let target = socket_target(&options.target);

    let (stream, _) = connect_async(&target)
        .await
        .map_err(|err| AtriumError::DevChannel(format!("connect to {target} failed: {err}")))?;
    debug!(target = %target, "hot-swap channel connected");

    let (_write, mut messages) = stream.split();

    while let Some(message) = messages.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ModuleMetadata>(&text) {
                Ok(meta) => host.hot_swap(meta).await,
                Err(err) => error!(error = %err, "malformed hot-swap message"),
            },
            Ok(Message::Close(_)) => break,
            // Pings and pongs are handled by the transport; binary frames
            // are not part of the protocol.
            Ok(_) => {}
            Err(err) => return Err(AtriumError::DevChannel(err.to_string())),
        }
    }

    Ok(())
}
