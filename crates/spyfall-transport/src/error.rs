/// Errors that can occur in the transport layer.
///
/// Every variant wraps an `io::Error` so callers can inspect the kind
/// without depending on the WebSocket library.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listener could not bind its address.
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Accepting a TCP connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The peer connected but the WebSocket upgrade failed.
    #[error("websocket upgrade failed: {0}")]
    UpgradeFailed(#[source] std::io::Error),

    /// Sending a frame failed; the connection is unusable.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving a frame failed; the connection is unusable.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),
}
