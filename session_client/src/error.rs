use protocol::RoomError;
use std::fmt;

#[derive(Debug)]
pub enum ClientError {
    /// The server acknowledged the request with a rejection.
    Rejected(RoomError),
    /// Transport-level WebSocket failure.
    Ws(tokio_tungstenite::tungstenite::Error),
    /// Failed to encode an outbound message.
    Encode(serde_json::Error),
    /// No live connection for an operation that needs one.
    NotConnected,
    /// The connection dropped while a request was in flight.
    ConnectionClosed,
    /// No acknowledgement arrived within the request timeout.
    Timeout,
    /// The ack did not match the request that was sent.
    UnexpectedAck,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Rejected(err) => write!(f, "server rejected request: {err}"),
            ClientError::Ws(err) => write!(f, "websocket error: {err}"),
            ClientError::Encode(err) => write!(f, "message encode error: {err}"),
            ClientError::NotConnected => write!(f, "not connected"),
            ClientError::ConnectionClosed => write!(f, "connection closed"),
            ClientError::Timeout => write!(f, "request timed out"),
            ClientError::UnexpectedAck => write!(f, "unexpected acknowledgement"),
        }
    }
}

impl std::error::Error for ClientError {}
