// ABOUTME: Error types for the streamcall-grpc crate.
// ABOUTME: One terminal error per call, classified by kind and mapped to and from gRPC status.

use thiserror::Error;
use tonic::Code;

/// Classification of a terminal call failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    Cancelled,
    Timeout,
    TransportFailure,
    PeerError,
}

/// Errors that terminate a streaming call.
///
/// EndOfStream is not an error: receive operations report it as `Ok(None)`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    /// Malformed request or misuse of the handle, raised before anything is streamed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The call was cancelled locally or by the peer.
    #[error("call cancelled")]
    Cancelled,

    /// The call deadline expired.
    #[error("deadline exceeded")]
    Timeout,

    /// The underlying channel broke.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// The peer closed the call with an error.
    #[error("peer error: {0}")]
    PeerError(String),
}

impl StreamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StreamError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            StreamError::Cancelled => ErrorKind::Cancelled,
            StreamError::Timeout => ErrorKind::Timeout,
            StreamError::TransportFailure(_) => ErrorKind::TransportFailure,
            StreamError::PeerError(_) => ErrorKind::PeerError,
        }
    }

    /// Cancellation and timeout both mean the call was cut short rather than broken.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, StreamError::Cancelled | StreamError::Timeout)
    }
}

impl From<tonic::Status> for StreamError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            Code::Cancelled => StreamError::Cancelled,
            Code::DeadlineExceeded => StreamError::Timeout,
            Code::InvalidArgument => StreamError::InvalidArgument(status.message().to_string()),
            Code::Unavailable | Code::Unknown => {
                StreamError::TransportFailure(status.message().to_string())
            }
            _ => StreamError::PeerError(status.message().to_string()),
        }
    }
}

impl From<StreamError> for tonic::Status {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::InvalidArgument(msg) => tonic::Status::invalid_argument(msg),
            StreamError::Cancelled => tonic::Status::cancelled("call cancelled"),
            StreamError::Timeout => tonic::Status::deadline_exceeded("deadline exceeded"),
            StreamError::TransportFailure(msg) => tonic::Status::unavailable(msg),
            StreamError::PeerError(msg) => tonic::Status::internal(msg),
        }
    }
}

impl From<tonic::transport::Error> for StreamError {
    fn from(err: tonic::transport::Error) -> Self {
        StreamError::TransportFailure(err.to_string())
    }
}
