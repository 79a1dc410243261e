// ABOUTME: Re-exports generated protobuf types for the streamcall protocol.
// ABOUTME: Single source of truth for the StreamingService and its message envelopes.

#![allow(clippy::derive_partial_eq_without_eq)]

/// Generated protobuf types for the streamcall protocol.
pub mod streamcall {
    tonic::include_proto!("streamcall");
}

pub use streamcall::*;

pub mod client {
    pub use super::streamcall::streaming_service_client::StreamingServiceClient;
}

pub mod server {
    pub use super::streamcall::streaming_service_server::{
        StreamingService, StreamingServiceServer,
    };
}
