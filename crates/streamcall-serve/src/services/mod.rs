// ABOUTME: gRPC service implementations for the streamcall server
// ABOUTME: StreamingService (UploadFile, GetStockPrices, Chat)

pub mod streaming;

pub use streaming::StreamingServiceImpl;
