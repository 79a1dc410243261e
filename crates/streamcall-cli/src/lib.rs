// ABOUTME: CLI library components for the streamcall binary.
// ABOUTME: Command implementations shared by the serve and client subcommands.

//! # streamcall-cli
//!
//! Command-line interface for the streamcall StreamingService.
//!
//! ```text
//! streamcall
//! ├── serve                         # Run the gRPC server
//! ├── stocks --symbol AAPL          # Server-streaming: print price ticks
//! ├── upload [--file PATH]          # Client-streaming: upload chunks, print summary
//! └── chat [--message TEXT]...      # Bidirectional: exchange chat turns
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the server with defaults (0.0.0.0:50051)
//! streamcall serve
//!
//! # Stream ten ticks for AAPL
//! streamcall stocks --symbol AAPL
//!
//! # Upload a file in 1 KiB chunks
//! streamcall upload --file notes.txt --chunk-size 1024
//! ```

pub mod commands;
