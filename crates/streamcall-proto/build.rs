// ABOUTME: Build script for generating Rust code from streamcall.proto.
// ABOUTME: Uses tonic-build to compile the service and envelope definitions into Rust types.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto-src/streamcall.proto"], &["proto-src"])?;

    println!("cargo:rerun-if-changed=proto-src/streamcall.proto");

    Ok(())
}
