fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Compile the volume daemon definitions
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/lvmd.proto"], &["proto"])?;

    Ok(())
}
