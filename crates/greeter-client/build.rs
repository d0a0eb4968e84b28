fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Server stubs back the echo test double and the greeter-server demo
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/helloworld.proto"], &["proto"])?;
    Ok(())
}
