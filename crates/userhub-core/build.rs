/// Builds the gRPC client and server code for `proto/auth.proto` using
/// `tonic-prost-build`.
///
/// Every message in the `auth` package additionally derives `serde`'s
/// `Serialize`/`Deserialize` with camelCase field names, so the HTTP gateway
/// can speak JSON with the exact same types it forwards over gRPC. Missing
/// JSON fields fall back to the prost `Default`.
///
/// A file descriptor set is written next to the generated code for the
/// reflection service:
///
/// ```rust
/// pub mod proto {
///     tonic::include_proto!("auth");
///     pub const FILE_DESCRIPTOR_SET: &[u8] =
///         tonic::include_file_descriptor_set!("auth_descriptor");
/// }
/// ```
///
/// # Panics
///
/// Panics if code generation fails.
use std::env;
use std::path::PathBuf;
fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("auth_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();

    config
        .type_attribute(
            ".auth",
            "#[derive(serde::Serialize, serde::Deserialize)]",
        )
        .type_attribute(".auth", "#[serde(default, rename_all = \"camelCase\")]")
        .file_descriptor_set_path(&descriptor_path);

    println!("cargo:rerun-if-changed=proto/auth.proto");

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/auth.proto"], &["proto"])
        .unwrap();
}
