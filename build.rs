//! Compiles the sync/state/light-client protobuf schema into Rust types via `prost-build`, the
//! same way substrate's `sc-network-sync` generates its `schema.rs` from `api.v1.proto` at build
//! time rather than checking in generated code.

fn main() {
    println!("cargo:rerun-if-changed=proto/api.v1.proto");
    prost_build::compile_protos(&["proto/api.v1.proto"], &["proto"])
        .expect("failed to compile sync/state/light-client protobuf schema");
}
