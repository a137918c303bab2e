//! Build script for compiling protobuf definitions.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        if let Ok(protoc_path) = protoc_bin_vendored::protoc_bin_path() {
            std::env::set_var("PROTOC", protoc_path);
        }
    }

    let proto_files = [
        "../../proto/cairn/v1/record.proto",
        "../../proto/cairn/v1/store.proto",
        "../../proto/cairn/v1/routing.proto",
        "../../proto/cairn/v1/search.proto",
        "../../proto/cairn/v1/sync.proto",
    ];

    let includes = ["../../proto"];

    tonic_build::configure()
        // Use BTreeMap for deterministic ordering of map fields
        .btree_map(["."])
        .compile_protos(&proto_files, &includes)?;

    // Rerun if proto files change
    for file in &proto_files {
        println!("cargo:rerun-if-changed={file}");
    }

    Ok(())
}
