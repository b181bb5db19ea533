// Copyright (c) 2026 The KMS Plugin Authors
//
// SPDX-License-Identifier: Apache-2.0
//

fn main() {
    #[cfg(feature = "build")]
    tonic_build::configure()
        .build_server(true)
        .out_dir("src/grpc")
        .compile_protos(&["./protos/api.proto"], &["./protos"])
        .expect("grpc proto files build");
}
