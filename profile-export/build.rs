// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

fn main() -> Result<(), std::io::Error> {
    let protos = &[concat!(env!("CARGO_MANIFEST_DIR"), "/src/profile.proto")];
    let includes = &[concat!(env!("CARGO_MANIFEST_DIR"), "/src")];
    prost_build::compile_protos(protos, includes)?;
    Ok(())
}
