// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `prost`-generated bindings for the vendored pprof schema (`profile.proto`).

include!(concat!(env!("OUT_DIR"), "/perftools.profiles.rs"));
