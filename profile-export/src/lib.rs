// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Converts profiling events (stack samples, allocations, lock contention)
//! into pprof profiles.

pub mod config;
pub mod converter;
pub mod error;
pub mod events;
pub mod exporter;
pub mod pb;
pub mod string_table;

pub use config::ExporterConfig;
pub use converter::PprofConverter;
pub use error::ProfileError;
pub use exporter::{EventBatch, PprofExporter};
