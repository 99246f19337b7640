// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Explicit construction knobs for [`crate::exporter::PprofExporter`],
//! replacing the `get_application_name()` global flagged as a redesign
//! target: the caller supplies `program_name` up front instead of it being
//! read from process-wide state at export time.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterConfig {
    pub program_name: String,
}
