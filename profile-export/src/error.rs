// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the pprof converter/exporter.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ProfileError {
    /// `_build_profile` (or any `_str` call reachable from it) was invoked
    /// after the string table had already been iterated for emission. The
    /// converter is single-use: once its strings are drained, no further
    /// interning is allowed.
    #[error("string table already consumed by a prior emission")]
    AlreadyEmitted,
}
