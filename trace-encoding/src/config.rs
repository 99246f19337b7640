// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Explicit construction knobs, passed in by the caller rather than read
//! from a global or thread-local, matching `datadog-trace-utils`'s general
//! preference for explicit parameters (e.g. `TracerHeaderTags` passed
//! explicitly through call sites rather than stashed in thread-locals).

/// Sizing knobs shared by both trace encoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderConfig {
    pub max_size: usize,
    pub max_item_size: usize,
}
