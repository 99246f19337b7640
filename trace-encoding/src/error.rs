// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the buffered trace encoders.

use thiserror::Error;

/// Errors surfaced by [`crate::buffer::Buffer::put`] and the concrete
/// `pack_item` implementations it drives.
#[derive(Debug, Error, PartialEq)]
pub enum EncoderError {
    /// A single item's encoded contribution exceeds `max_item_size`.
    /// `delta` is the number of bytes the item would have added.
    #[error("item too large by {0} bytes over the per-item cap")]
    BufferItemTooLarge(usize),

    /// The total payload would exceed `max_size`. Transient: the caller is
    /// expected to `encode()` and retry.
    #[error("buffer full, item needs {0} more bytes than remain")]
    BufferFull(usize),

    /// A numeric value did not fit in a 64-bit signed or unsigned integer.
    #[error("numeric value overflows 64-bit representation")]
    NumericOverflow,

    /// A string or byte value exceeds the 2^32 - 1 msgpack length limit.
    #[error("value length exceeds msgpack's 32-bit size limit")]
    ValueTooLarge,

    /// A value of a type this encoder has no msgpack representation for.
    #[error("no msgpack encoding for this value's type")]
    UnhandledType,

    /// An unexpected failure from the underlying msgpack primitive writer.
    /// Should not occur against a correctly sized buffer; treated as a
    /// programming error and surfaced verbatim.
    #[error("msgpack encoding primitive failed: {0}")]
    EncodingError(String),

    /// The buffer's backing allocation could not be made at construction.
    #[error("failed to allocate encoder buffer of the requested capacity")]
    AllocationFailed,
}
