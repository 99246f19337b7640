// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The abstract buffered encoder: a fixed-capacity byte region with a
//! reserved prefix for a patchable array-length header, transactional
//! `put`, and terminal `encode`.

use crate::error::EncoderError;
use crate::primitives;

/// A growable-until-`max_size` byte buffer with a reserved prefix for a
/// msgpack array header that is only known once all items are in.
///
/// Invariant: `reserved_prefix <= length <= max_size` and
/// `size() = length + array_prefix_size(count) - reserved_prefix <= max_size`.
pub struct Buffer {
    buf: Vec<u8>,
    length: usize,
    reserved_prefix: usize,
    max_size: usize,
    max_item_size: usize,
    count: u32,
}

impl Buffer {
    /// `reserved_prefix` is 5 for the base/V03 payload (room for an
    /// `array32` header) and 6 for V05's string table (an `array32` header
    /// plus the enclosing 2-element array's 1-byte fixarray tag).
    pub fn new(
        max_size: usize,
        max_item_size: usize,
        reserved_prefix: usize,
    ) -> Result<Self, EncoderError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(max_size)
            .map_err(|_| EncoderError::AllocationFailed)?;
        buf.resize(reserved_prefix, 0);
        Ok(Buffer {
            buf,
            length: reserved_prefix,
            reserved_prefix,
            max_size,
            max_item_size,
            count: 0,
        })
    }

    /// Current logical payload size, including the not-yet-written prefix
    /// header that `encode`/`flush` will eventually write.
    pub fn size(&self) -> usize {
        self.length + primitives::array_prefix_size(self.count) - self.reserved_prefix
    }

    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn reserved_prefix(&self) -> usize {
        self.reserved_prefix
    }

    /// Append one item to the buffer. `pack` writes the item's encoded form
    /// onto the tail of the backing `Vec<u8>`. On any failure — `pack`
    /// itself fails, the item exceeds `max_item_size`, or the total would
    /// exceed `max_size` — the buffer is rewound to its pre-call state and
    /// the item counter is left unchanged.
    pub fn put<F>(&mut self, pack: F) -> Result<(), EncoderError>
    where
        F: FnOnce(&mut Vec<u8>) -> Result<(), EncoderError>,
    {
        let start = self.length;
        debug_assert_eq!(self.buf.len(), start);

        if let Err(err) = pack(&mut self.buf) {
            self.buf.truncate(start);
            return Err(err);
        }

        let item_len = self.buf.len() - start;
        if item_len > self.max_item_size {
            self.buf.truncate(start);
            return Err(EncoderError::BufferItemTooLarge(
                item_len - self.max_item_size,
            ));
        }

        let candidate_count = self.count + 1;
        let candidate_size =
            self.buf.len() + primitives::array_prefix_size(candidate_count) - self.reserved_prefix;
        if candidate_size > self.max_size {
            self.buf.truncate(start);
            return Err(EncoderError::BufferFull(candidate_size - self.max_size));
        }

        self.length = self.buf.len();
        self.count = candidate_count;
        Ok(())
    }

    /// Patches the reserved prefix with an array header of value `count`,
    /// returns a snapshot of `[offset, length)`, and resets the buffer to
    /// reuse its allocation (`count = 0`, `length = reserved_prefix`).
    /// Returns `None` when no items have been accepted.
    pub fn encode(&mut self) -> Result<Option<Vec<u8>>, EncoderError> {
        if self.count == 0 {
            return Ok(None);
        }

        let header_width = primitives::array_prefix_size(self.count);
        let offset = self.reserved_prefix - header_width;

        let mut header = Vec::with_capacity(header_width);
        primitives::write_array_len(&mut header, self.count)?;
        debug_assert_eq!(header.len(), header_width);
        self.buf[offset..self.reserved_prefix].copy_from_slice(&header);

        let out = self.buf[offset..self.length].to_vec();

        self.buf.truncate(self.reserved_prefix);
        self.length = self.reserved_prefix;
        self.count = 0;

        Ok(Some(out))
    }
}
