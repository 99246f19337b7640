// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The msgpack-backed string table used by V05: an append-only interner
//! whose wire encoding is a reserved-prefix-patched msgpack array, plus a
//! savepoint/rollback pair so a failed span `put` can undo the strings it
//! interned.

use crate::primitives;
use indexmap::IndexSet;

/// Number of bytes reserved at the front of the buffer for the two headers
/// this table eventually writes: a 1-byte fixarray tag for the enclosing
/// `[string_table, traces]` pair, plus up to a 5-byte `array32` header for
/// the interned-strings array.
const RESERVED_PREFIX: usize = 6;

pub struct MsgpackStringTable {
    /// Insertion-ordered set of interned strings; index position is the id.
    /// Id 0 is always `""`, seeded at construction.
    index: IndexSet<String>,
    /// The strings, msgpack-encoded back to back, preceded by
    /// `RESERVED_PREFIX` placeholder bytes for the eventual header patch.
    buf: Vec<u8>,
}

impl Default for MsgpackStringTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MsgpackStringTable {
    pub fn new() -> Self {
        let mut index = IndexSet::new();
        index.insert(String::new());

        let mut buf = vec![0u8; RESERVED_PREFIX];
        // Encoding "" into an unbounded Vec<u8> cannot fail: there is no
        // size cap and no fallible sink here.
        primitives::write_str(&mut buf, "").expect("encoding into a Vec<u8> cannot fail");

        MsgpackStringTable { index, buf }
    }

    /// Returns the id for `text`, assigning a new one (and appending the
    /// msgpack-encoded string) the first time it's seen. `None` and `""`
    /// both collapse to id 0.
    pub fn index(&mut self, text: Option<&str>) -> u32 {
        let s = text.unwrap_or("");
        if let Some(pos) = self.index.get_index_of(s) {
            return pos as u32;
        }
        let id = self.index.len() as u32;
        self.index.insert(s.to_string());
        primitives::write_str(&mut self.buf, s).expect("encoding into a Vec<u8> cannot fail");
        id
    }

    pub fn contains(&self, text: &str) -> bool {
        self.index.contains(text)
    }

    pub fn len(&self) -> u32 {
        self.index.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        false // "" is always present
    }

    /// Current byte size of the msgpack-encoded region (strings plus any
    /// payload glued on via [`Self::append_raw`]), including the
    /// not-yet-written prefix headers.
    pub fn size(&self) -> usize {
        self.buf.len() + primitives::array_prefix_size(2) + primitives::array_prefix_size(self.len())
            - RESERVED_PREFIX
    }

    /// Records the current buffer length so a later [`Self::rollback`] can
    /// undo everything interned since.
    pub fn savepoint(&self) -> usize {
        self.buf.len()
    }

    /// Truncates the msgpack buffer back to a savepoint. The index map is
    /// deliberately *not* rewound: rolled-back strings remain indexed, but
    /// re-use is harmless because both structures are reset together at
    /// the next [`Self::flush`] (spec source's choice; see DESIGN.md).
    pub fn rollback(&mut self, savepoint: usize) {
        self.buf.truncate(savepoint);
    }

    /// Concatenates an externally encoded byte span onto this table's
    /// buffer. Used at flush time to glue the trace payload onto the
    /// string-array region before the combined header patch.
    pub fn append_raw(&mut self, src: &[u8]) {
        self.buf.extend_from_slice(src);
    }

    /// Patches the two reserved headers (outer 2-element array, inner
    /// N-strings array) into the prefix region by rewinding to the exact
    /// offset [`primitives::array_prefix_size`] dictates, then returns the
    /// composite bytes `[offset, len)`. Does not reset state; see
    /// [`Self::flush`].
    pub fn get_bytes(&mut self) -> Vec<u8> {
        let inner_width = primitives::array_prefix_size(self.len());
        let outer_width = primitives::array_prefix_size(2);
        let offset = RESERVED_PREFIX - outer_width - inner_width;

        let mut header = Vec::with_capacity(outer_width + inner_width);
        primitives::write_array_len(&mut header, 2).expect("encoding into a Vec<u8> cannot fail");
        primitives::write_array_len(&mut header, self.len())
            .expect("encoding into a Vec<u8> cannot fail");
        self.buf[offset..RESERVED_PREFIX].copy_from_slice(&header);

        self.buf[offset..].to_vec()
    }

    /// `get_bytes()` followed by a full reset of both the index and the
    /// buffer.
    pub fn flush(&mut self) -> Vec<u8> {
        let out = self.get_bytes();
        self.reset();
        out
    }

    /// Clears all entries. Post-condition: `index(Some(""))  == 0`.
    pub fn reset(&mut self) {
        *self = MsgpackStringTable::new();
    }
}
