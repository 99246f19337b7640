// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory list variant of the string table, used by the pprof path: a
//! simple append-only interner whose iteration order is insertion order.
//!
//! This mirrors `datadog-profiling`'s `collections::string_table::StringTable`
//! (an `IndexSet`-backed interner reserving id 0 for `""`), without that
//! crate's arena allocator, which exists to avoid per-string heap
//! allocations at profiler-hot-path scale — out of scope here.

use indexmap::IndexSet;

#[derive(Debug, Default)]
pub struct StringTable {
    strings: IndexSet<String>,
}

impl StringTable {
    pub fn new() -> Self {
        let mut strings = IndexSet::new();
        strings.insert(String::new());
        StringTable { strings }
    }

    /// Returns the id for `text`, interning it if this is the first time
    /// it's been seen. `None` collapses to id 0, same as `""`.
    pub fn index(&mut self, text: Option<&str>) -> u32 {
        let s = text.unwrap_or("");
        if let Some(pos) = self.strings.get_index_of(s) {
            return pos as u32;
        }
        let id = self.strings.len() as u32;
        self.strings.insert(s.to_string());
        id
    }

    pub fn contains(&self, text: &str) -> bool {
        self.strings.contains(text)
    }

    pub fn len(&self) -> u32 {
        self.strings.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn reset(&mut self) {
        self.strings.clear();
        self.strings.insert(String::new());
    }

    /// Iterates the interned strings in insertion order, i.e. the order
    /// their ids were assigned.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(|s| s.as_str())
    }

    pub fn into_vec(self) -> Vec<String> {
        self.strings.into_iter().collect()
    }
}
