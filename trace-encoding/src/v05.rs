// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! V05: a dictionary-compressed positional msgpack array per span, with
//! every string replaced by its id into a shared, msgpack-backed string
//! table.

use crate::buffer::Buffer;
use crate::config::EncoderConfig;
use crate::error::EncoderError;
use crate::primitives;
use crate::span::{trace_origin, Span, SpanText, Trace, DD_ORIGIN_KEY};
use crate::string_table::MsgpackStringTable;
use parking_lot::Mutex;
use std::marker::PhantomData;

pub const CONTENT_TYPE: &str = "application/msgpack";

/// V05's payload buffer has the same reserved prefix as the base/V03
/// buffer; the extra 6-byte reservation described in spec.md §3 belongs to
/// the string table, not this buffer.
const RESERVED_PREFIX: usize = 5;

struct Inner {
    buffer: Buffer,
    strings: MsgpackStringTable,
}

/// Buffered positional-array encoder for the V05 trace dialect.
pub struct MsgpackEncoderV05<T: SpanText> {
    inner: Mutex<Inner>,
    _marker: PhantomData<T>,
}

impl<T: SpanText> MsgpackEncoderV05<T> {
    pub fn new(max_size: usize, max_item_size: usize) -> Result<Self, EncoderError> {
        Ok(MsgpackEncoderV05 {
            inner: Mutex::new(Inner {
                buffer: Buffer::new(max_size, max_item_size, RESERVED_PREFIX)?,
                strings: MsgpackStringTable::new(),
            }),
            _marker: PhantomData,
        })
    }

    pub fn from_config(config: EncoderConfig) -> Result<Self, EncoderError> {
        Self::new(config.max_size, config.max_item_size)
    }

    /// Appends one trace. Transactional across *both* the payload buffer
    /// and the string table: a savepoint is taken on the string table
    /// before delegating to the payload buffer's own transactional `put`;
    /// if that fails, the string table is rolled back to undo any strings
    /// this trace interned, and the error is re-raised. A failed `put`
    /// leaves the encoder byte-identical to its pre-call state.
    pub fn put(&self, trace: &Trace<T>) -> Result<(), EncoderError> {
        let mut inner = self.inner.lock();
        let Inner { buffer, strings } = &mut *inner;
        let savepoint = strings.savepoint();

        if let Err(err) = buffer.put(|buf| encode_trace(buf, trace, strings)) {
            strings.rollback(savepoint);
            return Err(err);
        }

        tracing::debug!(spans = trace.len(), "encoded trace into V05 buffer");
        Ok(())
    }

    /// Glues the payload bytes onto the string table's buffer, then drains
    /// the string table: patches the outer 2-element array header and the
    /// inner N-strings header into its reserved prefix, returns the
    /// composite bytes, and resets both the payload cursor (`length = 5`)
    /// and the string table. `None` when no trace has been `put` since the
    /// last call.
    pub fn flush(&self) -> Result<Option<Vec<u8>>, EncoderError> {
        let mut inner = self.inner.lock();
        let payload = match inner.buffer.encode()? {
            Some(payload) => payload,
            None => return Ok(None),
        };
        inner.strings.append_raw(&payload);
        Ok(Some(inner.strings.flush()))
    }

    /// Alias for [`Self::flush`]: V05 has no separate terminal step, unlike
    /// V03 where `encode` and `flush` coincide trivially.
    pub fn encode(&self) -> Result<Option<Vec<u8>>, EncoderError> {
        self.flush()
    }

    /// Payload size plus string-table size.
    pub fn size(&self) -> usize {
        let inner = self.inner.lock();
        inner.buffer.size() + inner.strings.size()
    }

    pub fn len(&self) -> u32 {
        self.inner.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn encode_trace<T: SpanText>(
    buf: &mut Vec<u8>,
    trace: &Trace<T>,
    strings: &mut MsgpackStringTable,
) -> Result<(), EncoderError> {
    let origin = trace_origin(trace);
    primitives::write_array_len(buf, trace.len() as u32)?;
    for span in trace {
        encode_span(buf, span, origin, strings)?;
    }
    Ok(())
}

fn encode_span<T: SpanText>(
    buf: &mut Vec<u8>,
    span: &Span<T>,
    origin: Option<&T>,
    strings: &mut MsgpackStringTable,
) -> Result<(), EncoderError> {
    primitives::write_array_len(buf, 12)?;

    let service_id = strings.index(span.service.as_ref().map(|s| s.borrow()));
    let name_id = strings.index(span.name.as_ref().map(|s| s.borrow()));
    let resource_id = strings.index(span.resource.as_ref().map(|s| s.borrow()));

    primitives::write_uint(buf, service_id as u64)?;
    primitives::write_uint(buf, name_id as u64)?;
    primitives::write_uint(buf, resource_id as u64)?;

    primitives::write_uint(buf, span.trace_id)?;
    primitives::write_uint(buf, span.span_id)?;
    primitives::write_uint(buf, span.parent_id)?;

    primitives::write_int(buf, span.start_ns)?;
    primitives::write_int(buf, span.duration_ns)?;
    primitives::write_int(buf, span.error as i64)?;

    let meta_len = span.meta.len() as u32 + origin.is_some() as u32;
    primitives::write_map_len(buf, meta_len)?;
    for (k, v) in &span.meta {
        let k_id = strings.index(Some(k.borrow()));
        let v_id = strings.index(Some(v.borrow()));
        primitives::write_uint(buf, k_id as u64)?;
        primitives::write_uint(buf, v_id as u64)?;
    }
    if let Some(origin) = origin {
        let k_id = strings.index(Some(DD_ORIGIN_KEY));
        let v_id = strings.index(Some(origin.borrow()));
        primitives::write_uint(buf, k_id as u64)?;
        primitives::write_uint(buf, v_id as u64)?;
    }

    primitives::write_map_len(buf, span.metrics.len() as u32)?;
    for (k, v) in &span.metrics {
        let k_id = strings.index(Some(k.borrow()));
        primitives::write_uint(buf, k_id as u64)?;
        primitives::write_number(buf, *v)?;
    }

    let type_id = strings.index(span.span_type.as_ref().map(|s| s.borrow()));
    primitives::write_uint(buf, type_id as u64)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::SpanContext;

    fn span(trace_id: u64, span_id: u64) -> Span<String> {
        Span {
            trace_id,
            span_id,
            parent_id: 0,
            service: Some("s".to_string()),
            resource: Some("r".to_string()),
            name: Some("n".to_string()),
            error: false,
            start_ns: 1000,
            duration_ns: 500,
            span_type: None,
            meta: Vec::new(),
            metrics: Vec::new(),
            context: SpanContext::default(),
        }
    }

    #[test]
    fn literal_scenario_3_string_table_and_span_array_shape() {
        let encoder = MsgpackEncoderV05::<String>::new(64 * 1024, 64 * 1024).unwrap();
        encoder.put(&vec![span(1, 2)]).unwrap();
        let bytes = encoder.flush().unwrap().unwrap();

        let mut slice = &bytes[..];
        assert_eq!(rmp::decode::read_array_len(&mut slice).unwrap(), 2);

        let n_strings = rmp::decode::read_array_len(&mut slice).unwrap();
        assert_eq!(n_strings, 4);
        let mut strs = Vec::new();
        for _ in 0..n_strings {
            let len = rmp::decode::read_str_len(&mut slice).unwrap() as usize;
            let (s, rest) = slice.split_at(len);
            strs.push(std::str::from_utf8(s).unwrap().to_string());
            slice = rest;
        }
        assert_eq!(strs, vec!["", "s", "n", "r"]);

        assert_eq!(rmp::decode::read_array_len(&mut slice).unwrap(), 1); // traces
        assert_eq!(rmp::decode::read_array_len(&mut slice).unwrap(), 1); // spans
        assert_eq!(rmp::decode::read_array_len(&mut slice).unwrap(), 12); // positional fields
    }

    #[test]
    fn every_emitted_string_id_is_a_valid_table_index() {
        let encoder = MsgpackEncoderV05::<String>::new(64 * 1024, 64 * 1024).unwrap();
        let mut trace = vec![span(1, 2), span(1, 3)];
        trace[0].meta.push(("k".to_string(), "v".to_string()));
        trace[1].context.dd_origin = Some("synthetics".to_string());
        encoder.put(&trace).unwrap();
        let bytes = encoder.flush().unwrap().unwrap();

        let mut slice = &bytes[..];
        rmp::decode::read_array_len(&mut slice).unwrap();
        let n_strings = rmp::decode::read_array_len(&mut slice).unwrap();
        for _ in 0..n_strings {
            let len = rmp::decode::read_str_len(&mut slice).unwrap() as usize;
            let (_, rest) = slice.split_at(len);
            slice = rest;
        }
        let n_traces = rmp::decode::read_array_len(&mut slice).unwrap();
        for _ in 0..n_traces {
            let n_spans = rmp::decode::read_array_len(&mut slice).unwrap();
            for _ in 0..n_spans {
                let n_fields = rmp::decode::read_array_len(&mut slice).unwrap();
                assert_eq!(n_fields, 12);
                for field in 0..12 {
                    match field {
                        0..=2 | 11 => {
                            let id = rmp::decode::read_int::<u32, _>(&mut slice).unwrap();
                            assert!(id < n_strings);
                        }
                        3..=5 => {
                            rmp::decode::read_int::<u64, _>(&mut slice).unwrap();
                        }
                        6 | 7 => {
                            rmp::decode::read_int::<i64, _>(&mut slice).unwrap();
                        }
                        8 => {
                            rmp::decode::read_int::<i32, _>(&mut slice).unwrap();
                        }
                        9 => {
                            let n = rmp::decode::read_map_len(&mut slice).unwrap();
                            for _ in 0..n {
                                let k = rmp::decode::read_int::<u32, _>(&mut slice).unwrap();
                                let v = rmp::decode::read_int::<u32, _>(&mut slice).unwrap();
                                assert!(k < n_strings && v < n_strings);
                            }
                        }
                        10 => {
                            let n = rmp::decode::read_map_len(&mut slice).unwrap();
                            for _ in 0..n {
                                rmp::decode::read_int::<u32, _>(&mut slice).unwrap();
                                rmp::decode::read_f64(&mut slice).unwrap();
                            }
                        }
                        _ => unreachable!(),
                    }
                }
            }
        }
    }

    #[test]
    fn rollback_on_buffer_full_leaves_string_table_untouched_by_size() {
        // max_item_size deliberately too small for even one span: the put
        // fails while interning strings for the first span, and both the
        // payload buffer and the string table must be back at their
        // pre-call sizes.
        let encoder = MsgpackEncoderV05::<String>::new(64 * 1024, 4).unwrap();
        let size_before = encoder.size();
        let err = encoder.put(&vec![span(1, 2)]).unwrap_err();
        assert!(matches!(err, EncoderError::BufferItemTooLarge(_)));
        assert_eq!(encoder.size(), size_before);
        assert_eq!(encoder.len(), 0);
    }

    #[test]
    fn flush_twice_in_a_row_yields_none_the_second_time() {
        let encoder = MsgpackEncoderV05::<String>::new(64 * 1024, 64 * 1024).unwrap();
        encoder.put(&vec![span(1, 2)]).unwrap();
        assert!(encoder.flush().unwrap().is_some());
        assert_eq!(encoder.flush().unwrap(), None);
    }
}
