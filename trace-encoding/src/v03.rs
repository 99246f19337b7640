// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! V03: a self-describing msgpack map per span.

use crate::buffer::Buffer;
use crate::config::EncoderConfig;
use crate::error::EncoderError;
use crate::primitives;
use crate::span::{trace_origin, SpanText, Trace, DD_ORIGIN_KEY};
use parking_lot::Mutex;
use std::marker::PhantomData;

/// Content type a V03 payload is advertised under.
pub const CONTENT_TYPE: &str = "application/msgpack";

/// Base/V03 reserved prefix: room for an `array32` header only.
const RESERVED_PREFIX: usize = 5;

/// Buffered msgpack-map encoder for the V03 trace dialect. One instance is
/// meant to be shared by concurrent producers calling [`Self::put`] and a
/// single consumer calling [`Self::encode`]/[`Self::flush`]; a single mutex
/// guards all buffer mutations.
pub struct MsgpackEncoderV03<T: SpanText> {
    inner: Mutex<Buffer>,
    _marker: PhantomData<T>,
}

impl<T: SpanText> MsgpackEncoderV03<T> {
    pub fn new(max_size: usize, max_item_size: usize) -> Result<Self, EncoderError> {
        Ok(MsgpackEncoderV03 {
            inner: Mutex::new(Buffer::new(max_size, max_item_size, RESERVED_PREFIX)?),
            _marker: PhantomData,
        })
    }

    pub fn from_config(config: EncoderConfig) -> Result<Self, EncoderError> {
        Self::new(config.max_size, config.max_item_size)
    }

    /// Appends one trace. Atomic: on any failure the buffer is left exactly
    /// as it was before the call and the trace is not counted.
    pub fn put(&self, trace: &Trace<T>) -> Result<(), EncoderError> {
        let mut buffer = self.inner.lock();
        buffer.put(|buf| encode_trace(buf, trace))?;
        tracing::debug!(spans = trace.len(), "encoded trace into V03 buffer");
        Ok(())
    }

    /// Patches the header, returns a snapshot, and resets for reuse. `None`
    /// when no trace has been `put` since the last call.
    pub fn encode(&self) -> Result<Option<Vec<u8>>, EncoderError> {
        self.inner.lock().encode()
    }

    /// Identical to [`Self::encode`] for the base dialect; V05 overrides
    /// this to also drain its string table.
    pub fn flush(&self) -> Result<Option<Vec<u8>>, EncoderError> {
        self.encode()
    }

    pub fn size(&self) -> usize {
        self.inner.lock().size()
    }

    pub fn len(&self) -> u32 {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn encode_trace<T: SpanText>(buf: &mut Vec<u8>, trace: &Trace<T>) -> Result<(), EncoderError> {
    let origin = trace_origin(trace);
    primitives::write_array_len(buf, trace.len() as u32)?;
    for span in trace {
        encode_span(buf, span, origin)?;
    }
    Ok(())
}

fn encode_span<T: SpanText>(
    buf: &mut Vec<u8>,
    span: &crate::span::Span<T>,
    origin: Option<&T>,
) -> Result<(), EncoderError> {
    let has_type = span.span_type.is_some();
    let has_meta = span.has_meta() || origin.is_some();
    let has_metrics = !span.metrics.is_empty();
    let map_len = 9 + has_type as u32 + has_meta as u32 + has_metrics as u32;

    primitives::write_map_len(buf, map_len)?;

    primitives::write_key(buf, "trace_id")?;
    primitives::write_uint(buf, span.trace_id)?;

    primitives::write_key(buf, "parent_id")?;
    primitives::write_uint(buf, span.parent_id)?;

    primitives::write_key(buf, "span_id")?;
    primitives::write_uint(buf, span.span_id)?;

    primitives::write_key(buf, "service")?;
    primitives::write_str_opt(buf, span.service.as_ref().map(|s| s.borrow()))?;

    primitives::write_key(buf, "resource")?;
    primitives::write_str_opt(buf, span.resource.as_ref().map(|s| s.borrow()))?;

    primitives::write_key(buf, "name")?;
    primitives::write_str_opt(buf, span.name.as_ref().map(|s| s.borrow()))?;

    primitives::write_key(buf, "error")?;
    primitives::write_bool_as_int(buf, span.error)?;

    primitives::write_key(buf, "start")?;
    primitives::write_int(buf, span.start_ns)?;

    primitives::write_key(buf, "duration")?;
    primitives::write_int(buf, span.duration_ns)?;

    if has_type {
        primitives::write_key(buf, "type")?;
        primitives::write_str_opt(buf, span.span_type.as_ref().map(|s| s.borrow()))?;
    }

    if has_meta {
        primitives::write_key(buf, "meta")?;
        let n = span.meta.len() as u32 + origin.is_some() as u32;
        primitives::write_map_len(buf, n)?;
        for (k, v) in &span.meta {
            primitives::write_str(buf, k.borrow())?;
            primitives::write_str(buf, v.borrow())?;
        }
        if let Some(origin) = origin {
            primitives::write_str(buf, DD_ORIGIN_KEY)?;
            primitives::write_str(buf, origin.borrow())?;
        }
    }

    if has_metrics {
        primitives::write_key(buf, "metrics")?;
        primitives::write_map_len(buf, span.metrics.len() as u32)?;
        for (k, v) in &span.metrics {
            primitives::write_str(buf, k.borrow())?;
            primitives::write_number(buf, *v)?;
        }
    }

    Ok(())
}
