// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The span/trace data model shared by both msgpack dialects.

use std::borrow::Borrow;
use std::hash::Hash;

/// The key under which a trace's sampling origin is carried in `meta`.
pub const DD_ORIGIN_KEY: &str = "_dd.origin";

/// Requirements for a type used as a span's string representation. Mirrors
/// the `&str`/owned-string split a real tracer needs: spans decoded off the
/// wire borrow from the decode buffer, spans built fresh by instrumentation
/// own their strings.
pub trait SpanText: Eq + Hash + Borrow<str> + Clone {}
impl<T> SpanText for T where T: Eq + Hash + Borrow<str> + Clone {}

/// A numeric span metric value: msgpack has no integer/float unification,
/// so `metrics` values are explicitly one or the other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
}

/// Minimal context carried alongside a trace. Only `dd_origin` is consumed
/// by this subsystem; a real tracer's context carries a great deal more
/// (baggage, sampling priority) that is out of scope here.
#[derive(Debug, Clone, Default)]
pub struct SpanContext<T: SpanText> {
    pub dd_origin: Option<T>,
}

/// A single unit of traced work.
#[derive(Debug, Clone)]
pub struct Span<T: SpanText> {
    pub trace_id: u64,
    pub span_id: u64,
    pub parent_id: u64,
    pub service: Option<T>,
    pub resource: Option<T>,
    pub name: Option<T>,
    pub error: bool,
    pub start_ns: i64,
    pub duration_ns: i64,
    pub span_type: Option<T>,
    /// Insertion-ordered: V05's positional encoding requires a stable
    /// iteration order across `put` and any eventual decode-side
    /// reconstruction.
    pub meta: Vec<(T, T)>,
    pub metrics: Vec<(T, MetricValue)>,
    pub context: SpanContext<T>,
}

impl<T: SpanText> Span<T> {
    /// `true` when this span's own `meta` map is non-empty. Does not
    /// account for a trace-level `dd_origin` injection; see
    /// [`Trace::origin`] and the callers in `v03`/`v05` that combine the two.
    pub fn has_meta(&self) -> bool {
        !self.meta.is_empty()
    }
}

/// An ordered sequence of spans sharing a trace id.
pub type Trace<T> = Vec<Span<T>>;

/// The origin of a trace is `trace[0].context.dd_origin`, if present. Only
/// the first span's context contributes; later spans' contexts are ignored
/// for this purpose even if they carry a (possibly different) origin.
pub fn trace_origin<T: SpanText>(trace: &Trace<T>) -> Option<&T> {
    trace.first().and_then(|span| span.context.dd_origin.as_ref())
}
