// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Buffered, size-bounded msgpack encoders for trace payloads.
//!
//! Two on-wire dialects are supported: [`v03`], a self-describing map form,
//! and [`v05`], a dictionary-compressed positional form sharing an interned
//! string table. Both are built on the same [`buffer::Buffer`] primitive:
//! a fixed-capacity byte region with a reserved prefix for a patchable
//! array-length header and a transactional `put`.

pub mod buffer;
pub mod config;
pub mod error;
pub mod primitives;
pub mod span;
pub mod string_table;
pub mod v03;
pub mod v05;

pub use config::EncoderConfig;
pub use error::EncoderError;
pub use span::{MetricValue, Span, SpanContext, SpanText, Trace};
pub use v03::MsgpackEncoderV03;
pub use v05::MsgpackEncoderV05;
