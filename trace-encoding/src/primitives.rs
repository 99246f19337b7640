// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Low-level msgpack type-tagged writers. No knowledge of domain types: a
//! `Span` is encoded by calling these in the right order with the right
//! values, nothing more.
//!
//! Growth is the caller's problem: these functions append to a `Vec<u8>`,
//! which never fails to grow in practice. The owning [`crate::buffer::Buffer`]
//! is responsible for detecting, after the fact, that the write pushed it
//! over its configured size caps and rolling back.

use crate::error::EncoderError;
use crate::span::MetricValue;

fn map_rmp_err<E: std::fmt::Display>(err: rmp::encode::ValueWriteError<E>) -> EncoderError {
    EncoderError::EncodingError(err.to_string())
}

/// `array_prefix_size(n)`: the number of bytes a msgpack array header needs
/// to encode a length of `n`. Used to compute the exact offset at which a
/// patched top-level array header will be written.
pub fn array_prefix_size(n: u32) -> usize {
    if n < 16 {
        1
    } else if n < (1 << 16) {
        3
    } else {
        5
    }
}

pub fn write_nil(buf: &mut Vec<u8>) -> Result<(), EncoderError> {
    rmp::encode::write_nil(buf).map_err(|e| EncoderError::EncodingError(e.to_string()))
}

/// Numeric dispatch: negative integers are signed-encoded, non-negative
/// integers are unsigned-encoded, matching spec.md's "if non-negative, use
/// unsigned-long-long encoding; otherwise signed-long-long encoding".
pub fn write_int(buf: &mut Vec<u8>, n: i64) -> Result<(), EncoderError> {
    if n >= 0 {
        rmp::encode::write_uint(buf, n as u64).map_err(map_rmp_err)?;
    } else {
        rmp::encode::write_sint(buf, n).map_err(map_rmp_err)?;
    }
    Ok(())
}

pub fn write_uint(buf: &mut Vec<u8>, n: u64) -> Result<(), EncoderError> {
    rmp::encode::write_uint(buf, n).map_err(map_rmp_err)
}

pub fn write_f64(buf: &mut Vec<u8>, n: f64) -> Result<(), EncoderError> {
    rmp::encode::write_f64(buf, n).map_err(map_rmp_err)
}

pub fn write_number(buf: &mut Vec<u8>, n: MetricValue) -> Result<(), EncoderError> {
    match n {
        MetricValue::Int(i) => write_int(buf, i),
        MetricValue::Float(f) => write_f64(buf, f),
    }
}

/// Text dispatch: `None` writes a nil tag, `Some` writes a UTF-8 msgpack
/// str. Length is bounded by msgpack's 32-bit size field.
pub fn write_str_opt(buf: &mut Vec<u8>, s: Option<&str>) -> Result<(), EncoderError> {
    match s {
        None => write_nil(buf),
        Some(s) => write_str(buf, s),
    }
}

pub fn write_str(buf: &mut Vec<u8>, s: &str) -> Result<(), EncoderError> {
    if s.len() as u64 > u32::MAX as u64 {
        return Err(EncoderError::ValueTooLarge);
    }
    rmp::encode::write_str(buf, s).map_err(|e| EncoderError::EncodingError(e.to_string()))
}

/// Literal map keys are always plain UTF-8 str values; this is just a
/// readability alias over [`write_str`] for call sites that are writing a
/// fixed field-name key rather than a domain string.
pub fn write_key(buf: &mut Vec<u8>, key: &str) -> Result<(), EncoderError> {
    write_str(buf, key)
}

pub fn write_bool_as_int(buf: &mut Vec<u8>, b: bool) -> Result<(), EncoderError> {
    write_int(buf, b as i64)
}

pub fn write_array_len(buf: &mut Vec<u8>, len: u32) -> Result<(), EncoderError> {
    rmp::encode::write_array_len(buf, len).map_err(|e| EncoderError::EncodingError(e.to_string()))
}

pub fn write_map_len(buf: &mut Vec<u8>, len: u32) -> Result<(), EncoderError> {
    rmp::encode::write_map_len(buf, len).map_err(|e| EncoderError::EncodingError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_prefix_size_boundaries() {
        assert_eq!(array_prefix_size(0), 1);
        assert_eq!(array_prefix_size(15), 1);
        assert_eq!(array_prefix_size(16), 3);
        assert_eq!(array_prefix_size(u16::MAX as u32), 3);
        assert_eq!(array_prefix_size(u16::MAX as u32 + 1), 5);
    }

    #[test]
    fn negative_ints_use_signed_encoding() {
        let mut buf = Vec::new();
        write_int(&mut buf, -1).unwrap();
        let mut slice = &buf[..];
        assert_eq!(rmp::decode::read_int::<i64, _>(&mut slice).unwrap(), -1);
    }

    #[test]
    fn non_negative_ints_roundtrip_through_u64_encoding() {
        let mut buf = Vec::new();
        write_int(&mut buf, u32::MAX as i64 + 1).unwrap();
        let mut slice = &buf[..];
        assert_eq!(
            rmp::decode::read_int::<u64, _>(&mut slice).unwrap(),
            u32::MAX as u64 + 1
        );
    }
}
