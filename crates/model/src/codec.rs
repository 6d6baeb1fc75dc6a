//! Binary stroke point codec
//!
//! Layout (all multi-byte values little-endian):
//!
//! ```text
//! [mask: u8] [count: u32] { x: f32, y: f32, [pressure: f32], [tilt_x: i32], [tilt_y: i32] } * count
//! ```
//!
//! Optional columns are written only when their bit is set in the mask
//! (bit0 = pressure, bit1 = tilt_x, bit2 = tilt_y), interleaved per point so
//! decoding can stream. An empty byte sequence decodes to an empty point list.
//! Omitted columns decode to 0.

use crate::stroke::{PointMask, StrokePoint};

/// Size of the header (mask byte + point count)
pub const HEADER_LEN: usize = 5;

/// Default ceiling for an encoded payload (2 MiB, a common single-row blob limit)
pub const DEFAULT_MAX_PAYLOAD: usize = 2 * 1024 * 1024;

/// Codec error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Encoded payload would exceed the configured ceiling
    #[error("encoded stroke payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Header carries bits outside the known channel set
    #[error("unknown channel flags in header: {0:#04x}")]
    UnknownFlags(u8),

    /// Buffer ends before the declared number of points
    #[error("payload truncated: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    /// Buffer continues past the declared number of points
    #[error("payload has {0} trailing bytes")]
    TrailingBytes(usize),

    /// More points than the count field can express
    #[error("too many points to encode: {0}")]
    TooManyPoints(usize),
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Mask of the optional channels in use for `points`
pub fn point_mask(points: &[StrokePoint]) -> PointMask {
    PointMask::of_points(points)
}

/// Bytes per encoded point for a given mask
pub fn point_stride(mask: PointMask) -> usize {
    let mut stride = 8;
    if mask.contains(PointMask::PRESSURE) {
        stride += 4;
    }
    if mask.contains(PointMask::TILT_X) {
        stride += 4;
    }
    if mask.contains(PointMask::TILT_Y) {
        stride += 4;
    }
    stride
}

/// Size in bytes of the encoding of `count` points with `mask`
pub fn encoded_len(count: usize, mask: PointMask) -> usize {
    HEADER_LEN + count * point_stride(mask)
}

/// Encode points using the minimal mask and the default payload ceiling
pub fn encode(points: &[StrokePoint]) -> CodecResult<Vec<u8>> {
    encode_with_limit(points, DEFAULT_MAX_PAYLOAD)
}

/// Encode points using the minimal mask and an explicit payload ceiling
pub fn encode_with_limit(points: &[StrokePoint], limit: usize) -> CodecResult<Vec<u8>> {
    encode_with_mask(points, point_mask(points), limit)
}

/// Encode points with an explicit mask
///
/// Channels set in `mask` are written even when every value is 0. Channels not
/// set are dropped, so callers passing a narrower mask than
/// [`point_mask`] lose data by request.
pub fn encode_with_mask(points: &[StrokePoint], mask: PointMask, limit: usize) -> CodecResult<Vec<u8>> {
    let count = u32::try_from(points.len()).map_err(|_| CodecError::TooManyPoints(points.len()))?;
    let size = encoded_len(points.len(), mask);
    if size > limit {
        return Err(CodecError::PayloadTooLarge { size, limit });
    }

    let mut out = Vec::with_capacity(size);
    out.push(mask.bits());
    out.extend_from_slice(&count.to_le_bytes());
    for p in points {
        out.extend_from_slice(&p.x.to_le_bytes());
        out.extend_from_slice(&p.y.to_le_bytes());
        if mask.contains(PointMask::PRESSURE) {
            out.extend_from_slice(&p.pressure.to_le_bytes());
        }
        if mask.contains(PointMask::TILT_X) {
            out.extend_from_slice(&p.tilt_x.to_le_bytes());
        }
        if mask.contains(PointMask::TILT_Y) {
            out.extend_from_slice(&p.tilt_y.to_le_bytes());
        }
    }
    debug_assert_eq!(out.len(), size);
    Ok(out)
}

/// Decode a payload produced by [`encode`]
///
/// An empty slice decodes to an empty list.
pub fn decode(bytes: &[u8]) -> CodecResult<Vec<StrokePoint>> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::Truncated {
            expected: HEADER_LEN,
            found: bytes.len(),
        });
    }

    let mask = PointMask::from_bits(bytes[0]).ok_or(CodecError::UnknownFlags(bytes[0]))?;
    let count = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
    let expected = encoded_len(count, mask);
    if bytes.len() < expected {
        return Err(CodecError::Truncated {
            expected,
            found: bytes.len(),
        });
    }
    if bytes.len() > expected {
        return Err(CodecError::TrailingBytes(bytes.len() - expected));
    }

    let mut reader = Reader {
        bytes,
        pos: HEADER_LEN,
    };
    let mut points = Vec::with_capacity(count);
    for _ in 0..count {
        let x = f32::from_le_bytes(reader.take4());
        let y = f32::from_le_bytes(reader.take4());
        let pressure = if mask.contains(PointMask::PRESSURE) {
            f32::from_le_bytes(reader.take4())
        } else {
            0.0
        };
        let tilt_x = if mask.contains(PointMask::TILT_X) {
            i32::from_le_bytes(reader.take4())
        } else {
            0
        };
        let tilt_y = if mask.contains(PointMask::TILT_Y) {
            i32::from_le_bytes(reader.take4())
        } else {
            0
        };
        points.push(StrokePoint {
            x,
            y,
            pressure,
            tilt_x,
            tilt_y,
        });
    }
    Ok(points)
}

/// Decode an optional payload; `None` behaves like an empty slice
pub fn decode_opt(bytes: Option<&[u8]>) -> CodecResult<Vec<StrokePoint>> {
    decode(bytes.unwrap_or_default())
}

// Length is validated up front, so reads never run past the end.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take4(&mut self) -> [u8; 4] {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.bytes[self.pos..self.pos + 4]);
        self.pos += 4;
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xy_only_points_have_zero_header() {
        let points = vec![
            StrokePoint::new(1.0, 2.0),
            StrokePoint::new(3.5, -4.0),
            StrokePoint::new(100.25, 7.0),
        ];
        let bytes = encode(&points).unwrap();
        assert_eq!(bytes[0], 0x00);
        assert_eq!(&bytes[1..5], &3u32.to_le_bytes());
        assert_eq!(bytes.len(), HEADER_LEN + 3 * 8);

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, points);
        for p in decoded {
            assert_eq!(p.pressure, 0.0);
            assert_eq!(p.tilt_x, 0);
            assert_eq!(p.tilt_y, 0);
        }
    }

    #[test]
    fn test_column_order_is_pressure_tiltx_tilty() {
        let points = vec![StrokePoint::new(1.0, 2.0)
            .with_pressure(0.5)
            .with_tilt(-3, 9)];
        let bytes = encode(&points).unwrap();
        assert_eq!(bytes[0], 0b111);
        assert_eq!(&bytes[5..9], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[9..13], &2.0f32.to_le_bytes());
        assert_eq!(&bytes[13..17], &0.5f32.to_le_bytes());
        assert_eq!(&bytes[17..21], &(-3i32).to_le_bytes());
        assert_eq!(&bytes[21..25], &9i32.to_le_bytes());
    }

    #[test]
    fn test_only_tilt_y_column() {
        let points = vec![StrokePoint::new(0.0, 0.0), StrokePoint::new(1.0, 1.0).with_tilt(0, 12)];
        let bytes = encode(&points).unwrap();
        assert_eq!(bytes[0], 0b100);
        assert_eq!(bytes.len(), HEADER_LEN + 2 * 12);
        assert_eq!(decode(&bytes).unwrap(), points);
    }

    #[test]
    fn test_empty_input() {
        assert!(decode(&[]).unwrap().is_empty());
        assert!(decode_opt(None).unwrap().is_empty());

        let bytes = encode(&[]).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0, 0]);
        assert!(decode(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_oversize_is_distinguishable() {
        let points = vec![StrokePoint::new(1.0, 1.0); 100];
        let err = encode_with_limit(&points, 64).unwrap_err();
        assert_eq!(
            err,
            CodecError::PayloadTooLarge {
                size: HEADER_LEN + 800,
                limit: 64
            }
        );
    }

    #[test]
    fn test_truncated_and_trailing() {
        let points = vec![StrokePoint::new(1.0, 1.0); 2];
        let mut bytes = encode(&points).unwrap();

        assert!(matches!(
            decode(&bytes[..bytes.len() - 1]),
            Err(CodecError::Truncated { .. })
        ));
        assert!(matches!(decode(&bytes[..3]), Err(CodecError::Truncated { .. })));

        bytes.push(0);
        assert_eq!(decode(&bytes), Err(CodecError::TrailingBytes(1)));
    }

    #[test]
    fn test_unknown_flags_rejected() {
        let bytes = [0x08, 0, 0, 0, 0];
        assert_eq!(decode(&bytes), Err(CodecError::UnknownFlags(0x08)));
    }

    #[test]
    fn test_forced_mask_writes_zero_columns() {
        let points = vec![StrokePoint::new(1.0, 1.0)];
        let bytes = encode_with_mask(&points, PointMask::PRESSURE, DEFAULT_MAX_PAYLOAD).unwrap();
        assert_eq!(bytes[0], 0b001);
        assert_eq!(bytes.len(), HEADER_LEN + 12);
        assert_eq!(decode(&bytes).unwrap(), points);
    }
}
