//! Property tests for the stroke codec round trip

use inkpage_model::codec::{decode, encode, encoded_len, point_mask};
use inkpage_model::StrokePoint;
use proptest::prelude::*;

fn point_strategy() -> impl Strategy<Value = StrokePoint> {
    (
        -1.0e6f32..1.0e6,
        -1.0e6f32..1.0e6,
        prop_oneof![Just(0.0f32), 0.0f32..4096.0],
        prop_oneof![Just(0i32), -90i32..90],
        prop_oneof![Just(0i32), -90i32..90],
    )
        .prop_map(|(x, y, pressure, tilt_x, tilt_y)| StrokePoint {
            x,
            y,
            pressure,
            tilt_x,
            tilt_y,
        })
}

proptest! {
    #[test]
    fn decode_inverts_encode(points in prop::collection::vec(point_strategy(), 0..200)) {
        let bytes = encode(&points).unwrap();
        prop_assert_eq!(decode(&bytes).unwrap(), points);
    }

    #[test]
    fn encoding_is_minimal(points in prop::collection::vec(point_strategy(), 0..50)) {
        let bytes = encode(&points).unwrap();
        let mask = point_mask(&points);
        prop_assert_eq!(bytes[0], mask.bits());
        prop_assert_eq!(bytes.len(), encoded_len(points.len(), mask));
    }
}
