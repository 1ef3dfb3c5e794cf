//! IEEE-488.2 definite-length binary block handling.
//!
//! Logging data arrives as `#<n><length digits><payload>` where `<n>` is the
//! number of decimal digits in the payload byte length. The transfer size has
//! to be known before the read is issued, so [`expected_block_size`] derives
//! it from the device-reported sample count instead of waiting on a
//! terminator (the block payload is raw bytes and carries none).

use crate::error::SweepError;
use byteorder::ByteOrder;

/// Logging samples are transferred as 4-byte floats.
pub const SAMPLE_WIDTH: usize = 4;

fn decimal_digits(mut n: usize) -> usize {
    if n == 0 {
        return 1;
    }
    let mut digits = 0;
    while n > 0 {
        digits += 1;
        n /= 10;
    }
    digits
}

/// Total transfer size in bytes for a block of `count` samples of
/// `element_width` bytes each.
///
/// The header overhead is `#` plus one digit-count digit plus the decimal
/// digits of the payload byte length, derived from the actual payload size
/// rather than a fixed constant.
pub fn expected_block_size(count: usize, element_width: usize) -> usize {
    let payload = count * element_width;
    2 + decimal_digits(payload) + payload
}

/// Encode samples into a definite-length block, used by tests and simulators.
pub fn encode_ieee_block<B: ByteOrder>(samples: &[f32]) -> Vec<u8> {
    let payload_len = samples.len() * SAMPLE_WIDTH;
    let length_field = payload_len.to_string();

    let mut block = Vec::with_capacity(2 + length_field.len() + payload_len);
    block.push(b'#');
    block.extend_from_slice(length_field.len().to_string().as_bytes());
    block.extend_from_slice(length_field.as_bytes());

    let mut payload = vec![0u8; payload_len];
    B::write_f32_into(samples, &mut payload);
    block.extend_from_slice(&payload);

    block
}

/// Decode a definite-length block into its samples.
///
/// The input must contain exactly the header plus the declared payload, no
/// more and no less; any mismatch is a framing error rather than a silent
/// truncation.
pub fn decode_ieee_block<B: ByteOrder>(bytes: &[u8]) -> Result<Vec<f32>, SweepError> {
    if bytes.first() != Some(&b'#') {
        return Err(SweepError::Framing(
            "block does not start with '#'".to_string(),
        ));
    }

    let digit_count = match bytes.get(1) {
        Some(c @ b'1'..=b'9') => (c - b'0') as usize,
        Some(c) => {
            return Err(SweepError::Framing(format!(
                "invalid digit count character {:?}",
                *c as char
            )));
        }
        None => return Err(SweepError::Framing("block header truncated".to_string())),
    };

    let length_field = bytes
        .get(2..2 + digit_count)
        .ok_or_else(|| SweepError::Framing("block length field truncated".to_string()))?;
    let length_str = std::str::from_utf8(length_field)
        .map_err(|_| SweepError::Framing("non-ASCII block length field".to_string()))?;
    let payload_len: usize = length_str
        .parse()
        .map_err(|_| SweepError::Framing(format!("invalid block length field {length_str:?}")))?;

    let payload = &bytes[2 + digit_count..];
    if payload.len() != payload_len {
        return Err(SweepError::Framing(format!(
            "block declares {payload_len} payload bytes but {} are present",
            payload.len()
        )));
    }
    if payload_len % SAMPLE_WIDTH != 0 {
        return Err(SweepError::Framing(format!(
            "payload length {payload_len} is not a multiple of the sample width"
        )));
    }

    let mut samples = vec![0f32; payload_len / SAMPLE_WIDTH];
    B::read_f32_into(payload, &mut samples);
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, LittleEndian};

    #[test]
    fn expected_size_matches_encoded_length() {
        for count in [1usize, 9, 10, 99, 100, 250, 1000, 500_000] {
            let samples = vec![0.5f32; count];
            let encoded = encode_ieee_block::<LittleEndian>(&samples);
            assert_eq!(
                expected_block_size(count, SAMPLE_WIDTH),
                encoded.len(),
                "count = {count}"
            );
        }
    }

    #[test]
    fn expected_size_for_100_samples() {
        // payload 400 bytes -> header "#3400"
        assert_eq!(expected_block_size(100, SAMPLE_WIDTH), 405);
    }

    #[test]
    fn expected_size_degenerate_zero_count() {
        // "#10" with an empty payload
        let encoded = encode_ieee_block::<LittleEndian>(&[]);
        assert_eq!(encoded, b"#10");
        assert_eq!(expected_block_size(0, SAMPLE_WIDTH), 3);
    }

    #[test]
    fn round_trip_preserves_samples() {
        let samples = vec![-42.5f32, 0.0, 1.25, 6.0221e23, -13.37];
        let decoded =
            decode_ieee_block::<LittleEndian>(&encode_ieee_block::<LittleEndian>(&samples))
                .unwrap();
        assert_eq!(decoded, samples);

        let decoded = decode_ieee_block::<BigEndian>(&encode_ieee_block::<BigEndian>(&samples))
            .unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn truncated_payload_is_a_framing_error() {
        let mut block = encode_ieee_block::<LittleEndian>(&[1.0, 2.0, 3.0]);
        block.truncate(block.len() - 5);
        let err = decode_ieee_block::<LittleEndian>(&block).unwrap_err();
        assert!(matches!(err, SweepError::Framing(_)));
    }

    #[test]
    fn trailing_bytes_are_a_framing_error() {
        let mut block = encode_ieee_block::<LittleEndian>(&[1.0, 2.0]);
        block.push(b'\r');
        let err = decode_ieee_block::<LittleEndian>(&block).unwrap_err();
        assert!(matches!(err, SweepError::Framing(_)));
    }

    #[test]
    fn malformed_header_is_rejected() {
        assert!(matches!(
            decode_ieee_block::<LittleEndian>(b"400 bytes follow").unwrap_err(),
            SweepError::Framing(_)
        ));
        assert!(matches!(
            decode_ieee_block::<LittleEndian>(b"#04").unwrap_err(),
            SweepError::Framing(_)
        ));
        assert!(matches!(
            decode_ieee_block::<LittleEndian>(b"#3").unwrap_err(),
            SweepError::Framing(_)
        ));
    }
}
