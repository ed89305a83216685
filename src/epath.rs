//! EPATH (CIP Request Path) encoder for dotted symbolic tag references.
//!
//! Converts strings like `Motor.Speed[3,2]` into the logical + extended
//! symbolic segment bytes a Message Router expects, keeping the whole
//! path word-aligned as CIP requires.

use crate::codec::{pack_dint, pack_uint, pack_usint};
use crate::consts::segment::{
    ELEMENT_ID_16_BIT as ELEMENT_ID_16, ELEMENT_ID_32_BIT as ELEMENT_ID_32,
    ELEMENT_ID_8_BIT as ELEMENT_ID_8, EXTENDED_SYMBOLIC as EXTENDED_SYMBOL, PADDING as PAD,
};
use crate::error::{CipError, CipResult};

/// Encode `tag` (e.g. `"Motor.Speed[3,2]"`) into a CIP Request Path.
///
/// When `multi_requests` is set, the returned bytes are prefixed with a
/// single Path Size byte counting 16-bit words, as required when the path
/// is embedded inside a Multiple Service Packet request.
pub fn create_tag_rp(tag: &str, multi_requests: bool) -> CipResult<Vec<u8>> {
    if tag.is_empty() {
        return Err(CipError::encoding("empty tag path"));
    }

    let mut rp = Vec::new();
    for segment in tag.split('.') {
        encode_segment(segment, &mut rp)?;
    }

    if multi_requests {
        if rp.len() % 2 != 0 {
            return Err(CipError::encoding("request path is not word-aligned"));
        }
        let word_count: u8 = (rp.len() / 2)
            .try_into()
            .map_err(|_| CipError::encoding("request path too long for multi-service framing"))?;
        let mut framed = Vec::with_capacity(rp.len() + 1);
        framed.push(word_count);
        framed.extend_from_slice(&rp);
        Ok(framed)
    } else {
        Ok(rp)
    }
}

fn encode_segment(segment: &str, out: &mut Vec<u8>) -> CipResult<()> {
    let (name, indices) = split_indices(segment)?;
    if name.is_empty() {
        return Err(CipError::encoding("empty tag segment name"));
    }

    let name_bytes = name.as_bytes();
    let len: u8 = name_bytes
        .len()
        .try_into()
        .map_err(|_| CipError::encoding(format!("tag segment '{name}' too long")))?;

    out.push(EXTENDED_SYMBOL);
    out.push(len);
    out.extend_from_slice(name_bytes);
    if name_bytes.len() % 2 != 0 {
        out.push(PAD);
    }

    for index in indices {
        encode_index(index, out)?;
    }
    Ok(())
}

/// Split `"Name[1,2]"` into `("Name", [1, 2])`; a segment with no bracket
/// returns an empty index list.
fn split_indices(segment: &str) -> CipResult<(&str, Vec<u64>)> {
    let Some(open) = segment.find('[') else {
        return Ok((segment, Vec::new()));
    };
    let close = segment
        .rfind(']')
        .ok_or_else(|| CipError::encoding(format!("unterminated index in '{segment}'")))?;
    if close < open {
        return Err(CipError::encoding(format!("malformed index in '{segment}'")));
    }

    let name = &segment[..open];
    let inside = &segment[open + 1..close];
    let mut indices = Vec::new();
    for part in inside.split(',') {
        let value: u64 = part
            .trim()
            .parse()
            .map_err(|_| CipError::encoding(format!("invalid array index '{part}'")))?;
        indices.push(value);
    }
    Ok((name, indices))
}

fn encode_index(value: u64, out: &mut Vec<u8>) -> CipResult<()> {
    if value <= 0xFF {
        out.push(ELEMENT_ID_8);
        out.extend_from_slice(&pack_usint(value as u8));
    } else if value <= 0xFFFF {
        out.push(ELEMENT_ID_16);
        out.push(PAD);
        out.extend_from_slice(&pack_uint(value as u16));
    } else if value <= 0xFFFF_FFFF {
        out.push(ELEMENT_ID_32);
        out.push(PAD);
        out.extend_from_slice(&pack_dint(value as i32));
    } else {
        return Err(CipError::encoding(format!(
            "array index {value} exceeds 32-bit element id range"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_dotted_path() {
        let rp = create_tag_rp("Motor.Speed", false).unwrap();
        let expected = [
            0x91, 0x05, b'M', b'o', b't', b'o', b'r', 0x00, 0x91, 0x05, b'S', b'p', b'e', b'e',
            b'd', 0x00,
        ];
        assert_eq!(rp, expected);
    }

    #[test]
    fn array_index_8_bit() {
        let rp = create_tag_rp("Array[3,2]", false).unwrap();
        let expected = [
            0x91, 0x05, b'A', b'r', b'r', b'a', b'y', 0x00, 0x28, 0x03, 0x28, 0x02,
        ];
        assert_eq!(rp, expected);
    }

    #[test]
    fn wide_index_16_bit() {
        let rp = create_tag_rp("A[1000]", false).unwrap();
        let expected = [0x91, 0x01, b'A', 0x00, 0x29, 0x00, 0xE8, 0x03];
        assert_eq!(rp, expected);
    }

    #[test]
    fn multi_request_framing_prefixes_word_count() {
        let rp = create_tag_rp("A[1000]", true).unwrap();
        assert_eq!(rp[0], 4); // 8 bytes of path == 4 words
        assert_eq!(&rp[1..], &create_tag_rp("A[1000]", false).unwrap()[..]);
    }

    #[test]
    fn always_word_aligned() {
        for name in ["A", "AB", "ABC", "Motor", "Speed1"] {
            let rp = create_tag_rp(name, false).unwrap();
            assert_eq!(rp.len() % 2, 0, "{name} produced odd-length path");
        }
    }

    #[test]
    fn rejects_empty_path() {
        assert!(create_tag_rp("", false).is_err());
    }

    #[test]
    fn accepts_32_bit_boundary_and_rejects_beyond() {
        assert!(create_tag_rp("A[4294967295]", false).is_ok());
        assert!(create_tag_rp("A[4294967296]", false).is_err());
    }

    #[test]
    fn rejects_malformed_bracket() {
        assert!(create_tag_rp("A[1,2", false).is_err());
    }
}
