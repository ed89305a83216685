//! Property-based coverage for the byte codec and EPATH encoder, mirroring
//! the invariants in spec §8: codec round-trips across the full width
//! range, and EPATH output is always word-aligned regardless of the tag
//! name or index list fed in.

use enip_cip_core::codec::{pack_dint, pack_udint, pack_uint, unpack_dint, unpack_udint, unpack_uint};
use enip_cip_core::create_tag_rp;
use proptest::prelude::*;

proptest! {
    #[test]
    fn uint_round_trips(v in any::<u16>()) {
        prop_assert_eq!(unpack_uint(&pack_uint(v)).unwrap(), v);
    }

    #[test]
    fn udint_round_trips(v in any::<u32>()) {
        prop_assert_eq!(unpack_udint(&pack_udint(v)).unwrap(), v);
    }

    #[test]
    fn dint_round_trips(v in any::<i32>()) {
        prop_assert_eq!(unpack_dint(&pack_dint(v)).unwrap(), v);
    }

    #[test]
    fn epath_is_always_word_aligned(
        name in "[A-Za-z][A-Za-z0-9_]{0,30}",
        indices in prop::collection::vec(0u64..0xFFFF_FFFFu64, 0..4),
    ) {
        let segment = if indices.is_empty() {
            name.clone()
        } else {
            let list = indices
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(",");
            format!("{name}[{list}]")
        };
        let rp = create_tag_rp(&segment, false).unwrap();
        prop_assert_eq!(rp.len() % 2, 0);
    }

    #[test]
    fn epath_dotted_path_is_always_word_aligned(
        names in prop::collection::vec("[A-Za-z][A-Za-z0-9_]{0,20}", 1..5),
    ) {
        let tag = names.join(".");
        let rp = create_tag_rp(&tag, false).unwrap();
        prop_assert_eq!(rp.len() % 2, 0);
    }

    #[test]
    fn epath_multi_service_framing_always_even_body(
        name in "[A-Za-z][A-Za-z0-9_]{0,30}",
    ) {
        let rp = create_tag_rp(&name, true).unwrap();
        // One Path Size byte, then a word-aligned body.
        prop_assert_eq!((rp.len() - 1) % 2, 0);
        prop_assert_eq!(rp[0] as usize, (rp.len() - 1) / 2);
    }
}
