//! Property-based tests for allowed-response masks and event decoding.

use evt_response::{decode_event, AllowedResponses, EvtError, Response};
use proptest::prelude::*;

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(500))]

    /// Encoding a set of distinct buttons sets exactly one bit per button, at n - 1.
    #[test]
    fn prop_mask_has_one_bit_per_button(
        buttons in proptest::sample::subsequence((1u8..=8).collect::<Vec<_>>(), 1..=8),
        shuffle in any::<bool>(),
    ) {
        let mut listed = buttons.clone();
        if shuffle {
            listed.reverse();
        }
        let text = listed.iter().map(|b| b.to_string()).collect::<Vec<_>>().join(";");
        let allowed = AllowedResponses::parse(&text).unwrap();

        prop_assert_eq!(allowed.mask().count_ones() as usize, buttons.len());
        for b in &buttons {
            prop_assert!(allowed.mask() & (1 << (b - 1)) != 0);
        }
        let expected = buttons.iter().fold(0u8, |m, b| m | 1 << (b - 1));
        prop_assert_eq!(allowed.mask(), expected);
    }

    /// A single-bit mask at position k decodes to button k + 1.
    #[test]
    fn prop_single_bit_decodes(k in 0u32..8) {
        prop_assert_eq!(decode_event(1 << k).unwrap(), Response::Button(k as u8 + 1));
    }

    /// Any mask with two or more bits set is rejected.
    #[test]
    fn prop_multi_bit_rejected(mask in any::<u8>().prop_filter("2+ bits", |m| m.count_ones() >= 2)) {
        let rejected = matches!(
            decode_event(mask as i32),
            Err(EvtError::MultipleButtonsPressed { mask: m }) if m == mask
        );
        prop_assert!(rejected);
    }

    /// The decoded button of an allowed single press is always in the allowed set.
    #[test]
    fn prop_allowed_press_decodes_into_set(
        buttons in proptest::sample::subsequence((1u8..=8).collect::<Vec<_>>(), 1..=8),
        pick in any::<prop::sample::Index>(),
    ) {
        let allowed = AllowedResponses::from_buttons(buttons.clone()).unwrap();
        let pressed = buttons[pick.index(buttons.len())];
        let raw = (1u8 << (pressed - 1)) & allowed.mask();
        let decoded = decode_event(raw as i32).unwrap();
        prop_assert_eq!(decoded.button(), Some(pressed));
        prop_assert!(allowed.contains(pressed));
    }

    /// Numbers outside 1..=8 never encode.
    #[test]
    fn prop_out_of_range_rejected(n in prop_oneof![Just(0u32), 9u32..1000]) {
        let is_invalid = matches!(
            AllowedResponses::parse(&n.to_string()),
            Err(EvtError::InvalidConfiguration(_))
        );
        prop_assert!(is_invalid);
    }
}
