//! Property-based tests using proptest
//!
//! Invariants of the wire codec and key derivation over random inputs.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use phantom_station::core::keys::{derive_keys, SharedSecret};
use phantom_station::core::wire::{WireMessage, MIN_MESSAGE_LEN};
use phantom_station::core::{ClientToStation, RegistrationFlags};
use phantom_station::StationError;
use proptest::prelude::*;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

fn phantom_strategy() -> impl Strategy<Value = IpAddr> {
    prop_oneof![
        any::<u32>()
            .prop_filter("non-zero", |v| *v != 0)
            .prop_map(|v| IpAddr::V4(Ipv4Addr::from(v))),
        any::<u128>()
            .prop_filter("routable v6", |v| {
                let addr = Ipv6Addr::from(*v);
                // Mapped and unspecified forms canonicalise to something else
                !addr.is_unspecified() && addr.to_ipv4_mapped().is_none()
            })
            .prop_map(|v| IpAddr::V6(Ipv6Addr::from(v))),
    ]
}

// Property: the same secret always derives the same keys
proptest! {
    #[test]
    fn prop_derivation_deterministic(secret in prop::array::uniform32(any::<u8>())) {
        let a = derive_keys(&secret).expect("32-byte secret");
        let b = derive_keys(&secret).expect("32-byte secret");
        prop_assert_eq!(a, b);
    }
}

// Property: any buffer below the minimum is ShortMessage, never a panic
proptest! {
    #[test]
    fn prop_short_buffers_rejected(data in prop::collection::vec(any::<u8>(), 0..MIN_MESSAGE_LEN)) {
        let result = WireMessage::decode(&data);
        let is_short = matches!(result, Err(StationError::ShortMessage { .. }));
        prop_assert!(is_short);
    }
}

// Property: arbitrary input never panics the decoder
proptest! {
    #[test]
    fn prop_decode_total(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = WireMessage::decode(&data);
    }
}

// Property: decode(encode(m)) == m for well-formed messages
proptest! {
    #[test]
    fn prop_wire_roundtrip(
        secret in prop::array::uniform32(any::<u8>()),
        phantom in phantom_strategy(),
        port in any::<u16>(),
        flags in any::<u8>(),
        covert in "[a-z]{1,20}\\.example:[0-9]{2,5}",
        transport in prop::option::of(0u32..4),
        padding in prop::option::of(prop::collection::vec(any::<u8>(), 0..256)),
    ) {
        let msg = WireMessage::new(
            SharedSecret::new(secret),
            phantom,
            Some(port),
            RegistrationFlags::from_wire(flags),
            ClientToStation {
                covert_address: Some(covert),
                transport,
                padding,
                ..Default::default()
            },
        );

        let bytes = msg.encode().expect("encode");
        let decoded = WireMessage::decode(&bytes).expect("decode");
        prop_assert_eq!(decoded, msg);
    }
}
