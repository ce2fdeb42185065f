//! 结构化地址的文本/二进制形态与组件操作。

use std::net::{Ipv4Addr, Ipv6Addr};

use proptest::prelude::*;
use spark_multiaddr::protocol::{P_IP4, P_P2P, P_TCP, P_WS};
use spark_multiaddr::{Multiaddr, MultiaddrError, ProtocolRegistry};

fn network() -> impl Strategy<Value = String> {
    prop_oneof![
        any::<[u8; 4]>().prop_map(|octets| format!("/ip4/{}", Ipv4Addr::from(octets))),
        any::<[u8; 16]>().prop_map(|octets| format!("/ip6/{}", Ipv6Addr::from(octets))),
        "[a-z][a-z0-9-]{0,12}\\.[a-z]{2,5}".prop_map(|name| format!("/dns4/{name}")),
    ]
}

proptest! {
    /// 文本 → 地址 → 二进制 → 地址 → 文本，组件与文本均不变。
    #[test]
    fn text_and_binary_forms_agree(
        network in network(),
        port in any::<u16>(),
        ws in any::<bool>(),
    ) {
        let registry = ProtocolRegistry::standard();
        let suffix = if ws { "/ws" } else { "" };
        let text = format!("{network}/tcp/{port}{suffix}");
        let parsed = registry.parse_str(&text).expect("text");
        let decoded = registry.parse_bytes(&parsed.to_bytes()).expect("bytes");
        prop_assert_eq!(&decoded, &parsed);
        prop_assert_eq!(decoded.to_string(), text);
    }
}

#[test]
fn components_can_be_wrapped_and_unwrapped() {
    let registry = ProtocolRegistry::standard();
    let base = registry.parse_str("/ip4/127.0.0.1/tcp/4001").expect("base");
    let peer = registry
        .parse_str("/p2p/QmYyQSo1c1Ym7orWxLYvCrM2EmxFTANf8wXmmE7DWjhx5N")
        .expect("peer");
    let ws = registry.component("ws", "").expect("ws");

    let full = base.with(ws).encapsulate(&peer);
    assert_eq!(full.protocol_codes(), vec![P_IP4, P_TCP, P_WS, P_P2P]);
    assert_eq!(
        full.to_string(),
        "/ip4/127.0.0.1/tcp/4001/ws/p2p/QmYyQSo1c1Ym7orWxLYvCrM2EmxFTANf8wXmmE7DWjhx5N"
    );
    assert_eq!(full.decapsulate(P_WS), base);
    assert_eq!(full.prefix(2), base);
    assert_eq!(full.decapsulate(53), full);
    assert_eq!(
        full.find(P_TCP).and_then(|c| c.value_string()).as_deref(),
        Some("4001")
    );
}

#[test]
fn malformed_text_is_rejected() {
    let registry = ProtocolRegistry::standard();
    assert!(matches!(
        registry.parse_str("ip4/1.2.3.4"),
        Err(MultiaddrError::MissingLeadingSlash(_))
    ));
    assert!(matches!(
        registry.parse_str("/ip4/1.2.3.4/tcp"),
        Err(MultiaddrError::MissingValue { .. })
    ));
    assert!(matches!(
        registry.parse_str("/ip4/1.2.3.4/quic-v9"),
        Err(MultiaddrError::UnknownProtocolName(_))
    ));
    assert!(matches!(
        registry.parse_str("/ip4/300.0.0.1"),
        Err(MultiaddrError::InvalidValue { .. })
    ));
    assert!(matches!(
        registry.parse_str("/tcp/99999"),
        Err(MultiaddrError::InvalidValue { .. })
    ));
}

#[test]
fn empty_address_renders_as_root() {
    let empty = Multiaddr::empty();
    assert!(empty.is_empty());
    assert_eq!(empty.to_string(), "/");
    assert!(empty.to_bytes().is_empty());
    assert_eq!(
        ProtocolRegistry::standard().parse_str("/").expect("root"),
        empty
    );
}

#[test]
fn peer_identity_binary_form_is_decoded_base58() {
    let registry = ProtocolRegistry::standard();
    let text = "/p2p/QmYyQSo1c1Ym7orWxLYvCrM2EmxFTANf8wXmmE7DWjhx5N";
    let addr = registry.parse_str(text).expect("peer");
    let bytes = addr.to_bytes();
    // varint(421) = a5 03，随后是长度 34 与 sha2-256 多重哈希头 12 20。
    assert_eq!(&bytes[..5], &[0xa5, 0x03, 34, 0x12, 0x20]);
    assert_eq!(bytes.len(), 2 + 1 + 34);
    assert_eq!(registry.parse_bytes(&bytes).expect("bytes").to_string(), text);
    assert!(matches!(
        registry.parse_str("/p2p/Qm0OIl"),
        Err(MultiaddrError::InvalidValue { .. })
    ));
}
