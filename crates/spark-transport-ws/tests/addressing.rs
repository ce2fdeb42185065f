//! 地址编解码、协议登记与配置装配的集成测试。

mod common;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

use common::{PassthroughUpgrader, addr};
use proptest::prelude::*;
use spark_multiaddr::{NetAddr, NetCodecBuilder, RegistryBuilder};
use spark_transport::Transport;
use spark_transport_ws::{
    ConfigIssue, Host, P_WSS, TransportConfig, TransportSettings, WS_FMT, WsAddr, WsTransport,
    from_native, parse_native, to_native,
};

fn host_strategy() -> impl Strategy<Value = Host> {
    prop_oneof![
        any::<[u8; 4]>().prop_map(|octets| Host::Ip(IpAddr::V4(Ipv4Addr::from(octets)))),
        any::<[u8; 16]>().prop_map(|octets| Host::Ip(IpAddr::V6(Ipv6Addr::from(octets)))),
        "[a-z][a-z0-9]{0,10}(\\.[a-z][a-z0-9]{0,6}){0,2}".prop_map(Host::Name),
    ]
}

proptest! {
    /// 原生地址 → 结构化地址 → 原生地址保持不变；文本形态也可往返。
    #[test]
    fn native_addresses_survive_structured_form(
        secure in any::<bool>(),
        host in host_strategy(),
        port in any::<u16>(),
    ) {
        let codecs = common::codecs();
        let native = WsAddr::new(secure, host, port);
        let structured = from_native(codecs.protocols(), &native).expect("from native");
        prop_assert!(WS_FMT.matches(&structured));
        prop_assert_eq!(to_native(&structured).expect("to native"), native.clone());

        let reparsed: WsAddr = native.to_string().parse().expect("parse text");
        prop_assert_eq!(reparsed, native);
    }
}

#[test]
fn named_native_address_is_understood_but_not_dialable() {
    let codecs = common::codecs();
    let structured = parse_native(codecs.protocols(), "ws://example.invalid:80").expect("parse");
    assert_eq!(structured.to_string(), "/dns4/example.invalid/tcp/80/ws");

    let transport = common::transport(PassthroughUpgrader::new(), TransportConfig::default());
    assert!(WS_FMT.matches(&structured));
    assert!(!transport.can_dial(&structured));
}

#[test]
fn codec_registry_round_trips_through_network_names() {
    let codecs = common::codecs();
    let secure = addr("/ip6/::1/tcp/4443/wss");
    let native = codecs.to_net_addr(&secure).expect("to net addr");
    assert_eq!(native, NetAddr::new("websocket secure", "wss://[::1]:4443"));
    assert_eq!(codecs.from_net_addr(&native).expect("from net addr"), secure);

    let plain = codecs
        .from_net_addr(&NetAddr::new("websocket", "ws://10.0.0.1:8080"))
        .expect("plain");
    assert_eq!(plain, addr("/ip4/10.0.0.1/tcp/8080/ws"));
}

#[test]
fn transport_reports_fixed_protocols_and_no_proxy() {
    let transport = common::transport(PassthroughUpgrader::new(), TransportConfig::default());
    assert_eq!(transport.protocols(), &[477, 478]);
    assert_eq!(transport.protocols()[1], P_WSS);
    assert!(!transport.proxy());
}

#[test]
fn transport_requires_registered_websocket_protocols() {
    let protocols = RegistryBuilder::with_standard_protocols().freeze();
    let codecs = NetCodecBuilder::with_standard_codecs().freeze(protocols);
    let err = WsTransport::new(PassthroughUpgrader::new(), codecs, TransportConfig::default())
        .expect_err("wss is not registered");
    assert!(err.contains(&ConfigIssue::MissingProtocol {
        code: P_WSS,
        name: "wss"
    }));
    assert!(err.contains(&ConfigIssue::MissingCodec("ws")));
    assert!(err.contains(&ConfigIssue::MissingCodec("wss")));
    assert!(!err.contains(&ConfigIssue::MissingProtocol {
        code: 477,
        name: "ws"
    }));
}

#[test]
fn settings_merge_with_code_options() {
    let settings = TransportSettings::from_toml_str("handshake_timeout_ms = 750").expect("toml");
    let config = TransportConfig::builder()
        .options(settings.into_options())
        .allow_self_signed(true)
        .build()
        .expect("config");
    assert_eq!(config.handshake_timeout(), Duration::from_millis(750));
    assert!(config.tls_client_config().is_some());

    let settings = TransportSettings::from_toml_str("handshake_timeout_ms = 0").expect("toml");
    let err = TransportConfig::builder()
        .options(settings.into_options())
        .handshake_timeout(Duration::from_secs(1))
        .build()
        .expect_err("zero and duplicate");
    assert_eq!(
        err.issues,
        vec![
            ConfigIssue::ZeroHandshakeTimeout,
            ConfigIssue::DuplicateOption("handshake_timeout"),
        ]
    );
}

#[test]
fn configured_transport_exposes_its_configuration() {
    let config = TransportConfig::builder()
        .handshake_timeout(Duration::from_secs(2))
        .build()
        .expect("config");
    let codecs = common::codecs();
    let transport = WsTransport::new(PassthroughUpgrader::new(), Arc::clone(&codecs), config)
        .expect("transport");
    assert_eq!(transport.config().handshake_timeout(), Duration::from_secs(2));
    assert!(Arc::ptr_eq(transport.codecs(), &codecs));
}
