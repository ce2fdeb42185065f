//! 结构化地址与 `ws://host:port` 原生地址之间的双向编解码。
//!
//! # 教案级注释
//!
//! ## 契约（What）
//! - [`to_native`]：`<网络层>/tcp/<port>/(ws|wss)[/p2p/<id>]` → [`WsAddr`]；
//!   组件顺序不符或出现未知组件时返回 [`CodecError::Unsupported`]；
//! - [`from_native`]：[`WsAddr`] → 结构化地址；IPv4 字面量映射为 `ip4`，IPv6 字面量映射为 `ip6`，
//!   其余主机名映射为 `dns4`（不做解析）；
//! - 对可直接拨号的地址，`from_native(to_native(a))` 与 `a` 去掉身份后缀后的部分逐组件相等。
//!
//! ## 注意事项（Trade-offs）
//! - 名称统一映射为 `dns4` 是有损的：`/dns6/x/tcp/1/ws` 转为原生地址再转回会变成 `dns4`；
//!   可拨号地址只含 IP 字面量，不受影响。

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use spark_multiaddr::protocol::{
    P_DNS, P_DNS4, P_DNS6, P_DNSADDR, P_IP4, P_IP6, P_P2P, P_TCP, P_WS,
};
use spark_multiaddr::{CodecError, Multiaddr, NetAddr, NetCodec, ProtocolRegistry};

use crate::protocol::{P_WSS, WS_NETWORK, WSS_NETWORK};

/// 原生地址中的主机部分。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Host {
    Ip(IpAddr),
    Name(String),
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip(IpAddr::V6(ip)) => write!(f, "[{ip}]"),
            Self::Ip(IpAddr::V4(ip)) => write!(f, "{ip}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// WebSocket 原生地址：`ws://host:port` 或 `wss://host:port`。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WsAddr {
    pub secure: bool,
    pub host: Host,
    pub port: u16,
}

impl WsAddr {
    pub fn new(secure: bool, host: Host, port: u16) -> Self {
        Self { secure, host, port }
    }

    pub fn scheme(&self) -> &'static str {
        if self.secure { "wss" } else { "ws" }
    }

    /// 对应的原生网络名。
    pub fn network(&self) -> &'static str {
        if self.secure { WSS_NETWORK } else { WS_NETWORK }
    }

    /// `host:port` 部分，可直接交给套接字层。
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn to_net_addr(&self) -> NetAddr {
        NetAddr::new(self.network(), self.to_string())
    }
}

impl fmt::Display for WsAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme(), self.host, self.port)
    }
}

impl FromStr for WsAddr {
    type Err = CodecError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = input
            .split_once("://")
            .ok_or_else(|| CodecError::parse(input, "missing `scheme://`"))?;
        let secure = match scheme {
            "ws" => false,
            "wss" => true,
            other => {
                return Err(CodecError::parse(
                    input,
                    format!("unsupported scheme `{other}`"),
                ));
            }
        };
        let authority = rest.strip_suffix('/').unwrap_or(rest);
        if authority.contains('/') {
            return Err(CodecError::parse(input, "paths are not supported"));
        }
        let (host, port) = split_authority(input, authority)?;
        let port = port
            .parse::<u16>()
            .map_err(|err| CodecError::parse(input, format!("invalid port: {err}")))?;
        Ok(Self::new(secure, parse_host(input, host)?, port))
    }
}

fn split_authority<'a>(input: &str, authority: &'a str) -> Result<(&'a str, &'a str), CodecError> {
    if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, rest) = bracketed
            .split_once(']')
            .ok_or_else(|| CodecError::parse(input, "unterminated `[` in host"))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| CodecError::parse(input, "missing port"))?;
        return Ok((host, port));
    }
    let (host, port) = authority
        .rsplit_once(':')
        .ok_or_else(|| CodecError::parse(input, "missing port"))?;
    if host.contains(':') {
        return Err(CodecError::parse(input, "IPv6 hosts must be bracketed"));
    }
    Ok((host, port))
}

fn parse_host(input: &str, host: &str) -> Result<Host, CodecError> {
    if host.is_empty() {
        return Err(CodecError::parse(input, "empty host"));
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(Host::Ip(ip));
    }
    if host.contains(':') {
        return Err(CodecError::parse(input, "invalid IPv6 literal"));
    }
    Ok(Host::Name(host.to_owned()))
}

/// 结构化地址 → 原生地址。
pub fn to_native(addr: &Multiaddr) -> Result<WsAddr, CodecError> {
    let mut components = addr.components();
    if let [rest @ .., last] = components
        && last.code() == P_P2P
    {
        components = rest;
    }
    let [network, transport, scheme] = components else {
        return Err(CodecError::unsupported(
            addr,
            "expected `<network>/tcp/<port>/(ws|wss)`",
        ));
    };
    let secure = match scheme.code() {
        P_WS => false,
        P_WSS => true,
        _ => return Err(CodecError::unsupported(addr, "missing ws or wss scheme marker")),
    };
    if transport.code() != P_TCP {
        return Err(CodecError::unsupported(addr, "transport layer must be tcp"));
    }
    let port = <[u8; 2]>::try_from(transport.value())
        .map(u16::from_be_bytes)
        .map_err(|_| CodecError::unsupported(addr, "malformed tcp port"))?;
    let host = match network.code() {
        P_IP4 | P_IP6 => {
            let text = network
                .value_string()
                .ok_or_else(|| CodecError::unsupported(addr, "malformed ip value"))?;
            let ip = text
                .parse::<IpAddr>()
                .map_err(|_| CodecError::unsupported(addr, "malformed ip value"))?;
            Host::Ip(ip)
        }
        P_DNS | P_DNS4 | P_DNS6 | P_DNSADDR => Host::Name(
            network
                .value_string()
                .ok_or_else(|| CodecError::unsupported(addr, "malformed name value"))?,
        ),
        _ => {
            return Err(CodecError::unsupported(
                addr,
                format!("unsupported network layer `{}`", network.name()),
            ));
        }
    };
    Ok(WsAddr::new(secure, host, port))
}

/// 原生地址 → 结构化地址。`registry` 必须已登记 `wss`。
pub fn from_native(registry: &ProtocolRegistry, addr: &WsAddr) -> Result<Multiaddr, CodecError> {
    let build = |name: &str, value: &str| {
        registry
            .component(name, value)
            .map_err(|err| CodecError::parse(addr.to_string(), err.to_string()))
    };
    let network = match &addr.host {
        Host::Ip(IpAddr::V4(ip)) => build("ip4", &ip.to_string())?,
        Host::Ip(IpAddr::V6(ip)) => build("ip6", &ip.to_string())?,
        Host::Name(name) => build("dns4", name)?,
    };
    let port = build("tcp", &addr.port.to_string())?;
    let scheme = build(addr.scheme(), "")?;
    Ok(Multiaddr::from_components(vec![network, port, scheme]))
}

/// 解析 `ws://host:port` 文本并转换为结构化地址。
pub fn parse_native(registry: &ProtocolRegistry, input: &str) -> Result<Multiaddr, CodecError> {
    from_native(registry, &input.parse()?)
}

fn convert_ws(addr: &Multiaddr) -> Result<NetAddr, CodecError> {
    to_native(addr).map(|native| native.to_net_addr())
}

fn parse_ws(addr: &NetAddr, registry: &ProtocolRegistry) -> Result<Multiaddr, CodecError> {
    let native: WsAddr = addr.address().parse()?;
    if native.network() != addr.network() {
        return Err(CodecError::parse(
            addr.address(),
            format!("scheme does not belong to network `{}`", addr.network()),
        ));
    }
    from_native(registry, &native)
}

/// `"websocket"` 网络的编解码条目。
pub const WS_CODEC: NetCodec = NetCodec {
    networks: &[WS_NETWORK],
    protocol_name: "ws",
    convert: convert_ws,
    parse: parse_ws,
};

/// `"websocket secure"` 网络的编解码条目。
pub const WSS_CODEC: NetCodec = NetCodec {
    networks: &[WSS_NETWORK],
    protocol_name: "wss",
    convert: convert_ws,
    parse: parse_ws,
};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use spark_multiaddr::{NetCodecBuilder, NetCodecRegistry, RegistryBuilder};

    use super::*;
    use crate::protocol::{register_codecs, register_protocols};

    fn codecs() -> Arc<NetCodecRegistry> {
        let mut protocols = RegistryBuilder::with_standard_protocols();
        register_protocols(&mut protocols).expect("protocols");
        let mut codecs = NetCodecBuilder::with_standard_codecs();
        register_codecs(&mut codecs).expect("codecs");
        codecs.freeze(protocols.freeze())
    }

    #[test]
    fn converts_literal_addresses() {
        let codecs = codecs();
        let addr = codecs
            .protocols()
            .parse_str("/ip4/198.51.100.1/tcp/443/wss/p2p/QmPeer")
            .expect("parse");
        let native = to_native(&addr).expect("to_native");
        assert_eq!(native.to_string(), "wss://198.51.100.1:443");
        assert_eq!(
            from_native(codecs.protocols(), &native).expect("from_native"),
            addr.decapsulate(P_P2P)
        );
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let native: WsAddr = "ws://[::1]:8080".parse().expect("parse");
        assert_eq!(native.host, Host::Ip("::1".parse().expect("ip")));
        assert_eq!(native.to_string(), "ws://[::1]:8080");
        assert!("ws://::1:8080".parse::<WsAddr>().is_err());
    }

    #[test]
    fn names_become_dns4() {
        let codecs = codecs();
        let addr = parse_native(codecs.protocols(), "ws://example.invalid:80").expect("parse");
        assert_eq!(addr.to_string(), "/dns4/example.invalid/tcp/80/ws");
    }

    #[test]
    fn malformed_native_addresses_are_parse_errors() {
        for input in [
            "ws://example.com",
            "http://example.com:80",
            "ws://:80",
            "ws://example.com:99999",
            "ws://example.com:80/path",
            "example.com:80",
        ] {
            assert!(
                matches!(input.parse::<WsAddr>(), Err(CodecError::Parse { .. })),
                "{input} should fail"
            );
        }
    }

    #[test]
    fn wrong_shapes_are_unsupported() {
        let codecs = codecs();
        for text in [
            "/ip4/1.2.3.4/tcp/80",
            "/ip4/1.2.3.4/ws/tcp/80",
            "/ip4/1.2.3.4/tcp/80/ws/ws",
            "/p2p/QmPeer",
        ] {
            let addr = codecs.protocols().parse_str(text).expect("parse");
            assert!(
                matches!(to_native(&addr), Err(CodecError::Unsupported { .. })),
                "{text} should be unsupported"
            );
        }
    }

    #[test]
    fn registry_dispatches_by_network_and_protocol() {
        let codecs = codecs();
        let addr = codecs
            .protocols()
            .parse_str("/ip4/10.0.0.1/tcp/9000/ws")
            .expect("parse");
        let native = codecs.to_net_addr(&addr).expect("to_net_addr");
        assert_eq!(native, NetAddr::new("websocket", "ws://10.0.0.1:9000"));
        assert_eq!(codecs.from_net_addr(&native).expect("from_net_addr"), addr);

        let mismatched = NetAddr::new("websocket secure", "ws://10.0.0.1:9000");
        assert!(codecs.from_net_addr(&mismatched).is_err());
    }
}
