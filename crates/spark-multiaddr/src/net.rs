use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::error::{CodecError, MultiaddrError, RegistrationError};
use crate::multiaddr::Multiaddr;
use crate::protocol::{P_IP4, P_IP6, P_P2P, P_TCP};
use crate::registry::ProtocolRegistry;

/// 原生网络地址：`(网络名, 地址文本)`，对应套接字层的 `network` + `address` 二元组。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NetAddr {
    network: String,
    address: String,
}

impl NetAddr {
    pub fn new(network: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            address: address.into(),
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for NetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// 结构化地址 → 原生地址。
pub type ConvertFn = fn(&Multiaddr) -> Result<NetAddr, CodecError>;

/// 原生地址 → 结构化地址。
pub type ParseFn = fn(&NetAddr, &ProtocolRegistry) -> Result<Multiaddr, CodecError>;

/// 地址编解码条目。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把“某类原生网络名如何与结构化地址互转”登记为数据，而不是在核心代码里写分支；
/// - 传输在启动阶段注册自己的条目（例如 `"websocket"` / `"websocket secure"`），连接建立时按网络名查找。
///
/// ## 契约（What）
/// - `networks`：该条目负责的原生网络名集合，全表唯一；
/// - `protocol_name`：结构化地址中决定使用该条目的协议名（通常是末尾协议），全表唯一；
/// - `convert` / `parse`：一对互逆的转换函数。
#[derive(Clone, Copy)]
pub struct NetCodec {
    pub networks: &'static [&'static str],
    pub protocol_name: &'static str,
    pub convert: ConvertFn,
    pub parse: ParseFn,
}

impl fmt::Debug for NetCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetCodec")
            .field("networks", &self.networks)
            .field("protocol_name", &self.protocol_name)
            .finish()
    }
}

/// 内置 TCP 条目：`/ip4|ip6/<ip>/tcp/<port>` ⇄ `tcp4|tcp6` 套接字地址。
pub const TCP_CODEC: NetCodec = NetCodec {
    networks: &["tcp", "tcp4", "tcp6"],
    protocol_name: "tcp",
    convert: convert_tcp,
    parse: parse_tcp,
};

fn convert_tcp(addr: &Multiaddr) -> Result<NetAddr, CodecError> {
    let socket = multiaddr_to_socket_addr(addr)?;
    let network = if socket.is_ipv4() { "tcp4" } else { "tcp6" };
    Ok(NetAddr::new(network, socket.to_string()))
}

fn parse_tcp(addr: &NetAddr, registry: &ProtocolRegistry) -> Result<Multiaddr, CodecError> {
    let socket: SocketAddr = addr
        .address()
        .parse()
        .map_err(|err: std::net::AddrParseError| CodecError::parse(addr.address(), err.to_string()))?;
    socket_addr_to_multiaddr(registry, socket)
        .map_err(|err| CodecError::parse(addr.address(), err.to_string()))
}

/// 将 `/ip4|ip6/<ip>/tcp/<port>` 前缀转换为套接字地址。
///
/// 仅接受恰好两个组件，名称地址或多余组件返回 [`CodecError::Unsupported`]。
pub fn multiaddr_to_socket_addr(addr: &Multiaddr) -> Result<SocketAddr, CodecError> {
    let [network, transport] = addr.components() else {
        return Err(CodecError::unsupported(addr, "expected `<ip>/tcp/<port>`"));
    };
    let ip = ip_of(network.code(), network.value())
        .ok_or_else(|| CodecError::unsupported(addr, "network layer must be an IP literal"))?;
    if transport.code() != P_TCP {
        return Err(CodecError::unsupported(addr, "transport layer must be tcp"));
    }
    let port = port_of(transport.value())
        .ok_or_else(|| CodecError::unsupported(addr, "malformed tcp port"))?;
    Ok(SocketAddr::new(ip, port))
}

/// 套接字地址 → `/ip4|ip6/<ip>/tcp/<port>`。
pub fn socket_addr_to_multiaddr(
    registry: &ProtocolRegistry,
    addr: SocketAddr,
) -> Result<Multiaddr, MultiaddrError> {
    let network = match addr.ip() {
        IpAddr::V4(ip) => registry.component("ip4", &ip.to_string())?,
        IpAddr::V6(ip) => registry.component("ip6", &ip.to_string())?,
    };
    let port = registry.component("tcp", &addr.port().to_string())?;
    Ok(Multiaddr::from_components(vec![network, port]))
}

pub(crate) fn ip_of(code: u32, value: &[u8]) -> Option<IpAddr> {
    match code {
        P_IP4 => <[u8; 4]>::try_from(value).ok().map(IpAddr::from),
        P_IP6 => <[u8; 16]>::try_from(value).ok().map(IpAddr::from),
        _ => None,
    }
}

pub(crate) fn port_of(value: &[u8]) -> Option<u16> {
    <[u8; 2]>::try_from(value).ok().map(u16::from_be_bytes)
}

/// 启动阶段使用的地址编解码表草稿。
#[derive(Debug, Default)]
pub struct NetCodecBuilder {
    by_network: HashMap<&'static str, NetCodec>,
    by_protocol: HashMap<&'static str, NetCodec>,
}

impl NetCodecBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预装内置 TCP 条目。
    pub fn with_standard_codecs() -> Self {
        let mut builder = Self::new();
        builder.insert(TCP_CODEC);
        builder
    }

    /// 注册条目；网络名或协议名冲突时失败且不做任何修改。
    pub fn register(&mut self, codec: NetCodec) -> Result<(), RegistrationError> {
        if let Some(network) = codec
            .networks
            .iter()
            .find(|network| self.by_network.contains_key(*network))
        {
            return Err(RegistrationError::DuplicateNetwork {
                network: (*network).to_owned(),
            });
        }
        if self.by_protocol.contains_key(codec.protocol_name) {
            return Err(RegistrationError::DuplicateCodec {
                protocol: codec.protocol_name.to_owned(),
            });
        }
        self.insert(codec);
        Ok(())
    }

    /// 结束注册阶段；`protocols` 为解析时构造组件所用的协议表。
    pub fn freeze(self, protocols: Arc<ProtocolRegistry>) -> Arc<NetCodecRegistry> {
        Arc::new(NetCodecRegistry {
            protocols,
            by_network: self.by_network,
            by_protocol: self.by_protocol,
        })
    }

    fn insert(&mut self, codec: NetCodec) {
        for network in codec.networks.iter().copied() {
            self.by_network.insert(network, codec);
        }
        self.by_protocol.insert(codec.protocol_name, codec);
    }
}

/// 冻结后的地址编解码表。
#[derive(Debug)]
pub struct NetCodecRegistry {
    protocols: Arc<ProtocolRegistry>,
    by_network: HashMap<&'static str, NetCodec>,
    by_protocol: HashMap<&'static str, NetCodec>,
}

impl NetCodecRegistry {
    pub fn builder() -> NetCodecBuilder {
        NetCodecBuilder::new()
    }

    pub fn protocols(&self) -> &Arc<ProtocolRegistry> {
        &self.protocols
    }

    pub fn codec_for_network(&self, network: &str) -> Option<&NetCodec> {
        self.by_network.get(network)
    }

    pub fn codec_for_protocol(&self, protocol: &str) -> Option<&NetCodec> {
        self.by_protocol.get(protocol)
    }

    /// 结构化地址 → 原生地址。
    ///
    /// 末尾的 `p2p` 身份组件不参与选择条目；之后的最后一个协议名决定使用哪个条目。
    pub fn to_net_addr(&self, addr: &Multiaddr) -> Result<NetAddr, CodecError> {
        let last = addr
            .components()
            .iter()
            .rev()
            .find(|component| component.code() != P_P2P)
            .ok_or_else(|| CodecError::unsupported(addr, "empty address"))?;
        let codec = self
            .codec_for_protocol(last.name())
            .ok_or_else(|| CodecError::NoCodec(last.name().to_owned()))?;
        (codec.convert)(addr)
    }

    /// 原生地址 → 结构化地址，按网络名选择条目。
    pub fn from_net_addr(&self, addr: &NetAddr) -> Result<Multiaddr, CodecError> {
        let codec = self
            .codec_for_network(addr.network())
            .ok_or_else(|| CodecError::NoCodec(addr.network().to_owned()))?;
        (codec.parse)(addr, &self.protocols)
    }
}
