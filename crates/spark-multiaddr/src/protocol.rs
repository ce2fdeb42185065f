use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use crate::varint;

pub const P_IP4: u32 = 4;
pub const P_TCP: u32 = 6;
pub const P_IP6: u32 = 41;
pub const P_DNS: u32 = 53;
pub const P_DNS4: u32 = 54;
pub const P_DNS6: u32 = 55;
pub const P_DNSADDR: u32 = 56;
pub const P_P2P: u32 = 421;
pub const P_WS: u32 = 477;

/// DNS 名称的最大字节数（RFC 1035 全限定名上限）。
const MAX_DNS_NAME_LEN: usize = 255;

/// 协议值在二进制形态中的尺寸提示。
///
/// - `Zero`：标记型协议（如 `ws`），不携带值；
/// - `Fixed(bits)`：定长值，按位计数（`ip4` 为 32）；
/// - `Variable`：变长值，二进制形态以 varint 长度前缀开头。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SizeHint {
    Zero,
    Fixed(usize),
    Variable,
}

impl SizeHint {
    /// 定长协议对应的字节数。
    pub fn fixed_bytes(self) -> Option<usize> {
        match self {
            Self::Fixed(bits) => Some(bits / 8),
            _ => None,
        }
    }
}

/// 协议值的文本/二进制互转契约。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 让新协议在注册时自带取值格式，解析器只负责切分组件，不需要为每个协议写分支；
/// - 与描述符一起冻结在注册表里，运行期只读，无需加锁。
///
/// ## 契约（What）
/// - `string_to_bytes`：把文本值转为二进制值，失败时返回人类可读原因；
/// - `bytes_to_string`：逆操作，必须与 `string_to_bytes` 构成无损往返；
/// - `validate_bytes`：解析二进制形态时调用，默认实现复用 `bytes_to_string`。
///
/// ## 注意事项（Trade-offs）
/// - 失败原因以 `String` 返回，由调用方包装为 [`MultiaddrError::InvalidValue`](crate::MultiaddrError::InvalidValue)，
///   避免每个实现都引入自己的错误类型。
pub trait Transcoder: Send + Sync + fmt::Debug + 'static {
    fn string_to_bytes(&self, value: &str) -> Result<Vec<u8>, String>;

    fn bytes_to_string(&self, bytes: &[u8]) -> Result<String, String>;

    fn validate_bytes(&self, bytes: &[u8]) -> Result<(), String> {
        self.bytes_to_string(bytes).map(|_| ())
    }
}

/// `ip4` 值：点分十进制 IPv4 字面量。
#[derive(Debug, Default)]
pub struct Ipv4Transcoder;

impl Transcoder for Ipv4Transcoder {
    fn string_to_bytes(&self, value: &str) -> Result<Vec<u8>, String> {
        value
            .parse::<Ipv4Addr>()
            .map(|ip| ip.octets().to_vec())
            .map_err(|err| err.to_string())
    }

    fn bytes_to_string(&self, bytes: &[u8]) -> Result<String, String> {
        let octets: [u8; 4] = bytes
            .try_into()
            .map_err(|_| format!("expected 4 bytes, got {}", bytes.len()))?;
        Ok(Ipv4Addr::from(octets).to_string())
    }
}

/// `ip6` 值：不带方括号的 IPv6 字面量。
#[derive(Debug, Default)]
pub struct Ipv6Transcoder;

impl Transcoder for Ipv6Transcoder {
    fn string_to_bytes(&self, value: &str) -> Result<Vec<u8>, String> {
        value
            .parse::<Ipv6Addr>()
            .map(|ip| ip.octets().to_vec())
            .map_err(|err| err.to_string())
    }

    fn bytes_to_string(&self, bytes: &[u8]) -> Result<String, String> {
        let octets: [u8; 16] = bytes
            .try_into()
            .map_err(|_| format!("expected 16 bytes, got {}", bytes.len()))?;
        Ok(Ipv6Addr::from(octets).to_string())
    }
}

/// `tcp` 端口：十进制 `u16`，二进制为大端序两字节。
#[derive(Debug, Default)]
pub struct PortTranscoder;

impl Transcoder for PortTranscoder {
    fn string_to_bytes(&self, value: &str) -> Result<Vec<u8>, String> {
        value
            .parse::<u16>()
            .map(|port| port.to_be_bytes().to_vec())
            .map_err(|err| err.to_string())
    }

    fn bytes_to_string(&self, bytes: &[u8]) -> Result<String, String> {
        let raw: [u8; 2] = bytes
            .try_into()
            .map_err(|_| format!("expected 2 bytes, got {}", bytes.len()))?;
        Ok(u16::from_be_bytes(raw).to_string())
    }
}

/// `dns*` 值：原样保存的主机名，不做解析。
#[derive(Debug, Default)]
pub struct DnsTranscoder;

impl DnsTranscoder {
    fn check(name: &str) -> Result<(), String> {
        if name.is_empty() {
            return Err("empty domain name".to_owned());
        }
        if name.len() > MAX_DNS_NAME_LEN {
            return Err(format!("domain name longer than {MAX_DNS_NAME_LEN} bytes"));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| *c == '/' || c.is_whitespace() || c.is_control())
        {
            return Err(format!("illegal character {bad:?} in domain name"));
        }
        Ok(())
    }
}

impl Transcoder for DnsTranscoder {
    fn string_to_bytes(&self, value: &str) -> Result<Vec<u8>, String> {
        Self::check(value)?;
        Ok(value.as_bytes().to_vec())
    }

    fn bytes_to_string(&self, bytes: &[u8]) -> Result<String, String> {
        let name = std::str::from_utf8(bytes).map_err(|err| err.to_string())?;
        Self::check(name)?;
        Ok(name.to_owned())
    }
}

/// `p2p` 值：对端身份。
///
/// 文本形态为 base58，二进制形态为解码后的身份字节；多重哈希的结构校验不在本层。
#[derive(Debug, Default)]
pub struct PeerIdTranscoder;

impl Transcoder for PeerIdTranscoder {
    fn string_to_bytes(&self, value: &str) -> Result<Vec<u8>, String> {
        if value.is_empty() {
            return Err("empty peer identity".to_owned());
        }
        bs58::decode(value).into_vec().map_err(|err| err.to_string())
    }

    fn bytes_to_string(&self, bytes: &[u8]) -> Result<String, String> {
        if bytes.is_empty() {
            return Err("empty peer identity".to_owned());
        }
        Ok(bs58::encode(bytes).into_string())
    }
}

/// 协议描述符：注册表中的一行。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 以数值码、名称、varint 码三种标识索引同一协议，分别服务二进制解析、文本解析与线上比对；
/// - 携带 [`SizeHint`] 与可选 [`Transcoder`]，使解析器无需理解具体协议即可切分组件。
///
/// ## 契约（What）
/// - `vcode` 恒等于 `varint::encode(code)`，由构造函数计算，调用方无法写入不一致的值；
/// - `Zero` 尺寸的协议不得携带值编解码器，其余尺寸必须携带；
/// - 描述符注册后以 `Arc` 共享，整个进程生命周期内不可变。
#[derive(Clone)]
pub struct ProtocolDescriptor {
    code: u32,
    name: String,
    vcode: Vec<u8>,
    size: SizeHint,
    transcoder: Option<Arc<dyn Transcoder>>,
}

impl ProtocolDescriptor {
    /// 通用构造函数。
    pub fn new(
        code: u32,
        name: impl Into<String>,
        size: SizeHint,
        transcoder: Option<Arc<dyn Transcoder>>,
    ) -> Self {
        Self {
            code,
            name: name.into(),
            vcode: varint::encode(u64::from(code)),
            size,
            transcoder,
        }
    }

    /// 不带值的标记型协议。
    pub fn marker(code: u32, name: impl Into<String>) -> Self {
        Self::new(code, name, SizeHint::Zero, None)
    }

    /// 定长协议，`bits` 为值的位宽。
    pub fn fixed(
        code: u32,
        name: impl Into<String>,
        bits: usize,
        transcoder: impl Transcoder,
    ) -> Self {
        Self::new(code, name, SizeHint::Fixed(bits), Some(Arc::new(transcoder)))
    }

    /// 变长协议。
    pub fn variable(code: u32, name: impl Into<String>, transcoder: impl Transcoder) -> Self {
        Self::new(code, name, SizeHint::Variable, Some(Arc::new(transcoder)))
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 协议码的 varint 编码。
    pub fn vcode(&self) -> &[u8] {
        &self.vcode
    }

    pub fn size(&self) -> SizeHint {
        self.size
    }

    pub fn transcoder(&self) -> Option<&Arc<dyn Transcoder>> {
        self.transcoder.as_ref()
    }

    /// 检查描述符的内部一致性，注册表在写入前调用。
    pub(crate) fn validate(&self) -> Result<(), &'static str> {
        if self.name.is_empty() {
            return Err("name must not be empty");
        }
        if self.name.contains('/') {
            return Err("name must not contain `/`");
        }
        match (self.size, self.transcoder.is_some()) {
            (SizeHint::Zero, true) => Err("marker protocols carry no value transcoder"),
            (SizeHint::Zero, false) => Ok(()),
            (_, false) => Err("protocols with a value need a transcoder"),
            (SizeHint::Fixed(bits), true) if bits == 0 || bits % 8 != 0 => {
                Err("fixed size must be a positive multiple of 8 bits")
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for ProtocolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolDescriptor")
            .field("code", &self.code)
            .field("name", &self.name)
            .field("size", &self.size)
            .finish()
    }
}

/// 核心内置协议集合。`wss` 等扩展协议由各自的传输在启动时追加。
pub fn standard_protocols() -> Vec<ProtocolDescriptor> {
    vec![
        ProtocolDescriptor::fixed(P_IP4, "ip4", 32, Ipv4Transcoder),
        ProtocolDescriptor::fixed(P_TCP, "tcp", 16, PortTranscoder),
        ProtocolDescriptor::fixed(P_IP6, "ip6", 128, Ipv6Transcoder),
        ProtocolDescriptor::variable(P_DNS, "dns", DnsTranscoder),
        ProtocolDescriptor::variable(P_DNS4, "dns4", DnsTranscoder),
        ProtocolDescriptor::variable(P_DNS6, "dns6", DnsTranscoder),
        ProtocolDescriptor::variable(P_DNSADDR, "dnsaddr", DnsTranscoder),
        ProtocolDescriptor::variable(P_P2P, "p2p", PeerIdTranscoder),
        ProtocolDescriptor::marker(P_WS, "ws"),
    ]
}
