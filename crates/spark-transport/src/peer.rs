use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use spark_multiaddr::protocol::{P_P2P, PeerIdTranscoder};
use spark_multiaddr::{Multiaddr, Transcoder};
use thiserror::Error;

/// 对端身份标识。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 拨号方可以声明“期望连到谁”，升级器在安全握手后据此校验；
/// - 传输层只搬运该值，不理解其密码学含义。
///
/// ## 契约（What）
/// - 文本形态为 base58 字符串，与结构化地址中 `/p2p/<id>` 组件的值一致；
/// - 二进制形态为 base58 解码后的身份字节，与 `/p2p` 组件的二进制值一致；
/// - 相等性按身份字节比较。
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(Arc<[u8]>);

/// 身份文本不合法。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid peer id `{value}`: {reason}")]
pub struct PeerIdError {
    pub value: String,
    pub reason: String,
}

impl PeerId {
    /// 解码并构造身份。
    pub fn parse(text: &str) -> Result<Self, PeerIdError> {
        let bytes = PeerIdTranscoder
            .string_to_bytes(text)
            .map_err(|reason| PeerIdError {
                value: text.to_owned(),
                reason,
            })?;
        Ok(Self(Arc::from(bytes)))
    }

    /// 读取地址末尾 `/p2p/<id>` 组件携带的身份。
    pub fn from_multiaddr(addr: &Multiaddr) -> Option<Self> {
        let last = addr.components().last()?;
        if last.code() != P_P2P || last.value().is_empty() {
            return None;
        }
        Some(Self(Arc::from(last.value())))
    }

    /// 解码后的身份字节。
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// base58 文本形态。
    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }
}

impl FromStr for PeerId {
    type Err = PeerIdError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse(text)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.to_base58())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spark_multiaddr::ProtocolRegistry;

    #[test]
    fn parse_rejects_non_base58() {
        let text = "QmYyQSo1c1Ym7orWxLYvCrM2EmxFTANf8wXmmE7DWjhx5N";
        let id = PeerId::parse(text).expect("valid");
        assert_eq!(id.to_string(), text);
        // CIDv0 形态的身份解码后是 34 字节的 sha2-256 多重哈希。
        assert_eq!(id.as_bytes().len(), 34);
        assert_eq!(&id.as_bytes()[..2], &[0x12, 0x20]);
        let err = PeerId::parse("not-base58!").expect_err("invalid");
        assert_eq!(err.value, "not-base58!");
        assert!(PeerId::parse("").is_err());
    }

    #[test]
    fn extracts_trailing_identity() {
        let registry = ProtocolRegistry::standard();
        let addr = registry
            .parse_str("/ip4/1.2.3.4/tcp/80/ws/p2p/QmPeer")
            .expect("parse");
        assert_eq!(
            PeerId::from_multiaddr(&addr).map(|id| id.to_string()),
            Some("QmPeer".to_owned())
        );
        let component = addr.find(P_P2P).expect("p2p component");
        assert_eq!(
            PeerId::from_multiaddr(&addr).map(|id| id.as_bytes().to_vec()),
            Some(component.value().to_vec())
        );
        assert_eq!(PeerId::from_multiaddr(&addr.decapsulate(P_P2P)), None);
    }
}
