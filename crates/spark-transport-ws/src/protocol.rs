//! 启动阶段的协议与编解码注册，以及本传输使用的两条地址格式。

use std::sync::LazyLock;

use spark_multiaddr::fmt::{ip, tcp};
use spark_multiaddr::protocol::{P_TCP, P_WS};
use spark_multiaddr::{NetCodecBuilder, Pattern, ProtocolDescriptor, RegistrationError, RegistryBuilder};

use crate::codec::{WS_CODEC, WSS_CODEC};

/// `wss` 协议码。
pub const P_WSS: u32 = 478;

/// `ws` 对应的原生网络名。
pub const WS_NETWORK: &str = "websocket";

/// `wss` 对应的原生网络名。
pub const WSS_NETWORK: &str = "websocket secure";

/// 本传输能够理解的地址：`TCP` 之后紧跟 `ws` 或 `wss`，允许名称网络层。
pub static WS_FMT: LazyLock<Pattern> =
    LazyLock::new(|| Pattern::and([tcp(), scheme()]));

/// 本传输能够直接拨号的地址：仅 IP 字面量，拨号时不做名称解析。
pub static WS_FMT_DIAL: LazyLock<Pattern> =
    LazyLock::new(|| Pattern::and([ip(), Pattern::base(P_TCP), scheme()]));

fn scheme() -> Pattern {
    Pattern::or([Pattern::base(P_WS), Pattern::named(P_WSS, "wss")])
}

/// `wss` 协议描述符：零长度标记。
pub fn wss_descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor::marker(P_WSS, "wss")
}

/// 向协议注册表草稿登记 `wss`。
///
/// `ws` 属于内置协议；重复调用会因协议码冲突返回 [`RegistrationError::DuplicateCode`]。
pub fn register_protocols(builder: &mut RegistryBuilder) -> Result<(), RegistrationError> {
    builder.register(wss_descriptor())
}

/// 向编解码表草稿登记 `"websocket"` 与 `"websocket secure"` 两个条目。
///
/// 任一条目冲突时返回错误；第一个条目成功而第二个失败时，已登记的条目保留，
/// 调用方应把该错误视为启动失败。
pub fn register_codecs(builder: &mut NetCodecBuilder) -> Result<(), RegistrationError> {
    builder.register(WS_CODEC)?;
    builder.register(WSS_CODEC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spark_multiaddr::ProtocolRegistry;

    fn registry() -> std::sync::Arc<ProtocolRegistry> {
        let mut builder = RegistryBuilder::with_standard_protocols();
        register_protocols(&mut builder).expect("register wss");
        builder.freeze()
    }

    #[test]
    fn second_registration_fails() {
        let mut builder = RegistryBuilder::with_standard_protocols();
        register_protocols(&mut builder).expect("first");
        assert_eq!(
            register_protocols(&mut builder),
            Err(RegistrationError::DuplicateCode {
                code: P_WSS,
                existing: "wss".to_owned()
            })
        );

        let mut codecs = NetCodecBuilder::with_standard_codecs();
        register_codecs(&mut codecs).expect("first");
        assert!(matches!(
            register_codecs(&mut codecs),
            Err(RegistrationError::DuplicateNetwork { network }) if network == WS_NETWORK
        ));
    }

    #[test]
    fn general_format_accepts_names_dial_format_does_not() {
        let registry = registry();
        let named = registry
            .parse_str("/dns4/example.com/tcp/443/wss")
            .expect("parse");
        assert!(WS_FMT.matches(&named));
        assert!(!WS_FMT_DIAL.matches(&named));

        let literal = registry.parse_str("/ip6/::1/tcp/80/ws").expect("parse");
        assert!(WS_FMT.matches(&literal));
        assert!(WS_FMT_DIAL.matches(&literal));

        let bare = registry.parse_str("/ip4/1.2.3.4/tcp/80").expect("parse");
        assert!(!WS_FMT.matches(&bare));
    }

    #[test]
    fn formats_render_their_grammar() {
        assert_eq!(
            WS_FMT_DIAL.to_string(),
            "And(Or(ip4,ip6),tcp,Or(ws,wss))"
        );
    }
}
