//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义结构化地址在注册、解析与原生地址转换三个阶段的错误语义；
//! - 每个错误都提供稳定错误码（`spark.multiaddr.*`），与传输层的 `spark.transport.*` 命名保持一致，
//!   便于日志聚合与告警按码值路由。
//!
//! ## 设计要求（What）
//! - 所有错误派生 [`thiserror::Error`]，可直接参与 `?` 传播与 `source()` 链；
//! - 注册错误只会在启动阶段出现，属于配置级致命错误；
//! - 解析错误与转换错误在任何套接字打开之前同步返回。

use thiserror::Error;

/// 协议注册阶段的错误。
///
/// # 教案式说明
/// - **意图 (Why)**：注册表要求协议码与名称全局唯一，重复注册意味着启动配置冲突，必须在任何匹配器或
///   编解码器构造之前暴露出来；
/// - **契约 (What)**：返回该错误时注册表保持调用前的状态，不存在“写了一半”的描述符；
/// - **风险 (Trade-offs)**：调用方通常应直接终止启动流程，而不是忽略后继续运行。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    /// 协议码已被占用。
    #[error("protocol code {code} is already registered as `{existing}`")]
    DuplicateCode { code: u32, existing: String },

    /// 协议名称已被占用。
    #[error("protocol name `{name}` is already registered with code {existing}")]
    DuplicateName { name: String, existing: u32 },

    /// 原生网络名已绑定到其他地址编解码器。
    #[error("net codec for network `{network}` is already registered")]
    DuplicateNetwork { network: String },

    /// 协议名已绑定到其他地址编解码器。
    #[error("net codec for protocol `{protocol}` is already registered")]
    DuplicateCodec { protocol: String },

    /// 描述符自身不合法（空名称、名称含 `/`、变长协议缺少值编解码器等）。
    #[error("invalid protocol descriptor `{name}`: {reason}")]
    InvalidDescriptor { name: String, reason: &'static str },
}

impl RegistrationError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateCode { .. } => "spark.multiaddr.registry.duplicate_code",
            Self::DuplicateName { .. } => "spark.multiaddr.registry.duplicate_name",
            Self::DuplicateNetwork { .. } => "spark.multiaddr.registry.duplicate_network",
            Self::DuplicateCodec { .. } => "spark.multiaddr.registry.duplicate_codec",
            Self::InvalidDescriptor { .. } => "spark.multiaddr.registry.invalid_descriptor",
        }
    }
}

/// 结构化地址文本/二进制解析错误。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MultiaddrError {
    /// 文本形态必须以 `/` 开头。
    #[error("multiaddr text must start with `/`: `{0}`")]
    MissingLeadingSlash(String),

    /// 文本中出现未注册的协议名称。
    #[error("unknown protocol name `{0}`")]
    UnknownProtocolName(String),

    /// 二进制中出现未注册的协议码。
    #[error("unknown protocol code {0}")]
    UnknownProtocolCode(u64),

    /// 需要取值的协议在文本末尾缺少值。
    #[error("protocol `{protocol}` requires a value")]
    MissingValue { protocol: String },

    /// 值无法被该协议的值编解码器接受。
    #[error("invalid value `{value}` for protocol `{protocol}`: {reason}")]
    InvalidValue {
        protocol: String,
        value: String,
        reason: String,
    },

    /// 二进制输入在组件中途结束。
    #[error("multiaddr bytes are truncated")]
    Truncated,

    /// 变长整数非法或溢出。
    #[error("invalid varint in multiaddr bytes")]
    InvalidVarint,
}

impl MultiaddrError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingLeadingSlash(_) => "spark.multiaddr.parse.missing_slash",
            Self::UnknownProtocolName(_) | Self::UnknownProtocolCode(_) => {
                "spark.multiaddr.parse.unknown_protocol"
            }
            Self::MissingValue { .. } => "spark.multiaddr.parse.missing_value",
            Self::InvalidValue { .. } => "spark.multiaddr.parse.invalid_value",
            Self::Truncated => "spark.multiaddr.parse.truncated",
            Self::InvalidVarint => "spark.multiaddr.parse.invalid_varint",
        }
    }
}

/// 结构化地址与原生地址之间转换失败。
///
/// - `Unsupported`：地址本身合法，但包含编解码器不认识的组件或顺序无法解释；
/// - `Parse`：原生地址文本畸形（缺端口、协议头非法、主机无法解析）。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unsupported address `{address}`: {reason}")]
    Unsupported { address: String, reason: String },

    #[error("cannot parse native address `{input}`: {reason}")]
    Parse { input: String, reason: String },

    /// 没有为该网络名或协议注册编解码器。
    #[error("no net codec registered for `{0}`")]
    NoCodec(String),
}

impl CodecError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unsupported { .. } => "spark.multiaddr.codec.unsupported",
            Self::Parse { .. } => "spark.multiaddr.codec.parse_failed",
            Self::NoCodec(_) => "spark.multiaddr.codec.missing",
        }
    }

    /// 构造 `Unsupported` 错误。
    pub fn unsupported(address: impl ToString, reason: impl Into<String>) -> Self {
        Self::Unsupported {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    /// 构造 `Parse` 错误。
    pub fn parse(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            input: input.into(),
            reason: reason.into(),
        }
    }
}
