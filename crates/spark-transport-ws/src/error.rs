//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义 WebSocket 传输对外暴露的错误语义：地址校验、原始连接、升级、监听与配置；
//! - 每个错误携带稳定的点分错误码（`spark.transport.ws.*`），运维脚本与测试按错误码断言，
//!   无需解析文案。
//!
//! ## 设计要求（What）
//! - 地址与编解码错误必须在任何套接字操作之前产生；
//! - 原始连接与升级失败保留底层原因（`#[source]`），不吞掉任何信息；
//! - 取消与超时统一为 [`CancelReason`]，并记录发生时所处的 [`DialStage`]。

use std::fmt;
use std::io;

use spark_multiaddr::{CodecError, Multiaddr, RegistrationError};
use spark_transport::UpgradeError;
use thiserror::Error;

/// 描述一次底层操作对应的稳定错误码与默认文案。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperationKind {
    pub code: &'static str,
    pub message: &'static str,
}

pub(crate) const CONNECT: OperationKind = OperationKind {
    code: "spark.transport.ws.connect_failed",
    message: "tcp connect",
};
pub(crate) const TLS_CONNECT: OperationKind = OperationKind {
    code: "spark.transport.ws.tls_connect_failed",
    message: "tls client handshake",
};
pub(crate) const BIND: OperationKind = OperationKind {
    code: "spark.transport.ws.bind_failed",
    message: "tcp bind",
};
pub(crate) const ACCEPT: OperationKind = OperationKind {
    code: "spark.transport.ws.accept_failed",
    message: "tcp accept",
};
pub(crate) const TLS_ACCEPT: OperationKind = OperationKind {
    code: "spark.transport.ws.tls_accept_failed",
    message: "tls server handshake",
};
pub(crate) const LOCAL_ADDR: OperationKind = OperationKind {
    code: "spark.transport.ws.local_addr_failed",
    message: "query local address",
};

/// 拨号状态机所处阶段。
///
/// `Idle → ValidatingAddress → Connecting → Upgrading → {Connected | Failed}`。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DialStage {
    Idle,
    ValidatingAddress,
    Connecting,
    Upgrading,
    Connected,
    Failed,
}

impl DialStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ValidatingAddress => "validating_address",
            Self::Connecting => "connecting",
            Self::Upgrading => "upgrading",
            Self::Connected => "connected",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DialStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 阻塞操作被打断的原因。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// 调用方触发了 [`Cancellation`](spark_transport::Cancellation)。
    Cancelled,
    /// 调用上下文的截止时间到期。
    DeadlineExceeded,
    /// 传输配置的握手超时到期。
    HandshakeTimeout,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline exceeded",
            Self::HandshakeTimeout => "handshake timed out",
        })
    }
}

/// 原始字节流层错误。
///
/// # 教案式说明
/// - **意图 (Why)**：原始层（TCP/TLS）只报告“哪一步、为什么”，由传输决定包装为拨号还是监听错误；
/// - **契约 (What)**：`Io` 携带 [`OperationKind`]，其错误码即对外稳定码；
///   [`is_per_connection`](Self::is_per_connection) 标识只影响单个入站连接、不应终止监听的错误。
#[derive(Debug, Error)]
pub enum RawError {
    #[error("{}: {source}", .kind.message)]
    Io {
        kind: OperationKind,
        #[source]
        source: io::Error,
    },
    #[error("wss dial requires a TLS client configuration")]
    MissingTlsClientConfig,
    #[error("wss listener requires a TLS server configuration")]
    MissingTlsServerConfig,
    #[error("`{0}` is not a valid TLS server name")]
    InvalidServerName(String),
    #[error("tls handshake timed out")]
    HandshakeTimeout,
    #[error("listener is not secure; there is no TLS configuration to replace")]
    NotSecure,
    #[error("listening socket already released")]
    ListenerClosed,
}

impl RawError {
    pub(crate) fn io(kind: OperationKind, source: io::Error) -> Self {
        Self::Io { kind, source }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { kind, .. } => kind.code,
            Self::MissingTlsClientConfig => "spark.transport.ws.missing_tls_client_config",
            Self::MissingTlsServerConfig => "spark.transport.ws.missing_tls_server_config",
            Self::InvalidServerName(_) => "spark.transport.ws.invalid_server_name",
            Self::HandshakeTimeout => "spark.transport.ws.tls_handshake_timeout",
            Self::NotSecure => "spark.transport.ws.not_secure",
            Self::ListenerClosed => "spark.transport.ws.raw_listener_closed",
        }
    }

    /// 只影响单个入站连接的错误：TLS 握手失败或超时，以及对端在 accept 前后断开。
    pub fn is_per_connection(&self) -> bool {
        match self {
            Self::Io { kind, source } => {
                *kind == TLS_ACCEPT
                    || *kind == LOCAL_ADDR
                    || matches!(
                        source.kind(),
                        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset
                    )
            }
            Self::HandshakeTimeout => true,
            _ => false,
        }
    }
}

/// 单个配置问题。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigIssue {
    #[error("option `{0}` given more than once")]
    DuplicateOption(&'static str),
    #[error("handshake timeout must be greater than zero")]
    ZeroHandshakeTimeout,
    #[error("allow_self_signed conflicts with an explicit TLS client configuration")]
    SelfSignedWithCustomClientConfig,
    #[error("protocol `{name}` ({code}) is not registered")]
    MissingProtocol { code: u32, name: &'static str },
    #[error("no address codec registered for `{0}`")]
    MissingCodec(&'static str),
    #[error("failed to build TLS configuration: {0}")]
    Tls(String),
    #[error("invalid settings: {0}")]
    Settings(String),
}

/// 聚合后的配置错误：一次构造中发现的全部问题。
///
/// 构造失败时返回全部问题而不是第一个，调用方可以一次性修正配置。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid websocket transport configuration: {}", join_issues(.issues))]
pub struct ConfigurationError {
    pub issues: Vec<ConfigIssue>,
}

fn join_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ConfigurationError {
    pub fn code(&self) -> &'static str {
        "spark.transport.ws.invalid_configuration"
    }

    pub fn contains(&self, issue: &ConfigIssue) -> bool {
        self.issues.contains(issue)
    }
}

impl From<ConfigIssue> for ConfigurationError {
    fn from(issue: ConfigIssue) -> Self {
        Self {
            issues: vec![issue],
        }
    }
}

/// WebSocket 传输错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：让调用方按变体区分“地址不可用”“连不上”“被取消”“升级失败”“监听失败”，
///   分别决定是换地址、重试还是放弃；
/// - **契约 (What)**：
///   - `AddressFormat`/`Codec` 一定发生在任何套接字操作之前；
///   - `Dial`/`Upgrade`/`DialCancelled` 返回前原始连接已关闭；
///   - `code()` 返回稳定错误码；
/// - **设计权衡 (Trade-offs)**：地址以 [`Multiaddr`] 原样携带，便于日志输出，代价是错误值较大。
#[derive(Debug, Error)]
pub enum TransportError {
    /// 地址不满足传输要求的格式。
    #[error("address {address} does not match {expected}")]
    AddressFormat {
        address: Multiaddr,
        expected: String,
    },
    /// 结构化地址与原生地址互转失败。
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// 原始连接建立失败。
    #[error("dial {address} failed")]
    Dial {
        address: Multiaddr,
        #[source]
        cause: RawError,
    },
    /// 拨号在某阶段被取消或超时。
    #[error("dial {address} {reason} during {stage}")]
    DialCancelled {
        address: Multiaddr,
        stage: DialStage,
        reason: CancelReason,
    },
    /// 安全/多路复用升级失败。
    #[error("upgrade of {address} failed")]
    Upgrade {
        address: Multiaddr,
        #[source]
        cause: UpgradeError,
    },
    /// 绑定监听失败。
    #[error("listen on {address} failed")]
    Listen {
        address: Multiaddr,
        #[source]
        cause: RawError,
    },
    /// 监听器已关闭。
    #[error("listener closed")]
    ListenerClosed,
    /// 监听器级别的接受失败（单连接失败不会走到这里）。
    #[error("accept on {address} failed")]
    Accept {
        address: Multiaddr,
        #[source]
        cause: RawError,
    },
    /// 接受过程被调用方取消或超时。
    #[error("accept {reason}")]
    AcceptCancelled { reason: CancelReason },
    /// 入站连接升级失败，仅通过观察者上报。
    #[error("inbound upgrade from {remote} failed")]
    InboundUpgrade {
        remote: Multiaddr,
        #[source]
        cause: UpgradeError,
    },
    /// 入站连接升级超时，仅通过观察者上报。
    #[error("inbound upgrade from {remote} timed out")]
    InboundUpgradeTimeout { remote: Multiaddr },
    /// 监听器运行期操作失败（例如替换证书）。
    #[error("listener operation failed")]
    ListenerOperation(#[source] RawError),
    /// 构造传输时的配置问题。
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// 启动阶段的注册冲突。
    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

impl TransportError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::AddressFormat { .. } => "spark.transport.ws.address_format",
            Self::Codec(err) => err.code(),
            Self::Dial { .. } => "spark.transport.ws.dial_failed",
            Self::DialCancelled { reason, .. } => match reason {
                CancelReason::Cancelled => "spark.transport.ws.dial_cancelled",
                CancelReason::DeadlineExceeded => "spark.transport.ws.dial_deadline_exceeded",
                CancelReason::HandshakeTimeout => "spark.transport.ws.handshake_timeout",
            },
            Self::Upgrade { .. } => "spark.transport.ws.upgrade_failed",
            Self::Listen { .. } => "spark.transport.ws.listen_failed",
            Self::ListenerClosed => "spark.transport.ws.listener_closed",
            Self::Accept { .. } => "spark.transport.ws.accept_failed",
            Self::AcceptCancelled { .. } => "spark.transport.ws.accept_cancelled",
            Self::InboundUpgrade { .. } => "spark.transport.ws.inbound_upgrade_failed",
            Self::InboundUpgradeTimeout { .. } => "spark.transport.ws.inbound_upgrade_timeout",
            Self::ListenerOperation(err) => err.code(),
            Self::Configuration(err) => err.code(),
            Self::Registration(err) => err.code(),
        }
    }

    /// 拨号失败时所处的阶段；非拨号错误返回 `None`。
    pub fn dial_stage(&self) -> Option<DialStage> {
        match self {
            Self::AddressFormat { .. } | Self::Codec(_) => Some(DialStage::ValidatingAddress),
            Self::Dial { .. } => Some(DialStage::Connecting),
            Self::DialCancelled { stage, .. } => Some(*stage),
            Self::Upgrade { .. } => Some(DialStage::Upgrading),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_lists_every_issue() {
        let err = ConfigurationError {
            issues: vec![
                ConfigIssue::DuplicateOption("handshake_timeout"),
                ConfigIssue::ZeroHandshakeTimeout,
            ],
        };
        assert_eq!(
            err.to_string(),
            "invalid websocket transport configuration: option `handshake_timeout` given more \
             than once; handshake timeout must be greater than zero"
        );
        assert!(err.contains(&ConfigIssue::ZeroHandshakeTimeout));
    }

    #[test]
    fn tls_accept_failures_are_per_connection() {
        let handshake = RawError::io(TLS_ACCEPT, io::Error::other("bad record"));
        assert!(handshake.is_per_connection());
        let aborted = RawError::io(ACCEPT, io::ErrorKind::ConnectionAborted.into());
        assert!(aborted.is_per_connection());
        let fatal = RawError::io(ACCEPT, io::ErrorKind::PermissionDenied.into());
        assert!(!fatal.is_per_connection());
        assert_eq!(fatal.code(), "spark.transport.ws.accept_failed");
        assert!(!RawError::ListenerClosed.is_per_connection());
    }

    #[test]
    fn cancellation_codes_follow_reason() {
        let err = TransportError::DialCancelled {
            address: Multiaddr::empty(),
            stage: DialStage::Upgrading,
            reason: CancelReason::HandshakeTimeout,
        };
        assert_eq!(err.code(), "spark.transport.ws.handshake_timeout");
        assert_eq!(err.dial_stage(), Some(DialStage::Upgrading));
        assert_eq!(
            err.to_string(),
            "dial / handshake timed out during upgrading"
        );
    }
}
