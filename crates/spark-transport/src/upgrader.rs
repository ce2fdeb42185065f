use std::io;

use async_trait::async_trait;
use thiserror::Error;

use crate::connection::{CapableConnection, RawConnection};
use crate::context::CallContext;
use crate::peer::PeerId;

/// 升级失败原因。
///
/// # 教案式说明
/// - **意图 (Why)**：区分“握手失败”“身份不符”“协商失败”等升级语义，传输据此记录日志并包装为自身错误；
/// - **契约 (What)**：所有变体满足 `Send + Sync`；`Io` 保留底层 IO 原因；
/// - **注意事项 (Trade-offs)**：升级器实现可用 [`UpgradeError::Other`] 承载自定义错误，但应尽量映射到已有变体。
#[derive(Debug, Error)]
pub enum UpgradeError {
    /// 安全握手失败。
    #[error("security handshake failed: {0}")]
    Security(String),
    /// 对端身份与拨号方期望不符。
    #[error("peer id mismatch: expected {expected}, got {actual}")]
    PeerMismatch { expected: PeerId, actual: PeerId },
    /// 多路复用协商失败。
    #[error("multiplexer negotiation failed: {0}")]
    Multiplexer(String),
    /// 升级过程中的 IO 错误。
    #[error("upgrade io failure")]
    Io(#[source] io::Error),
    /// 升级器自定义错误。
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl UpgradeError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Security(_) => "spark.upgrade.security_failed",
            Self::PeerMismatch { .. } => "spark.upgrade.peer_mismatch",
            Self::Multiplexer(_) => "spark.upgrade.muxer_failed",
            Self::Io(_) => "spark.upgrade.io_failed",
            Self::Other(_) => "spark.upgrade.other",
        }
    }
}

impl From<io::Error> for UpgradeError {
    fn from(error: io::Error) -> Self {
        Self::Io(error)
    }
}

/// 安全 + 多路复用升级器。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 传输只负责建立原始字节流；加密、身份验证与多路复用由宿主注入的升级器完成；
/// - 以 trait 对象形式注入，测试可以替换为桩实现。
///
/// ## 契约（What）
/// - `transport` 为调用方传输的标识（例如 `"websocket"`），用于日志与策略选择；
/// - 出站升级携带可选的期望身份；验证失败应返回 [`UpgradeError::PeerMismatch`]；
/// - 升级器取得原始连接所有权，失败时直接丢弃它即可，原始连接在 `Drop` 时标记关闭；
/// - 升级器应观察 `ctx` 的取消位，但传输也会在外层强制施加取消与超时。
#[async_trait]
pub trait Upgrader: Send + Sync {
    async fn upgrade_outbound(
        &self,
        ctx: &CallContext,
        transport: &'static str,
        raw: RawConnection,
        expected_peer: Option<&PeerId>,
    ) -> Result<Box<dyn CapableConnection>, UpgradeError>;

    async fn upgrade_inbound(
        &self,
        ctx: &CallContext,
        transport: &'static str,
        raw: RawConnection,
    ) -> Result<Box<dyn CapableConnection>, UpgradeError>;
}
