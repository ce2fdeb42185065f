use async_trait::async_trait;
use spark_multiaddr::Multiaddr;

use crate::connection::CapableConnection;
use crate::context::CallContext;
use crate::peer::PeerId;

/// 统一的传输接口。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 宿主节点按地址选择传输：先以 [`can_dial`](Self::can_dial) 过滤，再调用 [`dial`](Self::dial)；
/// - 监听侧通过 [`listen`](Self::listen) 产出 [`Listener`]，由宿主驱动接受循环。
///
/// ## 契约说明（What）
/// - `can_dial`：纯函数，不做任何 IO，只表示“可以直接拨号”；
/// - `protocols`：本传输负责的协议码集合，与配置无关；
/// - `proxy`：是否为代理型传输；
/// - `dial`/`listen`：返回的连接与监听器都已完成各自的前置校验。
///
/// ## 风险提示（Trade-offs）
/// - 实现必须是 `Send + Sync` 且在调用之间无状态，允许任意并发的拨号与接受。
#[async_trait]
pub trait Transport: Send + Sync {
    /// 错误类型。
    type Error: std::error::Error + Send + Sync + 'static;

    fn can_dial(&self, addr: &Multiaddr) -> bool;

    fn protocols(&self) -> &[u32];

    fn proxy(&self) -> bool;

    async fn dial(
        &self,
        ctx: &CallContext,
        addr: &Multiaddr,
        expected_peer: Option<&PeerId>,
    ) -> Result<Box<dyn CapableConnection>, Self::Error>;

    async fn listen(
        &self,
        addr: &Multiaddr,
    ) -> Result<Box<dyn Listener<Error = Self::Error>>, Self::Error>;
}

/// 传输监听器。
///
/// ## 契约说明（What）
/// - `accept` 只返回已完成入站升级的连接；单个入站连接的失败不终止接受循环；
/// - `close` 之后，挂起与后续的 `accept` 都立即返回错误；
/// - `multiaddr` 返回实际绑定的地址（包括系统分配的端口）。
#[async_trait]
pub trait Listener: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn accept(&self, ctx: &CallContext) -> Result<Box<dyn CapableConnection>, Self::Error>;

    fn multiaddr(&self) -> &Multiaddr;

    fn close(&self) -> Result<(), Self::Error>;
}
