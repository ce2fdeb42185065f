use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rustls::ServerConfig;
use spark_multiaddr::{CodecError, Component, Multiaddr, ProtocolRegistry, socket_addr_to_multiaddr};
use spark_transport::{
    CallContext, Cancellation, CapableConnection, Deadline, Listener, RawConnection, Upgrader,
};
use tokio::sync::{Mutex, mpsc};
use tracing::{Instrument, debug, info_span, warn};

use crate::error::{CancelReason, TransportError};
use crate::raw::{RawListener, RawSocket};
use crate::util::{Interrupted, run_with_context};

const TARGET: &str = "spark.transport.ws";

/// 已升级、等待 `accept` 取走的入站连接上限；队列满时每连接任务在发送处等待。
const READY_QUEUE_CAPACITY: usize = 32;

type Accepted = Result<Box<dyn CapableConnection>, TransportError>;

/// 传给 [`Upgrader`] 的传输标识。
pub(crate) const TRANSPORT_NAME: &str = "websocket";

/// 入站连接失败发生的阶段。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InboundStage {
    /// 原始层接受，含 `wss` 的 TLS 握手。
    RawAccept,
    /// 安全 + 多路复用升级。
    Upgrade,
}

/// 一次被隔离的入站失败。
#[derive(Debug)]
pub struct InboundFailure<'a> {
    /// 监听地址。
    pub listener: &'a Multiaddr,
    /// 对端地址；原始层失败时可能未知。
    pub remote: Option<&'a Multiaddr>,
    pub stage: InboundStage,
    pub error: &'a TransportError,
}

/// 入站失败观察者。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 单个入站连接的失败不应终止接受循环，但也不能被静默吞掉；
/// - 监听器把这类失败同时交给观察者与 `warn!` 日志，宿主可据此计数、告警或封禁对端。
///
/// ## 契约（What）
/// - 回调在各入站连接自己的后台任务内同步执行，可能被并发调用，实现应当快速返回；
/// - 回调不影响其他连接，也不影响监听器继续接受。
pub trait ListenerObserver: Send + Sync {
    fn on_inbound_failure(&self, failure: &InboundFailure<'_>);
}

/// 不做任何事的观察者（仅保留日志）。
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl ListenerObserver for NoopObserver {
    fn on_inbound_failure(&self, _failure: &InboundFailure<'_>) {}
}

/// 按阶段计数的观察者。
#[derive(Debug, Default)]
pub struct FailureCounter {
    raw_accept: AtomicU64,
    upgrade: AtomicU64,
}

impl FailureCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw_accept_failures(&self) -> u64 {
        self.raw_accept.load(Ordering::Relaxed)
    }

    pub fn upgrade_failures(&self) -> u64 {
        self.upgrade.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.raw_accept_failures() + self.upgrade_failures()
    }
}

impl ListenerObserver for FailureCounter {
    fn on_inbound_failure(&self, failure: &InboundFailure<'_>) {
        let counter = match failure.stage {
            InboundStage::RawAccept => &self.raw_accept,
            InboundStage::Upgrade => &self.upgrade,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// WebSocket 监听器。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 每个入站连接的 TLS 握手与升级互不等待：一个静默或缓慢的对端只占用自己的后台任务，
///   不会推迟其他对端的接受与升级。
///
/// ## 逻辑（How）
/// 1. 构造时启动接受循环任务，它只做原始层的 TCP 接受；
/// 2. 每接受一个字节流就派生一个连接任务：安全握手 → 入站升级（受握手超时约束）；
///    成功的连接写入就绪队列，失败交给观察者与 `warn!` 日志；
/// 3. [`accept`](Listener::accept) 从就绪队列取出下一个连接，多个并发调用按到达顺序依次获得连接。
///
/// ## 契约（What）
/// - 调用方取消或截止到期时返回 [`TransportError::AcceptCancelled`]，已就绪的连接留在队列中；
/// - [`close`](Listener::close) 同步释放监听套接字并停止所有后台任务，挂起与后续的 `accept`
///   均返回 [`TransportError::ListenerClosed`]；`Drop` 等同于 `close`；
/// - 接受循环遇到监听级错误时停止，该错误交给下一次 `accept`；
/// - `multiaddr()` 为实际绑定地址，端口为系统分配的真实端口。
pub struct WsListener {
    shared: Arc<Shared>,
    ready: Mutex<mpsc::Receiver<Accepted>>,
}

struct Shared {
    raw: Box<dyn RawListener>,
    upgrader: Arc<dyn Upgrader>,
    protocols: Arc<ProtocolRegistry>,
    scheme: Component,
    multiaddr: Multiaddr,
    handshake_timeout: Duration,
    observer: Arc<dyn ListenerObserver>,
    closed: Cancellation,
}

impl WsListener {
    /// 必须在 Tokio 运行时内调用：接受循环以后台任务运行。
    pub(crate) fn new(
        raw: Box<dyn RawListener>,
        upgrader: Arc<dyn Upgrader>,
        protocols: Arc<ProtocolRegistry>,
        scheme: Component,
        handshake_timeout: Duration,
        observer: Arc<dyn ListenerObserver>,
    ) -> Result<Self, TransportError> {
        let multiaddr = scheme_multiaddr(&protocols, &scheme, raw.local_addr())?;
        let span = info_span!(target: TARGET, "ws.listener", listener = %multiaddr);
        let shared = Arc::new(Shared {
            raw,
            upgrader,
            protocols,
            scheme,
            multiaddr,
            handshake_timeout,
            observer,
            closed: Cancellation::new(),
        });
        let (sender, receiver) = mpsc::channel(READY_QUEUE_CAPACITY);
        tokio::spawn(Arc::clone(&shared).accept_loop(sender).instrument(span));
        Ok(Self {
            shared,
            ready: Mutex::new(receiver),
        })
    }

    /// 是否已关闭。
    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled()
    }

    /// 替换 `wss` 监听器的服务端 TLS 配置（证书轮换）。
    pub fn replace_tls_config(&self, config: Arc<ServerConfig>) -> Result<(), TransportError> {
        self.shared
            .raw
            .replace_tls_config(config)
            .map_err(TransportError::ListenerOperation)
    }

    fn shutdown(&self) {
        if self.shared.closed.cancel() {
            self.shared.raw.close();
            debug!(target: TARGET, listener = %self.shared.multiaddr, "listener closed");
        }
    }
}

fn scheme_multiaddr(
    protocols: &ProtocolRegistry,
    scheme: &Component,
    socket: SocketAddr,
) -> Result<Multiaddr, TransportError> {
    socket_addr_to_multiaddr(protocols, socket)
        .map(|addr| addr.with(scheme.clone()))
        .map_err(|err| CodecError::unsupported(socket, err.to_string()).into())
}

impl Shared {
    async fn accept_loop(self: Arc<Self>, ready: mpsc::Sender<Accepted>) {
        let idle = CallContext::default();
        loop {
            let next = run_with_context(&idle, Some(&self.closed), self.raw.accept());
            let accepted = match next.await {
                Ok(accepted) => accepted,
                Err(_) => break,
            };
            match accepted {
                Ok(socket) => {
                    let connection = Arc::clone(&self).establish(socket, ready.clone());
                    tokio::spawn(connection.in_current_span());
                }
                Err(cause) if cause.is_per_connection() => {
                    let error = TransportError::Accept {
                        address: self.multiaddr.clone(),
                        cause,
                    };
                    self.report(None, InboundStage::RawAccept, &error);
                }
                Err(_) if self.closed.is_cancelled() => break,
                Err(cause) => {
                    let error = TransportError::Accept {
                        address: self.multiaddr.clone(),
                        cause,
                    };
                    warn!(
                        target: TARGET,
                        listener = %self.multiaddr,
                        code = error.code(),
                        error = %error,
                        "accept loop stopped"
                    );
                    if ready.send(Err(error)).await.is_err() {
                        debug!(
                            target: TARGET,
                            listener = %self.multiaddr,
                            "listener dropped before the accept error was delivered"
                        );
                    }
                    break;
                }
            }
        }
        debug!(target: TARGET, listener = %self.multiaddr, "accept loop finished");
    }

    /// 单个入站连接：安全握手 → 升级 → 就绪队列。
    async fn establish(self: Arc<Self>, socket: RawSocket, ready: mpsc::Sender<Accepted>) {
        let addresses = scheme_multiaddr(&self.protocols, &self.scheme, socket.local).and_then(
            |local| {
                scheme_multiaddr(&self.protocols, &self.scheme, socket.remote)
                    .map(|remote| (local, remote))
            },
        );
        let (local, remote) = match addresses {
            Ok(addresses) => addresses,
            Err(error) => {
                self.report(None, InboundStage::RawAccept, &error);
                return;
            }
        };
        debug!(target: TARGET, %remote, "raw connection accepted");

        let idle = CallContext::default();
        let secured = match run_with_context(&idle, Some(&self.closed), self.raw.secure(socket))
            .await
        {
            Ok(Ok(secured)) => secured,
            Ok(Err(cause)) => {
                let error = TransportError::Accept {
                    address: self.multiaddr.clone(),
                    cause,
                };
                self.report(Some(&remote), InboundStage::RawAccept, &error);
                return;
            }
            Err(_) => return,
        };

        let raw = RawConnection::new(secured.stream, local, remote.clone());
        let handle = raw.close_handle();
        let ctx = CallContext::builder()
            .with_cancellation(self.closed.child())
            .with_deadline(Deadline::with_timeout(self.handshake_timeout))
            .build();
        let upgraded = run_with_context(
            &ctx,
            Some(&self.closed),
            self.upgrader.upgrade_inbound(&ctx, TRANSPORT_NAME, raw),
        )
        .await;
        let connection = match upgraded {
            Ok(Ok(connection)) => connection,
            Ok(Err(cause)) => {
                handle.close();
                let error = TransportError::InboundUpgrade {
                    remote: remote.clone(),
                    cause,
                };
                self.report(Some(&remote), InboundStage::Upgrade, &error);
                return;
            }
            Err(Interrupted::Context(CancelReason::DeadlineExceeded)) => {
                handle.close();
                let error = TransportError::InboundUpgradeTimeout {
                    remote: remote.clone(),
                };
                self.report(Some(&remote), InboundStage::Upgrade, &error);
                return;
            }
            Err(_) => {
                handle.close();
                return;
            }
        };
        debug!(target: TARGET, %remote, "inbound connection upgraded");

        // 关闭后不再投递；被丢弃的发送 Future 连同连接一起释放。
        let delivered =
            run_with_context(&idle, Some(&self.closed), ready.send(Ok(connection))).await;
        if !matches!(delivered, Ok(Ok(()))) {
            debug!(target: TARGET, %remote, "listener gone; upgraded connection dropped");
        }
    }

    fn report(&self, remote: Option<&Multiaddr>, stage: InboundStage, error: &TransportError) {
        let peer = remote.map_or_else(|| "unknown".to_owned(), ToString::to_string);
        warn!(
            target: TARGET,
            listener = %self.multiaddr,
            remote = %peer,
            stage = ?stage,
            code = error.code(),
            error = %error,
            "inbound connection failed; continuing to accept"
        );
        self.observer.on_inbound_failure(&InboundFailure {
            listener: &self.multiaddr,
            remote,
            stage,
            error,
        });
    }
}

#[async_trait]
impl Listener for WsListener {
    type Error = TransportError;

    async fn accept(&self, ctx: &CallContext) -> Result<Box<dyn CapableConnection>, TransportError> {
        let next = async { self.ready.lock().await.recv().await };
        match run_with_context(ctx, Some(&self.shared.closed), next).await {
            Ok(Some(accepted)) => accepted,
            Ok(None) | Err(Interrupted::Guard) => Err(TransportError::ListenerClosed),
            Err(Interrupted::Context(reason)) => Err(TransportError::AcceptCancelled { reason }),
        }
    }

    fn multiaddr(&self) -> &Multiaddr {
        &self.shared.multiaddr
    }

    fn close(&self) -> Result<(), TransportError> {
        self.shutdown();
        Ok(())
    }
}

impl Drop for WsListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WsListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsListener")
            .field("multiaddr", &self.shared.multiaddr)
            .field("closed", &self.is_closed())
            .finish()
    }
}
