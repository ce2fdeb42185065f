use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use spark_multiaddr::protocol::P_WS;
use spark_multiaddr::{CodecError, Component, Multiaddr, NetCodecRegistry, socket_addr_to_multiaddr};
use spark_transport::{
    CallContext, CapableConnection, Deadline, Listener, PeerId, RawConnection, Transport, Upgrader,
};
use tracing::{Instrument, debug, field, info_span};

use crate::codec::{WsAddr, to_native};
use crate::config::TransportConfig;
use crate::error::{CancelReason, ConfigIssue, ConfigurationError, DialStage, RawError, TransportError};
use crate::listener::{ListenerObserver, NoopObserver, TRANSPORT_NAME, WsListener};
use crate::protocol::{P_WSS, WS_FMT, WS_FMT_DIAL};
use crate::raw::{RawBindRequest, RawBinder, RawDialRequest, RawDialer, TcpRawTransport};
use crate::util::{Interrupted, run_with_context};

const TARGET: &str = "spark.transport.ws";

const PROTOCOLS: [u32; 2] = [P_WS, P_WSS];

/// WebSocket 传输。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把“结构化地址 → 原始字节流 → 安全多路复用连接”的流程封装为一个无状态对象，
///   宿主可在任意数量的任务中并发拨号与监听；
/// - 升级器与原始层均以 trait 对象注入，测试可以替换为桩实现。
///
/// ## 逻辑（How）
/// 拨号按 [`DialStage`] 推进：
/// 1. `ValidatingAddress`：[`WS_FMT_DIAL`] 匹配失败立即返回 [`TransportError::AddressFormat`]，不触碰套接字；
/// 2. `Connecting`：编解码为 [`WsAddr`]，经原始层建立字节流，受调用上下文的取消与截止约束；
///    `wss` 的 TLS 客户端握手另受握手超时约束；
/// 3. `Upgrading`：交给 [`Upgrader::upgrade_outbound`]，额外受握手超时约束；
///    任何失败或取消都会先关闭原始连接再返回。
///
/// ## 契约（What）
/// - [`protocols`](Transport::protocols) 恒为 `[ws, wss]`，与配置无关；
/// - [`proxy`](Transport::proxy) 恒为 `false`；
/// - 每次拨号都打开新的原始连接，不做连接复用。
pub struct WsTransport {
    config: TransportConfig,
    upgrader: Arc<dyn Upgrader>,
    codecs: Arc<NetCodecRegistry>,
    dialer: Arc<dyn RawDialer>,
    binder: Arc<dyn RawBinder>,
    ws: Component,
    wss: Component,
}

impl WsTransport {
    /// 使用默认的 TCP/TLS 原始层构造传输。
    pub fn new(
        upgrader: Arc<dyn Upgrader>,
        codecs: Arc<NetCodecRegistry>,
        config: TransportConfig,
    ) -> Result<Self, ConfigurationError> {
        let raw = Arc::new(TcpRawTransport);
        Self::with_raw_layer(upgrader, codecs, config, raw.clone(), raw)
    }

    /// 注入自定义原始层。
    ///
    /// `codecs` 必须已登记 `ws`/`wss` 协议与对应的编解码条目，否则返回 [`ConfigurationError`]。
    pub fn with_raw_layer(
        upgrader: Arc<dyn Upgrader>,
        codecs: Arc<NetCodecRegistry>,
        config: TransportConfig,
        dialer: Arc<dyn RawDialer>,
        binder: Arc<dyn RawBinder>,
    ) -> Result<Self, ConfigurationError> {
        let mut issues = Vec::new();
        let protocols = codecs.protocols();
        let mut marker = |code: u32, name: &'static str| {
            let component = protocols
                .lookup_code(code)
                .filter(|descriptor| descriptor.name() == name)
                .and_then(|descriptor| Component::marker(Arc::clone(descriptor)).ok());
            if component.is_none() {
                issues.push(ConfigIssue::MissingProtocol { code, name });
            }
            component
        };
        let ws = marker(P_WS, "ws");
        let wss = marker(P_WSS, "wss");
        for name in ["ws", "wss"] {
            if codecs.codec_for_protocol(name).is_none() {
                issues.push(ConfigIssue::MissingCodec(name));
            }
        }
        match (ws, wss) {
            (Some(ws), Some(wss)) if issues.is_empty() => Ok(Self {
                config,
                upgrader,
                codecs,
                dialer,
                binder,
                ws,
                wss,
            }),
            _ => Err(ConfigurationError { issues }),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn codecs(&self) -> &Arc<NetCodecRegistry> {
        &self.codecs
    }

    /// 与 [`Transport::listen`] 相同，但入站失败同时上报给 `observer`。
    pub async fn listen_with_observer(
        &self,
        addr: &Multiaddr,
        observer: Arc<dyn ListenerObserver>,
    ) -> Result<WsListener, TransportError> {
        if !WS_FMT.matches(addr) {
            return Err(TransportError::AddressFormat {
                address: addr.clone(),
                expected: WS_FMT.to_string(),
            });
        }
        let native = to_native(addr)?;
        let tls = if native.secure {
            let config = self.config.tls_server_config().ok_or_else(|| {
                TransportError::Listen {
                    address: addr.clone(),
                    cause: RawError::MissingTlsServerConfig,
                }
            })?;
            Some(Arc::clone(config))
        } else {
            None
        };
        let request = RawBindRequest {
            addr: native.clone(),
            tls,
            handshake_timeout: self.config.handshake_timeout(),
        };
        let raw = self
            .binder
            .bind(&request)
            .await
            .map_err(|cause| TransportError::Listen {
                address: addr.clone(),
                cause,
            })?;
        let listener = WsListener::new(
            raw,
            Arc::clone(&self.upgrader),
            Arc::clone(self.codecs.protocols()),
            self.scheme_component(&native).clone(),
            self.config.handshake_timeout(),
            observer,
        )?;
        debug!(target: TARGET, requested = %addr, bound = %listener.multiaddr(), "listening");
        Ok(listener)
    }

    fn scheme_component(&self, native: &WsAddr) -> &Component {
        if native.secure { &self.wss } else { &self.ws }
    }

    fn socket_multiaddr(
        &self,
        socket: std::net::SocketAddr,
        native: &WsAddr,
    ) -> Result<Multiaddr, TransportError> {
        socket_addr_to_multiaddr(self.codecs.protocols(), socket)
            .map(|addr| addr.with(self.scheme_component(native).clone()))
            .map_err(|err| CodecError::unsupported(socket, err.to_string()).into())
    }

    async fn dial_stages(
        &self,
        ctx: &CallContext,
        addr: &Multiaddr,
        expected_peer: Option<&PeerId>,
        stage: &mut DialStage,
    ) -> Result<Box<dyn CapableConnection>, TransportError> {
        *stage = DialStage::ValidatingAddress;
        if !self.can_dial(addr) {
            return Err(TransportError::AddressFormat {
                address: addr.clone(),
                expected: WS_FMT_DIAL.to_string(),
            });
        }
        let native = to_native(addr)?;
        let tls = if native.secure {
            let config = self.config.tls_client_config().ok_or_else(|| TransportError::Dial {
                address: addr.clone(),
                cause: RawError::MissingTlsClientConfig,
            })?;
            Some(Arc::clone(config))
        } else {
            None
        };

        *stage = DialStage::Connecting;
        debug!(target: TARGET, native = %native, "connecting");
        let request = RawDialRequest {
            addr: native.clone(),
            tls,
            handshake_timeout: self.config.handshake_timeout(),
        };
        let socket = match run_with_context(ctx, None, self.dialer.connect(&request))
            .await
            .map_err(|interrupted| cancelled(addr, DialStage::Connecting, interrupted))?
        {
            Ok(socket) => socket,
            Err(RawError::HandshakeTimeout) => {
                return Err(TransportError::DialCancelled {
                    address: addr.clone(),
                    stage: DialStage::Connecting,
                    reason: CancelReason::HandshakeTimeout,
                });
            }
            Err(cause) => {
                return Err(TransportError::Dial {
                    address: addr.clone(),
                    cause,
                });
            }
        };
        let local = self.socket_multiaddr(socket.local, &native)?;
        let remote = self.socket_multiaddr(socket.remote, &native)?;
        let raw = RawConnection::new(socket.stream, local, remote);
        let handle = raw.close_handle();

        *stage = DialStage::Upgrading;
        debug!(target: TARGET, "upgrading");
        let upgrade_ctx =
            ctx.with_tighter_deadline(Deadline::with_timeout(self.config.handshake_timeout()));
        let upgraded = run_with_context(
            &upgrade_ctx,
            None,
            self.upgrader
                .upgrade_outbound(&upgrade_ctx, TRANSPORT_NAME, raw, expected_peer),
        )
        .await;
        match upgraded {
            Ok(Ok(connection)) => {
                *stage = DialStage::Connected;
                Ok(connection)
            }
            Ok(Err(cause)) => {
                handle.close();
                Err(TransportError::Upgrade {
                    address: addr.clone(),
                    cause,
                })
            }
            Err(Interrupted::Context(CancelReason::DeadlineExceeded))
                if !ctx.deadline().is_expired(Instant::now()) =>
            {
                handle.close();
                Err(TransportError::DialCancelled {
                    address: addr.clone(),
                    stage: DialStage::Upgrading,
                    reason: CancelReason::HandshakeTimeout,
                })
            }
            Err(interrupted) => {
                handle.close();
                Err(cancelled(addr, DialStage::Upgrading, interrupted))
            }
        }
    }
}

fn cancelled(addr: &Multiaddr, stage: DialStage, interrupted: Interrupted) -> TransportError {
    let reason = match interrupted {
        Interrupted::Context(reason) => reason,
        Interrupted::Guard => CancelReason::Cancelled,
    };
    TransportError::DialCancelled {
        address: addr.clone(),
        stage,
        reason,
    }
}

#[async_trait]
impl Transport for WsTransport {
    type Error = TransportError;

    fn can_dial(&self, addr: &Multiaddr) -> bool {
        WS_FMT_DIAL.matches(addr)
    }

    fn protocols(&self) -> &[u32] {
        &PROTOCOLS
    }

    fn proxy(&self) -> bool {
        false
    }

    async fn dial(
        &self,
        ctx: &CallContext,
        addr: &Multiaddr,
        expected_peer: Option<&PeerId>,
    ) -> Result<Box<dyn CapableConnection>, TransportError> {
        let span = info_span!(
            target: TARGET,
            "ws.dial",
            address = %addr,
            peer = field::Empty,
            stage = field::Empty
        );
        if let Some(peer) = expected_peer {
            span.record("peer", field::display(peer));
        }
        async {
            let mut stage = DialStage::Idle;
            let result = self.dial_stages(ctx, addr, expected_peer, &mut stage).await;
            match &result {
                Ok(_) => {
                    tracing::Span::current().record("stage", DialStage::Connected.as_str());
                    debug!(target: TARGET, "dial connected");
                }
                Err(err) => {
                    tracing::Span::current().record("stage", DialStage::Failed.as_str());
                    debug!(
                        target: TARGET,
                        failed_at = %stage,
                        code = err.code(),
                        error = %err,
                        "dial failed"
                    );
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn listen(
        &self,
        addr: &Multiaddr,
    ) -> Result<Box<dyn Listener<Error = TransportError>>, TransportError> {
        let listener = self
            .listen_with_observer(addr, Arc::new(NoopObserver))
            .await?;
        Ok(Box::new(listener))
    }
}

impl fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
