//! 原始字节流层：建立 TCP（`ws`）或 TLS-over-TCP（`wss`）字节流。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 传输只依赖 [`RawDialer`]/[`RawBinder`] 两个能力 trait，测试可以替换为计数桩实现，
//!   从而断言“地址被拒绝时没有打开任何套接字”；
//! - WebSocket 帧格式由宿主在此层之上接入，本层只搬运字节。
//!
//! ## 契约（What）
//! - 取消与截止时间由传输在外层施加；本层的 Future 被丢弃时必须释放套接字；
//! - 两端的 TLS 握手都受握手超时约束，到期返回 [`RawError::HandshakeTimeout`]；
//! - 监听器的 `accept` 只做 TCP 接受，TLS 握手由 [`RawListener::secure`] 单独完成，
//!   上层可以在每连接任务中并发执行，慢速对端不会占住接受路径；
//! - [`RawListener::close`] 同步释放监听套接字，返回后即可在同一地址重新监听。
//!
//! ## 注意事项（Trade-offs）
//! - 服务端 TLS 配置保存在 [`ArcSwap`] 中，证书轮换无需重建监听器；
//!   已建立的连接继续使用握手时的配置。

use std::fmt;
use std::future::poll_fn;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::Poll;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ServerConfig};
use spark_transport::BoxStream;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::debug;

use crate::codec::{Host, WsAddr};
use crate::error::{ACCEPT, BIND, CONNECT, LOCAL_ADDR, RawError, TLS_ACCEPT, TLS_CONNECT};

const TARGET: &str = "spark.transport.ws";

/// 原始层产出的字节流与两端套接字地址。
pub struct RawSocket {
    pub stream: BoxStream,
    pub local: SocketAddr,
    pub remote: SocketAddr,
}

impl fmt::Debug for RawSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawSocket")
            .field("local", &self.local)
            .field("remote", &self.remote)
            .finish()
    }
}

/// 拨号请求。`tls` 仅在 `wss` 时为 `Some`；`handshake_timeout` 约束 TLS 客户端握手。
#[derive(Clone, Debug)]
pub struct RawDialRequest {
    pub addr: WsAddr,
    pub tls: Option<Arc<ClientConfig>>,
    pub handshake_timeout: Duration,
}

/// 绑定请求。`tls` 仅在 `wss` 时为 `Some`。
#[derive(Clone, Debug)]
pub struct RawBindRequest {
    pub addr: WsAddr,
    pub tls: Option<Arc<ServerConfig>>,
    pub handshake_timeout: Duration,
}

#[async_trait]
pub trait RawDialer: Send + Sync {
    async fn connect(&self, request: &RawDialRequest) -> Result<RawSocket, RawError>;
}

#[async_trait]
pub trait RawBinder: Send + Sync {
    async fn bind(&self, request: &RawBindRequest) -> Result<Box<dyn RawListener>, RawError>;
}

#[async_trait]
pub trait RawListener: Send + Sync {
    /// 实际绑定的地址。
    fn local_addr(&self) -> SocketAddr;

    /// 接受一个入站 TCP 字节流，不做任何握手。
    ///
    /// [`close`](Self::close) 之后返回 [`RawError::ListenerClosed`]。
    async fn accept(&self) -> Result<RawSocket, RawError>;

    /// 在已接受的字节流上完成服务端安全握手：`wss` 为 TLS，明文监听器原样返回。
    async fn secure(&self, socket: RawSocket) -> Result<RawSocket, RawError>;

    /// 替换服务端 TLS 配置；非安全监听器返回 [`RawError::NotSecure`]。
    fn replace_tls_config(&self, config: Arc<ServerConfig>) -> Result<(), RawError>;

    /// 立即释放监听套接字。幂等。
    fn close(&self);
}

/// 基于 Tokio TCP 与 `tokio-rustls` 的默认原始层。
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpRawTransport;

fn server_name(host: &Host) -> Result<ServerName<'static>, RawError> {
    match host {
        Host::Ip(ip) => Ok(ServerName::from(*ip)),
        Host::Name(name) => ServerName::try_from(name.clone())
            .map_err(|_| RawError::InvalidServerName(name.clone())),
    }
}

#[async_trait]
impl RawDialer for TcpRawTransport {
    async fn connect(&self, request: &RawDialRequest) -> Result<RawSocket, RawError> {
        let addr = &request.addr;
        let stream = match &addr.host {
            Host::Ip(ip) => TcpStream::connect(SocketAddr::new(*ip, addr.port)).await,
            Host::Name(name) => TcpStream::connect((name.as_str(), addr.port)).await,
        }
        .map_err(|err| RawError::io(CONNECT, err))?;
        stream
            .set_nodelay(true)
            .map_err(|err| RawError::io(CONNECT, err))?;
        let local = stream
            .local_addr()
            .map_err(|err| RawError::io(LOCAL_ADDR, err))?;
        let remote = stream
            .peer_addr()
            .map_err(|err| RawError::io(LOCAL_ADDR, err))?;
        debug!(target: TARGET, %local, %remote, secure = addr.secure, "tcp connected");

        let stream: BoxStream = match &request.tls {
            Some(config) if addr.secure => {
                let name = server_name(&addr.host)?;
                let connect = TlsConnector::from(Arc::clone(config)).connect(name, stream);
                let tls = tokio::time::timeout(request.handshake_timeout, connect)
                    .await
                    .map_err(|_| RawError::HandshakeTimeout)?
                    .map_err(|err| RawError::io(TLS_CONNECT, err))?;
                Box::new(tls)
            }
            None if addr.secure => return Err(RawError::MissingTlsClientConfig),
            _ => Box::new(stream),
        };
        Ok(RawSocket {
            stream,
            local,
            remote,
        })
    }
}

#[async_trait]
impl RawBinder for TcpRawTransport {
    async fn bind(&self, request: &RawBindRequest) -> Result<Box<dyn RawListener>, RawError> {
        let addr = &request.addr;
        let tls = match &request.tls {
            Some(config) if addr.secure => Some(ArcSwap::new(Arc::clone(config))),
            None if addr.secure => return Err(RawError::MissingTlsServerConfig),
            _ => None,
        };
        let listener = match &addr.host {
            Host::Ip(ip) => TcpListener::bind(SocketAddr::new(*ip, addr.port)).await,
            Host::Name(name) => TcpListener::bind((name.as_str(), addr.port)).await,
        }
        .map_err(|err| RawError::io(BIND, err))?;
        let local = listener
            .local_addr()
            .map_err(|err| RawError::io(LOCAL_ADDR, err))?;
        Ok(Box::new(TcpRawListener {
            listener: Mutex::new(Some(listener)),
            local,
            tls,
            handshake_timeout: request.handshake_timeout,
        }))
    }
}

/// 监听套接字放在 `Mutex<Option<_>>` 中：`close` 取走并丢弃，`accept` 每次轮询时短暂加锁，
/// 锁不会跨越 `.await`。
struct TcpRawListener {
    listener: Mutex<Option<TcpListener>>,
    local: SocketAddr,
    tls: Option<ArcSwap<ServerConfig>>,
    handshake_timeout: Duration,
}

#[async_trait]
impl RawListener for TcpRawListener {
    fn local_addr(&self) -> SocketAddr {
        self.local
    }

    async fn accept(&self) -> Result<RawSocket, RawError> {
        let (stream, remote) = poll_fn(|cx| {
            let slot = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(listener) => listener
                    .poll_accept(cx)
                    .map_err(|err| RawError::io(ACCEPT, err)),
                None => Poll::Ready(Err(RawError::ListenerClosed)),
            }
        })
        .await?;
        if let Err(err) = stream.set_nodelay(true) {
            debug!(
                target: TARGET,
                %remote,
                error = %err,
                "failed to enable TCP_NODELAY on inbound stream"
            );
        }
        // 通配地址监听时，每个连接的真实本端地址各不相同。
        let local = stream
            .local_addr()
            .map_err(|err| RawError::io(LOCAL_ADDR, err))?;
        Ok(RawSocket {
            stream: Box::new(stream),
            local,
            remote,
        })
    }

    async fn secure(&self, socket: RawSocket) -> Result<RawSocket, RawError> {
        let Some(config) = &self.tls else {
            return Ok(socket);
        };
        let RawSocket {
            stream,
            local,
            remote,
        } = socket;
        let acceptor = TlsAcceptor::from(config.load_full());
        let tls = tokio::time::timeout(self.handshake_timeout, acceptor.accept(stream))
            .await
            .map_err(|_| RawError::HandshakeTimeout)?
            .map_err(|err| RawError::io(TLS_ACCEPT, err))?;
        Ok(RawSocket {
            stream: Box::new(tls),
            local,
            remote,
        })
    }

    fn replace_tls_config(&self, config: Arc<ServerConfig>) -> Result<(), RawError> {
        let slot = self.tls.as_ref().ok_or(RawError::NotSecure)?;
        slot.store(config);
        Ok(())
    }

    fn close(&self) {
        let released = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_some() {
            debug!(target: TARGET, local = %self.local, "listening socket released");
        }
    }
}
