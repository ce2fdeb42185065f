use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use async_trait::async_trait;
use spark_multiaddr::Multiaddr;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::peer::PeerId;

/// 可被升级器包装的双向字节流。
///
/// 任何满足 `AsyncRead + AsyncWrite + Send + Unpin` 的类型都自动实现该 trait，
/// 例如 `tokio::net::TcpStream` 或 `tokio_rustls` 的客户端/服务端流。
pub trait RawStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> RawStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// 类型擦除后的字节流。
pub type BoxStream = Box<dyn RawStream>;

/// 升级前的原始连接：字节流 + 两端结构化地址 + 关闭信号。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 传输把原始连接的所有权交给升级器；升级失败或被取消时，传输仍需保证底层套接字不可再用；
/// - 因此连接携带一个共享的 [`CloseHandle`]：传输在交出所有权前保留句柄，
///   失败路径上调用 [`CloseHandle::close`]，此后所有读写立即报错。
///
/// ## 契约（What）
/// - `Drop` 时自动标记关闭；
/// - 标记关闭后 `poll_read`/`poll_write` 返回 [`io::ErrorKind::NotConnected`]，
///   `poll_shutdown` 直接成功；
/// - 地址在构造时确定，之后不可变；
/// - 升级器应包装 `RawConnection` 本身（它实现了 [`RawStream`]）而不是拆出内部流，
///   这样关闭信号在升级后依然有效。
pub struct RawConnection {
    stream: BoxStream,
    local: Multiaddr,
    remote: Multiaddr,
    closed: CloseHandle,
}

impl RawConnection {
    pub fn new(stream: BoxStream, local: Multiaddr, remote: Multiaddr) -> Self {
        Self {
            stream,
            local,
            remote,
            closed: CloseHandle::default(),
        }
    }

    pub fn local_multiaddr(&self) -> &Multiaddr {
        &self.local
    }

    pub fn remote_multiaddr(&self) -> &Multiaddr {
        &self.remote
    }

    /// 共享关闭信号的句柄。
    pub fn close_handle(&self) -> CloseHandle {
        self.closed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_closed()
    }

    /// 优雅关闭写半部并标记关闭。
    pub async fn close(&mut self) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;

        if self.closed.close() {
            self.stream.shutdown().await
        } else {
            Ok(())
        }
    }
}

impl Drop for RawConnection {
    fn drop(&mut self) {
        self.closed.close();
    }
}

impl fmt::Debug for RawConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawConnection")
            .field("local", &self.local)
            .field("remote", &self.remote)
            .field("closed", &self.closed.is_closed())
            .finish()
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "raw connection closed")
}

impl AsyncRead for RawConnection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.closed.is_closed() {
            return Poll::Ready(Err(closed_error()));
        }
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for RawConnection {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.closed.is_closed() {
            return Poll::Ready(Err(closed_error()));
        }
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.closed.is_closed() {
            return Poll::Ready(Err(closed_error()));
        }
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.closed.is_closed() {
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

/// 原始连接的共享关闭信号。
#[derive(Clone, Debug, Default)]
pub struct CloseHandle {
    flag: Arc<AtomicBool>,
}

impl CloseHandle {
    /// 标记关闭，返回是否为首次标记。
    pub fn close(&self) -> bool {
        !self.flag.swap(true, Ordering::AcqRel)
    }

    pub fn is_closed(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// 升级完成后的连接：已加密、已多路复用，并可能已验证对端身份。
///
/// # 契约说明（What）
/// - `local_multiaddr`/`remote_multiaddr` 与原始连接的地址一致；
/// - `remote_peer` 在升级器完成身份验证后返回 `Some`；
/// - `open_stream`/`accept_stream` 由多路复用实现提供，关闭后返回错误；
/// - `close` 幂等。
#[async_trait]
pub trait CapableConnection: Send + Sync + fmt::Debug {
    fn local_multiaddr(&self) -> &Multiaddr;

    fn remote_multiaddr(&self) -> &Multiaddr;

    fn remote_peer(&self) -> Option<&PeerId>;

    /// 发起一条新的逻辑流。
    async fn open_stream(&self) -> io::Result<BoxStream>;

    /// 等待对端发起的逻辑流。
    async fn accept_stream(&self) -> io::Result<BoxStream>;

    async fn close(&self) -> io::Result<()>;

    fn is_closed(&self) -> bool;
}
