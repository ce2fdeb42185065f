//! 集成测试共享的桩升级器、证书工具与注册表构造。
//!
//! # 教案式说明
//! - **Why**：真实的安全/多路复用升级不在本仓库内；测试以“直通”升级器把原始连接原样包装为
//!   [`CapableConnection`]，从而在真实 TCP/TLS 字节流上验证传输的编排逻辑；
//! - **What**：提供直通、拒绝与挂起三类升级器，以及基于 `rcgen` 的自签名证书工具。

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use anyhow::Context;
use async_trait::async_trait;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use spark_multiaddr::{Multiaddr, NetCodecBuilder, NetCodecRegistry, RegistryBuilder};
use spark_transport::{
    BoxStream, CallContext, CapableConnection, CloseHandle, PeerId, RawConnection, UpgradeError,
    Upgrader,
};
use spark_transport_ws::{TransportConfig, WsTransport, register_codecs, register_protocols};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// 登记了 `wss` 与两个 WebSocket 编解码条目的注册表。
pub fn codecs() -> Arc<NetCodecRegistry> {
    let mut protocols = RegistryBuilder::with_standard_protocols();
    register_protocols(&mut protocols).expect("register wss");
    let mut codecs = NetCodecBuilder::with_standard_codecs();
    register_codecs(&mut codecs).expect("register websocket codecs");
    codecs.freeze(protocols.freeze())
}

pub fn addr(text: &str) -> Multiaddr {
    codecs()
        .protocols()
        .parse_str(text)
        .unwrap_or_else(|err| panic!("parse {text}: {err}"))
}

pub fn transport(upgrader: Arc<dyn Upgrader>, config: TransportConfig) -> WsTransport {
    WsTransport::new(upgrader, codecs(), config).expect("transport")
}

/// 把原始连接原样暴露为单一流的连接。
#[derive(Debug)]
pub struct PassthroughConnection {
    local: Multiaddr,
    remote: Multiaddr,
    peer: Option<PeerId>,
    raw: tokio::sync::Mutex<Option<RawConnection>>,
    handle: CloseHandle,
}

impl PassthroughConnection {
    pub fn new(raw: RawConnection, peer: Option<PeerId>) -> Self {
        Self {
            local: raw.local_multiaddr().clone(),
            remote: raw.remote_multiaddr().clone(),
            peer,
            handle: raw.close_handle(),
            raw: tokio::sync::Mutex::new(Some(raw)),
        }
    }

    async fn take(&self) -> io::Result<BoxStream> {
        match self.raw.lock().await.take() {
            Some(raw) => Ok(Box::new(raw)),
            None => Err(io::Error::other("stream already taken")),
        }
    }
}

#[async_trait]
impl CapableConnection for PassthroughConnection {
    fn local_multiaddr(&self) -> &Multiaddr {
        &self.local
    }

    fn remote_multiaddr(&self) -> &Multiaddr {
        &self.remote
    }

    fn remote_peer(&self) -> Option<&PeerId> {
        self.peer.as_ref()
    }

    async fn open_stream(&self) -> io::Result<BoxStream> {
        self.take().await
    }

    async fn accept_stream(&self) -> io::Result<BoxStream> {
        self.take().await
    }

    async fn close(&self) -> io::Result<()> {
        if let Some(mut raw) = self.raw.lock().await.take() {
            raw.close().await?;
        }
        self.handle.close();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }
}

/// 直通升级器；前 `reject_inbound` 个入站连接以安全握手失败拒绝。
#[derive(Debug, Default)]
pub struct PassthroughUpgrader {
    reject_inbound: usize,
    inbound_seen: AtomicUsize,
}

impl PassthroughUpgrader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rejecting_first_inbound(count: usize) -> Arc<Self> {
        Arc::new(Self {
            reject_inbound: count,
            inbound_seen: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Upgrader for PassthroughUpgrader {
    async fn upgrade_outbound(
        &self,
        _ctx: &CallContext,
        _transport: &'static str,
        raw: RawConnection,
        expected_peer: Option<&PeerId>,
    ) -> Result<Box<dyn CapableConnection>, UpgradeError> {
        Ok(Box::new(PassthroughConnection::new(raw, expected_peer.cloned())))
    }

    async fn upgrade_inbound(
        &self,
        _ctx: &CallContext,
        _transport: &'static str,
        raw: RawConnection,
    ) -> Result<Box<dyn CapableConnection>, UpgradeError> {
        if self.inbound_seen.fetch_add(1, Ordering::SeqCst) < self.reject_inbound {
            return Err(UpgradeError::Security("handshake rejected".into()));
        }
        Ok(Box::new(PassthroughConnection::new(raw, None)))
    }
}

/// 永不完成的升级器；记录收到的原始连接关闭句柄，供测试断言其已关闭。
#[derive(Debug, Default)]
pub struct HangingUpgrader {
    handles: Mutex<Vec<CloseHandle>>,
}

impl HangingUpgrader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn handles(&self) -> Vec<CloseHandle> {
        self.handles.lock().expect("handles lock").clone()
    }

    async fn hang(&self, raw: RawConnection) -> Result<Box<dyn CapableConnection>, UpgradeError> {
        self.handles
            .lock()
            .expect("handles lock")
            .push(raw.close_handle());
        let _raw = raw;
        std::future::pending().await
    }
}

#[async_trait]
impl Upgrader for HangingUpgrader {
    async fn upgrade_outbound(
        &self,
        _ctx: &CallContext,
        _transport: &'static str,
        raw: RawConnection,
        _expected_peer: Option<&PeerId>,
    ) -> Result<Box<dyn CapableConnection>, UpgradeError> {
        self.hang(raw).await
    }

    async fn upgrade_inbound(
        &self,
        _ctx: &CallContext,
        _transport: &'static str,
        raw: RawConnection,
    ) -> Result<Box<dyn CapableConnection>, UpgradeError> {
        self.hang(raw).await
    }
}

/// 服务端：接受一个流，读取 `len` 字节后原样写回。
pub async fn echo_once(connection: Box<dyn CapableConnection>, len: usize) -> anyhow::Result<()> {
    let mut stream = connection.accept_stream().await.context("accept stream")?;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.context("read request")?;
    stream.write_all(&buf).await.context("write echo")?;
    stream.flush().await.context("flush echo")?;
    Ok(())
}

/// 客户端：打开一个流，发送 `payload` 并读取回显。
pub async fn ping(connection: &dyn CapableConnection, payload: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut stream = connection.open_stream().await.context("open stream")?;
    stream.write_all(payload).await.context("write request")?;
    stream.flush().await.context("flush request")?;
    let mut buf = vec![0u8; payload.len()];
    stream.read_exact(&mut buf).await.context("read echo")?;
    Ok(buf)
}

/// 进程内只安装一次 AWS-LC 提供者。
pub fn ensure_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        rustls::crypto::aws_lc_rs::default_provider()
            .install_default()
            .expect("AWS-LC provider 注册失败，请检查 rustls 特性开关");
    });
}

/// 为 `subject`（IP 字面量或主机名）签发自签名证书，返回服务端配置与证书 DER。
pub fn self_signed(subject: &str) -> anyhow::Result<(Arc<ServerConfig>, CertificateDer<'static>)> {
    ensure_crypto_provider();
    let mut params = CertificateParams::new(vec![subject.to_string()]).context("证书参数")?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, subject);
    params.distinguished_name = dn;
    let key_pair = KeyPair::generate().context("生成私钥")?;
    let certificate = params.self_signed(&key_pair).context("签发证书")?;
    let cert_der = certificate.der().clone();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der.clone()], key)
        .context("服务端 TLS 配置")?;
    Ok((Arc::new(config), cert_der))
}

/// 只信任 `certificate` 的客户端配置。
pub fn trusting(certificate: CertificateDer<'static>) -> anyhow::Result<Arc<ClientConfig>> {
    ensure_crypto_provider();
    let mut roots = RootCertStore::empty();
    roots.add(certificate).context("写入 Root Store")?;
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}
