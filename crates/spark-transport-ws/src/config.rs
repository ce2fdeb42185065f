//! 传输配置：由命名选项记录构造的不可变值。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 以有序的选项列表描述配置，每个选项独立校验；全部问题聚合为一个
//!   [`ConfigurationError`]，调用方一次即可看到所有冲突；
//! - 构造完成后配置不可变，传输在整个生命周期内按同一份配置工作。
//!
//! ## 契约（What）
//! - 同名选项出现两次记为 [`ConfigIssue::DuplicateOption`]；
//! - 握手超时为零记为 [`ConfigIssue::ZeroHandshakeTimeout`]；
//! - `AllowSelfSigned(true)` 与显式 `TlsClientConfig` 同时出现记为
//!   [`ConfigIssue::SelfSignedWithCustomClientConfig`]；
//! - `AllowSelfSigned(true)` 且未提供客户端配置时，构造阶段生成接受任意证书的客户端配置。
//!
//! ## 注意事项（Trade-offs）
//! - 接受任意证书的配置只跳过证书链校验，握手签名仍按密码学提供者校验；
//!   它只适用于测试或已由上层身份协议保证对端身份的部署。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, aws_lc_rs, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, ServerConfig, SignatureScheme};

use crate::error::{ConfigIssue, ConfigurationError};

/// 默认握手超时。
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// 单个命名选项。
#[derive(Clone)]
pub enum TransportOption {
    /// `wss` 拨号使用的 TLS 客户端配置。
    TlsClientConfig(Arc<ClientConfig>),
    /// `wss` 监听使用的 TLS 服务端配置。
    TlsServerConfig(Arc<ServerConfig>),
    /// 升级（以及入站 TLS 握手）的超时。
    HandshakeTimeout(Duration),
    /// 拨号时接受自签名证书。
    AllowSelfSigned(bool),
}

impl TransportOption {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TlsClientConfig(_) => "tls_client_config",
            Self::TlsServerConfig(_) => "tls_server_config",
            Self::HandshakeTimeout(_) => "handshake_timeout",
            Self::AllowSelfSigned(_) => "allow_self_signed",
        }
    }
}

impl fmt::Debug for TransportOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HandshakeTimeout(timeout) => write!(f, "HandshakeTimeout({timeout:?})"),
            Self::AllowSelfSigned(allow) => write!(f, "AllowSelfSigned({allow})"),
            other => write!(f, "{}(..)", other.name()),
        }
    }
}

/// 构造完成的传输配置。
#[derive(Clone)]
pub struct TransportConfig {
    tls_client: Option<Arc<ClientConfig>>,
    tls_server: Option<Arc<ServerConfig>>,
    handshake_timeout: Duration,
    allow_self_signed: bool,
}

impl TransportConfig {
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::default()
    }

    /// 依次应用选项；所有问题聚合后一次返回。
    pub fn from_options(
        options: impl IntoIterator<Item = TransportOption>,
    ) -> Result<Self, ConfigurationError> {
        let mut issues = Vec::new();
        let mut seen: Vec<&'static str> = Vec::new();
        let mut tls_client = None;
        let mut tls_server = None;
        let mut handshake_timeout = None;
        let mut allow_self_signed = false;

        for option in options {
            let name = option.name();
            if seen.contains(&name) {
                issues.push(ConfigIssue::DuplicateOption(name));
                continue;
            }
            seen.push(name);
            match option {
                TransportOption::TlsClientConfig(config) => tls_client = Some(config),
                TransportOption::TlsServerConfig(config) => tls_server = Some(config),
                TransportOption::HandshakeTimeout(timeout) => {
                    if timeout.is_zero() {
                        issues.push(ConfigIssue::ZeroHandshakeTimeout);
                    }
                    handshake_timeout = Some(timeout);
                }
                TransportOption::AllowSelfSigned(allow) => allow_self_signed = allow,
            }
        }

        if allow_self_signed && tls_client.is_some() {
            issues.push(ConfigIssue::SelfSignedWithCustomClientConfig);
        }
        if allow_self_signed && tls_client.is_none() && issues.is_empty() {
            match accept_any_certificate_config() {
                Ok(config) => tls_client = Some(config),
                Err(err) => issues.push(ConfigIssue::Tls(err.to_string())),
            }
        }

        if !issues.is_empty() {
            return Err(ConfigurationError { issues });
        }
        Ok(Self {
            tls_client,
            tls_server,
            handshake_timeout: handshake_timeout.unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT),
            allow_self_signed,
        })
    }

    pub fn tls_client_config(&self) -> Option<&Arc<ClientConfig>> {
        self.tls_client.as_ref()
    }

    pub fn tls_server_config(&self) -> Option<&Arc<ServerConfig>> {
        self.tls_server.as_ref()
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    pub fn allow_self_signed(&self) -> bool {
        self.allow_self_signed
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls_client: None,
            tls_server: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            allow_self_signed: false,
        }
    }
}

impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConfig")
            .field("tls_client", &self.tls_client.is_some())
            .field("tls_server", &self.tls_server.is_some())
            .field("handshake_timeout", &self.handshake_timeout)
            .field("allow_self_signed", &self.allow_self_signed)
            .finish()
    }
}

/// 选项记录的收集器。
#[derive(Debug, Default)]
pub struct TransportConfigBuilder {
    options: Vec<TransportOption>,
}

impl TransportConfigBuilder {
    pub fn option(mut self, option: TransportOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn options(mut self, options: impl IntoIterator<Item = TransportOption>) -> Self {
        self.options.extend(options);
        self
    }

    pub fn tls_client_config(self, config: Arc<ClientConfig>) -> Self {
        self.option(TransportOption::TlsClientConfig(config))
    }

    pub fn tls_server_config(self, config: Arc<ServerConfig>) -> Self {
        self.option(TransportOption::TlsServerConfig(config))
    }

    pub fn handshake_timeout(self, timeout: Duration) -> Self {
        self.option(TransportOption::HandshakeTimeout(timeout))
    }

    pub fn allow_self_signed(self, allow: bool) -> Self {
        self.option(TransportOption::AllowSelfSigned(allow))
    }

    pub fn build(self) -> Result<TransportConfig, ConfigurationError> {
        TransportConfig::from_options(self.options)
    }
}

/// 只跳过证书链校验的验证器；握手签名仍由提供者校验。
#[derive(Debug)]
struct AcceptAnyCertificate {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

fn accept_any_certificate_config() -> Result<Arc<ClientConfig>, rustls::Error> {
    let provider = Arc::new(aws_lc_rs::default_provider());
    let config = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate { provider }))
        .with_no_client_auth();
    Ok(Arc::new(config))
}
