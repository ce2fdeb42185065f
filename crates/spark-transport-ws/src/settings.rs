use std::time::Duration;

use serde::Deserialize;

use crate::config::{TransportConfig, TransportOption};
use crate::error::{ConfigIssue, ConfigurationError};

/// 可从配置文件加载的传输设置。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 运维侧通过 TOML 调整握手超时与自签名开关，无需重新编译；
/// - TLS 证书材料不在此处描述：它们由宿主加载后以 [`TransportOption`] 注入。
///
/// ## 契约（What）
/// - 未知字段视为错误，避免拼写错误被静默忽略；
/// - [`into_options`](Self::into_options) 只为显式出现的字段生成选项，
///   因此与代码中追加的选项合并时仍能检测重复。
///
/// ```toml
/// handshake_timeout_ms = 5000
/// allow_self_signed = true
/// ```
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TransportSettings {
    pub handshake_timeout_ms: Option<u64>,
    pub allow_self_signed: Option<bool>,
}

impl TransportSettings {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigurationError> {
        toml::from_str(input).map_err(|err| ConfigIssue::Settings(err.to_string()).into())
    }

    pub fn into_options(self) -> Vec<TransportOption> {
        let mut options = Vec::new();
        if let Some(millis) = self.handshake_timeout_ms {
            options.push(TransportOption::HandshakeTimeout(Duration::from_millis(
                millis,
            )));
        }
        if let Some(allow) = self.allow_self_signed {
            options.push(TransportOption::AllowSelfSigned(allow));
        }
        options
    }

    /// 仅由设置构造配置。
    pub fn into_config(self) -> Result<TransportConfig, ConfigurationError> {
        TransportConfig::from_options(self.into_options())
    }
}
