#![deny(unsafe_code)]
#![doc = r#"
spark-transport-ws：WebSocket 传输胶水层。

# 使命概述
- **Why**：把 `ws`/`wss` 结构化地址接入宿主节点，使其可以像其它传输一样拨号、监听，
  并在原始字节流之上完成安全与多路复用升级。
- **What**：
  - 启动阶段登记 `wss`（478）协议与 `"websocket"`/`"websocket secure"` 两个编解码条目；
  - 两条地址格式：[`WS_FMT`]（可理解）与 [`WS_FMT_DIAL`]（可直接拨号，仅 IP 字面量）；
  - [`WsTransport`]：按阶段拨号，并在握手超时、取消与截止约束下完成出站升级；
  - [`WsListener`]：每个入站连接在独立任务中握手与升级，单连接失败交给 [`ListenerObserver`] 与 `warn!` 日志。
- **How**：原始层为 Tokio TCP 与 `tokio-rustls`，经 [`RawDialer`]/[`RawBinder`] 注入；
  升级器实现 [`spark_transport::Upgrader`]，由宿主提供。

# 注意事项（Trade-offs）
- WebSocket 帧格式不在本层实现：原始层只搬运字节，帧编解码由宿主在原始层之上接入；
- 名称地址（`/dns4/..`）可以监听但不可直接拨号，名称解析属于宿主的职责。
"#]

pub mod codec;
pub mod config;
pub mod error;
pub mod listener;
pub mod protocol;
pub mod raw;
pub mod settings;
pub mod transport;

mod util;

pub use codec::{Host, WS_CODEC, WSS_CODEC, WsAddr, from_native, parse_native, to_native};
pub use config::{DEFAULT_HANDSHAKE_TIMEOUT, TransportConfig, TransportConfigBuilder, TransportOption};
pub use error::{
    CancelReason, ConfigIssue, ConfigurationError, DialStage, OperationKind, RawError,
    TransportError,
};
pub use listener::{FailureCounter, InboundFailure, InboundStage, ListenerObserver, NoopObserver, WsListener};
pub use protocol::{
    P_WSS, WS_FMT, WS_FMT_DIAL, WS_NETWORK, WSS_NETWORK, register_codecs, register_protocols,
    wss_descriptor,
};
pub use raw::{
    RawBindRequest, RawBinder, RawDialRequest, RawDialer, RawListener, RawSocket, TcpRawTransport,
};
pub use settings::TransportSettings;
pub use transport::WsTransport;
