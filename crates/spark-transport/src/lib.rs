#![deny(unsafe_code)]
#![doc = "spark-transport: 点对点传输层契约。"]
#![doc = ""]
#![doc = "== 使命概述 =="]
#![doc = "- **Why**：为 WebSocket 等传输实现与宿主节点之间提供共同语言，升级器与原始字节流层均可替换为桩实现。"]
#![doc = "- **What**：定义调用上下文（取消 + 截止）、对端身份、原始连接、升级器、升级后连接、传输与监听器契约。"]
#![doc = "- **How**：异步契约以 `async-trait` 表达，便于以 trait 对象形式注入；字节流统一为 Tokio 的 `AsyncRead + AsyncWrite`。"]

pub mod connection;
pub mod context;
pub mod peer;
pub mod transport;
pub mod upgrader;

pub use connection::{BoxStream, CapableConnection, CloseHandle, RawConnection, RawStream};
pub use context::{CallContext, CallContextBuilder, Cancellation, Deadline};
pub use peer::{PeerId, PeerIdError};
pub use transport::{Listener, Transport};
pub use upgrader::{UpgradeError, Upgrader};
