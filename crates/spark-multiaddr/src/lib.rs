#![doc = r#"
# spark-multiaddr

## 设计动机（Why）
- **定位**：为点对点传输提供自描述的结构化地址（`/ip4/1.2.3.4/tcp/80/ws` 形态），
  以及可在启动阶段扩展的协议注册表。
- **架构角色**：传输实现（例如 `spark-transport-ws`）通过本 crate 判断“能否理解某地址”
  与“能否直接拨号某地址”，并在结构化地址与原生套接字地址之间互转。
- **设计理念**：注册表在启动阶段可变、冻结后只读，以 `Arc` 共享，避免进程级可变全局表。

## 核心契约（What）
- [`ProtocolRegistry`]：协议码/名称唯一，解析文本与二进制形态；
- [`Multiaddr`]：不可变组件序列，文本与二进制形态可无损往返；
- [`Pattern`]：`Base`/`And`/`Or` 三种变体组成的地址格式谓词；
- [`NetCodecRegistry`]：按网络名或协议名分派的地址编解码表。

## 实现策略（How）
- 协议码与变长值长度使用无符号 LEB128 varint 编码（见 [`varint`]）；
- 每个协议通过 [`Transcoder`] 自带值格式，新增协议无需修改解析器。

## 风险与考量（Trade-offs）
- 对等身份值仅按 base58 字符集校验，二进制形态为其 UTF-8 文本；
  多重哈希解码属于身份层职责。
- 名称类协议（`dns*`）不在本 crate 内解析为 IP。
"#]

pub mod error;
pub mod fmt;
pub mod multiaddr;
pub mod net;
pub mod protocol;
pub mod registry;
pub mod varint;

pub use error::{CodecError, MultiaddrError, RegistrationError};
pub use fmt::Pattern;
pub use multiaddr::{Component, Multiaddr};
pub use net::{
    NetAddr, NetCodec, NetCodecBuilder, NetCodecRegistry, multiaddr_to_socket_addr,
    socket_addr_to_multiaddr,
};
pub use protocol::{ProtocolDescriptor, SizeHint, Transcoder};
pub use registry::{ProtocolRegistry, RegistryBuilder};
