use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use bytes::Bytes;

use crate::error::MultiaddrError;
use crate::protocol::{ProtocolDescriptor, SizeHint};
use crate::varint;

/// 结构化地址中的单个组件：`(协议, 值)`。
///
/// 组件持有注册表中描述符的 `Arc`，因此无需注册表即可格式化；
/// 相等性只比较协议码与二进制值。
#[derive(Clone)]
pub struct Component {
    protocol: Arc<ProtocolDescriptor>,
    value: Bytes,
}

impl Component {
    /// 以文本值构造组件，值经由协议的 [`Transcoder`](crate::Transcoder) 校验。
    pub fn new(protocol: Arc<ProtocolDescriptor>, value: &str) -> Result<Self, MultiaddrError> {
        let value = match (protocol.size(), protocol.transcoder()) {
            (SizeHint::Zero, _) | (_, None) => {
                if !value.is_empty() {
                    return Err(invalid_value(&protocol, value, "protocol takes no value"));
                }
                Bytes::new()
            }
            (_, Some(transcoder)) => {
                let bytes = transcoder
                    .string_to_bytes(value)
                    .map_err(|reason| invalid_value(&protocol, value, reason))?;
                Bytes::from(bytes)
            }
        };
        Ok(Self { protocol, value })
    }

    /// 以二进制值构造组件。
    pub fn from_bytes(
        protocol: Arc<ProtocolDescriptor>,
        value: impl Into<Bytes>,
    ) -> Result<Self, MultiaddrError> {
        let value = value.into();
        match (protocol.size(), protocol.transcoder()) {
            (SizeHint::Zero, _) | (_, None) if !value.is_empty() => {
                return Err(invalid_value(
                    &protocol,
                    &format!("{:02x?}", &value[..]),
                    "protocol takes no value",
                ));
            }
            (size, Some(transcoder)) => {
                if let Some(expected) = size.fixed_bytes()
                    && expected != value.len()
                {
                    return Err(invalid_value(
                        &protocol,
                        &format!("{:02x?}", &value[..]),
                        format!("expected {expected} bytes"),
                    ));
                }
                transcoder.validate_bytes(&value).map_err(|reason| {
                    invalid_value(&protocol, &format!("{:02x?}", &value[..]), reason)
                })?;
            }
            _ => {}
        }
        Ok(Self { protocol, value })
    }

    /// 标记型组件（不带值）的便捷构造。
    pub fn marker(protocol: Arc<ProtocolDescriptor>) -> Result<Self, MultiaddrError> {
        Self::new(protocol, "")
    }

    pub fn protocol(&self) -> &Arc<ProtocolDescriptor> {
        &self.protocol
    }

    pub fn code(&self) -> u32 {
        self.protocol.code()
    }

    pub fn name(&self) -> &str {
        self.protocol.name()
    }

    /// 二进制值；标记型协议为空。
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// 文本值；标记型协议返回 `None`。
    pub fn value_string(&self) -> Option<String> {
        let transcoder = self.protocol.transcoder()?;
        transcoder.bytes_to_string(&self.value).ok()
    }

    fn write_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.protocol.vcode());
        match self.protocol.size() {
            SizeHint::Zero => {}
            SizeHint::Fixed(_) => out.extend_from_slice(&self.value),
            SizeHint::Variable => {
                varint::encode_into(self.value.len() as u64, out);
                out.extend_from_slice(&self.value);
            }
        }
    }
}

fn invalid_value(
    protocol: &ProtocolDescriptor,
    value: &str,
    reason: impl Into<String>,
) -> MultiaddrError {
    MultiaddrError::InvalidValue {
        protocol: protocol.name().to_owned(),
        value: value.to_owned(),
        reason: reason.into(),
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.code() == other.code() && self.value == other.value
    }
}

impl Eq for Component {}

impl Hash for Component {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.code().hash(state);
        self.value.hash(state);
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.name())?;
        if let Some(value) = self.value_string() {
            write!(f, "/{value}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// 自描述结构化地址：有序、不可变的组件序列。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 让传输层以统一结构描述“网络层 + 传输层 + 方案标记 + 可选身份”，而不是拼接字符串；
/// - 组件以 `Arc<[Component]>` 共享，克隆地址只增加引用计数，可在并发拨号间自由传递。
///
/// ## 契约（What）
/// - 构造后不可变：[`encapsulate`](Self::encapsulate)、[`decapsulate`](Self::decapsulate)、
///   [`with`](Self::with) 都返回新地址；
/// - `Display` 输出 `/name/value/...` 文本形态，[`to_bytes`](Self::to_bytes) 输出二进制形态，
///   两者经 [`ProtocolRegistry`](crate::ProtocolRegistry) 解析后与原地址逐组件相等。
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Multiaddr {
    components: Arc<[Component]>,
}

impl Multiaddr {
    /// 空地址。
    pub fn empty() -> Self {
        Self::from_components(Vec::new())
    }

    pub fn from_components(components: Vec<Component>) -> Self {
        Self {
            components: components.into(),
        }
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Component> {
        self.components.iter()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// 组件协议码序列。
    pub fn protocol_codes(&self) -> Vec<u32> {
        self.components.iter().map(Component::code).collect()
    }

    /// 第一个协议码为 `code` 的组件。
    pub fn find(&self, code: u32) -> Option<&Component> {
        self.components.iter().find(|c| c.code() == code)
    }

    /// 二进制形态。
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for component in self.components.iter() {
            component.write_bytes(&mut out);
        }
        out
    }

    /// 在末尾追加 `other` 的全部组件。
    pub fn encapsulate(&self, other: &Multiaddr) -> Multiaddr {
        let mut components = self.components.to_vec();
        components.extend(other.components.iter().cloned());
        Self::from_components(components)
    }

    /// 在末尾追加单个组件。
    pub fn with(&self, component: Component) -> Multiaddr {
        let mut components = self.components.to_vec();
        components.push(component);
        Self::from_components(components)
    }

    /// 从最后一次出现 `code` 的位置截断（含该组件）。
    ///
    /// 若地址中不存在该协议，返回原地址的克隆。
    pub fn decapsulate(&self, code: u32) -> Multiaddr {
        match self.components.iter().rposition(|c| c.code() == code) {
            Some(index) => Self::from_components(self.components[..index].to_vec()),
            None => self.clone(),
        }
    }

    /// 前 `len` 个组件组成的新地址。
    pub fn prefix(&self, len: usize) -> Multiaddr {
        let len = len.min(self.components.len());
        Self::from_components(self.components[..len].to_vec())
    }
}

impl Default for Multiaddr {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for Multiaddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return f.write_str("/");
        }
        for component in self.components.iter() {
            fmt::Display::fmt(component, f)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Multiaddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Multiaddr({self})")
    }
}

impl<'a> IntoIterator for &'a Multiaddr {
    type Item = &'a Component;
    type IntoIter = std::slice::Iter<'a, Component>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
