use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{MultiaddrError, RegistrationError};
use crate::multiaddr::{Component, Multiaddr};
use crate::protocol::{ProtocolDescriptor, SizeHint, standard_protocols};
use crate::varint;

/// 启动阶段使用的协议注册表草稿。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 用显式对象取代进程级可变全局表：宿主在初始化阶段持有唯一的可变草稿，注册完成后调用
///   [`freeze`](Self::freeze) 得到只读的 [`ProtocolRegistry`]；
/// - 只读表通过 `Arc` 共享，任意数量的并发读者都无需加锁。
///
/// ## 契约（What）
/// - `register` 在协议码或名称冲突时返回 [`RegistrationError`]，且草稿内容保持不变；
/// - `freeze` 消费草稿，之后不存在任何注册入口。
///
/// ## 注意事项（Trade-offs）
/// - 不支持注销：已冻结的表在进程生命周期内保持不变。
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    by_code: HashMap<u32, Arc<ProtocolDescriptor>>,
    by_name: HashMap<String, Arc<ProtocolDescriptor>>,
}

impl RegistryBuilder {
    /// 空草稿。
    pub fn new() -> Self {
        Self::default()
    }

    /// 预装核心内置协议（`ip4`、`ip6`、`tcp`、`dns*`、`p2p`、`ws`）。
    pub fn with_standard_protocols() -> Self {
        let mut builder = Self::new();
        for descriptor in standard_protocols() {
            // 内置表在编译期即保证唯一。
            builder.insert(descriptor);
        }
        builder
    }

    /// 注册一个协议描述符。
    pub fn register(&mut self, descriptor: ProtocolDescriptor) -> Result<(), RegistrationError> {
        descriptor
            .validate()
            .map_err(|reason| RegistrationError::InvalidDescriptor {
                name: descriptor.name().to_owned(),
                reason,
            })?;
        if let Some(existing) = self.by_code.get(&descriptor.code()) {
            return Err(RegistrationError::DuplicateCode {
                code: descriptor.code(),
                existing: existing.name().to_owned(),
            });
        }
        if let Some(existing) = self.by_name.get(descriptor.name()) {
            return Err(RegistrationError::DuplicateName {
                name: descriptor.name().to_owned(),
                existing: existing.code(),
            });
        }
        self.insert(descriptor);
        Ok(())
    }

    /// 当前草稿是否已包含某协议码。
    pub fn contains_code(&self, code: u32) -> bool {
        self.by_code.contains_key(&code)
    }

    /// 结束注册阶段。
    pub fn freeze(self) -> Arc<ProtocolRegistry> {
        Arc::new(ProtocolRegistry {
            by_code: self.by_code,
            by_name: self.by_name,
        })
    }

    fn insert(&mut self, descriptor: ProtocolDescriptor) {
        let descriptor = Arc::new(descriptor);
        self.by_name
            .insert(descriptor.name().to_owned(), Arc::clone(&descriptor));
        self.by_code.insert(descriptor.code(), descriptor);
    }
}

/// 冻结后的协议注册表，负责查找与结构化地址解析。
#[derive(Debug)]
pub struct ProtocolRegistry {
    by_code: HashMap<u32, Arc<ProtocolDescriptor>>,
    by_name: HashMap<String, Arc<ProtocolDescriptor>>,
}

impl ProtocolRegistry {
    /// 进入注册阶段。
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// 仅含内置协议的冻结表。
    pub fn standard() -> Arc<Self> {
        RegistryBuilder::with_standard_protocols().freeze()
    }

    pub fn lookup_code(&self, code: u32) -> Option<&Arc<ProtocolDescriptor>> {
        self.by_code.get(&code)
    }

    pub fn lookup_name(&self, name: &str) -> Option<&Arc<ProtocolDescriptor>> {
        self.by_name.get(name)
    }

    /// 以 varint 形式的协议码查找，返回描述符与剩余字节。
    pub fn lookup_vcode<'a>(
        &self,
        bytes: &'a [u8],
    ) -> Result<(&Arc<ProtocolDescriptor>, &'a [u8]), MultiaddrError> {
        let (code, rest) = varint::decode(bytes)?;
        let descriptor = u32::try_from(code)
            .ok()
            .and_then(|code| self.by_code.get(&code))
            .ok_or(MultiaddrError::UnknownProtocolCode(code))?;
        Ok((descriptor, rest))
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    /// 已注册的全部协议码，升序。
    pub fn codes(&self) -> Vec<u32> {
        let mut codes: Vec<u32> = self.by_code.keys().copied().collect();
        codes.sort_unstable();
        codes
    }

    /// 以协议名与文本值构造组件。
    pub fn component(&self, name: &str, value: &str) -> Result<Component, MultiaddrError> {
        let descriptor = self
            .lookup_name(name)
            .ok_or_else(|| MultiaddrError::UnknownProtocolName(name.to_owned()))?;
        Component::new(Arc::clone(descriptor), value)
    }

    /// 解析文本形态 `/name/value/...`。
    ///
    /// # 逻辑（How）
    /// 1. 去掉末尾多余的 `/`，要求首字符为 `/`；
    /// 2. 逐段读取协议名，按 [`SizeHint`] 决定是否再读取一个值段；
    /// 3. 值段交给协议的值编解码器校验并转为二进制。
    pub fn parse_str(&self, text: &str) -> Result<Multiaddr, MultiaddrError> {
        let trimmed = text.trim_end_matches('/');
        if !text.starts_with('/') {
            return Err(MultiaddrError::MissingLeadingSlash(text.to_owned()));
        }
        let mut components = Vec::new();
        let mut segments = trimmed.split('/').skip(1);
        while let Some(name) = segments.next() {
            let descriptor = self
                .lookup_name(name)
                .ok_or_else(|| MultiaddrError::UnknownProtocolName(name.to_owned()))?;
            let component = match descriptor.size() {
                SizeHint::Zero => Component::marker(Arc::clone(descriptor))?,
                SizeHint::Fixed(_) | SizeHint::Variable => {
                    let value = segments.next().ok_or_else(|| MultiaddrError::MissingValue {
                        protocol: name.to_owned(),
                    })?;
                    Component::new(Arc::clone(descriptor), value)?
                }
            };
            components.push(component);
        }
        Ok(Multiaddr::from_components(components))
    }

    /// 解析二进制形态。
    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<Multiaddr, MultiaddrError> {
        let mut components = Vec::new();
        let mut rest = bytes;
        while !rest.is_empty() {
            let (descriptor, after_code) = self.lookup_vcode(rest)?;
            let (value, after_value) = match descriptor.size() {
                SizeHint::Zero => (&after_code[..0], after_code),
                SizeHint::Fixed(bits) => split_exact(after_code, bits / 8)?,
                SizeHint::Variable => {
                    let (len, after_len) = varint::decode(after_code)?;
                    let len = usize::try_from(len).map_err(|_| MultiaddrError::Truncated)?;
                    split_exact(after_len, len)?
                }
            };
            components.push(Component::from_bytes(
                Arc::clone(descriptor),
                value.to_vec(),
            )?);
            rest = after_value;
        }
        Ok(Multiaddr::from_components(components))
    }
}

fn split_exact(input: &[u8], len: usize) -> Result<(&[u8], &[u8]), MultiaddrError> {
    if input.len() < len {
        return Err(MultiaddrError::Truncated);
    }
    Ok(input.split_at(len))
}
