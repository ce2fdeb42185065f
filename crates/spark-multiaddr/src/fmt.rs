//! 结构化地址格式匹配语法。
//!
//! 匹配器是作用在组件序列上的谓词树：`Base` 消费一个组件，`And` 顺序消费，`Or` 在同一起点
//! 尝试多个分支。封闭的三种变体足以表达传输层关心的全部地址形状，按结构递归求值即可。

use std::fmt;

use crate::multiaddr::{Component, Multiaddr};
use crate::protocol::{P_DNS, P_DNS4, P_DNS6, P_DNSADDR, P_IP4, P_IP6, P_TCP};

/// 地址格式谓词。
///
/// # 教案级注释
///
/// ## 契约（What）
/// - `Base { code, .. }`：下一个未消费组件的协议码等于 `code` 时匹配，并消费该组件；
///   `name` 只用于渲染，不参与匹配；
/// - `And(ps)`：依次匹配，每个子模式从前一个的剩余后缀开始（顺序消费，而非集合包含）；
/// - `Or(ps)`：从同一起点依次尝试，第一个成功的分支决定剩余后缀；失败分支不消费任何组件；
/// - [`Pattern::matches`] 要求整条地址被完全消费。
///
/// ## 注意事项（Trade-offs）
/// - `Or` 取第一个成功分支而不回溯，当两个分支消费长度不同且后续依赖更长分支时可能漏判；
///   本 crate 定义的模式都保证分支间首组件互斥，不受影响。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pattern {
    Base { code: u32, name: Option<&'static str> },
    And(Vec<Pattern>),
    Or(Vec<Pattern>),
}

impl Pattern {
    /// 内置协议按名称渲染，其余协议渲染为数值码。
    pub fn base(code: u32) -> Self {
        Self::Base {
            code,
            name: well_known_name(code),
        }
    }

    /// 由扩展协议的注册方提供渲染名称。
    pub fn named(code: u32, name: &'static str) -> Self {
        Self::Base {
            code,
            name: Some(name),
        }
    }

    pub fn and(patterns: impl IntoIterator<Item = Pattern>) -> Self {
        Self::And(patterns.into_iter().collect())
    }

    pub fn or(patterns: impl IntoIterator<Item = Pattern>) -> Self {
        Self::Or(patterns.into_iter().collect())
    }

    /// 匹配前缀，成功时返回未消费的后缀。
    pub fn partial_match<'a>(&self, components: &'a [Component]) -> Option<&'a [Component]> {
        match self {
            Self::Base { code, .. } => match components.split_first() {
                Some((head, rest)) if head.code() == *code => Some(rest),
                _ => None,
            },
            Self::And(patterns) => patterns
                .iter()
                .try_fold(components, |rest, pattern| pattern.partial_match(rest)),
            Self::Or(patterns) => patterns
                .iter()
                .find_map(|pattern| pattern.partial_match(components)),
        }
    }

    /// 整条地址是否恰好被消费完。
    pub fn matches(&self, addr: &Multiaddr) -> bool {
        self.partial_match(addr.components())
            .is_some_and(|rest| rest.is_empty())
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, label: &str, patterns: &[Pattern]) -> fmt::Result {
            write!(f, "{label}(")?;
            for (index, pattern) in patterns.iter().enumerate() {
                if index > 0 {
                    f.write_str(",")?;
                }
                fmt::Display::fmt(pattern, f)?;
            }
            f.write_str(")")
        }

        match self {
            Self::Base { name: Some(name), .. } => f.write_str(name),
            Self::Base { code, name: None } => write!(f, "{code}"),
            Self::And(patterns) => join(f, "And", patterns),
            Self::Or(patterns) => join(f, "Or", patterns),
        }
    }
}

fn well_known_name(code: u32) -> Option<&'static str> {
    Some(match code {
        P_IP4 => "ip4",
        P_TCP => "tcp",
        P_IP6 => "ip6",
        P_DNS => "dns",
        P_DNS4 => "dns4",
        P_DNS6 => "dns6",
        P_DNSADDR => "dnsaddr",
        crate::protocol::P_P2P => "p2p",
        crate::protocol::P_WS => "ws",
        _ => return None,
    })
}

/// IP 字面量网络层：`ip4 | ip6`。
pub fn ip() -> Pattern {
    Pattern::or([Pattern::base(P_IP4), Pattern::base(P_IP6)])
}

/// 需解析的名称网络层：`dns | dnsaddr | dns4 | dns6`。
pub fn dns() -> Pattern {
    Pattern::or([
        Pattern::base(P_DNS),
        Pattern::base(P_DNSADDR),
        Pattern::base(P_DNS4),
        Pattern::base(P_DNS6),
    ])
}

/// 名称或 IP 之上的 TCP 端口。
pub fn tcp() -> Pattern {
    Pattern::or([
        Pattern::and([dns(), Pattern::base(P_TCP)]),
        Pattern::and([ip(), Pattern::base(P_TCP)]),
    ])
}
