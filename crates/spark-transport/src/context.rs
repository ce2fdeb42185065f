use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// 取消原语，统一表达拨号、升级与接受流程的可中断性。
///
/// # 设计背景（Why）
/// - 拨号与升级都可能长时间阻塞，调用方需要在不持有 Future 的情况下从外部打断它们；
/// - 以共享原子位表达取消状态，克隆即共享，跨任务传播无需额外同步。
///
/// # 契约说明（What）
/// - `cancel` 在首次成功设置取消位时返回 `true`，重复调用返回 `false`；
/// - 一旦取消，所有持有同一令牌的阻塞点都应尽快返回取消错误并释放资源。
///
/// # 设计取舍与风险（Trade-offs）
/// - 未提供唤醒回调，阻塞点以短间隔轮询取消位；轮询间隔决定取消的响应延迟上限。
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    /// 创建处于“未取消”状态的令牌。
    pub fn new() -> Self {
        Self::default()
    }

    /// 查询当前是否已被标记取消。
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// 将令牌标记为取消，返回是否为首次触发。
    pub fn cancel(&self) -> bool {
        self.flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 派生共享同一原子位的子令牌。
    pub fn child(&self) -> Self {
        self.clone()
    }
}

/// 截止原语，描述操作的最迟完成时间（单调时钟）。
///
/// 截止时间不会自动触发取消；阻塞点需同时观察 [`Cancellation`] 与 `Deadline`。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Deadline {
    instant: Option<Instant>,
}

impl Deadline {
    /// 未设置截止时间。
    pub const fn none() -> Self {
        Self { instant: None }
    }

    /// 以绝对时间点构造。
    pub fn at(instant: Instant) -> Self {
        Self {
            instant: Some(instant),
        }
    }

    /// 从当前时刻起 `timeout` 之后到期。
    pub fn with_timeout(timeout: Duration) -> Self {
        let now = Instant::now();
        Self::at(now.checked_add(timeout).unwrap_or(now))
    }

    pub fn instant(&self) -> Option<Instant> {
        self.instant
    }

    /// 相对 `now` 是否已经到期。
    pub fn is_expired(&self, now: Instant) -> bool {
        self.instant.is_some_and(|deadline| now >= deadline)
    }

    /// 距离到期的剩余时长；未设置时返回 `None`。
    pub fn remaining(&self) -> Option<Duration> {
        self.instant
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// 取两个截止时间中更早的一个。
    pub fn min(self, other: Deadline) -> Deadline {
        match (self.instant, other.instant) {
            (Some(a), Some(b)) => Deadline::at(a.min(b)),
            (Some(_), None) => self,
            (None, _) => other,
        }
    }
}

/// 单次调用的上下文：取消令牌 + 截止时间。
///
/// # 契约说明（What）
/// - 每个可能阻塞的传输操作（拨号、升级、接受）都接收 `&CallContext`；
/// - `CallContext` 通过 `Arc` 共享，克隆成本为常数。
#[derive(Clone, Debug)]
pub struct CallContext {
    inner: Arc<CallContextInner>,
}

#[derive(Debug)]
struct CallContextInner {
    cancellation: Cancellation,
    deadline: Deadline,
}

impl CallContext {
    pub fn builder() -> CallContextBuilder {
        CallContextBuilder::default()
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.inner.cancellation
    }

    pub fn deadline(&self) -> Deadline {
        self.inner.deadline
    }

    /// 共享取消令牌、以更早的截止时间派生子上下文。
    pub fn with_tighter_deadline(&self, deadline: Deadline) -> CallContext {
        CallContext::builder()
            .with_cancellation(self.cancellation().child())
            .with_deadline(self.deadline().min(deadline))
            .build()
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Display for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let deadline = match self.deadline().remaining() {
            Some(remaining) => format!("{remaining:?}"),
            None => "none".to_owned(),
        };
        write!(
            f,
            "CallContext{{cancelled={}, deadline={}}}",
            self.cancellation().is_cancelled(),
            deadline
        )
    }
}

/// `CallContext` 构建器。
#[derive(Debug, Default)]
pub struct CallContextBuilder {
    cancellation: Cancellation,
    deadline: Deadline,
}

impl CallContextBuilder {
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn build(self) -> CallContext {
        CallContext {
            inner: Arc::new(CallContextInner {
                cancellation: self.cancellation,
                deadline: self.deadline,
            }),
        }
    }
}
