use std::future::Future;
use std::time::Duration;

use spark_transport::{CallContext, Cancellation};
use tokio::time::Instant as TokioInstant;

use crate::error::CancelReason;

const CANCELLATION_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// 阻塞操作被打断的来源。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Interrupted {
    /// 调用上下文的取消或截止时间。
    Context(CancelReason),
    /// 额外的守护令牌（例如监听器关闭）被触发。
    Guard,
}

pub(crate) async fn wait_for_cancellation(cancellation: &Cancellation) {
    while !cancellation.is_cancelled() {
        tokio::time::sleep(CANCELLATION_POLL_INTERVAL).await;
    }
}

async fn wait_for_guard(guard: Option<&Cancellation>) {
    match guard {
        Some(guard) => wait_for_cancellation(guard).await,
        None => std::future::pending().await,
    }
}

async fn wait_for_deadline(ctx: &CallContext) {
    match ctx.deadline().instant() {
        Some(deadline) => tokio::time::sleep_until(TokioInstant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

/// 在保留取消/截止语义的前提下执行 Future。
///
/// # 逻辑（How）
/// 1. 先同步检查守护令牌、截止时间与取消位，已触发则不启动 `future`；
/// 2. 以 `biased` 的 `tokio::select!` 依次观察守护令牌、取消位、截止时间与 `future`；
/// 3. 任一打断来源先就绪时，`future` 被丢弃，其持有的资源（套接字、原始连接）随之释放。
pub(crate) async fn run_with_context<F, T>(
    ctx: &CallContext,
    guard: Option<&Cancellation>,
    future: F,
) -> Result<T, Interrupted>
where
    F: Future<Output = T>,
{
    if guard.is_some_and(Cancellation::is_cancelled) {
        return Err(Interrupted::Guard);
    }
    if ctx.deadline().is_expired(std::time::Instant::now()) {
        return Err(Interrupted::Context(CancelReason::DeadlineExceeded));
    }
    if ctx.cancellation().is_cancelled() {
        return Err(Interrupted::Context(CancelReason::Cancelled));
    }

    tokio::select! {
        biased;
        _ = wait_for_guard(guard) => Err(Interrupted::Guard),
        _ = wait_for_cancellation(ctx.cancellation()) => {
            Err(Interrupted::Context(CancelReason::Cancelled))
        }
        _ = wait_for_deadline(ctx) => Err(Interrupted::Context(CancelReason::DeadlineExceeded)),
        output = future => Ok(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spark_transport::Deadline;

    #[tokio::test]
    async fn completes_when_nothing_interrupts() {
        let ctx = CallContext::default();
        assert_eq!(run_with_context(&ctx, None, async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn pre_cancelled_context_never_polls_future() {
        let ctx = CallContext::default();
        ctx.cancellation().cancel();
        let result = run_with_context(&ctx, None, async {
            panic!("future must not be polled");
        })
        .await;
        assert_eq!(
            result,
            Err::<(), _>(Interrupted::Context(CancelReason::Cancelled))
        );
    }

    #[tokio::test]
    async fn deadline_interrupts_pending_future() {
        let ctx = CallContext::builder()
            .with_deadline(Deadline::with_timeout(Duration::from_millis(20)))
            .build();
        let result = run_with_context(&ctx, None, std::future::pending::<()>()).await;
        assert_eq!(
            result,
            Err(Interrupted::Context(CancelReason::DeadlineExceeded))
        );
    }

    #[tokio::test]
    async fn guard_interrupts_pending_future() {
        let ctx = CallContext::default();
        let guard = Cancellation::new();
        let trigger = guard.child();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let result = run_with_context(&ctx, Some(&guard), std::future::pending::<()>()).await;
        assert_eq!(result, Err(Interrupted::Guard));
    }
}
