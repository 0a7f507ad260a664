//! 阻塞执行器：让同步调用点安全地等待异步管线完成。
//!
//! # 设计背景（Why）
//! - 同步入口是整个激活器中唯一会阻塞物理线程的位置。若直接在调用方所处的调度环境里阻塞等待，
//!   而挂起中的工作恰好只能由这条被阻塞的线程恢复（典型如单线程运行时），调用就会永久挂起；
//! - 因此等待前先判断环境：没有环境运行时则在调用线程上以私有运行时驱动；多线程运行时借
//!   `block_in_place` 让出工作线程；单线程运行时或已处于 `futures` 执行器内部时，
//!   把工作整体搬到专用辅助线程上驱动。
//!
//! # 契约说明（What）
//! - [`BlockingRunner::run`] 在返回前一定驱动工作完成，返回其结果；
//! - [`BlockingRunner::inline_poll_allowed`] 告知激活器能否先在调用线程上试探轮询一次。
//!   当工作会被搬离当前线程，或驱动所需的私有运行时尚未建立时返回 `false`，
//!   避免试探轮询把计时器或 IO 资源绑定到错误的调度器上，或在没有反应器时直接 panic；
//! - 工作中的 panic 在调用线程上原样恢复。
//!
//! # 风险提示（Trade-offs）
//! - 私有运行时与专用线程策略下，管线内 `tokio::spawn` 的任务落在私有运行时上，随调用结束一并终止；
//! - 私有运行时按调用创建，纯同步管线也要承担这笔开销；确定管线不依赖 Tokio 资源时可显式选择
//!   `CurrentThread` 策略走试探轮询的快速路径；
//! - `CurrentThread` 策略使用 `futures` 执行器，嵌套在另一个 `futures` 执行器内部时会 panic。

use core::fmt;
use std::{panic, thread};

use futures::executor::block_on;
use serde::{Deserialize, Serialize};
use tracing::{Span, debug};

use crate::{future::BoxFuture, observability::keys, pipeline::PipelineOutcome};

/// 专用辅助线程的名称。
pub const HELPER_THREAD_NAME: &str = "spark-aspect-blocking";

/// 同步等待挂起管线的执行器契约。
pub trait BlockingRunner: Send + Sync {
    /// 在当前线程上等待挂起中的管线完成。
    fn run(&self, pending: BoxFuture<'_, PipelineOutcome>) -> PipelineOutcome;

    /// 是否允许激活器在移交前于调用线程上轮询一次。
    fn inline_poll_allowed(&self) -> bool {
        true
    }
}

impl<T> BlockingRunner for std::sync::Arc<T>
where
    T: BlockingRunner + ?Sized,
{
    fn run(&self, pending: BoxFuture<'_, PipelineOutcome>) -> PipelineOutcome {
        (**self).run(pending)
    }

    fn inline_poll_allowed(&self) -> bool {
        (**self).inline_poll_allowed()
    }
}

/// 等待策略。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingStrategy {
    /// 按环境运行时自动选择。
    #[default]
    Auto,
    /// 在调用线程上以 `futures` 执行器驱动。
    CurrentThread,
    /// 在专用辅助线程上以私有运行时驱动。
    DedicatedThread,
}

impl BlockingStrategy {
    /// 稳定的小写标签，与配置取值一致。
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockingStrategy::Auto => "auto",
            BlockingStrategy::CurrentThread => "current_thread",
            BlockingStrategy::DedicatedThread => "dedicated_thread",
        }
    }
}

impl fmt::Display for BlockingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 解析环境后实际采用的等待方式。
enum Plan {
    CurrentThread,
    DedicatedThread,
    #[cfg(feature = "runtime-tokio")]
    PrivateRuntime,
    #[cfg(feature = "runtime-tokio")]
    InPlace(tokio::runtime::Handle),
}

impl Plan {
    fn as_str(&self) -> &'static str {
        match self {
            Plan::CurrentThread => "current_thread",
            Plan::DedicatedThread => "dedicated_thread",
            #[cfg(feature = "runtime-tokio")]
            Plan::PrivateRuntime => "private_runtime",
            #[cfg(feature = "runtime-tokio")]
            Plan::InPlace(_) => "block_in_place",
        }
    }

    /// 工作仍留在调用线程且其资源已就绪时才允许试探轮询。
    fn polls_inline(&self) -> bool {
        match self {
            Plan::CurrentThread => true,
            Plan::DedicatedThread => false,
            #[cfg(feature = "runtime-tokio")]
            Plan::PrivateRuntime => false,
            #[cfg(feature = "runtime-tokio")]
            Plan::InPlace(_) => true,
        }
    }
}

/// 默认阻塞执行器：等待前脱离调用方的调度环境。
///
/// # 执行逻辑（How）
/// - `CurrentThread`：`futures::executor::block_on`；
/// - `DedicatedThread`：作用域线程上新建单线程 Tokio 运行时驱动工作，运行时无法创建时退回 `futures` 执行器；
/// - `Auto`：
///   - 已处于 `futures` 执行器内部（嵌套的同步调用）→ `DedicatedThread`；
///   - 无环境运行时 → 调用线程上新建单线程 Tokio 运行时驱动，计时器与 IO 可用；
///   - 多线程运行时 → `block_in_place` 后经 `Handle::block_on` 驱动；
///   - 单线程运行时 → `DedicatedThread`。
///
/// 未启用 `runtime-tokio` 时 `Auto` 无法识别 Tokio 环境：不在执行器内部时采用 `CurrentThread`，
/// 否则采用 `DedicatedThread`。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DetachedBlockingRunner {
    strategy: BlockingStrategy,
}

impl DetachedBlockingRunner {
    /// 以指定策略构造。
    pub fn new(strategy: BlockingStrategy) -> Self {
        Self { strategy }
    }

    /// 配置的策略。
    pub fn strategy(&self) -> BlockingStrategy {
        self.strategy
    }

    fn plan(&self) -> Plan {
        match self.strategy {
            BlockingStrategy::CurrentThread => Plan::CurrentThread,
            BlockingStrategy::DedicatedThread => Plan::DedicatedThread,
            BlockingStrategy::Auto => ambient_plan(),
        }
    }
}

impl BlockingRunner for DetachedBlockingRunner {
    fn run(&self, pending: BoxFuture<'_, PipelineOutcome>) -> PipelineOutcome {
        let plan = self.plan();
        debug!(
            target: keys::TARGET,
            {
                aspect.blocking_strategy = plan.as_str(),
            },
            "pipeline pending, blocking caller until completion"
        );
        match plan {
            Plan::CurrentThread => block_on(pending),
            Plan::DedicatedThread => run_on_helper_thread(pending),
            #[cfg(feature = "runtime-tokio")]
            Plan::PrivateRuntime => drive_detached(pending),
            #[cfg(feature = "runtime-tokio")]
            Plan::InPlace(handle) => tokio::task::block_in_place(|| handle.block_on(pending)),
        }
    }

    fn inline_poll_allowed(&self) -> bool {
        self.plan().polls_inline()
    }
}

/// 当前线程是否已被某个 `futures` 执行器占用。
fn inside_executor() -> bool {
    futures::executor::enter().is_err()
}

#[cfg(feature = "runtime-tokio")]
fn ambient_plan() -> Plan {
    use tokio::runtime::{Handle, RuntimeFlavor};

    match Handle::try_current() {
        Err(_) if inside_executor() => Plan::DedicatedThread,
        Err(_) => Plan::PrivateRuntime,
        Ok(handle) => match handle.runtime_flavor() {
            RuntimeFlavor::MultiThread => Plan::InPlace(handle),
            _ => Plan::DedicatedThread,
        },
    }
}

#[cfg(not(feature = "runtime-tokio"))]
fn ambient_plan() -> Plan {
    if inside_executor() {
        Plan::DedicatedThread
    } else {
        Plan::CurrentThread
    }
}

fn run_on_helper_thread(pending: BoxFuture<'_, PipelineOutcome>) -> PipelineOutcome {
    let span = Span::current();
    thread::scope(|scope| {
        let spawned = thread::Builder::new()
            .name(HELPER_THREAD_NAME.to_owned())
            .spawn_scoped(scope, move || span.in_scope(|| drive_detached(pending)));
        match spawned {
            Ok(handle) => match handle.join() {
                Ok(outcome) => outcome,
                Err(payload) => panic::resume_unwind(payload),
            },
            Err(error) => Err(error.into()),
        }
    })
}

#[cfg(feature = "runtime-tokio")]
fn drive_detached(pending: BoxFuture<'_, PipelineOutcome>) -> PipelineOutcome {
    match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime.block_on(pending),
        Err(error) => {
            debug!(
                target: keys::TARGET,
                error = %error,
                "private runtime unavailable, falling back to futures executor"
            );
            block_on(pending)
        }
    }
}

#[cfg(not(feature = "runtime-tokio"))]
fn drive_detached(pending: BoxFuture<'_, PipelineOutcome>) -> PipelineOutcome {
    block_on(pending)
}
