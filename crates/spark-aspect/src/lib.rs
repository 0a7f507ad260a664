#![deny(unsafe_code)]

//! # spark-aspect
//!
//! ## 定位与职责（Why）
//! - 方法拦截框架的调用激活器：代理层生成的调用点把一次方法调用交给激活器，激活器创建调用上下文、
//!   执行拦截器管线，再把结果收敛为调用点声明的返回形态（同步值、`Task` 式或 `ValueTask` 式异步结果）；
//! - 同步调用点消费异步管线时，由阻塞执行器负责等待，避免与调用方所处的调度环境互相等待而死锁；
//! - 管线故障以原始身份抵达调用方，上下文在任意退出路径上恰好释放一次。
//!
//! ## 架构嵌入（Where）
//! - `request` / `context` / `future`：调用描述、单次调用的可变状态与返回形态；
//! - `factory`：上下文的创建、回收与作用域租借；
//! - `pipeline`：拦截器与执行链；
//! - `runner`：同步入口的阻塞等待策略；
//! - `activator`：三个入口的编排；
//! - `config` / `observability`：配置与日志键名；
//! - `test_stubs`：记录型工厂与请求构造器，供测试与示例复用。
//!
//! ## Feature 策略（Trade-offs）
//! - `runtime-tokio`（默认开启）：阻塞执行器识别环境 Tokio 运行时并选择不会死锁的等待方式；
//!   没有环境运行时则以私有单线程运行时驱动管线，计时器与 IO 照常可用；关闭后只使用 `futures` 执行器。
//!
//! ## 示例
//! ```
//! use spark_aspect::{
//!     activator::{AspectActivator, PipelineActivator},
//!     pipeline::InterceptorPipelineBuilder,
//!     test_stubs::requests,
//! };
//!
//! let activator = PipelineActivator::with_builder(InterceptorPipelineBuilder::new());
//! let answer: i32 = activator
//!     .invoke(requests::returning("answer", 42_i32))
//!     .expect("目标方法直接返回");
//! assert_eq!(answer, 42);
//! ```

pub mod activator;
pub mod config;
pub mod context;
pub mod error;
pub mod factory;
pub mod future;
pub mod observability;
pub mod pipeline;
pub mod request;
pub mod runner;

/// 测试桩集合。
///
/// - **意图说明 (Why)**：生命周期断言与示例需要记录型工厂与按形态构造的请求；
/// - **契约定位 (What)**：随 crate 公开，仅用于测试与示例环境。
pub mod test_stubs;

pub use async_trait::async_trait;

pub use activator::{AspectActivator, PipelineActivator};
pub use config::{ActivatorConfig, ConfigError};
pub use context::{CallContext, ContextId, InvocationState, ReturnValue};
pub use error::{AggregateFault, AspectError};
pub use factory::{ContextFactory, ContextLease, PooledContextFactory};
pub use future::{AsyncReturn, BoxError, BoxFuture, ValueFuture};
pub use pipeline::{
    Interceptor, InterceptorPipelineBuilder, Next, PipelineBuilder, PipelineChain,
    PipelineOutcome,
};
pub use request::{
    Arguments, InvocationRequest, MethodDescriptor, MethodInvoker, ReturnShape, invoker_fn,
};
pub use runner::{BlockingRunner, BlockingStrategy, DetachedBlockingRunner};
