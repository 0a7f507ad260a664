//! 激活器的错误分层。
//!
//! # 设计背景（Why）
//! - 管线故障必须以原始身份抵达调用方：上游日志与告警依赖具体错误类型与消息做分类，
//!   任何额外包装都会让 `downcast_ref` 失效；
//! - 返回形态不匹配属于代理生成或装配缺陷，需要与管线故障区分开来，并同时给出期望与实际类型；
//! - 错误码沿用 `<领域>.<语义>` 约定，便于跨组件检索与聚合。
//!
//! # 契约说明（What）
//! - [`AggregateFault`]：聚合容器，承载一个或多个并列故障；
//! - [`AspectError`]：激活器对外唯一的错误类型；
//! - [`codes`]：稳定错误码。

use core::fmt;
use std::error::Error;

use crate::future::BoxError;

/// 激活器使用的稳定错误码。
pub mod codes {
    /// 拦截器、目标方法或管线装配抛出的原始故障。
    pub const PIPELINE_FAULT: &str = "aspect.pipeline_fault";
    /// 管线产出的值与调用点声明的返回形态不符。
    pub const TYPE_MISMATCH: &str = "aspect.type_mismatch";
    /// 管线以多原因聚合故障结束。
    pub const AGGREGATE_FAULT: &str = "aspect.aggregate_fault";
}

/// 聚合故障容器。
///
/// # 设计背景（Why）
/// - 拦截器可能并行驱动多段子调用（例如同时写入多个审计后端），并需要把所有失败一次性上报；
///   该类型即是这些失败的承载体。
///
/// # 契约说明（What）
/// - `causes` 保持上报顺序；`Display` 输出首个原因并注明总数；
/// - `source()` 指向首个原因，保证只沿标准错误链遍历的日志组件也能看到根因。
///
/// # 风险提示（Trade-offs）
/// - 激活器只剥离“单原因”聚合；多原因聚合整体交给调用方，绝不静默丢弃其余原因。
#[derive(Debug, Default)]
pub struct AggregateFault {
    causes: Vec<BoxError>,
}

impl AggregateFault {
    /// 以给定原因集合构造聚合故障。
    pub fn new(causes: Vec<BoxError>) -> Self {
        Self { causes }
    }

    /// 包装单一原因。
    pub fn single(cause: impl Into<BoxError>) -> Self {
        Self {
            causes: vec![cause.into()],
        }
    }

    /// 追加一个原因。
    pub fn push(&mut self, cause: impl Into<BoxError>) {
        self.causes.push(cause.into());
    }

    /// 原因数量。
    pub fn len(&self) -> usize {
        self.causes.len()
    }

    /// 是否不含任何原因。
    pub fn is_empty(&self) -> bool {
        self.causes.is_empty()
    }

    /// 按上报顺序借用全部原因。
    pub fn causes(&self) -> &[BoxError] {
        &self.causes
    }

    /// 取回全部原因。
    pub fn into_causes(self) -> Vec<BoxError> {
        self.causes
    }

    /// 恰好一个原因时取出该原因，否则原样退回。
    pub fn into_single(mut self) -> Result<BoxError, Self> {
        if self.causes.len() == 1 {
            if let Some(cause) = self.causes.pop() {
                return Ok(cause);
            }
        }
        Err(self)
    }
}

impl fmt::Display for AggregateFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.causes.first() {
            None => f.write_str("aggregate fault without causes"),
            Some(first) if self.causes.len() == 1 => write!(f, "{first}"),
            Some(first) => write!(
                f,
                "{} faults occurred; first: {first}",
                self.causes.len()
            ),
        }
    }
}

impl Error for AggregateFault {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.causes
            .first()
            .map(|cause| cause.as_ref() as &(dyn Error + 'static))
    }
}

/// 激活器对外暴露的错误。
///
/// # 契约说明（What）
/// - `Fault`：管线或装配阶段抛出的原始故障。`Display` 与 `source()` 均透明转发，
///   调用方可通过 [`AspectError::downcast_ref`] 取回原类型；
/// - `TypeMismatch`：产出值的运行期类型与期望形态不符，携带方法标识、期望类型与实际类型；
/// - `Aggregate`：含多个原因的聚合故障，原样交给调用方。
///
/// # 风险提示（Trade-offs）
/// - `TypeMismatch` 代表代理生成或拦截器短路写错了返回形态，属于程序缺陷，不应被重试。
#[derive(Debug)]
#[non_exhaustive]
pub enum AspectError {
    Fault(BoxError),
    TypeMismatch {
        method: String,
        expected: &'static str,
        actual: &'static str,
    },
    Aggregate(AggregateFault),
}

impl AspectError {
    /// 构造返回形态不匹配错误。
    pub fn type_mismatch(
        method: impl fmt::Display,
        expected: &'static str,
        actual: &'static str,
    ) -> Self {
        AspectError::TypeMismatch {
            method: method.to_string(),
            expected,
            actual,
        }
    }

    /// 对应的稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            AspectError::Fault(_) => codes::PIPELINE_FAULT,
            AspectError::TypeMismatch { .. } => codes::TYPE_MISMATCH,
            AspectError::Aggregate(_) => codes::AGGREGATE_FAULT,
        }
    }

    /// 是否为返回形态不匹配。
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, AspectError::TypeMismatch { .. })
    }

    /// 借用原始管线故障。
    pub fn fault(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        match self {
            AspectError::Fault(fault) => Some(fault.as_ref()),
            _ => None,
        }
    }

    /// 以具体类型借用原始管线故障。
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: Error + 'static,
    {
        self.fault().and_then(|fault| fault.downcast_ref::<E>())
    }

    /// 取回原始管线故障。
    pub fn into_fault(self) -> Result<BoxError, Self> {
        match self {
            AspectError::Fault(fault) => Ok(fault),
            other => Err(other),
        }
    }
}

impl fmt::Display for AspectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AspectError::Fault(fault) => fmt::Display::fmt(fault, f),
            AspectError::TypeMismatch {
                method,
                expected,
                actual,
            } => write!(
                f,
                "invocation of `{method}` failed: unable to cast value of type `{actual}` to type `{expected}`"
            ),
            AspectError::Aggregate(aggregate) => fmt::Display::fmt(aggregate, f),
        }
    }
}

impl Error for AspectError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AspectError::Fault(fault) => fault.source(),
            AspectError::TypeMismatch { .. } => None,
            AspectError::Aggregate(aggregate) => aggregate.source(),
        }
    }
}

/// 剥离一层聚合容器，恢复故障的原始身份。
///
/// # 执行逻辑（How）
/// 1. 故障不是 [`AggregateFault`]：原样作为 [`AspectError::Fault`] 返回；
/// 2. 单原因聚合：取出唯一原因作为 `Fault`；
/// 3. 多原因（或空）聚合：整体作为 [`AspectError::Aggregate`] 返回。
///
/// 只剥离一层；原因本身若仍是聚合，保持不变。
pub(crate) fn unwrap_origin(fault: BoxError) -> AspectError {
    match fault.downcast::<AggregateFault>() {
        Ok(aggregate) => match (*aggregate).into_single() {
            Ok(cause) => AspectError::Fault(cause),
            Err(aggregate) => AspectError::Aggregate(aggregate),
        },
        Err(fault) => AspectError::Fault(fault),
    }
}
