//! 一次被代理调用的不可变描述。
//!
//! # 设计背景（Why）
//! - 代理层为每个被拦截的方法生成调用点，调用点只需把“实例、方法、参数、返回形态”打包交给激活器；
//!   激活器与拦截器都只读这份描述，不回写。
//! - 目标方法本身由 [`MethodInvoker`] 表达：它同步返回一个 [`ReturnValue`]，
//!   异步方法返回的值内部再携带挂起中的计算，这与反射调用返回 `Task` 对象的行为一致。
//!
//! # 契约说明（What）
//! - [`InvocationRequest`] 克隆成本仅为若干 `Arc` 计数，可在调用点缓存模板后逐次填入参数；
//! - 参数列表类型擦除为 `Arc<dyn Any + Send + Sync>`，上下文复制参数时不深拷贝。

use core::{any::Any, fmt, slice};
use std::{borrow::Cow, sync::Arc};

use crate::{context::ReturnValue, future::BoxError};

/// 调用点声明的返回形态。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReturnShape {
    /// 同步返回值。
    Value,
    /// `Task` 式异步结果，对应 [`AsyncReturn`](crate::future::AsyncReturn)。
    Future,
    /// `ValueTask` 式值型异步结果，对应 [`ValueFuture`](crate::future::ValueFuture)。
    ValueFuture,
}

impl ReturnShape {
    /// 稳定的小写标签，用于日志字段。
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnShape::Value => "value",
            ReturnShape::Future => "future",
            ReturnShape::ValueFuture => "value_future",
        }
    }
}

impl fmt::Display for ReturnShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 方法标识：所属服务、方法名与声明的返回形态。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    service: Cow<'static, str>,
    name: Cow<'static, str>,
    shape: ReturnShape,
}

impl MethodDescriptor {
    /// 构造方法标识。
    pub fn new(
        service: impl Into<Cow<'static, str>>,
        name: impl Into<Cow<'static, str>>,
        shape: ReturnShape,
    ) -> Self {
        Self {
            service: service.into(),
            name: name.into(),
            shape,
        }
    }

    /// 所属服务。
    pub fn service(&self) -> &str {
        &self.service
    }

    /// 方法名。
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 声明的返回形态。
    pub fn shape(&self) -> ReturnShape {
        self.shape
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.service, self.name)
    }
}

/// 类型擦除后的单个参数。
pub type Argument = Arc<dyn Any + Send + Sync>;

/// 按位置排列的参数列表。
///
/// # 契约说明（What）
/// - `get::<T>(i)` 在下标越界或类型不符时返回 `None`，不会 panic；
/// - `set` 仅替换已有位置，拦截器不能借此改变参数个数。
#[derive(Clone, Default)]
pub struct Arguments {
    values: Vec<Argument>,
}

impl Arguments {
    /// 空参数列表。
    pub fn new() -> Self {
        Self::default()
    }

    /// 预留容量的空参数列表。
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    /// 链式追加参数。
    pub fn with<T>(mut self, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        self.push(value);
        self
    }

    /// 追加参数。
    pub fn push<T>(&mut self, value: T)
    where
        T: Any + Send + Sync,
    {
        self.values.push(Arc::new(value));
    }

    /// 以具体类型读取参数。
    pub fn get<T>(&self, index: usize) -> Option<&T>
    where
        T: Any,
    {
        self.values.get(index).and_then(|value| value.downcast_ref::<T>())
    }

    /// 替换指定位置的参数，位置不存在时返回 `false`。
    pub fn set<T>(&mut self, index: usize, value: T) -> bool
    where
        T: Any + Send + Sync,
    {
        match self.values.get_mut(index) {
            Some(slot) => {
                *slot = Arc::new(value);
                true
            }
            None => false,
        }
    }

    /// 参数个数。
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 是否无参数。
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 遍历类型擦除的参数。
    pub fn iter(&self) -> slice::Iter<'_, Argument> {
        self.values.iter()
    }

    /// 清空参数但保留已分配的容量，供上下文复用。
    pub(crate) fn clear(&mut self) {
        self.values.clear();
    }

    /// 从另一参数列表复制全部参数（仅增加引用计数）。
    pub(crate) fn extend_from(&mut self, other: &Arguments) {
        self.values.extend(other.values.iter().cloned());
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arguments")
            .field("len", &self.values.len())
            .finish()
    }
}

/// 被代理实例的类型擦除引用。
pub type Instance = Arc<dyn Any + Send + Sync>;

/// 真正执行目标方法的调用器。
///
/// # 设计背景（Why）
/// - 管线最内层需要调用被代理实现；代理层生成调用点时，会为每个方法生成一个调用器，
///   把类型擦除的实例与参数还原为具体类型后调用实现方法。
///
/// # 契约说明（What）
/// - **输入**：被代理实例与当前（可能已被拦截器改写的）参数；
/// - **输出**：方法的返回值。异步方法返回 [`ReturnValue::future`] 或 [`ReturnValue::value_future`]，
///   同步失败以 `Err` 表达；
/// - **并发**：调用器在多个并发调用间共享，必须 `Send + Sync`。
pub trait MethodInvoker: Send + Sync + 'static {
    /// 调用目标方法。
    fn invoke(
        &self,
        instance: &(dyn Any + Send + Sync),
        arguments: &Arguments,
    ) -> Result<ReturnValue, BoxError>;
}

impl<F> MethodInvoker for F
where
    F: Fn(&(dyn Any + Send + Sync), &Arguments) -> Result<ReturnValue, BoxError>
        + Send
        + Sync
        + 'static,
{
    fn invoke(
        &self,
        instance: &(dyn Any + Send + Sync),
        arguments: &Arguments,
    ) -> Result<ReturnValue, BoxError> {
        self(instance, arguments)
    }
}

/// 以闭包构造共享调用器。
///
/// 直接把闭包强转为 `Arc<dyn MethodInvoker>` 时，编译器无法为参数推断高阶生命周期；
/// 经由本函数的显式 `Fn` 约束即可。
pub fn invoker_fn<F>(invoke: F) -> Arc<dyn MethodInvoker>
where
    F: Fn(&(dyn Any + Send + Sync), &Arguments) -> Result<ReturnValue, BoxError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(invoke)
}

/// 一次调用的完整描述。
#[derive(Clone)]
pub struct InvocationRequest {
    instance: Instance,
    method: MethodDescriptor,
    arguments: Arguments,
    invoker: Arc<dyn MethodInvoker>,
}

impl InvocationRequest {
    /// 构造无参数的调用描述。
    pub fn new(
        instance: Instance,
        method: MethodDescriptor,
        invoker: Arc<dyn MethodInvoker>,
    ) -> Self {
        Self {
            instance,
            method,
            arguments: Arguments::new(),
            invoker,
        }
    }

    /// 替换参数列表。
    pub fn with_arguments(mut self, arguments: Arguments) -> Self {
        self.arguments = arguments;
        self
    }

    /// 被代理实例。
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// 方法标识。
    pub fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    /// 调用参数。
    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    /// 目标方法调用器。
    pub fn invoker(&self) -> &Arc<dyn MethodInvoker> {
        &self.invoker
    }
}

impl fmt::Debug for InvocationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationRequest")
            .field("method", &self.method)
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}
