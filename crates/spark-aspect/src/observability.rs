//! 可观测性键名：激活器日志与追踪使用的 target、span 名与字段名。
//!
//! 教案式说明（Why）：日志平台按字段名解析调用事件，键名集中在此处，避免散落在各模块的字面量彼此漂移。
//! 契约定义（What）：所有常量均为稳定字符串；新增字段只追加，不修改既有取值。
//! 事件宏的字段名只接受字面标识符，各模块按此处取值书写字段，订阅侧以这些常量匹配。

/// 激活器键名分组。
pub mod keys {
    #[doc = "类型：日志 target。"]
    #[doc = "适用范围：日志过滤、订阅者路由。"]
    pub const TARGET: &str = "spark_aspect";

    #[doc = "类型：追踪 span 名。"]
    #[doc = ""]
    #[doc = "每次激活器调用创建一个该名称的 span，覆盖上下文创建到释放的全过程。"]
    pub const SPAN_INVOKE: &str = "aspect.invoke";

    #[doc = "类型：日志字段。"]
    #[doc = ""]
    #[doc = "被调用方法，格式为 `service::name`。"]
    pub const FIELD_METHOD: &str = "aspect.method";

    #[doc = "类型：日志字段。"]
    #[doc = ""]
    #[doc = "入口期望的返回形态：`value`、`future` 或 `value_future`。"]
    pub const FIELD_SHAPE: &str = "aspect.shape";

    #[doc = "类型：日志字段。"]
    #[doc = ""]
    #[doc = "调用上下文身份。"]
    pub const FIELD_CONTEXT_ID: &str = "aspect.context_id";

    #[doc = "类型：日志字段。"]
    #[doc = ""]
    #[doc = "上下文释放时所处的状态。"]
    pub const FIELD_STATE: &str = "aspect.state";

    #[doc = "类型：日志字段。"]
    #[doc = ""]
    #[doc = "稳定错误码，取值见 `error::codes`。"]
    pub const FIELD_ERROR_CODE: &str = "error.code";

    #[doc = "类型：日志字段。"]
    #[doc = ""]
    #[doc = "期望的返回值类型名。"]
    pub const FIELD_EXPECTED_TYPE: &str = "aspect.expected_type";

    #[doc = "类型：日志字段。"]
    #[doc = ""]
    #[doc = "管线实际产出的返回值类型名。"]
    pub const FIELD_ACTUAL_TYPE: &str = "aspect.actual_type";

    #[doc = "类型：日志字段。"]
    #[doc = ""]
    #[doc = "阻塞执行器采用的等待策略。"]
    pub const FIELD_BLOCKING_STRATEGY: &str = "aspect.blocking_strategy";

    #[doc = "类型：日志字段。"]
    #[doc = ""]
    #[doc = "聚合故障包含的原因个数。"]
    pub const FIELD_FAULT_COUNT: &str = "aspect.fault_count";
}
