//! 激活器配置：上下文池与阻塞策略。
//!
//! # 教案式说明
//! - **意图 (Why)**：宿主通常以 TOML 片段声明组件参数；激活器只暴露两组旋钮，
//!   其余行为（拦截器顺序、返回形态）由代码决定，不进入配置面。
//! - **契约 (What)**：所有字段均有默认值，空文档即合法配置；未知字段直接拒绝，
//!   防止拼写错误被静默忽略。
//! - **执行逻辑 (How)**：`from_toml_str` 先反序列化再调用 `validate`，两步的失败分别映射为
//!   [`ConfigError::Parse`] 与 [`ConfigError::Invalid`]。
//!
//! ```toml
//! [context_pool]
//! capacity = 128
//! preallocate = 16
//!
//! [blocking]
//! strategy = "dedicated_thread"
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runner::BlockingStrategy;

/// 上下文池默认容量。
pub const DEFAULT_POOL_CAPACITY: usize = 64;

/// 配置加载或校验失败。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML 语法错误、字段类型不符或出现未知字段。
    #[error("failed to parse activator config: {0}")]
    Parse(#[from] toml::de::Error),

    /// 字段取值之间互相矛盾。
    #[error("invalid activator config: {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// 激活器配置根。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActivatorConfig {
    /// 上下文池参数。
    pub context_pool: ContextPoolConfig,
    /// 同步入口的阻塞策略。
    pub blocking: BlockingConfig,
}

impl ActivatorConfig {
    /// 解析并校验 TOML 文本。
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// 校验字段组合。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.context_pool.preallocate > self.context_pool.capacity {
            return Err(ConfigError::Invalid {
                field: "context_pool.preallocate",
                reason: format!(
                    "preallocate ({}) exceeds capacity ({})",
                    self.context_pool.preallocate, self.context_pool.capacity
                ),
            });
        }
        Ok(())
    }
}

/// 上下文池参数。
///
/// `capacity = 0` 表示不回收任何缓冲，每次调用都重新分配。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContextPoolConfig {
    /// 池中最多保留的空闲缓冲数。
    pub capacity: usize,
    /// 构造时预先分配的缓冲数，不得超过 `capacity`。
    pub preallocate: usize,
}

impl Default for ContextPoolConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_POOL_CAPACITY,
            preallocate: 0,
        }
    }
}

/// 阻塞策略参数。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlockingConfig {
    /// 等待策略。
    pub strategy: BlockingStrategy,
}
