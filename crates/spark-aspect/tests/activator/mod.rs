//! 激活器集成测试：三个入口的返回值、故障、类型不匹配与上下文生命周期。

mod future_entry;
mod lifecycle;
mod support;
mod value_future_entry;
