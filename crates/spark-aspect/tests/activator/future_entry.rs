//! `Task` 式异步入口：透传、默认值、类型不匹配与提前丢弃。

use std::{any::type_name, task::Context};

use futures::{executor::block_on, task::noop_waker_ref};
use spark_aspect::{
    AggregateFault, AspectActivator, AspectError, AsyncReturn, BoxError, InterceptorPipelineBuilder,
    InvocationState, ReturnShape, ReturnValue, error::codes, invoker_fn, test_stubs::requests,
};

use crate::support::{Fail, InvalidOperation, Yield, activator};

#[test]
fn typed_future_is_passed_through() {
    let (factory, activator) = activator(InterceptorPipelineBuilder::new());
    let value: String = block_on(activator.invoke_future(requests::future_of(
        "greet",
        String::from("ok"),
    )))
    .expect("异步结果必须透传");
    assert_eq!(value, "ok");

    assert!(factory.is_balanced());
    let release = factory.last_release().expect("必须存在释放记录");
    assert_eq!(release.state, InvocationState::Completed);
}

#[test]
fn void_future_yields_default_value() {
    let (factory, activator) = activator(InterceptorPipelineBuilder::new().with(Yield));
    let value: u32 = block_on(activator.invoke_future(requests::void_future("flush")))
        .expect("无结果的异步方法必须成功");
    assert_eq!(value, 0);

    let () = block_on(activator.invoke_future(requests::void_future("flush")))
        .expect("R = () 时按透传处理");
    assert!(factory.is_balanced());
}

#[test]
fn synchronous_value_is_a_type_mismatch() {
    let (factory, activator) = activator(InterceptorPipelineBuilder::new());
    let err = block_on(activator.invoke_future::<u32>(requests::returning("count", 5_u32)))
        .expect_err("同步值不是异步结果");
    match err {
        AspectError::TypeMismatch {
            expected, actual, ..
        } => {
            assert_eq!(expected, type_name::<AsyncReturn<u32>>());
            assert_eq!(actual, "u32");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let release = factory.last_release().expect("必须存在释放记录");
    assert_eq!(release.state, InvocationState::Faulted);
}

#[test]
fn future_of_other_type_is_a_type_mismatch() {
    let (_, activator) = activator(InterceptorPipelineBuilder::new());
    let err = block_on(activator.invoke_future::<u64>(requests::future_of("greet", "ok")))
        .expect_err("结果类型不符必须失败");
    assert!(err.is_type_mismatch());
    assert!(err.to_string().contains(type_name::<AsyncReturn<&str>>()));
}

#[test]
fn inner_future_fault_keeps_original_identity() {
    let request = requests::with_invoker(
        "fetch",
        ReturnShape::Future,
        invoker_fn(|_, _| {
            Ok(ReturnValue::future(async {
                Err::<String, BoxError>(Box::new(AggregateFault::single(InvalidOperation(
                    "offline",
                ))))
            }))
        }),
    );
    let (factory, activator) = activator(InterceptorPipelineBuilder::new());
    let err = block_on(activator.invoke_future::<String>(request)).expect_err("内部故障必须传回");
    assert_eq!(err.code(), codes::PIPELINE_FAULT);
    assert_eq!(err.downcast_ref::<InvalidOperation>(), Some(&InvalidOperation("offline")));
    assert!(factory.is_balanced());
}

#[test]
fn pipeline_fault_skips_result_extraction() {
    let (factory, activator) = activator(InterceptorPipelineBuilder::new().with(Fail("denied")));
    let err = block_on(activator.invoke_future::<String>(requests::future_of(
        "greet",
        String::from("ok"),
    )))
    .expect_err("管线故障必须传回");
    assert_eq!(err.downcast_ref::<InvalidOperation>(), Some(&InvalidOperation("denied")));
    assert_eq!(factory.releases().len(), 1);
}

#[test]
fn dropping_unpolled_future_releases_context() {
    let (factory, activator) = activator(InterceptorPipelineBuilder::new());
    let pending = activator.invoke_future::<String>(requests::future_of("greet", String::from("ok")));
    assert_eq!(factory.created().len(), 1, "上下文在调用时即创建");
    assert!(factory.releases().is_empty());

    drop(pending);
    assert!(factory.is_balanced());
    let release = factory.last_release().expect("必须存在释放记录");
    assert_eq!(release.state, InvocationState::Created);
}

#[test]
fn dropping_suspended_future_releases_context() {
    let (factory, activator) = activator(InterceptorPipelineBuilder::new().with(Yield));
    {
        let mut pending =
            activator.invoke_future::<String>(requests::future_of("greet", String::from("ok")));
        let mut cx = Context::from_waker(noop_waker_ref());
        assert!(pending.as_mut().poll(&mut cx).is_pending(), "首个拦截器会让出执行权");
    }
    assert!(factory.is_balanced(), "挂起中被取消同样必须释放");
    let release = factory.last_release().expect("必须存在释放记录");
    assert_eq!(release.state, InvocationState::Running);
}
