//! `ValueTask` 式异步入口。

use std::any::type_name;

use futures::executor::block_on;
use spark_aspect::{
    AspectActivator, AspectError, InterceptorPipelineBuilder, InvocationState, ReturnShape,
    ReturnValue, ValueFuture, invoker_fn,
    test_stubs::{requests, yield_once},
};

use crate::support::{InvalidOperation, activator};

#[test]
fn ready_value_is_returned() {
    let (factory, activator) = activator(InterceptorPipelineBuilder::new());
    let value: u8 = block_on(activator.invoke_value_future(requests::value_future_of("level", 7_u8)))
        .expect("就绪值必须直接返回");
    assert_eq!(value, 7);
    assert_eq!(
        factory.last_release().map(|release| release.state),
        Some(InvocationState::Completed)
    );
}

#[test]
fn pending_value_is_awaited() {
    let request = requests::with_invoker(
        "load",
        ReturnShape::ValueFuture,
        invoker_fn(|_, _| {
            Ok(ReturnValue::value_future(ValueFuture::pending(async {
                yield_once().await;
                Ok(String::from("loaded"))
            })))
        }),
    );
    let (factory, activator) = activator(InterceptorPipelineBuilder::new());
    let value: String = block_on(activator.invoke_value_future(request)).expect("挂起值必须被等待");
    assert_eq!(value, "loaded");
    assert!(factory.is_balanced());
}

#[test]
fn failed_value_keeps_original_fault() {
    let request = requests::with_invoker(
        "load",
        ReturnShape::ValueFuture,
        invoker_fn(|_, _| {
            Ok(ReturnValue::value_future(ValueFuture::<String>::failed(
                InvalidOperation("corrupt"),
            )))
        }),
    );
    let (factory, activator) = activator(InterceptorPipelineBuilder::new());
    let err = block_on(activator.invoke_value_future::<String>(request))
        .expect_err("失败值必须传回");
    assert_eq!(err.downcast_ref::<InvalidOperation>(), Some(&InvalidOperation("corrupt")));
    assert_eq!(
        factory.last_release().map(|release| release.state),
        Some(InvocationState::Faulted)
    );
}

#[test]
fn task_shaped_value_is_a_type_mismatch() {
    let (_, activator) = activator(InterceptorPipelineBuilder::new());
    let err = block_on(activator.invoke_value_future::<String>(requests::future_of(
        "greet",
        String::from("ok"),
    )))
    .expect_err("`Task` 形态不是 `ValueTask` 形态");
    match err {
        AspectError::TypeMismatch { expected, .. } => {
            assert_eq!(expected, type_name::<ValueFuture<String>>());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
