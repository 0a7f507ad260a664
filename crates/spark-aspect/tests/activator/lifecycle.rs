//! 上下文生命周期：任意结局下恰好释放一次，并发调用互不干扰。

use std::{sync::Arc, thread};

use futures::executor::block_on;
use proptest::prelude::*;
use spark_aspect::{
    AspectActivator, InterceptorPipelineBuilder, InvocationState, ReturnShape,
    test_stubs::requests,
};

use crate::support::{
    Discard, Fail, FailAggregated, InvalidOperation, Yield, activator, broken_activator,
};

/// 单次调用的结局。
#[derive(Clone, Copy, Debug)]
enum Outcome {
    Value,
    PendingValue,
    TargetFault,
    InterceptorFault,
    Aggregate,
    Mismatch,
    Empty,
}

fn outcome() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        Just(Outcome::Value),
        Just(Outcome::PendingValue),
        Just(Outcome::TargetFault),
        Just(Outcome::InterceptorFault),
        Just(Outcome::Aggregate),
        Just(Outcome::Mismatch),
        Just(Outcome::Empty),
    ]
}

fn builder_for(outcome: Outcome) -> InterceptorPipelineBuilder {
    let builder = InterceptorPipelineBuilder::new();
    match outcome {
        Outcome::PendingValue => builder.with(Yield),
        Outcome::InterceptorFault => builder.with(Fail("interceptor")),
        Outcome::Aggregate => builder.with(FailAggregated(&["a", "b"])),
        Outcome::Empty => builder.with(Discard),
        Outcome::Value | Outcome::TargetFault | Outcome::Mismatch => builder,
    }
}

proptest! {
    #[test]
    fn sync_calls_release_exactly_once(outcome in outcome(), value in any::<i64>()) {
        let (factory, activator) = activator(builder_for(outcome));
        let request = match outcome {
            Outcome::TargetFault => {
                requests::failing("call", ReturnShape::Value, || InvalidOperation("target"))
            }
            Outcome::Mismatch => requests::returning("call", value.to_string()),
            _ => requests::returning("call", value),
        };

        let result = activator.invoke::<i64>(request);
        match outcome {
            Outcome::Value | Outcome::PendingValue => {
                prop_assert_eq!(result.ok(), Some(value), "返回值必须与目标方法写入的一致");
            }
            _ => prop_assert!(result.is_err()),
        }
        prop_assert_eq!(factory.created().len(), 1);
        prop_assert!(factory.is_balanced(), "任意结局下上下文都必须恰好释放一次");
        prop_assert!(factory.last_release().is_some_and(|release| release.state.is_terminal()));
    }

    #[test]
    fn future_calls_release_exactly_once(outcome in outcome(), value in any::<u16>()) {
        let (factory, activator) = activator(builder_for(outcome));
        let request = match outcome {
            Outcome::TargetFault => {
                requests::failing("call", ReturnShape::Future, || InvalidOperation("target"))
            }
            Outcome::Mismatch => requests::returning("call", value),
            _ => requests::future_of("call", value),
        };

        let result = block_on(activator.invoke_future::<u16>(request));
        match outcome {
            Outcome::Value | Outcome::PendingValue => prop_assert_eq!(result.ok(), Some(value)),
            _ => prop_assert!(result.is_err()),
        }
        prop_assert!(factory.is_balanced());
    }

    #[test]
    fn value_future_calls_release_exactly_once(outcome in outcome(), value in any::<u32>()) {
        let (factory, activator) = activator(builder_for(outcome));
        let request = match outcome {
            Outcome::TargetFault => {
                requests::failing("call", ReturnShape::ValueFuture, || InvalidOperation("target"))
            }
            Outcome::Mismatch => requests::future_of("call", value),
            _ => requests::value_future_of("call", value),
        };

        let result = block_on(activator.invoke_value_future::<u32>(request));
        match outcome {
            Outcome::Value | Outcome::PendingValue => prop_assert_eq!(result.ok(), Some(value)),
            _ => prop_assert!(result.is_err()),
        }
        prop_assert_eq!(factory.created().len(), 1);
        prop_assert!(factory.is_balanced());
        prop_assert!(factory.last_release().is_some_and(|release| release.state.is_terminal()));
    }
}

#[test]
fn build_failure_releases_context_on_every_entry() {
    let (factory, activator) = broken_activator();

    let sync = activator.invoke::<u32>(requests::returning("call", 1_u32));
    let future = block_on(activator.invoke_future::<u32>(requests::future_of("call", 1_u32)));
    let value_future =
        block_on(activator.invoke_value_future::<u32>(requests::value_future_of("call", 1_u32)));

    let results = [
        ("invoke", sync),
        ("invoke_future", future),
        ("invoke_value_future", value_future),
    ];
    for (entry, result) in results {
        let err = result.expect_err("构建失败必须传回");
        assert_eq!(
            err.downcast_ref::<InvalidOperation>(),
            Some(&InvalidOperation("no pipeline")),
            "{entry} 必须交出构建器的原始故障"
        );
    }

    let releases = factory.releases();
    assert_eq!(releases.len(), 3);
    assert!(factory.is_balanced(), "每个入口都必须恰好释放一次");
    assert!(
        releases
            .iter()
            .all(|release| release.state == InvocationState::Faulted),
        "构建失败的调用必须以故障状态释放"
    );
}

#[test]
fn concurrent_calls_get_distinct_contexts() {
    let (factory, activator) = activator(InterceptorPipelineBuilder::new().with(Yield));
    let activator = Arc::new(activator);

    let workers: Vec<_> = (0..8_i64)
        .map(|worker| {
            let activator = Arc::clone(&activator);
            thread::spawn(move || {
                (0..32_i64)
                    .map(|call| {
                        let expected = worker * 100 + call;
                        activator
                            .invoke::<i64>(requests::returning("call", expected))
                            .map(|value| value == expected)
                    })
                    .all(|matched| matched.unwrap_or(false))
            })
        })
        .collect();

    for worker in workers {
        assert!(worker.join().expect("工作线程不应 panic"), "并发调用之间不得串值");
    }

    let mut created = factory.created();
    assert_eq!(created.len(), 8 * 32);
    created.sort();
    created.dedup();
    assert_eq!(created.len(), 8 * 32, "上下文身份不得重复");
    assert!(factory.is_balanced());
}
