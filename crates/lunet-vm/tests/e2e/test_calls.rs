use super::helpers::*;
use lunet_core::closure::EntryPoint;
use lunet_core::error::{ErrorKind, Result, RuntimeError};
use lunet_core::host::{CallbackRef, NativeContext};
use lunet_core::object::DataType;
use lunet_core::symbol::SymbolRef;
use lunet_core::tuple::TailCallData;
use lunet_core::value::{TypeValidationFlags, Value};
use lunet_vm::frame::FrameState;

fn sum_args(args: &[Value]) -> f64 {
    args.iter().filter_map(Value::as_number).sum()
}

fn host(f: CallbackRef) -> Value {
    Value::HostCallback(f)
}

// ---- Host callbacks ----

#[test]
fn test_host_callback_arguments() {
    let sqrt = CallbackRef::new("sqrt", |ctx| {
        let n = ctx.check_arg(0, DataType::Number, TypeValidationFlags::default())?;
        Ok(num(n.as_number().unwrap_or(0.0).sqrt()))
    });
    let mut s = script(TestExecutor::new());
    assert_num(&s.call(&host(sqrt.clone()), vec![num(16.0)]).unwrap(), 4.0);
    assert_num(&s.call(&host(sqrt.clone()), vec![Value::new_string("9")]).unwrap(), 3.0);

    let err = s
        .call(&host(sqrt.clone()), vec![Value::new_string("abc")])
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "bad argument #1 to 'sqrt' (number expected, got string)"
    );
    assert_eq!(err.kind(), ErrorKind::Script);

    let err = s.call(&host(sqrt), vec![]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "bad argument #1 to 'sqrt' (number expected, got no value)"
    );
    assert!(s.machine().call_stack.is_empty());
}

#[test]
fn test_host_callback_sees_owner() {
    let whoami = CallbackRef::new("whoami", |ctx| {
        let owner = ctx.owner().map(|id| id.to_string()).unwrap_or_default();
        Ok(Value::new_string(owner))
    });
    let mut s = script(TestExecutor::new());
    let r = s.call(&host(whoami), vec![]).unwrap();
    assert_eq!(r.as_str(), Some(s.id().to_string().as_str()));
}

#[test]
fn test_call_non_callable() {
    let mut s = script(TestExecutor::new());
    let err = s.call(&Value::TRUE, vec![]).unwrap_err();
    assert_eq!(err.to_string(), "attempt to call a boolean value");
    let err = s.call_global("missing", vec![]).unwrap_err();
    assert_eq!(err.to_string(), "attempt to call a nil value");
}

#[test]
fn test_missing_code_is_internal() {
    let mut s = script(TestExecutor::new());
    let err = run(&mut s, 99, vec![]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(s.machine().call_stack.is_empty());
}

// ---- Script functions ----

#[test]
fn test_call_global() {
    let exec = TestExecutor::new().function(1, &[], |m, _, _| Ok(num(sum_args(m.frame_args()))));
    let mut s = script(exec);
    let f = s.load_function(EntryPoint(1));
    s.globals().set_str("sum", Value::Closure(f.clone())).unwrap();
    assert_num(&s.call_global("sum", vec![num(1.0), num(2.0), num(3.0)]).unwrap(), 6.0);
    // Through the single host entry point.
    assert_num(&f.call(&mut s, vec![num(4.0)]).unwrap(), 4.0);
}

#[test]
fn test_recursion() {
    let exec = TestExecutor::new().function(1, &["n"], |m, exec, this| {
        // local n = ...; if n == 0 then return 0 end; return 1 + f(n - 1)
        let n = m.frame_args().first().cloned().unwrap_or(Value::NIL);
        m.assign_symbol(&SymbolRef::local("n", 0), n)?;
        let n = m.get_symbol(&SymbolRef::local("n", 0))?.as_number().unwrap_or(0.0);
        if n == 0.0 {
            return Ok(num(0.0));
        }
        let rest = m.call(exec, &Value::Closure(this.clone()), vec![num(n - 1.0)])?;
        Ok(num(1.0 + rest.as_number().unwrap_or(0.0)))
    });
    let mut s = script(exec);
    assert_num(&run(&mut s, 1, vec![num(50.0)]).unwrap(), 50.0);
    assert!(s.machine().stack.is_empty());
}

#[test]
fn test_stack_overflow() {
    let exec = TestExecutor::new().function(1, &[], |m, exec, this| {
        m.call(exec, &Value::Closure(this.clone()), vec![])
    });
    let mut s = script_with_depth(exec, 10);
    let err = run(&mut s, 1, vec![]).unwrap_err();
    assert!(matches!(err, RuntimeError::StackOverflow));
    assert_eq!(err.to_string(), "stack overflow");
    assert!(s.machine().call_stack.is_empty());
    assert!(s.machine().stack.is_empty());
}

#[test]
fn test_frame_flags_and_state() {
    let exec = TestExecutor::new()
        .function(1, &[], |m, exec, _| {
            let top = m.call_stack.top().expect("frame");
            let outer = top.is_entry_point() && top.state() == FrameState::Executing;
            let nested = m.load_function(EntryPoint(2));
            let inner = m.call(exec, &Value::Closure(nested), vec![])?;
            Ok(Value::new_tuple(vec![Value::Boolean(outer), inner]))
        })
        .function(2, &[], |m, _, _| {
            let top = m.call_stack.top().expect("frame");
            Ok(Value::Boolean(top.is_entry_point()))
        });
    let mut s = script(exec);
    let r = run(&mut s, 1, vec![]).unwrap();
    assert_eq!(r.as_tuple(), Some(&[Value::TRUE, Value::FALSE][..]));
}

#[test]
fn test_error_unwinds_nested_frames() {
    let fail = CallbackRef::new("fail", |_| Err(RuntimeError::Message("boom".into())));
    let exec = TestExecutor::new().function(1, &["x"], move |m, exec, _| {
        m.assign_symbol(&SymbolRef::local("x", 0), Value::TRUE)?;
        m.call(exec, &host(fail.clone()), vec![num(1.0)])
    });
    let mut s = script(exec);
    let err = run(&mut s, 1, vec![num(0.0)]).unwrap_err();
    assert_eq!(err.to_string(), "boom");
    assert!(s.machine().call_stack.is_empty());
    assert!(s.machine().stack.is_empty());
}

#[test]
fn test_executor_may_finish_its_own_frame() {
    let exec = TestExecutor::new()
        .function(1, &[], |m, _, _| {
            m.call_stack.top_mut().expect("frame").advance(FrameState::Returning)?;
            Ok(num(1.0))
        })
        .function(2, &[], |m, _, _| {
            m.call_stack.top_mut().expect("frame").advance(FrameState::Unwinding)?;
            Err(RuntimeError::Message("failed".into()))
        });
    let mut s = script(exec);
    assert_num(&run(&mut s, 1, vec![num(0.0)]).unwrap(), 1.0);
    assert!(s.machine().call_stack.is_empty());
    assert!(s.machine().stack.is_empty());

    let err = run(&mut s, 2, vec![num(0.0)]).unwrap_err();
    assert_eq!(err.to_string(), "failed");
    assert!(s.machine().call_stack.is_empty());
    assert!(s.machine().stack.is_empty());
}

#[test]
fn test_frame_popped_by_callee_is_internal() {
    let exec = TestExecutor::new().function(1, &[], |m, _, _| {
        m.call_stack.pop();
        Ok(num(1.0))
    });
    let mut s = script(exec);
    let err = run(&mut s, 1, vec![num(0.0), num(1.0)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(s.machine().call_stack.is_empty());
    assert!(s.machine().stack.is_empty());
}

// ---- Tail calls ----

fn countdown(ctx: &mut NativeContext<'_>) -> Result<Value> {
    let k = ctx.arg(0).as_number().unwrap_or(0.0);
    if k <= 0.0 {
        return Ok(Value::new_string("done"));
    }
    let next = CallbackRef::new("countdown", countdown);
    Ok(Value::tail_call(host(next), vec![num(k - 1.0)]))
}

#[test]
fn test_long_tail_call_chain() {
    let mut s = script(TestExecutor::new());
    let start = CallbackRef::new("countdown", countdown);
    let r = s.call(&host(start), vec![num(200_000.0)]).unwrap();
    assert_eq!(r.as_str(), Some("done"));
    assert!(s.machine().call_stack.is_empty());
    assert!(s.machine().stack.is_empty());
}

fn count_up(ctx: &mut NativeContext<'_>) -> Result<Value> {
    let k = ctx.arg(0).as_number().unwrap_or(0.0);
    if k <= 0.0 {
        return Ok(num(0.0));
    }
    let add_one = CallbackRef::new("add_one", |ctx| {
        Ok(num(ctx.arg(0).as_number().unwrap_or(0.0) + 1.0))
    });
    let request = TailCallData::new(host(CallbackRef::new("count_up", count_up)), vec![num(k - 1.0)])
        .with_continuation(add_one);
    Ok(Value::tail_call_with(request))
}

#[test]
fn test_tail_call_chain_runs_every_continuation() {
    let mut s = script(TestExecutor::new());
    let start = CallbackRef::new("count_up", count_up);
    assert_num(&s.call(&host(start), vec![num(100_000.0)]).unwrap(), 100_000.0);
    assert!(s.machine().call_stack.is_empty());
}

#[test]
fn test_continuation_errors_reach_outer_handler() {
    let ok = CallbackRef::new("ok", |_| Ok(Value::TRUE));
    let bad_continuation = CallbackRef::new("bad", |_| Err(RuntimeError::Message("late".into())));
    let handler = CallbackRef::new("handler", |ctx| {
        Ok(Value::new_string(format!("caught: {}", ctx.arg(0).to_print_string())))
    });
    let inner = CallbackRef::new("inner", move |_| {
        let request = TailCallData::new(host(ok.clone()), Vec::new())
            .with_continuation(bad_continuation.clone());
        Ok(Value::tail_call_with(request))
    });
    let outer = CallbackRef::new("outer", move |_| {
        let request =
            TailCallData::new(host(inner.clone()), Vec::new()).with_error_handler(handler.clone());
        Ok(Value::tail_call_with(request))
    });
    let mut s = script(TestExecutor::new());
    let r = s.call(&host(outer), vec![]).unwrap();
    assert_eq!(r.as_str(), Some("caught: late"));
}

#[test]
fn test_tail_call_with_continuation() {
    let double = CallbackRef::new("double", |ctx| {
        Ok(num(ctx.arg(0).as_number().unwrap_or(0.0) * 2.0))
    });
    let add_one = CallbackRef::new("add_one", |ctx| {
        Ok(num(ctx.arg(0).as_number().unwrap_or(0.0) + 1.0))
    });
    let tc = CallbackRef::new("tc", move |ctx| {
        let request = TailCallData::new(host(double.clone()), ctx.args().to_vec())
            .with_continuation(add_one.clone());
        Ok(Value::tail_call_with(request))
    });
    let mut s = script(TestExecutor::new());
    assert_num(&s.call(&host(tc), vec![num(5.0)]).unwrap(), 11.0);
}

#[test]
fn test_tail_call_into_script() {
    let exec = TestExecutor::new().function(1, &[], |m, _, _| Ok(num(sum_args(m.frame_args()))));
    let mut s = script(exec);
    let f = s.load_function(EntryPoint(1));
    let tc = CallbackRef::new("tc", move |ctx| {
        let mut args = ctx.args().to_vec();
        args.push(num(100.0));
        Ok(Value::tail_call(Value::Closure(f.clone()), args))
    });
    assert_num(&s.call(&host(tc), vec![num(1.0), num(2.0)]).unwrap(), 103.0);
    assert!(s.machine().call_stack.is_empty());
}

#[test]
fn test_tail_call_error_handler() {
    let fail = CallbackRef::new("fail", |_| Err(RuntimeError::Message("boom".into())));
    let handler = CallbackRef::new("handler", |ctx| {
        Ok(Value::new_string(format!("handled: {}", ctx.arg(0).to_print_string())))
    });
    let guarded = {
        let fail = fail.clone();
        CallbackRef::new("guarded", move |_| {
            let request =
                TailCallData::new(host(fail.clone()), Vec::new()).with_error_handler(handler.clone());
            Ok(Value::tail_call_with(request))
        })
    };
    let unguarded = CallbackRef::new("unguarded", move |_| {
        Ok(Value::tail_call(host(fail.clone()), Vec::new()))
    });

    let mut s = script(TestExecutor::new());
    let r = s.call(&host(guarded), vec![]).unwrap();
    assert_eq!(r.as_str(), Some("handled: boom"));
    let err = s.call(&host(unguarded), vec![]).unwrap_err();
    assert_eq!(err.to_string(), "boom");
}

#[test]
fn test_error_handler_receives_error_value() {
    let raise = CallbackRef::new("raise", |_| Err(RuntimeError::Script(num(7.0))));
    let echo = CallbackRef::new("echo", |ctx| Ok(ctx.arg(0)));
    let guarded = CallbackRef::new("guarded", move |_| {
        let request = TailCallData::new(host(raise.clone()), Vec::new()).with_error_handler(echo.clone());
        Ok(Value::tail_call_with(request))
    });
    let mut s = script(TestExecutor::new());
    assert_num(&s.call(&host(guarded), vec![]).unwrap(), 7.0);
}

// ---- Yield ----

#[test]
fn test_yield_outside_coroutine() {
    let yielder = CallbackRef::new("yield", |ctx| Ok(Value::yield_request(ctx.args().to_vec())));
    let mut s = script(TestExecutor::new());
    let err = s.call(&host(yielder.clone()), vec![num(1.0)]).unwrap_err();
    assert!(matches!(err, RuntimeError::YieldOutsideCoroutine));

    s.machine_mut().enter_coroutine();
    let r = s.call(&host(yielder), vec![num(1.0)]).unwrap();
    let request = r.as_yield_request().expect("yield request");
    assert_eq!(request.values, vec![num(1.0)]);
    assert!(!request.forced);
    s.machine_mut().exit_coroutine();
    assert!(!s.machine().in_coroutine());
}
