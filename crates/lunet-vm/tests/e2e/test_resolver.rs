use super::helpers::*;
use lunet_core::error::{ErrorKind, RuntimeError};
use lunet_core::host::CallbackRef;
use lunet_core::symbol::{SymbolRef, ENV};
use lunet_core::value::Value;
use lunet_vm::frame::CallFrame;

fn env() -> SymbolRef {
    SymbolRef::upvalue(ENV, 0)
}

// ---- Globals ----

#[test]
fn test_global_assignment_through_env() {
    let exec = TestExecutor::new().function(1, &[], |m, _, _| {
        // answer = 42; return answer
        m.assign_symbol(&SymbolRef::global("answer", env()), num(42.0))?;
        let sym = m.find_symbol_by_name("answer");
        assert_eq!(sym, SymbolRef::global("answer", env()));
        m.get_symbol(&sym)
    });
    let mut s = script(exec);
    assert_num(&run(&mut s, 1, vec![]).unwrap(), 42.0);
    assert_num(&s.globals().get_str("answer").unwrap(), 42.0);
}

#[test]
fn test_default_env_outside_frames() {
    let mut s = script(TestExecutor::new());
    s.globals().set_str("x", Value::TRUE).unwrap();
    let m = s.machine_mut();
    let x = SymbolRef::global("x", SymbolRef::DefaultEnv);
    assert_eq!(m.get_symbol(&x).unwrap(), Value::TRUE);
    m.assign_symbol(&x, Value::FALSE).unwrap();
    assert_eq!(m.find_symbol_by_name("x"), x);
    assert_eq!(m.get_symbol(&x).unwrap(), Value::FALSE);
}

#[test]
fn test_assign_to_default_env_fails() {
    let mut s = script(TestExecutor::new());
    let err = s
        .machine_mut()
        .assign_symbol(&SymbolRef::DefaultEnv, Value::NIL)
        .unwrap_err();
    assert!(matches!(err, RuntimeError::InvalidOperation(_)));
    assert_eq!(err.kind(), ErrorKind::Usage);
}

#[test]
fn test_env_not_a_table() {
    let exec = TestExecutor::new().function(1, &[], |m, _, _| {
        // _ENV = 5; return x
        m.assign_symbol(&env(), num(5.0))?;
        m.get_symbol(&SymbolRef::global("x", env()))
    });
    let mut s = script(exec);
    let err = run(&mut s, 1, vec![]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(
        err.to_string(),
        "internal error: _ENV is not a table but a number"
    );
    assert!(s.machine().call_stack.is_empty());
}

#[test]
fn test_replaced_env_scopes_globals() {
    let exec = TestExecutor::new().function(1, &[], |m, _, _| {
        // local sandbox = {}; _ENV = sandbox; y = 1
        let sandbox = m.new_table();
        m.assign_symbol(&env(), Value::Table(sandbox.clone()))?;
        m.assign_symbol(&SymbolRef::global("y", env()), num(1.0))?;
        Ok(Value::Table(sandbox))
    });
    let mut s = script(exec);
    let sandbox = run(&mut s, 1, vec![]).unwrap();
    assert_num(&sandbox.as_table().unwrap().get_str("y").unwrap(), 1.0);
    assert!(s.globals().get_str("y").unwrap().is_nil());
}

// ---- Locals ----

#[test]
fn test_locals_resolve_past_host_frames() {
    let exec = TestExecutor::new().function(1, &["x"], |m, _, _| {
        let x = SymbolRef::local("x", 0);
        m.assign_symbol(&x, num(7.0))?;

        // A host callback running on top of this frame has no locals.
        let host = CallbackRef::new("host", |_| Ok(Value::VOID));
        m.call_stack.push(CallFrame::host(host, m.stack.len()))?;
        let seen = m.get_symbol(&x)?;
        m.assign_symbol(&x, num(8.0))?;
        assert_eq!(m.find_symbol_by_name("x"), x);
        m.call_stack.pop();

        Ok(Value::new_tuple(vec![seen, m.get_symbol(&x)?]))
    });
    let mut s = script(exec);
    let r = run(&mut s, 1, vec![]).unwrap();
    let r = r.as_tuple().unwrap();
    assert_num(&r[0], 7.0);
    assert_num(&r[1], 8.0);
}

#[test]
fn test_find_symbol_prefers_innermost_live_local() {
    let exec = TestExecutor::new().function(1, &["x", "y", "x"], |m, _, _| {
        // Neither local declared yet: falls through to the global.
        assert_eq!(m.find_symbol_by_name("x"), SymbolRef::global("x", env()));

        m.assign_symbol(&SymbolRef::local("x", 0), num(1.0))?;
        assert_eq!(m.find_symbol_by_name("x"), SymbolRef::local("x", 0));

        m.assign_symbol(&SymbolRef::local("x", 2), num(2.0))?;
        assert_eq!(m.find_symbol_by_name("x"), SymbolRef::local("x", 2));

        // Inner block ends.
        m.reassign_locals(2, 2)?;
        assert_eq!(m.find_symbol_by_name("x"), SymbolRef::local("x", 0));

        assert_eq!(m.find_symbol_by_name(ENV), env());
        Ok(Value::VOID)
    });
    let mut s = script(exec);
    assert!(run(&mut s, 1, vec![]).unwrap().is_void());
}

#[test]
fn test_unassigned_local_reads_nil() {
    let exec = TestExecutor::new().function(1, &["a"], |m, _, _| {
        m.get_symbol(&SymbolRef::local("a", 0))
    });
    let mut s = script(exec);
    assert!(run(&mut s, 1, vec![]).unwrap().is_nil());
}

#[test]
fn test_arguments_on_value_stack() {
    let exec = TestExecutor::new().function(1, &["a", "b"], |m, _, _| {
        let args = m.frame_args().to_vec();
        for (i, (name, v)) in ["a", "b"].into_iter().zip(args).enumerate() {
            m.assign_symbol(&SymbolRef::local(name, i), v)?;
        }
        let a = m.get_symbol(&SymbolRef::local("a", 0))?;
        let b = m.get_symbol(&SymbolRef::local("b", 1))?;
        Ok(num(a.as_number().unwrap_or(0.0) - b.as_number().unwrap_or(0.0)))
    });
    let mut s = script(exec);
    assert_num(&run(&mut s, 1, vec![num(10.0), num(4.0)]).unwrap(), 6.0);
    assert!(s.machine().stack.is_empty());
}
