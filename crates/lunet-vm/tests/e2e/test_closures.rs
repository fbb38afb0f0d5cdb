use super::helpers::*;
use lunet_core::closure::{EntryPoint, UpvaluesType};
use lunet_core::error::{ErrorKind, RuntimeError};
use lunet_core::symbol::SymbolRef;
use lunet_core::value::Value;
use lunet_vm::machine::Capture;

fn counter_exec() -> TestExecutor {
    TestExecutor::new()
        // local n = 0; return function() n = n + 1; return n end
        .function(1, &["n"], |m, _, _| {
            m.assign_symbol(&SymbolRef::local("n", 0), num(0.0))?;
            let c = m.make_closure(EntryPoint(2), &[("n", Capture::Local(0))])?;
            Ok(Value::Closure(c))
        })
        .function(2, &[], |m, _, _| {
            let n = SymbolRef::upvalue("n", 0);
            let next = m.get_symbol(&n)?.as_number().unwrap_or(0.0) + 1.0;
            m.assign_symbol(&n, num(next))?;
            Ok(num(next))
        })
}

// ---- Capture ----

#[test]
fn test_closure_counter() {
    let mut s = script(counter_exec());
    let c = run(&mut s, 1, vec![]).unwrap();
    s.call(&c, vec![]).unwrap();
    s.call(&c, vec![]).unwrap();
    assert_num(&s.call(&c, vec![]).unwrap(), 3.0);

    let c = c.as_closure().unwrap();
    assert_eq!(c.get_upvalues_count().unwrap(), 1);
    assert_eq!(&*c.get_upvalue_name(0).unwrap(), "n");
    assert_num(&c.get_upvalue(0).unwrap(), 3.0);
    assert_eq!(c.get_upvalues_type().unwrap(), UpvaluesType::Closure);
}

#[test]
fn test_counters_are_independent() {
    let mut s = script(counter_exec());
    let a = run(&mut s, 1, vec![]).unwrap();
    let b = run(&mut s, 1, vec![]).unwrap();
    s.call(&a, vec![]).unwrap();
    s.call(&a, vec![]).unwrap();
    assert_num(&s.call(&b, vec![]).unwrap(), 1.0);
    assert_num(&s.call(&a, vec![]).unwrap(), 3.0);
}

#[test]
fn test_write_visible_until_reassign() {
    let exec = TestExecutor::new().function(1, &["x"], |m, _, _| {
        let x = SymbolRef::local("x", 0);
        m.assign_symbol(&x, num(1.0))?;
        let c = m.make_closure(EntryPoint(2), &[("x", Capture::Local(0))])?;

        // Same cell: the frame's write shows through the closure.
        m.assign_symbol(&x, num(2.0))?;
        assert_num(&c.get_upvalue(0)?, 2.0);

        // Fresh cell after reassign.
        m.reassign_locals(0, 0)?;
        m.assign_symbol(&x, num(3.0))?;
        assert_num(&c.get_upvalue(0)?, 2.0);
        assert_num(&m.get_symbol(&x)?, 3.0);
        Ok(Value::Closure(c))
    });
    let mut s = script(exec);
    let c = run(&mut s, 1, vec![]).unwrap();
    assert_num(&c.as_closure().unwrap().get_upvalue(0).unwrap(), 2.0);
}

#[test]
fn test_closure_per_iteration() {
    let exec = TestExecutor::new()
        // for i = 0, 2 do list[#list + 1] = function() return i end end
        .function(1, &["i"], |m, _, _| {
            let list = m.new_table();
            for i in 0..3 {
                m.assign_symbol(&SymbolRef::local("i", 0), num(i as f64))?;
                let c = m.make_closure(EntryPoint(2), &[("i", Capture::Local(0))])?;
                list.append(Value::Closure(c))?;
                m.reassign_locals(0, 0)?;
            }
            Ok(Value::Table(list))
        })
        .function(2, &[], |m, _, _| m.get_symbol(&SymbolRef::upvalue("i", 0)));
    let mut s = script(exec);
    let list = run(&mut s, 1, vec![]).unwrap();
    let list = list.as_table().unwrap();
    assert_eq!(list.length().unwrap(), 3);
    for i in 1..=3 {
        let c = list.get_index(i).unwrap();
        assert_num(&s.call(&c, vec![]).unwrap(), (i - 1) as f64);
    }
}

#[test]
fn test_nested_capture_shares_cell() {
    let exec = TestExecutor::new()
        .function(1, &["x"], |m, exec, _| {
            m.assign_symbol(&SymbolRef::local("x", 0), num(10.0))?;
            let a = m.make_closure(EntryPoint(2), &[("x", Capture::Local(0))])?;
            let b = m.call(exec, &Value::Closure(a.clone()), vec![])?;
            Ok(Value::new_tuple(vec![Value::Closure(a), b]))
        })
        // Re-captures its own upvalue.
        .function(2, &[], |m, _, _| {
            let b = m.make_closure(EntryPoint(3), &[("x", Capture::Upvalue(0))])?;
            Ok(Value::Closure(b))
        })
        .function(3, &[], |m, _, _| {
            m.assign_symbol(&SymbolRef::upvalue("x", 0), num(99.0))?;
            Ok(Value::VOID)
        });
    let mut s = script(exec);
    let pair = run(&mut s, 1, vec![]).unwrap();
    let pair = pair.as_tuple().unwrap();
    let a = pair[0].as_closure().unwrap().clone();
    let b = pair[1].clone();

    let cell = a.get_upvalue_cell(0).unwrap();
    assert!(cell.ptr_eq(&b.as_closure().unwrap().get_upvalue_cell(0).unwrap()));
    // The creating frame is gone; the cell outlives it.
    assert_num(&a.get_upvalue(0).unwrap(), 10.0);
    s.call(&b, vec![]).unwrap();
    assert_num(&a.get_upvalue(0).unwrap(), 99.0);
}

#[test]
fn test_loaded_function_has_env_upvalue() {
    let mut s = script(TestExecutor::new());
    let f = s.load_function(EntryPoint(1));
    assert_eq!(f.get_upvalues_type().unwrap(), UpvaluesType::Environment);
    assert_eq!(&*f.get_upvalue_name(0).unwrap(), "_ENV");
    let env = f.get_upvalue(0).unwrap();
    assert!(env.as_table().unwrap().ptr_eq(s.globals()));
}

// ---- Lifecycle ----

#[test]
fn test_dead_closure() {
    let mut s = script(counter_exec());
    let f = s.load_function(EntryPoint(1));
    assert!(f.kill());
    assert!(!f.kill());

    let err = s.call(&Value::Closure(f.clone()), vec![]).unwrap_err();
    assert_eq!(err.to_string(), "attempt to call a dead closure");
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert!(f.get_upvalue(0).is_err());
    assert!(f.get_upvalues_count().is_err());
    assert!(f.entry_point().is_err());
    assert!(s.machine().call_stack.is_empty());
}

#[test]
fn test_cross_script_call_rejected() {
    let mut a = script(counter_exec());
    let mut b = script(counter_exec());
    let f = a.load_function(EntryPoint(1));

    let err = b.call(&Value::Closure(f.clone()), vec![]).unwrap_err();
    assert!(matches!(err, RuntimeError::InvalidOperation(_)));
    assert!(f.call0(&mut b).is_err());
    assert!(f.call0(&mut a).unwrap().as_closure().is_some());
}

#[test]
fn test_shutdown_kills_closures() {
    let mut s = script(counter_exec());
    let top = s.load_function(EntryPoint(1));
    let inner = s.call(&Value::Closure(top.clone()), vec![]).unwrap();
    drop(s);
    assert!(!top.is_alive());
    assert!(!inner.as_closure().unwrap().is_alive());
}
