mod common;

use basaltc::classfile::code::{Const, Insn};
use basaltc::classfile::opcodes as op;
use common::{compile, method_insns};

#[test]
fn straight_line_arithmetic_compiles_to_expected_sequence() {
    let program = compile(
        r#"
        fn run(): int {
            let x: int = 1
            let y: int = x + 1
            return y
        }
        "#,
    );
    let insns = method_insns(&program, "demo/Main", "run");
    assert_eq!(
        insns,
        vec![
            Insn::Push(Const::Int(1)),
            Insn::Var { op: op::ISTORE, index: 0 },
            Insn::Var { op: op::ILOAD, index: 0 },
            Insn::Push(Const::Int(1)),
            Insn::Simple(op::IADD),
            Insn::Var { op: op::ISTORE, index: 1 },
            Insn::Var { op: op::ILOAD, index: 1 },
            Insn::Simple(op::IRETURN),
        ]
    );
}

#[test]
fn conversion_to_same_type_emits_nothing() {
    let program = compile(
        r#"
        fn id(a: double): double {
            return a
        }
        "#,
    );
    let insns = method_insns(&program, "demo/Main", "id");
    assert_eq!(
        insns,
        vec![
            Insn::Var { op: op::DLOAD, index: 0 },
            Insn::Simple(op::DRETURN),
        ]
    );
}

#[test]
fn int_widens_to_double_in_mixed_addition() {
    let program = compile(
        r#"
        fn f(a: double): double {
            return a + 1
        }
        "#,
    );
    let insns = method_insns(&program, "demo/Main", "f");
    assert_eq!(
        insns,
        vec![
            Insn::Var { op: op::DLOAD, index: 0 },
            Insn::Push(Const::Int(1)),
            Insn::Simple(op::I2D),
            Insn::Simple(op::DADD),
            Insn::Simple(op::DRETURN),
        ]
    );
}

#[test]
fn literal_promotion_yields_double_and_long_results() {
    let program = compile(
        r#"
        fn d(): double {
            return 1 + 2.0
        }
        fn l(): long {
            return 1l + 1
        }
        "#,
    );
    let d = method_insns(&program, "demo/Main", "d");
    assert!(d.contains(&Insn::Simple(op::I2D)), "int operand must widen: {:?}", d);
    assert!(d.contains(&Insn::Simple(op::DADD)));
    assert_eq!(*d.last().unwrap(), Insn::Simple(op::DRETURN));

    let l = method_insns(&program, "demo/Main", "l");
    assert!(l.contains(&Insn::Simple(op::I2L)), "int operand must widen: {:?}", l);
    assert!(l.contains(&Insn::Simple(op::LADD)));
    assert_eq!(*l.last().unwrap(), Insn::Simple(op::LRETURN));
}

#[test]
fn string_plus_number_concatenates() {
    let program = compile(
        r#"
        fn f(): java.lang.String {
            return "a" + 1
        }
        "#,
    );
    let insns = method_insns(&program, "demo/Main", "f");
    assert!(insns.iter().any(|i| matches!(
        i,
        Insn::Method { owner, name, .. } if owner == "java/lang/String" && name == "valueOf"
    )));
    assert!(insns.iter().any(|i| matches!(
        i,
        Insn::Method { owner, name, .. } if owner == "java/lang/String" && name == "concat"
    )));
}

#[test]
fn comparison_in_if_branches_directly_without_boolean() {
    let program = compile(
        r#"
        fn f(x: int, y: int): int {
            if x == y {
                return 1
            }
            return 0
        }
        "#,
    );
    let insns = method_insns(&program, "demo/Main", "f");
    // the condition consumes the inverted comparison: branch on not-equal
    assert!(insns.iter().any(|i| matches!(i, Insn::Jump { op: o, .. } if *o == op::IF_ICMPNE)));
    // no materialized boolean for the condition
    let pushes = insns
        .iter()
        .filter(|i| matches!(i, Insn::Push(Const::Int(0)) | Insn::Push(Const::Int(1))))
        .count();
    assert_eq!(pushes, 2, "only the return values push constants: {:?}", insns);
}

#[test]
fn delayed_comparison_materializes_when_stored() {
    let program = compile(
        r#"
        fn f(x: int, y: int): boolean {
            let b: boolean = x == y
            if b {
                return true
            }
            return b
        }
        "#,
    );
    let insns = method_insns(&program, "demo/Main", "f");
    // stored comparison flushes into a branch/0/1 sequence
    assert!(insns.iter().any(|i| matches!(i, Insn::Jump { op: o, .. } if *o == op::IF_ICMPEQ)));
    assert!(insns.contains(&Insn::Push(Const::Int(0))));
    assert!(insns.contains(&Insn::Push(Const::Int(1))));
    // branching on the stored boolean tests the value itself
    assert!(insns.iter().any(|i| matches!(i, Insn::Jump { op: o, .. } if *o == op::IFEQ)));
}

#[test]
fn long_comparison_goes_through_lcmp() {
    let program = compile(
        r#"
        fn f(a: long, b: long): int {
            if a < b {
                return 1
            }
            return 0
        }
        "#,
    );
    let insns = method_insns(&program, "demo/Main", "f");
    assert!(insns.contains(&Insn::Simple(op::LCMP)));
    // inverted: exit the branch when a >= b
    assert!(insns.iter().any(|i| matches!(i, Insn::Jump { op: o, .. } if *o == op::IFGE)));
}

#[test]
fn while_loop_sums_with_iinc_and_backward_goto() {
    let program = compile(
        r#"
        fn sum(): int {
            let total: int = 0
            let i: int = 1
            while i <= 5 {
                total += i
                i += 1
            }
            return total
        }
        "#,
    );
    let insns = method_insns(&program, "demo/Main", "sum");
    assert!(insns.iter().any(|i| matches!(i, Insn::Jump { op: o, .. } if *o == op::IF_ICMPGT)));
    assert!(insns.iter().any(|i| matches!(i, Insn::Jump { op: o, .. } if *o == op::GOTO)));
    assert!(insns.contains(&Insn::Iinc { index: 1, delta: 1 }));
    assert!(insns.contains(&Insn::Simple(op::IADD)));
}

#[test]
fn wide_locals_reserve_two_slots() {
    let program = compile(
        r#"
        fn f(): int {
            let a: long = 1l
            let b: int = 2
            let c: long = 3l
            return b
        }
        "#,
    );
    let unit = program.unit("demo/Main").unwrap();
    let method = unit.methods.iter().find(|m| m.name == "f").unwrap();
    let slots: Vec<(String, u16)> = method
        .local_vars
        .iter()
        .map(|v| (v.name.clone(), v.slot))
        .collect();
    assert_eq!(
        slots,
        vec![
            ("a".to_string(), 0),
            ("b".to_string(), 2),
            ("c".to_string(), 3),
        ]
    );
    assert!(method.max_locals >= 5);
}

#[test]
fn null_propagating_access_branches_around_the_member() {
    let program = compile(
        r#"
        fn f(a: java.lang.String?): java.lang.Object? {
            return a?.length()
        }
        "#,
    );
    let insns = method_insns(&program, "demo/Main", "f");
    assert!(insns.contains(&Insn::Simple(op::DUP)));
    assert!(insns.iter().any(|i| matches!(i, Insn::Jump { op: o, .. } if *o == op::IFNULL)));
    assert!(insns.contains(&Insn::Push(Const::Null)));
    assert!(insns.iter().any(|i| matches!(
        i,
        Insn::Method { name, .. } if name == "length"
    )));
    // the non-null arm boxes the primitive result
    assert!(insns.iter().any(|i| matches!(
        i,
        Insn::Method { owner, name, .. } if owner == "java/lang/Integer" && name == "valueOf"
    )));
}

#[test]
fn array_literal_builds_and_stores_elements() {
    let program = compile(
        r#"
        fn f(): int {
            let a: int[] = [int: 1, 2, 3]
            return a[1]
        }
        "#,
    );
    let insns = method_insns(&program, "demo/Main", "f");
    assert!(insns.contains(&Insn::NewArray { atype: 10 }));
    assert_eq!(
        insns.iter().filter(|i| **i == Insn::Simple(op::IASTORE)).count(),
        3
    );
    assert!(insns.contains(&Insn::Simple(op::IALOAD)));
}

#[test]
fn generated_class_files_serialize() {
    let program = compile(
        r#"
        fn run(): int {
            let x: int = 1
            while x < 10 {
                x += 3
            }
            return x
        }
        "#,
    );
    let loader = basaltc::rt::EphemeralLoader::define(&program).expect("define failed");
    let (name, bytes) = loader.classes().next().expect("no classes defined");
    assert_eq!(name, "demo/Main");
    assert_eq!(&bytes[0..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
}
