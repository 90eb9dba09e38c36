mod common;

use basaltc::classfile::code::Insn;
use basaltc::classfile::opcodes as op;
use basaltc::program::PropertyKind;
use basaltc::universe::builtins::standard_universe;
use basaltc::universe::{ChainedUniverse, ClassDesc, HostUniverse};
use basaltc::{Config, ProgramTable};
use common::{compile, method_has, method_insns};

#[test]
fn class_with_fields_constructor_and_methods() {
    let program = compile(
        r#"
        class Point {
            let x: int = 0

            fn (nx: int) {
                x = nx
            }

            fn getX(): int {
                return x
            }
        }

        fn make(): int {
            let p = Point:new(7)
            return p.getX()
        }
        "#,
    );

    let point = program.unit("demo/Point").expect("Point unit missing");
    assert!(point.field("x").is_some());
    let ctor = point.methods.iter().find(|m| m.name == "<init>").unwrap();
    assert_eq!(ctor.descriptor, "(I)V");
    // the replacing constructor keeps the synthesized super call and the
    // field initializer ahead of its own body
    assert!(ctor.code.iter().any(|i| matches!(
        i,
        Insn::Method { name, .. } if name == "<init>"
    )));
    assert!(ctor.code.iter().any(|i| matches!(
        i,
        Insn::Field { op: o, name, .. } if *o == op::PUTFIELD && name == "x"
    )));

    let make = method_insns(&program, "demo/Main", "make");
    assert!(make.iter().any(|i| matches!(i, Insn::Type { op: o, name } if *o == op::NEW && name == "demo/Point")));
    assert!(make.iter().any(|i| matches!(
        i,
        Insn::Method { op: o, name, .. } if *o == op::INVOKESPECIAL && name == "<init>"
    )));
    assert!(make.iter().any(|i| matches!(
        i,
        Insn::Method { op: o, name, .. } if *o == op::INVOKEVIRTUAL && name == "getX"
    )));
}

#[test]
fn field_initializers_compile_into_init_and_clinit() {
    let program = compile(
        r#"
        class Config {
            let name: java.lang.String = "default"
            static let instances: int = 0
        }
        "#,
    );
    let unit = program.unit("demo/Config").unwrap();

    let init = unit.methods.iter().find(|m| m.name == "<init>").unwrap();
    assert!(init.code.iter().any(|i| matches!(
        i,
        Insn::Field { op: o, name, .. } if *o == op::PUTFIELD && name == "name"
    )));

    let clinit = unit.methods.iter().find(|m| m.name == "<clinit>").unwrap();
    assert!(clinit.code.iter().any(|i| matches!(
        i,
        Insn::Field { op: o, name, .. } if *o == op::PUTSTATIC && name == "instances"
    )));
    // both synthesized bodies are closed with a return
    assert_eq!(*init.code.last().unwrap(), Insn::Simple(op::RETURN));
    assert_eq!(*clinit.code.last().unwrap(), Insn::Simple(op::RETURN));
}

#[test]
fn top_level_functions_are_static_members_of_the_file_unit() {
    let program = compile(
        r#"
        fn helper(a: int): int {
            return a
        }
        "#,
    );
    let unit = program.unit("demo/Main").unwrap();
    let helper = unit.methods.iter().find(|m| m.name == "helper").unwrap();
    assert!(helper.is_static());
}

#[test]
fn top_level_statements_compile_into_the_static_initializer() {
    let program = compile(r#"println("hi")"#);
    let clinit = method_insns(&program, "demo/Main", "<clinit>");
    assert!(clinit.iter().any(|i| matches!(
        i,
        Insn::Method { op: o, owner, name, .. }
            if *o == op::INVOKESTATIC && owner == "basalt/lang/Std" && name == "println"
    )));
}

#[test]
fn imported_class_gives_static_member_access() {
    let program = compile(
        r#"
        import java.lang.Integer

        fn f(): int {
            return Integer.MAX_VALUE
        }
        "#,
    );
    assert!(method_has(&program, "demo/Main", "f", |i| matches!(
        i,
        Insn::Field { op: o, owner, name, .. }
            if *o == op::GETSTATIC && owner == "java/lang/Integer" && name == "MAX_VALUE"
    )));
}

#[test]
fn unqualified_calls_resolve_to_earlier_file_functions() {
    let program = compile(
        r#"
        fn twice(a: int): int {
            return a + a
        }

        fn f(): int {
            return twice(21)
        }
        "#,
    );
    assert!(method_has(&program, "demo/Main", "f", |i| matches!(
        i,
        Insn::Method { op: o, owner, name, .. }
            if *o == op::INVOKESTATIC && owner == "demo/Main" && name == "twice"
    )));
}

#[test]
fn nested_functions_get_mangled_names_and_resolve_by_bare_name() {
    let program = compile(
        r#"
        fn outer(): int {
            fn helper(x: int): int {
                return x + 1
            }
            return helper(41)
        }
        "#,
    );
    let unit = program.unit("demo/Main").unwrap();
    assert!(unit.methods.iter().any(|m| m.name == "outer#helper"));
    assert!(method_has(&program, "demo/Main", "outer", |i| matches!(
        i,
        Insn::Method { name, .. } if name == "outer#helper"
    )));
}

#[test]
fn instance_extension_compiles_to_static_call_with_receiver_argument() {
    let program = compile(
        r#"
        fn java.lang.String:twice(): java.lang.String {
            return this + this
        }

        fn f(): java.lang.String {
            return "ab".twice()
        }
        "#,
    );
    let unit = program.unit("demo/Main").unwrap();
    let ext = unit.methods.iter().find(|m| m.name == "twice").unwrap();
    assert!(ext.is_static());
    assert_eq!(ext.descriptor, "(Ljava/lang/String;)Ljava/lang/String;");

    assert!(method_has(&program, "demo/Main", "f", |i| matches!(
        i,
        Insn::Method { op: o, owner, name, .. }
            if *o == op::INVOKESTATIC && owner == "demo/Main" && name == "twice"
    )));
}

#[test]
fn getter_marker_dispatches_dot_access_to_the_accessor() {
    let program = compile(
        r#"
        class Box {
            let v: int = 0

            getter fn value(): int {
                return v
            }
        }

        fn f(b: demo.Box): int {
            return b.value
        }
        "#,
    );
    let unit = program.unit("demo/Box").unwrap();
    let accessor = unit.methods.iter().find(|m| m.name == "value").unwrap();
    assert_eq!(
        accessor.markers.property,
        Some((PropertyKind::Get, "I".to_string()))
    );

    assert!(method_has(&program, "demo/Main", "f", |i| matches!(
        i,
        Insn::Method { op: o, name, .. } if *o == op::INVOKEVIRTUAL && name == "value"
    )));
}

#[test]
fn nested_classes_are_linked_to_their_outer_unit() {
    let program = compile(
        r#"
        class Outer {
            class Inner {
                fn f(): int {
                    return 1
                }
            }
        }
        "#,
    );
    let outer = program.unit("demo/Outer").unwrap();
    assert_eq!(outer.nested, vec!["demo/Outer$Inner".to_string()]);
    let inner = program.unit("demo/Outer$Inner").unwrap();
    assert_eq!(inner.outer.as_deref(), Some("demo/Outer"));
}

#[test]
fn foreach_iterates_through_the_iterator_protocol() {
    let program = compile(
        r#"
        fn f(items: java.util.List<java.lang.String>): void {
            for s in items {
                println(s)
            }
        }
        "#,
    );
    let insns = method_insns(&program, "demo/Main", "f");
    for expected in ["iterator", "hasNext", "next"] {
        assert!(
            insns.iter().any(|i| matches!(
                i,
                Insn::Method { name, .. } if name == expected
            )),
            "missing {} call: {:?}",
            expected,
            insns
        );
    }
    // the declared element type drives a checkcast
    assert!(insns.iter().any(|i| matches!(
        i,
        Insn::Type { op: o, name } if *o == op::CHECKCAST && name == "java/lang/String"
    )));
}

#[test]
fn ternary_selects_between_both_arms() {
    let program = compile(
        r#"
        fn f(x: int): int {
            return x == 1 ? (2) : 3
        }
        "#,
    );
    let insns = method_insns(&program, "demo/Main", "f");
    assert!(insns.iter().any(|i| matches!(i, Insn::Jump { op: o, .. } if *o == op::IF_ICMPNE)));
    assert!(insns.iter().any(|i| matches!(i, Insn::Jump { op: o, .. } if *o == op::GOTO)));
}

#[test]
fn cast_emits_checkcast_for_object_targets() {
    let program = compile(
        r#"
        fn f(a: java.lang.Object): java.lang.String {
            return <java.lang.String>a
        }
        "#,
    );
    assert!(method_has(&program, "demo/Main", "f", |i| matches!(
        i,
        Insn::Type { op: o, name } if *o == op::CHECKCAST && name == "java/lang/String"
    )));
}

#[test]
fn object_number_comparison_swaps_operands_for_magic_dispatch() {
    let mut host = HostUniverse::new();
    host.insert(ClassDesc::new("ext/Thing").method("magic^eq", "(I)Z"));
    let universe = ChainedUniverse {
        first: &host,
        second: standard_universe(),
    };

    let config = Config::default();
    let mut swapped = ProgramTable::new();
    basaltc::compile_with_universe(
        "fn f(a: ext.Thing): boolean { return 5 == a; }",
        "demo",
        "Main",
        &config,
        &universe,
        &mut swapped,
    )
    .expect("compilation failed");

    let insns = method_insns(&swapped, "demo/Main", "f");
    assert!(insns.contains(&Insn::Simple(op::SWAP)), "operand swap missing: {:?}", insns);
    assert!(insns.iter().any(|i| matches!(
        i,
        Insn::Method { op: o, owner, name, .. }
            if *o == op::INVOKEVIRTUAL && owner == "ext/Thing" && name == "magic^eq"
    )));

    // the already-canonical order dispatches without a swap
    let mut direct = ProgramTable::new();
    basaltc::compile_with_universe(
        "fn f(a: ext.Thing): boolean { return a == 5; }",
        "demo",
        "Main",
        &config,
        &universe,
        &mut direct,
    )
    .expect("compilation failed");
    let insns = method_insns(&direct, "demo/Main", "f");
    assert!(!insns.contains(&Insn::Simple(op::SWAP)));
    assert!(insns.iter().any(|i| matches!(
        i,
        Insn::Method { name, .. } if name == "magic^eq"
    )));
}

#[test]
fn magic_operator_methods_compile_operators_to_virtual_calls() {
    let program = compile(
        r#"
        class Vec {
            let x: int = 0

            magic fn add(other: demo.Vec): demo.Vec {
                return other
            }
        }

        fn f(a: demo.Vec, b: demo.Vec): demo.Vec {
            return a + b
        }
        "#,
    );
    let unit = program.unit("demo/Vec").unwrap();
    assert!(unit.methods.iter().any(|m| m.name == "magic^add"));
    assert!(method_has(&program, "demo/Main", "f", |i| matches!(
        i,
        Insn::Method { op: o, name, .. } if *o == op::INVOKEVIRTUAL && name == "magic^add"
    )));
}

#[test]
fn elvis_runs_fallback_statement_on_null() {
    let program = compile(
        r#"
        fn f(a: java.lang.String?): java.lang.String {
            return a ?: { return "x"; };
        }
        "#,
    );
    let insns = method_insns(&program, "demo/Main", "f");
    assert!(insns.iter().any(|i| matches!(i, Insn::Jump { op: o, .. } if *o == op::IFNULL)));
    // both the fallback return and the main return are present
    let returns = insns
        .iter()
        .filter(|i| matches!(i, Insn::Simple(o) if *o == op::ARETURN))
        .count();
    assert_eq!(returns, 2);
}

#[test]
fn destructuring_let_unpacks_array_elements() {
    let program = compile(
        r#"
        fn f(pair: int[]): int {
            let (a, b) = pair
            return a + b
        }
        "#,
    );
    let insns = method_insns(&program, "demo/Main", "f");
    let loads = insns
        .iter()
        .filter(|i| matches!(i, Insn::Simple(o) if *o == op::IALOAD))
        .count();
    assert_eq!(loads, 2, "one indexed load per binding: {:?}", insns);
}
