mod common;

use basaltc::Error;
use common::{compile, compile_err};

#[test]
fn unresolvable_call_fails_compilation() {
    let err = compile_err("doesNotExist()");
    assert!(matches!(err, Error::Semantic { .. }), "got {:?}", err);
}

#[test]
fn invalid_assignment_target_is_rejected() {
    let err = compile_err("1 = 2");
    assert!(matches!(err, Error::Semantic { .. }));
}

#[test]
fn missing_expression_is_reported() {
    let err = compile_err("let x = ;");
    assert!(matches!(err, Error::Semantic { .. }));
}

#[test]
fn return_outside_a_method_is_rejected() {
    let err = compile_err("return 1");
    assert!(matches!(err, Error::Semantic { .. }));
}

#[test]
fn nullable_value_into_non_nullable_binding_is_rejected() {
    let err = compile_err(
        r#"
        fn f(a: java.lang.String?): void {
            let b: java.lang.String = a
        }
        "#,
    );
    assert!(matches!(err, Error::Semantic { .. }));
}

#[test]
fn nullable_return_from_non_nullable_method_is_rejected() {
    let err = compile_err(
        r#"
        fn f(a: java.lang.String?): java.lang.String {
            return a
        }
        "#,
    );
    assert!(matches!(err, Error::Semantic { .. }));
}

#[test]
fn unknown_import_is_rejected() {
    let err = compile_err("import com.example.Missing");
    assert!(matches!(err, Error::Semantic { .. }));
}

#[test]
fn operator_on_unsupported_type_names_the_operator() {
    let err = compile_err(
        r#"
        fn f(a: java.lang.Object, b: java.lang.Object): java.lang.Object {
            return a - b
        }
        "#,
    );
    assert!(matches!(err, Error::Semantic { .. }));
}

#[test]
fn unknown_variable_is_rejected() {
    let err = compile_err(
        r#"
        fn f(): int {
            return missing
        }
        "#,
    );
    assert!(matches!(err, Error::Semantic { .. }));
}

#[test]
fn recovery_surfaces_later_independent_errors() {
    // both statements are bad; resynchronization lets compilation continue
    // past the first and still fail overall
    let err = compile_err(
        r#"
        fn f(): int {
            let x = ;
            return missing
        }
        "#,
    );
    assert!(matches!(err, Error::Semantic { .. }));
}

#[test]
fn lexical_errors_are_reported_through_the_same_path() {
    let err = compile_err("let a: int = 1 $ 2");
    assert!(matches!(err, Error::Semantic { .. }));
}

#[test]
fn valid_program_still_compiles_after_error_tests() {
    // sanity: the error cases above are about the source, not the harness
    let program = compile("fn ok(): int { return 1 }");
    assert!(program.unit("demo/Main").is_some());
}
