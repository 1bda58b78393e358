use std::cell::RefCell;
use std::rc::Rc;

use rlox as lox;

use lox::error::LoxError;
use lox::interpreter::Interpreter;
use lox::parser::Parser;
use lox::resolver::Resolver;
use lox::scanner::Scanner;
use lox::stmt::Stmt;
use lox::token::Token;

fn parse(source: &str) -> Vec<Stmt> {
    let tokens: Vec<Token> = Scanner::new(source)
        .collect::<Result<_, _>>()
        .expect("source should tokenize");

    let (statements, errors) = Parser::new(&tokens).parse();
    assert!(errors.is_empty(), "unexpected parse errors: {:?}", errors);

    statements
}

/// Run a program expected to finish cleanly, returning what it printed.
fn run(source: &str) -> String {
    let statements = parse(source);

    let output = Rc::new(RefCell::new(Vec::new()));
    let mut interpreter = Interpreter::new(output.clone());

    let mut resolver = Resolver::new(&mut interpreter);
    resolver.resolve(&statements);
    let errors = resolver.into_errors();
    assert!(errors.is_empty(), "unexpected resolve errors: {:?}", errors);

    interpreter
        .interpret(&statements)
        .expect("program should run cleanly");

    String::from_utf8(output.take()).expect("output should be valid UTF-8")
}

/// Run a program expected to fault, returning the output produced before the
/// fault and the fault itself.
fn run_faulting(source: &str) -> (String, LoxError) {
    let statements = parse(source);

    let output = Rc::new(RefCell::new(Vec::new()));
    let mut interpreter = Interpreter::new(output.clone());

    let mut resolver = Resolver::new(&mut interpreter);
    resolver.resolve(&statements);
    let errors = resolver.into_errors();
    assert!(errors.is_empty(), "unexpected resolve errors: {:?}", errors);

    let err = interpreter
        .interpret(&statements)
        .expect_err("program should raise a runtime error");

    let printed = String::from_utf8(output.take()).expect("output should be valid UTF-8");
    (printed, err)
}

/// Resolve a program without interpreting it, returning the diagnostics.
fn resolve_errors(source: &str) -> Vec<LoxError> {
    let statements = parse(source);

    let mut interpreter = Interpreter::default();
    let mut resolver = Resolver::new(&mut interpreter);
    resolver.resolve(&statements);

    resolver.into_errors()
}

fn assert_runtime_error(err: &LoxError, expected_message: &str, expected_line: usize) {
    match err {
        LoxError::Runtime { message, line } => {
            assert_eq!(message, expected_message);
            assert_eq!(*line, expected_line);
        }
        other => panic!("expected runtime error, got {:?}", other),
    }
}

// ───────────────────────── scoping & closures ─────────────────────────

#[test]
fn test_block_shadowing() {
    let source = "var a = 1; { var a = 2; print a; } print a;";
    assert_eq!(run(source), "2\n1\n");
}

#[test]
fn test_closure_shares_defining_scope() {
    let source = r#"
    fun counter() {
        var i = 0;
        fun inc() {
            i = i + 1;
            print i;
        }
        return inc;
    }
    var c = counter();
    c();
    c();
    "#;
    assert_eq!(run(source), "1\n2\n");
}

#[test]
fn test_independent_closures_have_independent_counters() {
    let source = r#"
    fun counter() {
        var i = 0;
        fun inc() {
            i = i + 1;
            print i;
        }
        return inc;
    }
    var c1 = counter();
    var c2 = counter();
    c1();
    c1();
    c2();
    "#;
    assert_eq!(run(source), "1\n2\n1\n");
}

#[test]
fn test_functions_resolve_against_declaration_scope() {
    let source = r#"
    var a = "global";
    {
        fun showA() {
            print a;
        }
        showA();
        var a = "block";
        showA();
    }
    "#;
    assert_eq!(run(source), "global\nglobal\n");
}

#[test]
fn test_return_unwinds_nested_blocks() {
    let source = r#"
    fun f() {
        while (true) {
            {
                return 7;
            }
        }
    }
    print f();
    "#;
    assert_eq!(run(source), "7\n");
}

#[test]
fn test_recursion() {
    let source = r#"
    fun fib(n) {
        if (n <= 1) return n;
        return fib(n - 1) + fib(n - 2);
    }
    for (var i = 0; i < 10; i = i + 1) {
        print fib(i);
    }
    "#;
    assert_eq!(run(source), "0\n1\n1\n2\n3\n5\n8\n13\n21\n34\n");
}

// ───────────────────────── for desugaring ─────────────────────────

#[test]
fn test_for_loop_matches_equivalent_while() {
    let for_source = "for (var i = 0; i < 3; i = i + 1) print i;";
    let while_source = r#"
    {
        var i = 0;
        while (i < 3) {
            print i;
            i = i + 1;
        }
    }
    "#;

    let for_output = run(for_source);
    assert_eq!(for_output, "0\n1\n2\n");
    assert_eq!(for_output, run(while_source));
}

#[test]
fn test_for_with_empty_initializer_and_increment() {
    let source = r#"
    var i = 0;
    for (; i < 2;) {
        print i;
        i = i + 1;
    }
    "#;
    assert_eq!(run(source), "0\n1\n");
}

// ───────────────────────── classes & inheritance ─────────────────────────

#[test]
fn test_inheritance_dispatch_with_super() {
    let source = r#"
    class A {
        cook() {
            print "base";
        }
    }
    class B < A {
        cook() {
            super.cook();
            print "derived";
        }
    }
    B().cook();
    "#;
    assert_eq!(run(source), "base\nderived\n");
}

#[test]
fn test_super_dispatch_is_static() {
    let source = r#"
    class A {
        method() {
            print "A method";
        }
    }
    class B < A {
        method() {
            print "B method";
        }
        test() {
            super.method();
        }
    }
    class C < B {}
    C().test();
    "#;
    assert_eq!(run(source), "A method\n");
}

#[test]
fn test_methods_inherited_through_chain() {
    let source = r#"
    class A {
        hello() {
            print "hi";
        }
    }
    class B < A {}
    B().hello();
    "#;
    assert_eq!(run(source), "hi\n");
}

#[test]
fn test_initializer_returns_instance() {
    let source = r#"
    class Point {
        init(x) {
            this.x = x;
        }
    }
    var p = Point(4);
    print p.x;
    "#;
    assert_eq!(run(source), "4\n");
}

#[test]
fn test_initializer_bare_return_still_yields_instance() {
    let source = r#"
    class F {
        init() {
            this.v = 1;
            return;
        }
    }
    print F().v;
    "#;
    assert_eq!(run(source), "1\n");
}

#[test]
fn test_direct_init_call_yields_instance() {
    let source = r#"
    class Point {
        init(x) {
            this.x = x;
        }
    }
    print Point(1).init(2).x;
    "#;
    assert_eq!(run(source), "2\n");
}

#[test]
fn test_fields_shadow_methods() {
    let source = r#"
    class C {
        m() {
            print "method";
        }
    }
    var c = C();
    c.m = "field";
    print c.m;
    "#;
    assert_eq!(run(source), "field\n");
}

#[test]
fn test_bound_method_retains_this() {
    let source = r#"
    class C {
        init() {
            this.name = "c";
        }
        who() {
            print this.name;
        }
    }
    var m = C().who;
    m();
    "#;
    assert_eq!(run(source), "c\n");
}

#[test]
fn test_class_and_instance_stringification() {
    let source = r#"
    class Widget {}
    print Widget;
    print Widget();
    "#;
    assert_eq!(run(source), "Widget\nWidget instance\n");
}

// ───────────────────────── operators & values ─────────────────────────

#[test]
fn test_logical_operators_return_operand_values() {
    let source = r#"
    print "hi" or 2;
    print nil or "yes";
    print nil and 2;
    print 1 and 2;
    "#;
    assert_eq!(run(source), "hi\nyes\nnil\n2\n");
}

#[test]
fn test_short_circuit_skips_right_operand() {
    let source = r#"
    fun loud() {
        print "evaluated";
        return true;
    }
    false and loud();
    true or loud();
    print "done";
    "#;
    assert_eq!(run(source), "done\n");
}

#[test]
fn test_zero_and_empty_string_are_truthy() {
    let source = r#"
    if (0) print "zero";
    if ("") print "empty";
    if (nil) print "nil"; else print "not nil";
    "#;
    assert_eq!(run(source), "zero\nempty\nnot nil\n");
}

#[test]
fn test_equality_semantics() {
    let source = r#"
    print nil == nil;
    print "1" == 1;
    print 1 == 1;
    print true != false;
    "#;
    assert_eq!(run(source), "true\nfalse\ntrue\ntrue\n");
}

#[test]
fn test_instances_compare_by_identity() {
    let source = r#"
    class C {}
    var a = C();
    var b = a;
    print a == b;
    print a == C();
    "#;
    assert_eq!(run(source), "true\nfalse\n");
}

#[test]
fn test_number_stringification_strips_integral_suffix() {
    let source = r#"
    print 4.0;
    print 2.5;
    print 10 / 4;
    print -0.5;
    "#;
    assert_eq!(run(source), "4\n2.5\n2.5\n-0.5\n");
}

#[test]
fn test_string_concatenation() {
    assert_eq!(run("print \"foo\" + \"bar\";"), "foobar\n");
}

#[test]
fn test_division_follows_ieee() {
    assert_eq!(run("print 1 / 0;"), "inf\n");
}

#[test]
fn test_clock_is_available() {
    assert_eq!(run("print clock() > 0;"), "true\n");
}

// ───────────────────────── arrays ─────────────────────────

#[test]
fn test_array_literal_get_set_print() {
    let source = r#"
    var a = {1, 2, 3};
    print a[0];
    a[1] = a[1] * 10;
    print a[1];
    print a;
    "#;
    assert_eq!(run(source), "1\n20\n{1, 20, 3}\n");
}

#[test]
fn test_arrays_share_by_reference() {
    let source = r#"
    var a = {1};
    var b = a;
    b[0] = 5;
    print a[0];
    print a == b;
    print a == {1};
    "#;
    assert_eq!(run(source), "5\ntrue\nfalse\n");
}

#[test]
fn test_array_index_out_of_range() {
    let (_, err) = run_faulting("var a = {1, 2}; print a[2];");
    assert_runtime_error(&err, "Array index out of range.", 1);
}

#[test]
fn test_array_index_must_be_whole_number() {
    let (_, err) = run_faulting("var a = {1, 2}; print a[0.5];");
    assert_runtime_error(&err, "Array index must be a whole number.", 1);

    let (_, err) = run_faulting("var a = {1, 2}; print a[\"x\"];");
    assert_runtime_error(&err, "Array index must be a whole number.", 1);
}

#[test]
fn test_subscript_requires_array() {
    let (_, err) = run_faulting("var s = \"abc\"; print s[0];");
    assert_runtime_error(&err, "Only arrays can be subscripted.", 1);
}

// ───────────────────────── runtime errors ─────────────────────────

#[test]
fn test_type_error_aborts_rest_of_batch() {
    let source = "print 1;\n\"1\" + 2;\nprint 2;";
    let (printed, err) = run_faulting(source);

    // Effects before the fault stay; statements after it never run.
    assert_eq!(printed, "1\n");
    assert_runtime_error(&err, "Operands must be two numbers or two strings.", 2);
}

#[test]
fn test_comparison_requires_numbers() {
    let (_, err) = run_faulting("print 1 < \"2\";");
    assert_runtime_error(&err, "Operands must be numbers.", 1);
}

#[test]
fn test_unary_minus_requires_number() {
    let (_, err) = run_faulting("print -\"x\";");
    assert_runtime_error(&err, "Operand must be a number.", 1);
}

#[test]
fn test_arity_mismatch() {
    let source = "fun f() {}\nf(1);";
    let (_, err) = run_faulting(source);
    assert_runtime_error(&err, "Expected 0 arguments but got 1.", 2);
}

#[test]
fn test_class_arity_follows_initializer() {
    let source = r#"
    class P {
        init(x, y) {}
    }
    P(1);
    "#;
    let (_, err) = run_faulting(source);
    assert_runtime_error(&err, "Expected 2 arguments but got 1.", 5);
}

#[test]
fn test_calling_non_callable() {
    let (_, err) = run_faulting("\"nope\"();");
    assert_runtime_error(&err, "Can only call functions and classes.", 1);
}

#[test]
fn test_property_access_requires_instance() {
    let (_, err) = run_faulting("4 .x;");
    assert_runtime_error(&err, "Only instances have properties.", 1);

    let (_, err) = run_faulting("4 .x = 1;");
    assert_runtime_error(&err, "Only instances have fields.", 1);
}

#[test]
fn test_undefined_property() {
    let source = "class C {}\nC().missing;";
    let (_, err) = run_faulting(source);
    assert_runtime_error(&err, "Undefined property 'missing'.", 2);
}

#[test]
fn test_undefined_variable() {
    let (_, err) = run_faulting("print missing;");
    assert_runtime_error(&err, "Undefined variable 'missing'.", 1);
}

#[test]
fn test_superclass_must_be_a_class() {
    let source = "var NotAClass = \"x\";\nclass Sub < NotAClass {}";
    let (_, err) = run_faulting(source);
    assert_runtime_error(&err, "Superclass must be a class.", 2);
}

// ───────────────────────── resolver diagnostics ─────────────────────────

#[test]
fn test_self_inheritance_is_rejected() {
    let errors = resolve_errors("class X < X {}");
    assert_eq!(errors.len(), 1);
    assert!(errors[0]
        .to_string()
        .contains("A class can't inherit from itself."));
}

#[test]
fn test_local_redeclaration_is_rejected() {
    let errors = resolve_errors("{ var a = 1; var a = 2; }");
    assert_eq!(errors.len(), 1);
    assert!(errors[0]
        .to_string()
        .contains("Already a variable with this name in this scope."));
}

#[test]
fn test_shadowing_across_scopes_is_accepted() {
    assert!(resolve_errors("var a = 1; { var a = 2; }").is_empty());
}

#[test]
fn test_global_redeclaration_is_accepted() {
    // Top level deliberately allows re-running a declaration.
    assert_eq!(run("var x = 1; var x = 2; print x;"), "2\n");
}

#[test]
fn test_read_in_own_initializer_is_rejected() {
    let errors = resolve_errors("{ var a = a; }");
    assert_eq!(errors.len(), 1);
    assert!(errors[0]
        .to_string()
        .contains("Can't read local variable in its own initializer."));
}

#[test]
fn test_top_level_return_is_rejected() {
    let errors = resolve_errors("return 1;");
    assert_eq!(errors.len(), 1);
    assert!(errors[0]
        .to_string()
        .contains("Can't return from top-level code."));
}

#[test]
fn test_value_return_from_initializer_is_rejected() {
    let source = r#"
    class C {
        init() {
            return 1;
        }
    }
    "#;
    let errors = resolve_errors(source);
    assert_eq!(errors.len(), 1);
    assert!(errors[0]
        .to_string()
        .contains("Can't return a value from an initializer."));
}

#[test]
fn test_this_outside_class_is_rejected() {
    let errors = resolve_errors("print this;");
    assert_eq!(errors.len(), 1);
    assert!(errors[0]
        .to_string()
        .contains("Can't use 'this' outside of a class."));
}

#[test]
fn test_super_outside_class_is_rejected() {
    let errors = resolve_errors("fun f() { super.m(); }");
    assert_eq!(errors.len(), 1);
    assert!(errors[0]
        .to_string()
        .contains("Can't use 'super' outside of a class."));
}

#[test]
fn test_super_without_superclass_is_rejected() {
    let source = r#"
    class C {
        m() {
            super.m();
        }
    }
    "#;
    let errors = resolve_errors(source);
    assert_eq!(errors.len(), 1);
    assert!(errors[0]
        .to_string()
        .contains("Can't use 'super' in a class with no superclass."));
}

#[test]
fn test_resolver_surfaces_multiple_errors() {
    let source = r#"
    return 1;
    { var a = 1; var a = 2; }
    "#;
    let errors = resolve_errors(source);
    assert_eq!(errors.len(), 2);
}

// ───────────────────────── idempotence ─────────────────────────

#[test]
fn test_reinterpreting_the_same_ast_is_idempotent() {
    let statements = parse(
        r#"
        var total = 0;
        fun add(n) {
            total = total + n;
            return total;
        }
        print add(1);
        print add(2);
        "#,
    );

    let mut outputs = Vec::new();

    for _ in 0..2 {
        let output = Rc::new(RefCell::new(Vec::new()));
        let mut interpreter = Interpreter::new(output.clone());

        let mut resolver = Resolver::new(&mut interpreter);
        resolver.resolve(&statements);
        assert!(resolver.into_errors().is_empty());

        interpreter
            .interpret(&statements)
            .expect("program should run cleanly");

        outputs.push(String::from_utf8(output.take()).expect("valid UTF-8"));
    }

    assert_eq!(outputs[0], "1\n3\n");
    assert_eq!(outputs[0], outputs[1]);
}
