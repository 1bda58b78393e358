use rlox as lox;

use lox::ast_printer::AstPrinter;
use lox::error::LoxError;
use lox::expr::Expr;
use lox::parser::Parser;
use lox::scanner::Scanner;
use lox::stmt::Stmt;
use lox::token::Token;

fn tokenize(source: &str) -> Vec<Token> {
    Scanner::new(source)
        .collect::<Result<_, _>>()
        .expect("source should tokenize")
}

fn parse(source: &str) -> (Vec<Stmt>, Vec<LoxError>) {
    let tokens = tokenize(source);
    Parser::new(&tokens).parse()
}

fn parse_clean(source: &str) -> Vec<Stmt> {
    let (statements, errors) = parse(source);
    assert!(errors.is_empty(), "unexpected parse errors: {:?}", errors);
    statements
}

// ───────────────────────── error recovery ─────────────────────────

#[test]
fn test_parser_surfaces_multiple_errors_in_one_pass() {
    // Statement 1 and 3 are malformed; statement 2 must still parse.
    let source = "var = 1;\nprint 2;\n+;";
    let (statements, errors) = parse(source);

    assert_eq!(statements.len(), 1);
    assert!(matches!(statements[0], Stmt::Print(_)));

    assert_eq!(errors.len(), 2);
    assert!(errors[0].to_string().contains("Expect variable name."));
    assert!(errors[1].to_string().contains("Expect expression."));
}

#[test]
fn test_parser_resynchronizes_at_semicolon() {
    // The unclosed grouping fails at ';', which is also the recovery point.
    let source = "var a = (1;\nprint 3;";
    let (statements, errors) = parse(source);

    assert_eq!(errors.len(), 1);
    assert_eq!(statements.len(), 1);
    assert!(matches!(statements[0], Stmt::Print(_)));
}

#[test]
fn test_parser_resynchronizes_at_statement_keyword() {
    // No semicolon at all, so recovery relies on the keyword boundary.
    let source = "foo bar\nprint 1;";
    let (statements, errors) = parse(source);

    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("Expect ';' after expression."));
    assert_eq!(statements.len(), 1);
    assert!(matches!(statements[0], Stmt::Print(_)));
}

#[test]
fn test_invalid_assignment_target_is_recoverable() {
    let (statements, errors) = parse("a + b = 1;");

    assert_eq!(errors.len(), 1);
    match &errors[0] {
        LoxError::Parse {
            message, location, ..
        } => {
            assert_eq!(message, "Invalid assignment target.");
            assert_eq!(location, " at '='");
        }
        other => panic!("expected parse error, got {:?}", other),
    }

    // The left-hand side survives as an ordinary expression statement.
    assert_eq!(statements.len(), 1);
    assert!(matches!(
        &statements[0],
        Stmt::Expression(Expr::Binary { .. })
    ));
}

#[test]
fn test_error_at_end_location() {
    let (_, errors) = parse("print 1");

    assert_eq!(errors.len(), 1);
    match &errors[0] {
        LoxError::Parse {
            message, location, ..
        } => {
            assert_eq!(message, "Expect ';' after value.");
            assert_eq!(location, " at end");
        }
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[test]
fn test_parameter_limit_is_a_diagnostic_not_a_failure() {
    let params: Vec<String> = (0..=255).map(|i| format!("p{}", i)).collect();
    let source = format!("fun f({}) {{}}", params.join(", "));

    let (statements, errors) = parse(&source);

    // The declaration still parses; the overflow is only reported.
    assert_eq!(statements.len(), 1);
    assert!(matches!(statements[0], Stmt::Function(_)));

    assert_eq!(errors.len(), 1);
    assert!(errors[0]
        .to_string()
        .contains("Can't have more than 255 parameters."));
}

// ───────────────────────── desugaring & structure ─────────────────────────

#[test]
fn test_for_desugars_to_while_in_blocks() {
    let statements = parse_clean("for (var i = 0; i < 3; i = i + 1) print i;");
    assert_eq!(statements.len(), 1);

    // Outer block: [initializer, while]
    let Stmt::Block(outer) = &statements[0] else {
        panic!("expected outer Block, got {:?}", statements[0]);
    };
    assert_eq!(outer.len(), 2);
    assert!(matches!(outer[0], Stmt::Var { .. }));

    // The while body is a block of [original body, increment statement].
    let Stmt::While { body, .. } = &outer[1] else {
        panic!("expected While, got {:?}", outer[1]);
    };
    let Stmt::Block(inner) = body.as_ref() else {
        panic!("expected inner Block, got {:?}", body);
    };
    assert_eq!(inner.len(), 2);
    assert!(matches!(inner[0], Stmt::Print(_)));
    assert!(matches!(
        &inner[1],
        Stmt::Expression(Expr::Assign { .. })
    ));
}

#[test]
fn test_for_without_condition_defaults_to_true() {
    let statements = parse_clean("for (;;) print 1;");

    let Stmt::While { condition, .. } = &statements[0] else {
        panic!("expected While, got {:?}", statements[0]);
    };
    assert!(matches!(
        condition,
        Expr::Literal(lox::expr::LiteralValue::True)
    ));
}

#[test]
fn test_class_with_superclass_parses() {
    let statements = parse_clean("class B < A { m() {} init(x) {} }");

    let Stmt::Class {
        name,
        superclass,
        methods,
    } = &statements[0]
    else {
        panic!("expected Class, got {:?}", statements[0]);
    };

    assert_eq!(name.lexeme, "B");
    assert!(matches!(superclass, Some(Expr::Variable { .. })));
    assert_eq!(methods.len(), 2);
    assert_eq!(methods[0].name.lexeme, "m");
    assert_eq!(methods[1].params.len(), 1);
}

#[test]
fn test_array_literal_and_subscript_parse() {
    let statements = parse_clean("var a = {1, 2}; a[0] = a[1];");

    let Stmt::Var {
        initializer: Some(Expr::Array { elements }),
        ..
    } = &statements[0]
    else {
        panic!("expected array initializer, got {:?}", statements[0]);
    };
    assert_eq!(elements.len(), 2);

    assert!(matches!(
        &statements[1],
        Stmt::Expression(Expr::SetSubscript { .. })
    ));
}

#[test]
fn test_subscript_chains_with_calls_and_properties() {
    let statements = parse_clean("print rows[0].cells[i]();");

    let Stmt::Print(expr) = &statements[0] else {
        panic!("expected Print, got {:?}", statements[0]);
    };
    assert!(matches!(expr, Expr::Call { .. }));
}

// ───────────────────────── printer & serialization ─────────────────────────

#[test]
fn test_ast_printer_prefix_form() {
    let statements = parse_clean("print (1 + 2) * -3;");

    assert_eq!(
        AstPrinter::print_stmt(&statements[0]),
        "(print (* (group (+ 1.0 2.0)) (- 3.0)))"
    );
}

#[test]
fn test_ast_printer_statements() {
    let statements = parse_clean("var x = 1; { x = 2; }");

    assert_eq!(AstPrinter::print_stmt(&statements[0]), "(var x = 1.0)");
    assert_eq!(AstPrinter::print_stmt(&statements[1]), "(block (; (= x 2.0)))");
}

#[test]
fn test_ast_serializes_to_json() {
    let statements = parse_clean("print 1 + 2;");

    let json = serde_json::to_string(&statements).expect("AST should serialize");
    assert!(json.contains("Print"));
    assert!(json.contains("Binary"));
}
