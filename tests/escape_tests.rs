use tigerc::escape;
use tigerc::lex::Lexer;
use tigerc::parse::{self, Decl, Expr};
use tigerc::source::Located;

fn parse_program(source: &str) -> Located<Expr> {
    let tokens = Lexer::new(source).tokenize().expect("lexing failed");
    parse::parse(tokens).expect("parsing failed")
}

fn analyzed(source: &str) -> Located<Expr> {
    let program = parse_program(source);
    escape::find_escapes(&program);
    program
}

/// Busca la bandera de escape de una variable declarada en el `let`
/// raíz del programa.
fn var_escape(program: &Located<Expr>, name: &str) -> bool {
    let decls = match program.val() {
        Expr::Let { decls, .. } => decls,
        other => panic!("expected a let expression, found {:?}", other),
    };

    for decl in decls {
        if let Decl::Var {
            name: decl_name,
            escape,
            ..
        } = decl.val()
        {
            if decl_name.val().as_ref() == name {
                return escape.get();
            }
        }
    }

    panic!("no declaration for `{}`", name);
}

/// Banderas de escape de los parámetros de una función del `let` raíz.
fn param_escapes(program: &Located<Expr>, name: &str) -> Vec<bool> {
    let decls = match program.val() {
        Expr::Let { decls, .. } => decls,
        other => panic!("expected a let expression, found {:?}", other),
    };

    for decl in decls {
        if let Decl::Function {
            name: decl_name,
            params,
            ..
        } = decl.val()
        {
            if decl_name.val().as_ref() == name {
                return params.iter().map(|param| param.escape.get()).collect();
            }
        }
    }

    panic!("no function declaration for `{}`", name);
}

#[test]
fn simple_var_does_not_escape() {
    let program = analyzed("let var x := 5 in x end");
    assert!(!var_escape(&program, "x"));
}

#[test]
fn var_used_in_nested_function_escapes() {
    let program = analyzed(
        "let \
           var x := 5 \
           function f(): int = x \
         in f() end",
    );

    assert!(var_escape(&program, "x"));
}

#[test]
fn var_used_two_levels_deep_escapes() {
    let program = analyzed(
        "let \
           var x := 5 \
           function outer(): int = \
             let function inner(): int = x in inner() end \
         in outer() end",
    );

    assert!(var_escape(&program, "x"));
}

#[test]
fn parameter_used_in_nested_function_escapes() {
    let program = analyzed(
        "let \
           function outer(n: int): int = \
             let function inner(): int = n in inner() end \
         in outer(5) end",
    );

    assert_eq!(param_escapes(&program, "outer"), vec![true]);
}

#[test]
fn locally_used_parameter_does_not_escape() {
    let program = analyzed(
        "let \
           function f(n: int): int = n + 1 \
         in f(5) end",
    );

    assert_eq!(param_escapes(&program, "f"), vec![false]);
}

#[test]
fn for_loop_variable_does_not_escape_by_default() {
    let program = analyzed("for i := 0 to 10 do (i; ())");
    match program.val() {
        Expr::For { escape, .. } => assert!(!escape.get()),
        other => panic!("expected a for expression, found {:?}", other),
    }
}

#[test]
fn for_loop_variable_escapes_into_nested_function() {
    let program = analyzed(
        "for i := 0 to 10 do \
           (let function f(): int = i in f() end; ())",
    );

    match program.val() {
        Expr::For { escape, .. } => assert!(escape.get()),
        other => panic!("expected a for expression, found {:?}", other),
    }
}

#[test]
fn mixed_escape_status() {
    let program = analyzed(
        "let \
           var a := 1 \
           var b := 2 \
           var c := 3 \
           function f(): int = a + c \
         in b end",
    );

    assert!(var_escape(&program, "a"));
    assert!(!var_escape(&program, "b"));
    assert!(var_escape(&program, "c"));
}

#[test]
fn inner_local_does_not_escape_to_the_outer_function() {
    let program = analyzed(
        "let \
           function outer(): int = \
             let var local := 10 in local end \
         in outer() end",
    );

    let decls = match program.val() {
        Expr::Let { decls, .. } => decls,
        other => panic!("expected a let expression, found {:?}", other),
    };

    let body = match decls[0].val() {
        Decl::Function { body, .. } => body,
        other => panic!("expected a function declaration, found {:?}", other),
    };

    match body.val() {
        Expr::Let { decls, .. } => match decls[0].val() {
            Decl::Var { escape, .. } => assert!(!escape.get()),
            other => panic!("expected a var declaration, found {:?}", other),
        },
        other => panic!("expected a let body, found {:?}", other),
    }
}

#[test]
fn assignment_from_nested_function_escapes() {
    let program = analyzed(
        "let \
           var x := 0 \
           function inc() = x := x + 1 \
         in inc() end",
    );

    assert!(var_escape(&program, "x"));
}

#[test]
fn array_subscript_in_nested_function_escapes_the_base() {
    let program = analyzed(
        "let \
           type intArray = array of int \
           var arr := intArray[10] of 0 \
           function f(): int = arr[0] \
         in f() end",
    );

    assert!(var_escape(&program, "arr"));
}

#[test]
fn record_field_in_nested_function_escapes_the_base() {
    let program = analyzed(
        "let \
           type point = {x: int, y: int} \
           var p := point{x=1, y=2} \
           function getX(): int = p.x \
         in getX() end",
    );

    assert!(var_escape(&program, "p"));
}

#[test]
fn shadowed_outer_variable_does_not_escape() {
    // La x interna ensombrece a la externa dentro de f, por lo cual
    // la externa nunca se usa desde mayor profundidad
    let program = analyzed(
        "let \
           var x := 0 \
           function f() = let var x := 1 in x := 2 end \
         in x end",
    );

    assert!(!var_escape(&program, "x"));
}

#[test]
fn running_the_analysis_twice_is_idempotent() {
    let source = "let \
                    var x := 5 \
                    var y := 6 \
                    function f(): int = x \
                  in f() + y end";

    let program = parse_program(source);
    escape::find_escapes(&program);
    let first = (var_escape(&program, "x"), var_escape(&program, "y"));

    escape::find_escapes(&program);
    let second = (var_escape(&program, "x"), var_escape(&program, "y"));

    assert_eq!(first, (true, false));
    assert_eq!(first, second);
}
