use tigerc::escape;
use tigerc::frame::{Frame, Mips, X86_64};
use tigerc::ir::{self, Exp, Stm};
use tigerc::irgen::{self, Fragment};
use tigerc::lex::Lexer;
use tigerc::parse::{self, Expr};
use tigerc::semantic;
use tigerc::source::Located;
use tigerc::temp::Label;
use tigerc::types::TypeContext;

fn parse_program(source: &str) -> Located<Expr> {
    let tokens = Lexer::new(source).tokenize().expect("lexing failed");
    parse::parse(tokens).expect("parsing failed")
}

fn compile<F: Frame>(source: &str) -> Vec<Fragment<F>> {
    let program = parse_program(source);
    escape::find_escapes(&program);

    let ctx = TypeContext::new();
    semantic::analyze(&program, &ctx).expect("semantic analysis should succeed");

    irgen::generate::<F>(&program, &ctx)
}

/// Genera IR sin pasar por el análisis semántico.
fn compile_unchecked(source: &str) -> Vec<Fragment<X86_64>> {
    let program = parse_program(source);
    escape::find_escapes(&program);

    let ctx = TypeContext::new();
    irgen::generate::<X86_64>(&program, &ctx)
}

fn proc_body<'a, F: Frame>(fragments: &'a [Fragment<F>], name: &str) -> &'a Stm {
    fragments
        .iter()
        .find_map(|fragment| match fragment {
            Fragment::Proc { body, level } if level.frame().name().name() == name => Some(body),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no procedure fragment named `{}`", name))
}

//==============================================================================
// Recorridos auxiliares sobre los árboles IR
//==============================================================================

/// Aplana un cuerpo en listas de todas sus sentencias y expresiones.
fn collect_stm<'a>(stm: &'a Stm, stms: &mut Vec<&'a Stm>, exps: &mut Vec<&'a Exp>) {
    stms.push(stm);

    match stm {
        Stm::Move(dst, src) => {
            collect_exp(dst, stms, exps);
            collect_exp(src, stms, exps);
        }
        Stm::Exp(exp) => collect_exp(exp, stms, exps),
        Stm::Jump(exp, _) => collect_exp(exp, stms, exps),
        Stm::CJump(_, left, right, _, _) => {
            collect_exp(left, stms, exps);
            collect_exp(right, stms, exps);
        }
        Stm::Seq(first, second) => {
            collect_stm(first, stms, exps);
            collect_stm(second, stms, exps);
        }
        Stm::Label(_) => (),
    }
}

fn collect_exp<'a>(exp: &'a Exp, stms: &mut Vec<&'a Stm>, exps: &mut Vec<&'a Exp>) {
    exps.push(exp);

    match exp {
        Exp::Binop(_, left, right) => {
            collect_exp(left, stms, exps);
            collect_exp(right, stms, exps);
        }
        Exp::Mem(addr) => collect_exp(addr, stms, exps),
        Exp::Call(func, args) => {
            collect_exp(func, stms, exps);
            for arg in args {
                collect_exp(arg, stms, exps);
            }
        }
        Exp::Eseq(stm, exp) => {
            collect_stm(stm, stms, exps);
            collect_exp(exp, stms, exps);
        }
        Exp::Const(_) | Exp::Name(_) | Exp::Temp(_) => (),
    }
}

fn all_nodes(body: &Stm) -> (Vec<&Stm>, Vec<&Exp>) {
    let mut stms = Vec::new();
    let mut exps = Vec::new();
    collect_stm(body, &mut stms, &mut exps);
    (stms, exps)
}

/// Todas las llamadas a la etiqueta dada, como listas de argumentos.
fn calls_to<'a>(body: &'a Stm, name: &str) -> Vec<&'a [Exp]> {
    let (_, exps) = all_nodes(body);

    exps.into_iter()
        .filter_map(|exp| match exp {
            Exp::Call(func, args) => match &**func {
                Exp::Name(label) if label.name() == name => Some(args.as_slice()),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

/// Offsets constantes de todos los accesos `MEM(BINOP(PLUS, _, CONST))`.
fn mem_offsets(body: &Stm) -> Vec<i64> {
    let (_, exps) = all_nodes(body);

    exps.into_iter()
        .filter_map(|exp| match exp {
            Exp::Mem(addr) => match &**addr {
                Exp::Binop(ir::BinOp::Plus, _, right) => match &**right {
                    Exp::Const(offset) => Some(*offset),
                    _ => None,
                },
                _ => None,
            },
            _ => None,
        })
        .collect()
}

/// Comprueba la disciplina de etiquetas de un fragmento: cada destino
/// de salto se define exactamente una vez dentro del mismo cuerpo.
fn check_labels(body: &Stm) {
    let (stms, _) = all_nodes(body);

    let mut defined: Vec<Label> = Vec::new();
    let mut targets: Vec<Label> = Vec::new();

    for stm in stms {
        match stm {
            Stm::Label(label) => defined.push(label.clone()),
            Stm::Jump(_, jump_targets) => targets.extend(jump_targets.iter().cloned()),
            Stm::CJump(_, _, _, if_true, if_false) => {
                targets.push(if_true.clone());
                targets.push(if_false.clone());
            }
            _ => (),
        }
    }

    for (i, label) in defined.iter().enumerate() {
        assert!(
            !defined[i + 1..].contains(label),
            "label {} defined more than once",
            label
        );
    }

    for target in &targets {
        assert!(
            defined.contains(target),
            "jump target {} is not defined in the fragment",
            target
        );
    }
}

//==============================================================================
// Casos
//==============================================================================

#[test]
fn a_program_becomes_a_single_main_fragment() {
    let fragments = compile::<X86_64>("let var x := 5 in x end");

    assert_eq!(fragments.len(), 1);
    let body = proc_body(&fragments, "_main");
    assert!(ir::format_stm(body).contains("CONST(5)"));
}

#[test]
fn the_main_fragment_is_emitted_last() {
    let fragments = compile::<X86_64>("let function f(): int = 1 in f() end");

    assert_eq!(fragments.len(), 2);
    assert!(matches!(
        &fragments[1],
        Fragment::Proc { level, .. } if level.frame().name().name() == "_main"
    ));
}

#[test]
fn frame_formals_include_the_static_link() {
    let fragments =
        compile::<X86_64>("let function add(a: int, b: int): int = a + b in add(1, 2) end");

    let add = fragments
        .iter()
        .find_map(|fragment| match fragment {
            Fragment::Proc { level, .. } if level.frame().name().name() == "add" => Some(level),
            _ => None,
        })
        .expect("no fragment for add");

    // static link más los dos parámetros
    assert_eq!(add.frame().formals().len(), 3);
}

#[test]
fn calling_a_nested_function_passes_the_frame_pointer_as_static_link() {
    let fragments = compile::<X86_64>(
        "let \
           var x := 0 \
           function f(): int = x \
         in f() end",
    );

    let main_level = fragments
        .iter()
        .find_map(|fragment| match fragment {
            Fragment::Proc { level, .. } if level.frame().name().name() == "_main" => Some(level),
            _ => None,
        })
        .expect("no fragment for _main");

    let calls = calls_to(proc_body(&fragments, "_main"), "f");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 1);
    assert_eq!(calls[0][0], Exp::Temp(main_level.frame().frame_pointer()));
}

#[test]
fn builtin_calls_take_no_static_link() {
    let fragments = compile::<X86_64>("print(\"hi\")");

    match &fragments[0] {
        Fragment::Str { value, .. } => assert_eq!(value, "hi"),
        _ => panic!("expected the string fragment first"),
    }

    let calls = calls_to(proc_body(&fragments, "_main"), "print");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 1);
    assert!(matches!(calls[0][0], Exp::Name(_)));
}

#[test]
fn array_creation_calls_init_array() {
    let fragments =
        compile::<X86_64>("let type intArr = array of int in intArr[10] of 0 end");

    let calls = calls_to(proc_body(&fragments, "_main"), "initArray");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], &[Exp::Const(10), Exp::Const(0)]);
}

#[test]
fn record_fields_get_word_sized_offsets() {
    let source = "let \
                    type point = {x: int, y: int} \
                    var p := point{x=1, y=2} \
                  in p.y end";

    let fragments = compile::<X86_64>(source);
    let body = proc_body(&fragments, "_main");

    let allocs = calls_to(body, "allocRecord");
    assert_eq!(allocs.len(), 1);
    assert_eq!(allocs[0], &[Exp::Const(16)]);

    let offsets = mem_offsets(body);
    assert!(offsets.contains(&0), "missing offset for x: {:?}", offsets);
    assert!(offsets.contains(&8), "missing offset for y: {:?}", offsets);
}

#[test]
fn the_mips_frame_is_a_drop_in_with_its_own_word_size() {
    let source = "let \
                    type point = {x: int, y: int} \
                    var p := point{x=1, y=2} \
                  in p.y end";

    let fragments = compile::<Mips>(source);
    let body = proc_body(&fragments, "_main");

    let allocs = calls_to(body, "allocRecord");
    assert_eq!(allocs[0], &[Exp::Const(8)]);

    let offsets = mem_offsets(body);
    assert!(offsets.contains(&4), "missing offset for y: {:?}", offsets);
}

#[test]
fn string_literals_become_fragments_in_emission_order() {
    let fragments = compile::<X86_64>("(print(\"a\"); print(\"b\"))");

    let labels: Vec<_> = fragments
        .iter()
        .filter_map(|fragment| match fragment {
            Fragment::Str { label, value } => Some((label.clone(), value.clone())),
            _ => None,
        })
        .collect();

    assert_eq!(labels.len(), 2);
    assert_eq!(labels[0].1, "a");
    assert_eq!(labels[1].1, "b");
    assert_ne!(labels[0].0, labels[1].0);
}

#[test]
fn mutually_recursive_functions_resolve_their_labels() {
    let fragments = compile::<X86_64>(
        "let \
           function odd(n: int): int = if n = 0 then 0 else even(n - 1) \
           function even(n: int): int = if n = 0 then 1 else odd(n - 1) \
         in odd(5) end",
    );

    // odd llama a even con static link más el argumento
    let calls = calls_to(proc_body(&fragments, "odd"), "even");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 2);

    let calls = calls_to(proc_body(&fragments, "even"), "odd");
    assert_eq!(calls.len(), 1);
}

#[test]
fn comparisons_lower_to_conditional_jumps() {
    let fragments = compile::<X86_64>("if 1 < 2 then () else ()");
    let text = ir::format_stm(proc_body(&fragments, "_main"));

    assert!(text.contains("CJUMP(LT"), "unexpected dump:\n{}", text);
}

#[test]
fn logical_operators_short_circuit() {
    let fragments = compile::<X86_64>("if 1 & 2 then () else ()");
    let text = ir::format_stm(proc_body(&fragments, "_main"));

    // Cada operando se decide contra cero por separado
    assert!(text.matches("CJUMP(NE").count() >= 2, "unexpected dump:\n{}", text);
}

#[test]
fn for_loops_guard_the_increment_against_overflow() {
    let fragments = compile::<X86_64>("for i := 1 to 3 do ()");
    let text = ir::format_stm(proc_body(&fragments, "_main"));

    assert!(text.contains("CJUMP(LE"), "unexpected dump:\n{}", text);
    assert!(text.contains("CJUMP(LT"), "unexpected dump:\n{}", text);
}

#[test]
fn every_jump_target_is_defined_in_its_fragment() {
    let sources = [
        "while 1 do break",
        "for i := 0 to 3 do if i < 2 then break",
        "let var x := if 1 then 2 else 3 in while x do x := x - 1 end",
        "if 1 & (2 | 3) then print(\"y\") else print(\"n\")",
        "let function f(n: int): int = if n < 1 then 0 else f(n - 1) in f(3) end",
    ];

    for source in sources {
        for fragment in compile::<X86_64>(source) {
            if let Fragment::Proc { body, .. } = fragment {
                check_labels(&body);
            }
        }
    }
}

#[test]
fn functions_with_results_move_into_the_return_register() {
    let fragments = compile::<X86_64>("let function one(): int = 1 in one() end");

    let one = fragments
        .iter()
        .find_map(|fragment| match fragment {
            Fragment::Proc { body, level } if level.frame().name().name() == "one" => {
                Some((body, level))
            }
            _ => None,
        })
        .expect("no fragment for one");

    let (body, level) = one;
    let return_value = level.frame().return_value();
    assert_eq!(
        *body,
        Stm::Move(Box::new(Exp::Temp(return_value)), Box::new(Exp::Const(1)))
    );
}

#[test]
fn missing_names_recover_with_a_zero_constant() {
    // Sin análisis semántico previo, el generador no debe fallar
    let fragments = compile_unchecked("x");
    let text = ir::format_stm(proc_body(&fragments, "_main"));
    assert!(text.contains("CONST(0)"));

    let fragments = compile_unchecked("break");
    let text = ir::format_stm(proc_body(&fragments, "_main"));
    assert!(text.contains("CONST(0)"));
}
