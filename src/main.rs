use std::{fs, process};

use anyhow::{anyhow, Context};
use clap::{crate_version, Arg, ArgAction, Command};
use log::{debug, info};

use tigerc::{
    dispatch_frame, escape,
    frame::{Arch, Frame},
    ir,
    irgen::{self, Fragment},
    lex::Lexer,
    parse, semantic,
    types::TypeContext,
};

fn main() {
    env_logger::init();

    let args = Command::new("tigerc")
        .version(crate_version!())
        .arg(
            Arg::new("input")
                .required(true)
                .value_name("FILE")
                .help("Tiger source file"),
        )
        .arg(
            Arg::new("dump-ir")
                .long("dump-ir")
                .action(ArgAction::SetTrue)
                .help("Write the generated IR to standard output"),
        )
        .arg(
            Arg::new("target")
                .short('t')
                .long("target")
                .value_name("ARCH")
                .value_parser(["x86-64", "mips"])
                .default_value("x86-64")
                .help("Target frame layout"),
        )
        .get_matches();

    let input = args.get_one::<String>("input").expect("input is required");
    let dump_ir = args.get_flag("dump-ir");
    let arch = match args.get_one::<String>("target").expect("target has a default").as_str() {
        "mips" => Arch::Mips,
        _ => Arch::X86_64,
    };

    let result = dispatch_frame!(Target: arch => compile::<Target>(input, dump_ir));
    if let Err(error) = result {
        eprintln!("{:#}", error);
        process::exit(1);
    }
}

/// Encadena las fases sobre un archivo fuente.
///
/// El análisis de escape debe completarse antes de generar IR, ya que
/// las banderas de escape deciden dónde vive cada variable. El
/// análisis semántico corre antes que el generador, el cual asume un
/// programa válido.
fn compile<F: Frame>(path: &str, dump_ir: bool) -> anyhow::Result<()> {
    let source =
        fs::read_to_string(path).with_context(|| format!("Cannot open file `{}`", path))?;

    let tokens = Lexer::new(&source).tokenize().map_err(|error| {
        let (position, error) = error.split();
        anyhow!(
            "Lexical error at line {}, column {}: {}",
            position.line(),
            position.column(),
            error
        )
    })?;
    debug!("lexical analysis completed: {} tokens", tokens.len());

    let program = parse::parse(tokens).map_err(|error| {
        let (position, error) = error.split();
        debug!("syntax error at {}: {}", position, error);
        anyhow!("Syntax error")
    })?;
    debug!("parsing completed");

    escape::find_escapes(&program);
    debug!("escape analysis completed");

    let ctx = TypeContext::new();
    semantic::analyze(&program, &ctx).map_err(|error| {
        let (position, error) = error.split();
        anyhow!(
            "Semantic error at ({}, {}): {}",
            position.line(),
            position.column(),
            error
        )
    })?;
    debug!("semantic analysis completed");

    let fragments = irgen::generate::<F>(&program, &ctx);
    info!("compilation completed: {} fragments", fragments.len());

    if dump_ir {
        dump(&fragments);
    }

    Ok(())
}

/// Volcado de fragmentos en orden de emisión.
fn dump<F: Frame>(fragments: &[Fragment<F>]) {
    for fragment in fragments {
        match fragment {
            Fragment::Proc { body, level } => {
                println!("proc {}:", level.frame().name());
                print!("{}", ir::format_stm(body));
                println!();
            }

            Fragment::Str { label, value } => {
                println!("string {} = {:?}", label, value);
                println!();
            }
        }
    }
}
