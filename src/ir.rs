//! Representación intermedia de código.
//!
//! El lenguaje intermedio es un árbol de expresiones y sentencias al
//! estilo del libro de Appel. Las expresiones producen un valor; las
//! sentencias solo tienen efectos. El control de flujo se expresa con
//! etiquetas y saltos, y la memoria se lee y escribe a través de
//! nodos `Mem` que denotan una palabra completa en una dirección.
//!
//! Fases posteriores (canonización, selección de instrucciones) operan
//! sobre estos árboles; por ahora la única salida observable es el
//! volcado de texto determinista de [`format_stm`].

use std::fmt::{self, Write};

use crate::temp::{Label, Temp};

/// Operador binario sobre palabras.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Plus,
    Minus,
    Mul,
    Div,
    And,
    Or,
    Xor,
    LShift,
    RShift,
    ARShift,
}

/// Operador relacional de un salto condicional.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

/// Niega un operador relacional.
pub fn negate_rel(op: RelOp) -> RelOp {
    use RelOp::*;

    match op {
        Eq => Ne,
        Ne => Eq,
        Lt => Ge,
        Ge => Lt,
        Gt => Le,
        Le => Gt,
        Ult => Uge,
        Uge => Ult,
        Ugt => Ule,
        Ule => Ugt,
    }
}

/// Ajusta un operador relacional al intercambio de sus operandos.
pub fn commute_rel(op: RelOp) -> RelOp {
    use RelOp::*;

    match op {
        Eq => Eq,
        Ne => Ne,
        Lt => Gt,
        Gt => Lt,
        Le => Ge,
        Ge => Le,
        Ult => Ugt,
        Ugt => Ult,
        Ule => Uge,
        Uge => Ule,
    }
}

/// Una expresión que produce un valor.
#[derive(Clone, Debug, PartialEq)]
pub enum Exp {
    /// Constante entera.
    Const(i64),

    /// Constante simbólica, una etiqueta de ensamblador.
    Name(Label),

    /// Un temporal, registro abstracto.
    Temp(Temp),

    /// Operación binaria.
    Binop(BinOp, Box<Exp>, Box<Exp>),

    /// La palabra de memoria que comienza en la dirección dada.
    Mem(Box<Exp>),

    /// Llamada a función.
    Call(Box<Exp>, Vec<Exp>),

    /// Ejecuta la sentencia por sus efectos y luego produce el valor.
    Eseq(Box<Stm>, Box<Exp>),
}

/// Una sentencia, solo efectos.
#[derive(Clone, Debug, PartialEq)]
pub enum Stm {
    /// Escribe el valor fuente en el destino, que debe ser un
    /// temporal o una palabra de memoria.
    Move(Box<Exp>, Box<Exp>),

    /// Evalúa y descarta, por sus efectos.
    Exp(Box<Exp>),

    /// Salto incondicional. La lista enumera los destinos posibles.
    Jump(Box<Exp>, Vec<Label>),

    /// Salto condicional según la comparación de dos valores.
    CJump(RelOp, Box<Exp>, Box<Exp>, Label, Label),

    /// Ejecuta la primera sentencia y luego la segunda.
    Seq(Box<Stm>, Box<Stm>),

    /// Define la posición de una etiqueta.
    Label(Label),
}

/// Salto incondicional a una etiqueta conocida.
pub fn jump(label: Label) -> Stm {
    Stm::Jump(
        Box::new(Exp::Name(label.clone())),
        vec![label],
    )
}

/// Pliega una lista de sentencias en una sola con `Seq`.
///
/// Una lista vacía produce una sentencia sin efectos.
pub fn seq(stms: impl IntoIterator<Item = Stm>) -> Stm {
    let mut result: Option<Stm> = None;
    for stm in stms {
        result = Some(match result {
            None => stm,
            Some(first) => Stm::Seq(Box::new(first), Box::new(stm)),
        });
    }

    result.unwrap_or(Stm::Exp(Box::new(Exp::Const(0))))
}

/// Vuelca una sentencia como texto multilínea determinista.
pub fn format_stm(stm: &Stm) -> String {
    let mut printer = TreePrinter::new();
    printer
        .print_stm(stm)
        .expect("formatting to a string cannot fail");
    printer.output
}

/// Vuelca una expresión como texto multilínea determinista.
pub fn format_exp(exp: &Exp) -> String {
    let mut printer = TreePrinter::new();
    printer
        .print_exp(exp)
        .expect("formatting to a string cannot fail");
    printer.output
}

/// Impresión con sangría de árboles IR.
///
/// Las secuencias se aplanan: cada sentencia ocupa sus propias líneas
/// sin envoltorio `SEQ`, lo cual mantiene el volcado legible y estable
/// para comparaciones contra archivos esperados.
struct TreePrinter {
    output: String,
    indent: usize,
}

const INDENT_SIZE: usize = 2;

impl TreePrinter {
    fn new() -> Self {
        TreePrinter {
            output: String::new(),
            indent: 0,
        }
    }

    fn pad(&mut self) -> fmt::Result {
        write!(self.output, "{:width$}", "", width = self.indent)
    }

    fn print_stm(&mut self, stm: &Stm) -> fmt::Result {
        match stm {
            Stm::Move(dst, src) => {
                self.pad()?;
                self.output.push_str("MOVE(\n");
                self.indent += INDENT_SIZE;
                self.pad()?;
                self.print_exp(dst)?;
                self.output.push_str(",\n");
                self.pad()?;
                self.print_exp(src)?;
                self.output.push_str(")\n");
                self.indent -= INDENT_SIZE;
            }

            Stm::Exp(exp) => {
                self.pad()?;
                self.output.push_str("EXP(\n");
                self.indent += INDENT_SIZE;
                self.pad()?;
                self.print_exp(exp)?;
                self.output.push_str(")\n");
                self.indent -= INDENT_SIZE;
            }

            Stm::Jump(exp, targets) => {
                self.pad()?;
                self.output.push_str("JUMP(\n");
                self.indent += INDENT_SIZE;
                self.pad()?;
                self.print_exp(exp)?;
                self.output.push_str(", [");
                for (i, target) in targets.iter().enumerate() {
                    if i > 0 {
                        self.output.push_str(", ");
                    }
                    write!(self.output, "{}", target)?;
                }
                self.output.push_str("])\n");
                self.indent -= INDENT_SIZE;
            }

            Stm::CJump(op, left, right, if_true, if_false) => {
                self.pad()?;
                write!(self.output, "CJUMP({},\n", rel_op_str(*op))?;
                self.indent += INDENT_SIZE;
                self.pad()?;
                self.print_exp(left)?;
                self.output.push_str(",\n");
                self.pad()?;
                self.print_exp(right)?;
                self.output.push_str(",\n");
                self.pad()?;
                write!(self.output, "{}, {})\n", if_true, if_false)?;
                self.indent -= INDENT_SIZE;
            }

            Stm::Seq(first, second) => {
                self.print_stm(first)?;
                self.print_stm(second)?;
            }

            Stm::Label(label) => {
                self.pad()?;
                write!(self.output, "LABEL({})\n", label)?;
            }
        }

        Ok(())
    }

    fn print_exp(&mut self, exp: &Exp) -> fmt::Result {
        match exp {
            Exp::Const(value) => write!(self.output, "CONST({})", value),
            Exp::Name(label) => write!(self.output, "NAME({})", label),
            Exp::Temp(temp) => write!(self.output, "TEMP({})", temp),

            Exp::Binop(op, left, right) => {
                write!(self.output, "BINOP({},\n", bin_op_str(*op))?;
                self.indent += INDENT_SIZE;
                self.pad()?;
                self.print_exp(left)?;
                self.output.push_str(",\n");
                self.pad()?;
                self.print_exp(right)?;
                self.output.push(')');
                self.indent -= INDENT_SIZE;
                Ok(())
            }

            Exp::Mem(addr) => {
                self.output.push_str("MEM(\n");
                self.indent += INDENT_SIZE;
                self.pad()?;
                self.print_exp(addr)?;
                self.output.push(')');
                self.indent -= INDENT_SIZE;
                Ok(())
            }

            Exp::Call(func, args) => {
                self.output.push_str("CALL(\n");
                self.indent += INDENT_SIZE;
                self.pad()?;
                self.print_exp(func)?;
                for arg in args {
                    self.output.push_str(",\n");
                    self.pad()?;
                    self.print_exp(arg)?;
                }
                self.output.push(')');
                self.indent -= INDENT_SIZE;
                Ok(())
            }

            Exp::Eseq(stm, exp) => {
                self.output.push_str("ESEQ(\n");
                self.indent += INDENT_SIZE;
                self.print_stm(stm)?;
                self.pad()?;
                self.print_exp(exp)?;
                self.output.push(')');
                self.indent -= INDENT_SIZE;
                Ok(())
            }
        }
    }
}

fn bin_op_str(op: BinOp) -> &'static str {
    use BinOp::*;

    match op {
        Plus => "PLUS",
        Minus => "MINUS",
        Mul => "MUL",
        Div => "DIV",
        And => "AND",
        Or => "OR",
        Xor => "XOR",
        LShift => "LSHIFT",
        RShift => "RSHIFT",
        ARShift => "ARSHIFT",
    }
}

fn rel_op_str(op: RelOp) -> &'static str {
    use RelOp::*;

    match op {
        Eq => "EQ",
        Ne => "NE",
        Lt => "LT",
        Gt => "GT",
        Le => "LE",
        Ge => "GE",
        Ult => "ULT",
        Ule => "ULE",
        Ugt => "UGT",
        Uge => "UGE",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negate_is_an_involution() {
        let all = [
            RelOp::Eq,
            RelOp::Ne,
            RelOp::Lt,
            RelOp::Gt,
            RelOp::Le,
            RelOp::Ge,
            RelOp::Ult,
            RelOp::Ule,
            RelOp::Ugt,
            RelOp::Uge,
        ];

        for op in all {
            assert_eq!(negate_rel(negate_rel(op)), op);
            assert_eq!(commute_rel(commute_rel(op)), op);
        }
    }

    #[test]
    fn seq_folds_left_and_tolerates_emptiness() {
        let folded = seq([
            Stm::Label(label("a")),
            Stm::Label(label("b")),
            Stm::Label(label("c")),
        ]);

        match folded {
            Stm::Seq(first, last) => {
                assert!(matches!(*first, Stm::Seq(..)));
                assert_eq!(*last, Stm::Label(label("c")));
            }
            other => panic!("unexpected fold shape: {:?}", other),
        }

        assert_eq!(seq([]), Stm::Exp(Box::new(Exp::Const(0))));
    }

    #[test]
    fn printer_spells_nodes_like_the_dump_format() {
        let stm = Stm::CJump(
            RelOp::Lt,
            Box::new(Exp::Const(1)),
            Box::new(Exp::Const(2)),
            label("t"),
            label("f"),
        );

        let text = format_stm(&stm);
        assert!(text.starts_with("CJUMP(LT,"));
        assert!(text.contains("CONST(1)"));
        assert!(text.contains("t, f)"));
    }

    #[test]
    fn calls_print_their_arguments_in_order() {
        let call = Exp::Call(
            Box::new(Exp::Name(label("initArray"))),
            vec![Exp::Const(10), Exp::Const(0)],
        );

        let text = format_exp(&call);
        assert!(text.starts_with("CALL(\n"));

        let name = text.find("NAME(initArray)").expect("missing callee");
        let size = text.find("CONST(10)").expect("missing size argument");
        let init = text.find("CONST(0)").expect("missing init argument");
        assert!(name < size && size < init);
    }

    fn label(name: &str) -> Label {
        crate::temp::TempFactory::new().named_label(name)
    }
}
