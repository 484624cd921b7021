//! Análisis de escape.
//!
//! Una variable escapa cuando se usa desde una función más anidada que
//! la que la declaró. Tales variables deben vivir en el stack frame,
//! accesibles a través de static links, en vez de en un registro.
//!
//! El análisis es una sola pasada sobre el árbol que mantiene dos
//! cantidades: la profundidad de anidamiento de funciones (los bucles
//! no la alteran) y una pila de alcances que asocia cada nombre con la
//! profundidad de su declaración y su bandera de escape. Las banderas
//! solo se encienden, nunca se apagan, por lo cual repetir el análisis
//! es idempotente.

use std::{cell::Cell, collections::HashMap};

use crate::{
    lex::Symbol,
    parse::{Decl, Expr, Lvalue},
    source::Located,
};

/// Marca las banderas de escape de todo un programa.
pub fn find_escapes(program: &Located<Expr>) {
    let mut analyzer = EscapeAnalyzer {
        depth: 0,
        scopes: vec![HashMap::new()],
    };

    analyzer.traverse_expr(program.val());
}

struct EscapeEntry<'ast> {
    depth: u32,
    escape: &'ast Cell<bool>,
}

struct EscapeAnalyzer<'ast> {
    depth: u32,
    scopes: Vec<HashMap<Symbol, EscapeEntry<'ast>>>,
}

impl<'ast> EscapeAnalyzer<'ast> {
    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn enter_var(&mut self, name: Symbol, escape: &'ast Cell<bool>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(
                name,
                EscapeEntry {
                    depth: self.depth,
                    escape,
                },
            );
        }
    }

    /// Una referencia desde mayor profundidad enciende la bandera.
    fn check_escape(&self, name: &Symbol) {
        for scope in self.scopes.iter().rev() {
            if let Some(entry) = scope.get(name) {
                if self.depth > entry.depth {
                    entry.escape.set(true);
                }

                return;
            }
        }
    }

    fn traverse_expr(&mut self, expr: &'ast Expr) {
        match expr {
            Expr::Nil | Expr::Int(_) | Expr::Str(_) | Expr::Break => (),

            Expr::Var(lvalue) => self.traverse_lvalue(lvalue),

            Expr::Op { left, right, .. } => {
                self.traverse_expr(left.val());
                self.traverse_expr(right.val());
            }

            Expr::Call { args, .. } => {
                for arg in args {
                    self.traverse_expr(arg.val());
                }
            }

            Expr::Record { fields, .. } => {
                for (_, value) in fields {
                    self.traverse_expr(value.val());
                }
            }

            Expr::Array { size, init, .. } => {
                self.traverse_expr(size.val());
                self.traverse_expr(init.val());
            }

            Expr::Assign { target, value } => {
                self.traverse_lvalue(target.val());
                self.traverse_expr(value.val());
            }

            Expr::If {
                test,
                then,
                otherwise,
            } => {
                self.traverse_expr(test.val());
                self.traverse_expr(then.val());
                if let Some(otherwise) = otherwise {
                    self.traverse_expr(otherwise.val());
                }
            }

            Expr::While { test, body } => {
                self.traverse_expr(test.val());
                self.traverse_expr(body.val());
            }

            Expr::For {
                var,
                escape,
                lo,
                hi,
                body,
            } => {
                self.begin_scope();
                self.enter_var(var.val().clone(), escape);
                self.traverse_expr(lo.val());
                self.traverse_expr(hi.val());
                self.traverse_expr(body.val());
                self.end_scope();
            }

            Expr::Let { decls, body } => {
                self.begin_scope();
                for decl in decls {
                    self.traverse_decl(decl.val());
                }
                for expr in body {
                    self.traverse_expr(expr.val());
                }
                self.end_scope();
            }

            Expr::Seq(exprs) => {
                for expr in exprs {
                    self.traverse_expr(expr.val());
                }
            }
        }
    }

    fn traverse_lvalue(&mut self, lvalue: &'ast Lvalue) {
        match lvalue {
            Lvalue::Simple(name) => self.check_escape(name),

            // Los accesos compuestos solo marcan la variable base
            Lvalue::Field(base, _) => self.traverse_lvalue(base.val()),

            Lvalue::Subscript(base, index) => {
                self.traverse_lvalue(base.val());
                self.traverse_expr(index.val());
            }
        }
    }

    fn traverse_decl(&mut self, decl: &'ast Decl) {
        match decl {
            Decl::Type { .. } => (),

            // El inicializador se analiza en el alcance externo, antes
            // de que el nombre quede visible
            Decl::Var {
                name, init, escape, ..
            } => {
                self.traverse_expr(init.val());
                self.enter_var(name.val().clone(), escape);
            }

            Decl::Function { params, body, .. } => {
                self.depth += 1;
                self.begin_scope();

                for param in params {
                    self.enter_var(param.name.val().clone(), &param.escape);
                }

                self.traverse_expr(body.val());
                self.end_scope();
                self.depth -= 1;
            }
        }
    }
}
