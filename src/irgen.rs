//! Generación de representación intermedia.
//!
//! Esta fase baja el árbol de sintaxis, ya validado y con las banderas
//! de escape resueltas, al lenguaje de árboles IR. La salida es una
//! lista de fragmentos: cuerpos de procedimiento con su frame y
//! literales de cadena con su etiqueta. El orden de emisión es
//! observable y estable.
//!
//! El generador asume validez semántica. Ante un nombre que no
//! resuelve produce `Const(0)` en vez de fallar, de manera que una
//! corrida sobre entrada no validada siga siendo determinista.
//!
//! Para conocer el offset de cada campo de record, el generador
//! reconstruye tipos a medida que traduce: sus entornos registran el
//! tipo declarado de cada variable y el de resultado de cada función,
//! y cada expresión traducida viaja junto a su tipo.

use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::{
    frame::{Access, Frame},
    ir::{self, BinOp, Exp, RelOp, Stm},
    lex::Symbol,
    parse::{Decl, Expr, Field, Lvalue, Oper, TypeAst},
    semantic::{self, SymbolTable},
    source::Located,
    temp::{Label, TempFactory},
    translate::{Level, TransExp},
    types::{self, TyRef, TypeContext},
};

/// Una unidad de salida del compilador.
pub enum Fragment<F: Frame> {
    /// El cuerpo de un procedimiento junto a su nivel, que retiene el
    /// frame correspondiente.
    Proc { body: Stm, level: Rc<Level<F>> },

    /// Un literal de cadena con la etiqueta que lo direcciona.
    Str { label: Label, value: String },
}

/// Genera los fragmentos de un programa completo.
///
/// El programa entero se trata como el cuerpo de un procedimiento
/// implícito `_main` en el nivel más externo; su fragmento se emite de
/// último.
pub fn generate<F: Frame>(program: &Located<Expr>, ctx: &TypeContext) -> Vec<Fragment<F>> {
    let mut temps = TempFactory::new();
    let outermost = Level::<F>::outermost(&mut temps);

    let mut generator = IrGenerator {
        ctx,
        temps,
        current: Rc::clone(&outermost),
        fragments: Vec::new(),
        break_labels: Vec::new(),
        type_env: SymbolTable::new(),
        var_env: SymbolTable::new(),
        fun_env: SymbolTable::new(),
        fun_labels: HashMap::new(),
    };

    generator.enter_builtins(&outermost);

    let program = generator.trans_expr(program);
    let body = program.exp.un_nx(&mut generator.temps);
    let body = outermost.frame().proc_entry_exit(body);

    debug!("emitting fragment for _main");
    generator.fragments.push(Fragment::Proc {
        body,
        level: Rc::clone(&outermost),
    });

    generator.fragments
}

/// Entrada de variable: dónde vive y de qué tipo es.
struct VarTranslation<F: Frame> {
    level: Rc<Level<F>>,
    access: Access,
    ty: TyRef,
}

impl<F: Frame> Clone for VarTranslation<F> {
    fn clone(&self) -> Self {
        VarTranslation {
            level: Rc::clone(&self.level),
            access: self.access.clone(),
            ty: Rc::clone(&self.ty),
        }
    }
}

/// Entrada de función: su nivel, su etiqueta y su tipo de resultado.
struct FunTranslation<F: Frame> {
    level: Rc<Level<F>>,
    label: Label,
    result: TyRef,
}

impl<F: Frame> Clone for FunTranslation<F> {
    fn clone(&self) -> Self {
        FunTranslation {
            level: Rc::clone(&self.level),
            label: self.label.clone(),
            result: Rc::clone(&self.result),
        }
    }
}

/// Una expresión traducida junto al tipo que reconstruye.
struct Translation {
    exp: TransExp,
    ty: TyRef,
}

struct IrGenerator<'a, F: Frame> {
    ctx: &'a TypeContext,
    temps: TempFactory,
    current: Rc<Level<F>>,
    fragments: Vec<Fragment<F>>,
    break_labels: Vec<Label>,
    type_env: SymbolTable<TyRef>,
    var_env: SymbolTable<VarTranslation<F>>,
    fun_env: SymbolTable<FunTranslation<F>>,

    /// Cuenta usos de cada nombre de función para acuñar etiquetas
    /// únicas cuando un nombre se redeclara.
    fun_labels: HashMap<Symbol, u32>,
}

impl<F: Frame> IrGenerator<'_, F> {
    fn enter_builtins(&mut self, outermost: &Rc<Level<F>>) {
        self.type_env.enter(Symbol::new("int"), self.ctx.int());
        self.type_env.enter(Symbol::new("string"), self.ctx.string());

        // Las funciones del runtime viven en el nivel más externo y se
        // llaman por su propio nombre, sin static link
        for (name, _, result) in semantic::builtin_signatures(self.ctx) {
            self.fun_env.enter(
                Symbol::new(name),
                FunTranslation {
                    level: Rc::clone(outermost),
                    label: self.temps.named_label(name),
                    result,
                },
            );
        }
    }

    fn begin_scope(&mut self) {
        self.type_env.begin_scope();
        self.var_env.begin_scope();
        self.fun_env.begin_scope();
    }

    fn end_scope(&mut self) {
        self.type_env.end_scope();
        self.var_env.end_scope();
        self.fun_env.end_scope();
    }

    /// Busca un tipo por nombre, con `int` como recuperación.
    fn lookup_type(&self, name: &Symbol) -> TyRef {
        self.type_env
            .lookup(name)
            .map(Rc::clone)
            .unwrap_or_else(|| self.ctx.int())
    }

    /// Etiqueta para una función declarada, única dentro del programa.
    fn function_label(&mut self, name: &Symbol) -> Label {
        let uses = self.fun_labels.get(name).copied().unwrap_or(0);
        self.fun_labels.insert(name.clone(), uses + 1);

        if uses == 0 {
            self.temps.named_label(name.as_ref())
        } else {
            self.temps.named_label(&format!("{}.{}", name, uses))
        }
    }

    //==========================================================================
    // Static links y accesos
    //==========================================================================

    /// Construye la cadena de static links desde un nivel hasta otro.
    ///
    /// Parte del frame pointer del nivel actual y derreferencia el
    /// primer formal de cada frame intermedio.
    fn static_link_chain(&self, from: &Rc<Level<F>>, to: &Rc<Level<F>>) -> Exp {
        let mut pointer = Exp::Temp(self.current.frame().frame_pointer());
        let mut level = Rc::clone(from);

        while !Rc::ptr_eq(&level, to) {
            let parent = match level.parent() {
                Some(parent) => Rc::clone(parent),
                None => break,
            };

            let link = level.frame().formals().first().cloned();
            if let Some(link) = link {
                pointer = access_to_exp(&link, pointer);
            }

            level = parent;
        }

        pointer
    }

    /// Traduce el acceso a una variable, cruzando niveles si es preciso.
    fn access_var(&self, entry: &VarTranslation<F>) -> Exp {
        let pointer = self.static_link_chain(&self.current, &entry.level);
        access_to_exp(&entry.access, pointer)
    }

    //==========================================================================
    // Expresiones
    //==========================================================================

    fn trans_expr(&mut self, expr: &Located<Expr>) -> Translation {
        match expr.val() {
            Expr::Nil => Translation {
                exp: TransExp::Ex(Exp::Const(0)),
                ty: self.ctx.nil(),
            },

            Expr::Int(value) => Translation {
                exp: TransExp::Ex(Exp::Const(*value)),
                ty: self.ctx.int(),
            },

            Expr::Str(value) => {
                let label = self.temps.new_label();
                debug!("emitting string fragment {}", label);
                self.fragments.push(Fragment::Str {
                    label: label.clone(),
                    value: value.clone(),
                });

                Translation {
                    exp: TransExp::Ex(Exp::Name(label)),
                    ty: self.ctx.string(),
                }
            }

            Expr::Var(lvalue) => {
                let (exp, ty) = self.trans_lvalue(lvalue);
                Translation {
                    exp: TransExp::Ex(exp),
                    ty,
                }
            }

            Expr::Op { op, left, right } => self.trans_op(*op, left, right),

            Expr::Call { func, args } => self.trans_call(func, args),

            Expr::Record { type_id, fields } => self.trans_record(type_id.val(), fields),

            Expr::Array { type_id, size, init } => {
                let size = self.trans_expr(size).exp.un_ex(&mut self.temps);
                let init = self.trans_expr(init).exp.un_ex(&mut self.temps);

                let call = Exp::Call(
                    Box::new(Exp::Name(self.temps.named_label("initArray"))),
                    vec![size, init],
                );

                Translation {
                    exp: TransExp::Ex(call),
                    ty: self.lookup_type(type_id.val()),
                }
            }

            Expr::Assign { target, value } => {
                let value = self.trans_expr(value).exp.un_ex(&mut self.temps);
                let (dst, _) = self.trans_lvalue(target.val());

                Translation {
                    exp: TransExp::Nx(mov(dst, value)),
                    ty: self.ctx.void(),
                }
            }

            Expr::If {
                test,
                then,
                otherwise,
            } => self.trans_if(test, then, otherwise.as_deref()),

            Expr::While { test, body } => {
                let test_label = self.temps.new_label();
                let body_label = self.temps.new_label();
                let done = self.temps.new_label();

                self.break_labels.push(done.clone());
                let test = self.trans_expr(test);
                let body = self.trans_expr(body);
                self.break_labels.pop();

                let test_jump =
                    test.exp
                        .un_cx(body_label.clone(), done.clone(), &mut self.temps);
                let body_stm = body.exp.un_nx(&mut self.temps);

                Translation {
                    exp: TransExp::Nx(ir::seq([
                        Stm::Label(test_label.clone()),
                        test_jump,
                        Stm::Label(body_label),
                        body_stm,
                        ir::jump(test_label),
                        Stm::Label(done),
                    ])),
                    ty: self.ctx.void(),
                }
            }

            Expr::For {
                var,
                escape,
                lo,
                hi,
                body,
            } => self.trans_for(var.val(), escape.get(), lo, hi, body),

            Expr::Break => {
                // Fuera de un bucle el salto se degrada a no hacer nada
                let stm = match self.break_labels.last() {
                    Some(done) => ir::jump(done.clone()),
                    None => Stm::Exp(Box::new(Exp::Const(0))),
                };

                Translation {
                    exp: TransExp::Nx(stm),
                    ty: self.ctx.void(),
                }
            }

            Expr::Let { decls, body } => self.trans_let(decls, body),

            Expr::Seq(exprs) => {
                let mut stms = Vec::new();
                self.trans_body(exprs, &mut stms)
            }
        }
    }

    fn trans_lvalue(&mut self, lvalue: &Lvalue) -> (Exp, TyRef) {
        match lvalue {
            Lvalue::Simple(name) => match self.var_env.lookup(name).cloned() {
                Some(entry) => {
                    let exp = self.access_var(&entry);
                    (exp, entry.ty)
                }

                // Debió atraparlo el análisis semántico
                None => (Exp::Const(0), self.ctx.int()),
            },

            Lvalue::Field(base, field) => {
                let (base_exp, base_ty) = self.trans_lvalue(base.val());
                let record = types::actual(&base_ty);

                let index = record.field_index(field.val()).unwrap_or(0);
                let ty = record
                    .record_fields()
                    .and_then(|fields| fields.get(index))
                    .map(|(_, ty)| Rc::clone(ty))
                    .unwrap_or_else(|| self.ctx.int());

                let offset = index as i64 * F::WORD_SIZE;
                let exp = Exp::Mem(Box::new(plus(base_exp, Exp::Const(offset))));
                (exp, ty)
            }

            Lvalue::Subscript(base, index) => {
                let (base_exp, base_ty) = self.trans_lvalue(base.val());
                let element = types::actual(&base_ty)
                    .array_element()
                    .map(Rc::clone)
                    .unwrap_or_else(|| self.ctx.int());

                let index = self.trans_expr(index).exp.un_ex(&mut self.temps);
                let offset = Exp::Binop(
                    BinOp::Mul,
                    Box::new(index),
                    Box::new(Exp::Const(F::WORD_SIZE)),
                );

                (Exp::Mem(Box::new(plus(base_exp, offset))), element)
            }
        }
    }

    fn trans_op(
        &mut self,
        op: Oper,
        left: &Located<Expr>,
        right: &Located<Expr>,
    ) -> Translation {
        let left = self.trans_expr(left).exp;
        let right = self.trans_expr(right).exp;

        let exp = match op {
            Oper::Plus | Oper::Minus | Oper::Times | Oper::Divide => {
                let op = match op {
                    Oper::Plus => BinOp::Plus,
                    Oper::Minus => BinOp::Minus,
                    Oper::Times => BinOp::Mul,
                    _ => BinOp::Div,
                };

                let left = left.un_ex(&mut self.temps);
                let right = right.un_ex(&mut self.temps);
                TransExp::Ex(Exp::Binop(op, Box::new(left), Box::new(right)))
            }

            Oper::Eq | Oper::Neq | Oper::Lt | Oper::Le | Oper::Gt | Oper::Ge => {
                let rel = match op {
                    Oper::Eq => RelOp::Eq,
                    Oper::Neq => RelOp::Ne,
                    Oper::Lt => RelOp::Lt,
                    Oper::Le => RelOp::Le,
                    Oper::Gt => RelOp::Gt,
                    _ => RelOp::Ge,
                };

                let left = left.un_ex(&mut self.temps);
                let right = right.un_ex(&mut self.temps);
                TransExp::Cx(Box::new(
                    move |t: Label, f: Label, _: &mut TempFactory| {
                        Stm::CJump(rel, Box::new(left), Box::new(right), t, f)
                    },
                ))
            }

            // `a & b` es `if a then b else 0`: si a es falso ya se
            // sabe el destino; si no, decide b
            Oper::And => TransExp::Cx(Box::new(
                move |t: Label, f: Label, temps: &mut TempFactory| {
                    let middle = temps.new_label();
                    let first = left.un_cx(middle.clone(), f.clone(), temps);
                    let second = right.un_cx(t, f, temps);
                    ir::seq([first, Stm::Label(middle), second])
                },
            )),

            // `a | b` es simétrico: si a es verdadero ya se sabe
            Oper::Or => TransExp::Cx(Box::new(
                move |t: Label, f: Label, temps: &mut TempFactory| {
                    let middle = temps.new_label();
                    let first = left.un_cx(t.clone(), middle.clone(), temps);
                    let second = right.un_cx(t, f, temps);
                    ir::seq([first, Stm::Label(middle), second])
                },
            )),
        };

        Translation {
            exp,
            ty: self.ctx.int(),
        }
    }

    fn trans_call(&mut self, func: &Located<Symbol>, args: &[Located<Expr>]) -> Translation {
        let entry = match self.fun_env.lookup(func.val()).cloned() {
            Some(entry) => entry,
            None => {
                return Translation {
                    exp: TransExp::Ex(Exp::Const(0)),
                    ty: self.ctx.int(),
                }
            }
        };

        let mut actuals = Vec::new();

        // Una función anidada recibe como primer argumento implícito
        // el enlace al frame de su función envolvente. Las funciones
        // del runtime y las del nivel más externo no lo llevan.
        if let Some(parent) = entry.level.parent() {
            let link = self.static_link_chain(&Rc::clone(&self.current), parent);
            actuals.push(link);
        }

        for arg in args {
            let arg = self.trans_expr(arg).exp.un_ex(&mut self.temps);
            actuals.push(arg);
        }

        Translation {
            exp: TransExp::Ex(Exp::Call(
                Box::new(Exp::Name(entry.label.clone())),
                actuals,
            )),
            ty: entry.result,
        }
    }

    fn trans_record(
        &mut self,
        type_id: &Symbol,
        fields: &[(Located<Symbol>, Located<Expr>)],
    ) -> Translation {
        let ty = self.lookup_type(type_id);
        let record = self.temps.new_temp();

        // El record se reserva en el heap y el puntero queda en un
        // temporal; luego cada campo se inicializa en orden de fuente
        let bytes = fields.len() as i64 * F::WORD_SIZE;
        let alloc = mov(
            Exp::Temp(record),
            Exp::Call(
                Box::new(Exp::Name(self.temps.named_label("allocRecord"))),
                vec![Exp::Const(bytes)],
            ),
        );

        let mut stms = vec![alloc];
        for (index, (_, value)) in fields.iter().enumerate() {
            let value = self.trans_expr(value).exp.un_ex(&mut self.temps);
            let offset = index as i64 * F::WORD_SIZE;
            let slot = Exp::Mem(Box::new(plus(Exp::Temp(record), Exp::Const(offset))));
            stms.push(mov(slot, value));
        }

        Translation {
            exp: TransExp::Ex(Exp::Eseq(
                Box::new(ir::seq(stms)),
                Box::new(Exp::Temp(record)),
            )),
            ty,
        }
    }

    fn trans_if(
        &mut self,
        test: &Located<Expr>,
        then: &Located<Expr>,
        otherwise: Option<&Located<Expr>>,
    ) -> Translation {
        let test = self.trans_expr(test);
        let then = self.trans_expr(then);

        let true_label = self.temps.new_label();
        let false_label = self.temps.new_label();

        match otherwise {
            Some(otherwise) => {
                let otherwise = self.trans_expr(otherwise);
                let join = self.temps.new_label();
                let result = self.temps.new_temp();

                let test_jump =
                    test.exp
                        .un_cx(true_label.clone(), false_label.clone(), &mut self.temps);
                let then_ty = then.ty;
                let then_value = then.exp.un_ex(&mut self.temps);
                let else_value = otherwise.exp.un_ex(&mut self.temps);

                Translation {
                    exp: TransExp::Ex(Exp::Eseq(
                        Box::new(ir::seq([
                            test_jump,
                            Stm::Label(true_label),
                            mov(Exp::Temp(result), then_value),
                            ir::jump(join.clone()),
                            Stm::Label(false_label),
                            mov(Exp::Temp(result), else_value),
                            ir::jump(join.clone()),
                            Stm::Label(join),
                        ])),
                        Box::new(Exp::Temp(result)),
                    )),
                    ty: then_ty,
                }
            }

            None => {
                let test_jump =
                    test.exp
                        .un_cx(true_label.clone(), false_label.clone(), &mut self.temps);
                let then_stm = then.exp.un_nx(&mut self.temps);

                Translation {
                    exp: TransExp::Nx(ir::seq([
                        test_jump,
                        Stm::Label(true_label),
                        then_stm,
                        Stm::Label(false_label),
                    ])),
                    ty: self.ctx.void(),
                }
            }
        }
    }

    fn trans_for(
        &mut self,
        var: &Symbol,
        escape: bool,
        lo: &Located<Expr>,
        hi: &Located<Expr>,
        body: &Located<Expr>,
    ) -> Translation {
        let body_label = self.temps.new_label();
        let increment = self.temps.new_label();
        let done = self.temps.new_label();

        let access = self.current.alloc_local(escape, &mut self.temps);
        let entry = VarTranslation {
            level: Rc::clone(&self.current),
            access,
            ty: self.ctx.int(),
        };

        self.begin_scope();
        self.var_env.enter(var.clone(), entry.clone());

        let lo = self.trans_expr(lo).exp.un_ex(&mut self.temps);
        let hi = self.trans_expr(hi).exp.un_ex(&mut self.temps);

        let index = self.access_var(&entry);
        let limit = self.temps.new_temp();

        self.break_labels.push(done.clone());
        let body = self.trans_expr(body).exp.un_nx(&mut self.temps);
        self.break_labels.pop();
        self.end_scope();

        // El incremento solo ocurre tras comprobar `i < limit`, de
        // manera que `hi = maxint` no desborde el índice
        Translation {
            exp: TransExp::Nx(ir::seq([
                mov(index.clone(), lo),
                mov(Exp::Temp(limit), hi),
                Stm::CJump(
                    RelOp::Le,
                    Box::new(index.clone()),
                    Box::new(Exp::Temp(limit)),
                    body_label.clone(),
                    done.clone(),
                ),
                Stm::Label(body_label.clone()),
                body,
                Stm::CJump(
                    RelOp::Lt,
                    Box::new(index.clone()),
                    Box::new(Exp::Temp(limit)),
                    increment.clone(),
                    done.clone(),
                ),
                Stm::Label(increment),
                mov(index.clone(), plus(index, Exp::Const(1))),
                ir::jump(body_label),
                Stm::Label(done),
            ])),
            ty: self.ctx.void(),
        }
    }

    //==========================================================================
    // Declaraciones
    //==========================================================================

    fn trans_let(&mut self, decls: &[Located<Decl>], body: &[Located<Expr>]) -> Translation {
        self.begin_scope();

        // Las declaraciones consecutivas de una misma clase forman un
        // lote, igual que en el análisis semántico, para que funciones
        // y tipos mutuamente recursivos se resuelvan entre sí
        let mut stms = Vec::new();
        let mut i = 0;
        while i < decls.len() {
            match decls[i].val() {
                Decl::Type { .. } => {
                    let start = i;
                    while i < decls.len() && matches!(decls[i].val(), Decl::Type { .. }) {
                        i += 1;
                    }

                    self.trans_type_batch(&decls[start..i]);
                }

                Decl::Function { .. } => {
                    let start = i;
                    while i < decls.len() && matches!(decls[i].val(), Decl::Function { .. }) {
                        i += 1;
                    }

                    self.trans_function_batch(&decls[start..i]);
                }

                Decl::Var {
                    name,
                    type_id,
                    init,
                    escape,
                } => {
                    let stm = self.trans_var_decl(name.val(), type_id.as_ref(), init, escape.get());
                    stms.push(stm);
                    i += 1;
                }
            }
        }

        let translation = self.trans_body(body, &mut stms);
        self.end_scope();

        translation
    }

    /// Secuencia los cuerpos de un `let` o de un `Seq` tras el prefijo
    /// de sentencias dado, conservando el valor de la última expresión.
    fn trans_body(&mut self, body: &[Located<Expr>], stms: &mut Vec<Stm>) -> Translation {
        let mut last: Option<Translation> = None;
        for (i, expr) in body.iter().enumerate() {
            let translation = self.trans_expr(expr);
            if i + 1 == body.len() {
                last = Some(translation);
            } else {
                let stm = translation.exp.un_nx(&mut self.temps);
                stms.push(stm);
            }
        }

        let last = match last {
            Some(last) => last,
            None => {
                // Sin cuerpo no hay valor
                return Translation {
                    exp: TransExp::Nx(ir::seq(stms.drain(..))),
                    ty: self.ctx.void(),
                };
            }
        };

        if stms.is_empty() {
            return last;
        }

        // Si la última expresión tampoco produce valor, el resultado
        // entero es una sentencia; de lo contrario es un Eseq
        match last.exp {
            TransExp::Nx(stm) => {
                stms.push(stm);
                Translation {
                    exp: TransExp::Nx(ir::seq(stms.drain(..))),
                    ty: last.ty,
                }
            }

            exp => {
                let value = exp.un_ex(&mut self.temps);
                Translation {
                    exp: TransExp::Ex(Exp::Eseq(
                        Box::new(ir::seq(stms.drain(..))),
                        Box::new(value),
                    )),
                    ty: last.ty,
                }
            }
        }
    }

    fn trans_var_decl(
        &mut self,
        name: &Symbol,
        type_id: Option<&Located<Symbol>>,
        init: &Located<Expr>,
        escape: bool,
    ) -> Stm {
        // El inicializador se traduce antes de ligar el nombre, por si
        // la declaración ensombrece una variable que el propio
        // inicializador usa
        let init = self.trans_expr(init);

        let ty = match type_id {
            Some(type_id) => self.lookup_type(type_id.val()),
            None => init.ty,
        };

        let access = self.current.alloc_local(escape, &mut self.temps);
        self.var_env.enter(
            name.clone(),
            VarTranslation {
                level: Rc::clone(&self.current),
                access: access.clone(),
                ty,
            },
        );

        let frame_pointer = Exp::Temp(self.current.frame().frame_pointer());
        let dst = access_to_exp(&access, frame_pointer);
        let value = init.exp.un_ex(&mut self.temps);

        mov(dst, value)
    }

    /// Lote de tipos: publica los alias y luego ata las definiciones.
    ///
    /// Es la misma resolución en dos fases del análisis semántico,
    /// sin diagnóstico; los errores ya fueron reportados.
    fn trans_type_batch(&mut self, batch: &[Located<Decl>]) {
        for decl in batch {
            if let Decl::Type { name, .. } = decl.val() {
                let alias = self.ctx.new_alias(name.val().clone());
                self.type_env.enter(name.val().clone(), alias);
            }
        }

        for decl in batch {
            if let Decl::Type { name, ty } = decl.val() {
                let translated = self.trans_type_ast(ty);
                if let Some(alias) = self.type_env.lookup(name.val()) {
                    alias.bind(translated);
                }
            }
        }
    }

    fn trans_type_ast(&mut self, ty: &TypeAst) -> TyRef {
        match ty {
            TypeAst::Name(name) => self.lookup_type(name.val()),

            TypeAst::Record(fields) => {
                let fields = fields
                    .iter()
                    .map(|field| {
                        (
                            field.name.val().clone(),
                            self.lookup_type(field.type_id.val()),
                        )
                    })
                    .collect();

                self.ctx.new_record(fields)
            }

            TypeAst::Array(element) => {
                let element = self.lookup_type(element.val());
                self.ctx.new_array(element)
            }
        }
    }

    /// Lote de funciones mutuamente recursivas.
    ///
    /// La primera fase crea nivel, etiqueta y entrada para cada
    /// función del lote; la segunda traduce los cuerpos, de manera que
    /// las llamadas cruzadas dentro del lote resuelvan su destino.
    fn trans_function_batch(&mut self, batch: &[Located<Decl>]) {
        for decl in batch {
            if let Decl::Function {
                name,
                params,
                result,
                ..
            } = decl.val()
            {
                let formals: Vec<bool> = params.iter().map(|param| param.escape.get()).collect();
                let label = self.function_label(name.val());
                let level = Level::child(&self.current, label.clone(), &formals, &mut self.temps);

                let result = match result {
                    Some(type_id) => self.lookup_type(type_id.val()),
                    None => self.ctx.void(),
                };

                self.fun_env.enter(
                    name.val().clone(),
                    FunTranslation {
                        level,
                        label,
                        result,
                    },
                );
            }
        }

        for decl in batch {
            if let Decl::Function {
                name,
                params,
                result,
                body,
            } = decl.val()
            {
                self.trans_function_body(name.val(), params, result.is_some(), body);
            }
        }
    }

    fn trans_function_body(
        &mut self,
        name: &Symbol,
        params: &[Field],
        has_result: bool,
        body: &Located<Expr>,
    ) {
        let entry = match self.fun_env.lookup(name).cloned() {
            Some(entry) => entry,
            None => return,
        };

        let saved = Rc::clone(&self.current);
        self.current = Rc::clone(&entry.level);
        self.begin_scope();

        // Los parámetros toman los accesos que el frame les asignó; el
        // índice 0 es el static link y no corresponde a ninguno
        let formals: Vec<Access> = entry.level.frame().formals().to_vec();
        for (param, access) in params.iter().zip(formals.into_iter().skip(1)) {
            let ty = self.lookup_type(param.type_id.val());
            self.var_env.enter(
                param.name.val().clone(),
                VarTranslation {
                    level: Rc::clone(&entry.level),
                    access,
                    ty,
                },
            );
        }

        let body = self.trans_expr(body);
        let body_stm = if has_result {
            let return_value = Exp::Temp(entry.level.frame().return_value());
            let value = body.exp.un_ex(&mut self.temps);
            mov(return_value, value)
        } else {
            body.exp.un_nx(&mut self.temps)
        };

        self.end_scope();

        let body_stm = entry.level.frame().proc_entry_exit(body_stm);
        debug!("emitting fragment for {}", entry.label);
        self.fragments.push(Fragment::Proc {
            body: body_stm,
            level: Rc::clone(&entry.level),
        });

        self.current = saved;
    }
}

/// Aplica un acceso sobre el frame pointer que le corresponde.
fn access_to_exp(access: &Access, frame_pointer: Exp) -> Exp {
    match access {
        Access::InFrame(offset) => {
            Exp::Mem(Box::new(plus(frame_pointer, Exp::Const(*offset))))
        }

        Access::InReg(temp) => Exp::Temp(*temp),
    }
}

fn plus(left: Exp, right: Exp) -> Exp {
    Exp::Binop(BinOp::Plus, Box::new(left), Box::new(right))
}

fn mov(dst: Exp, src: Exp) -> Stm {
    Stm::Move(Box::new(dst), Box::new(src))
}
