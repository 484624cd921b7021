//! Análisis semántico.
//!
//! El chequeo de tipos recorre el árbol de sintaxis con dos espacios
//! de nombres apilados: uno para tipos y otro compartido entre
//! variables y funciones. Las declaraciones consecutivas de un mismo
//! tipo forman lotes mutuamente recursivos que se procesan en dos
//! fases: primero se publican los encabezados y luego se resuelven
//! las definiciones.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use thiserror::Error;

use crate::{
    lex::Symbol,
    parse::{Decl, Expr, Field, Lvalue, Oper, TypeAst},
    source::{Located, Position},
    types::{self, Ty, TyRef, TypeContext},
};

pub type Semantic<T> = Result<T, Located<SemanticError>>;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("Undefined variable `{0}`")]
    UndefinedVariable(Symbol),

    #[error("Undefined function `{0}`")]
    UndefinedFunction(Symbol),

    #[error("Undefined type `{0}`")]
    UndefinedType(Symbol),

    #[error("`{0}` is a function, not a variable")]
    NotAVariable(Symbol),

    #[error("`{0}` is a variable, not a function")]
    NotAFunction(Symbol),

    #[error("Function `{func}` expects {expected} arguments, got {found}")]
    ArityMismatch {
        func: Symbol,
        expected: usize,
        found: usize,
    },

    #[error("{context} (expected `{expected}`, found `{found}`)")]
    TypeMismatch {
        context: &'static str,
        expected: TyRef,
        found: TyRef,
    },

    #[error("Comparison is not defined for type `{0}`")]
    NotComparable(TyRef),

    #[error("Field access on non-record type `{0}`")]
    NotARecord(TyRef),

    #[error("Record has no field named `{0}`")]
    FieldNotFound(Symbol),

    #[error("Array subscript on non-array type `{0}`")]
    NotAnArray(TyRef),

    #[error("Type `{0}` is not a record type")]
    NotARecordType(Symbol),

    #[error("Type `{0}` is not an array type")]
    NotAnArrayType(Symbol),

    #[error("Record creation expects {expected} fields, got {found}")]
    RecordFieldCount { expected: usize, found: usize },

    #[error("Field `{0}` not found or out of order in record creation")]
    RecordFieldName(Symbol),

    #[error("Cannot assign to loop variable `{0}`")]
    AssignToLoopVariable(Symbol),

    #[error("break statement must be inside a loop")]
    BreakOutsideLoop,

    #[error("Type declaration cycle detected: {0}")]
    TypeCycle(String),

    #[error("Duplicate name `{0}` in recursive declaration group")]
    DuplicateName(Symbol),

    #[error("Cannot infer a type for `{0}` from nil, a type annotation is required")]
    UnconstrainedNil(Symbol),
}

/// Tabla de símbolos con anidamiento de alcances.
///
/// Cada alcance es un mapa de nombres a valores. Las búsquedas van del
/// alcance más interno hacia afuera.
pub struct SymbolTable<T> {
    scopes: Vec<HashMap<Symbol, T>>,
}

impl<T> SymbolTable<T> {
    /// Crea una tabla con el alcance global ya abierto.
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn end_scope(&mut self) {
        self.scopes.pop();
    }

    /// Registra un nombre en el alcance actual.
    pub fn enter(&mut self, name: Symbol, value: T) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, value);
        }
    }

    /// Busca un nombre del alcance más interno hacia afuera.
    pub fn lookup(&self, name: &Symbol) -> Option<&T> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Determina si un nombre ya existe en el alcance actual.
    pub fn exists_in_current_scope(&self, name: &Symbol) -> bool {
        self.scopes
            .last()
            .map(|scope| scope.contains_key(name))
            .unwrap_or(false)
    }
}

impl<T> Default for SymbolTable<T> {
    fn default() -> Self {
        SymbolTable::new()
    }
}

/// Una entrada del espacio de nombres de valores.
///
/// Variables y funciones comparten espacio de nombres, por lo cual un
/// mismo alcance no puede contener una variable y una función con el
/// mismo nombre.
#[derive(Clone)]
pub enum ValueEntry {
    Var {
        ty: TyRef,
        /// Las variables de índice de `for` no admiten asignación.
        read_only: bool,
    },

    Func {
        /// Siempre una firma `Ty::Function`.
        ty: TyRef,
    },
}

/// Los dos espacios de nombres más el estado de anidamiento de bucles.
struct Environment<'a> {
    ctx: &'a TypeContext,
    type_env: SymbolTable<TyRef>,
    value_env: SymbolTable<ValueEntry>,
    loop_depth: u32,
}

impl<'a> Environment<'a> {
    fn new(ctx: &'a TypeContext) -> Self {
        let mut env = Environment {
            ctx,
            type_env: SymbolTable::new(),
            value_env: SymbolTable::new(),
            loop_depth: 0,
        };

        env.type_env.enter(Symbol::new("int"), ctx.int());
        env.type_env.enter(Symbol::new("string"), ctx.string());

        for (name, params, result) in builtin_signatures(ctx) {
            let ty = ctx.new_function(params, result);
            env.value_env.enter(Symbol::new(name), ValueEntry::Func { ty });
        }

        env
    }

    fn begin_scope(&mut self) {
        self.type_env.begin_scope();
        self.value_env.begin_scope();
    }

    fn end_scope(&mut self) {
        self.type_env.end_scope();
        self.value_env.end_scope();
    }

    fn enter_var(&mut self, name: Symbol, ty: TyRef, read_only: bool) {
        self.value_env.enter(name, ValueEntry::Var { ty, read_only });
    }
}

/// Firmas de las funciones provistas por el runtime.
pub fn builtin_signatures(ctx: &TypeContext) -> Vec<(&'static str, Vec<TyRef>, TyRef)> {
    vec![
        ("print", vec![ctx.string()], ctx.void()),
        ("printi", vec![ctx.int()], ctx.void()),
        ("flush", vec![], ctx.void()),
        ("getchar", vec![], ctx.string()),
        ("ord", vec![ctx.string()], ctx.int()),
        ("chr", vec![ctx.int()], ctx.string()),
        ("size", vec![ctx.string()], ctx.int()),
        (
            "substring",
            vec![ctx.string(), ctx.int(), ctx.int()],
            ctx.string(),
        ),
        ("concat", vec![ctx.string(), ctx.string()], ctx.string()),
        ("not", vec![ctx.int()], ctx.int()),
        ("exit", vec![ctx.int()], ctx.void()),
    ]
}

/// Chequea el programa completo y obtiene el tipo de su expresión raíz.
pub fn analyze(program: &Located<Expr>, ctx: &TypeContext) -> Semantic<TyRef> {
    let mut analyzer = Analyzer {
        env: Environment::new(ctx),
    };

    analyzer.check_expr(program)
}

struct Analyzer<'a> {
    env: Environment<'a>,
}

impl Analyzer<'_> {
    fn check_expr(&mut self, expr: &Located<Expr>) -> Semantic<TyRef> {
        let position = expr.position();

        match expr.val() {
            Expr::Nil => Ok(self.env.ctx.nil()),
            Expr::Int(_) => Ok(self.env.ctx.int()),
            Expr::Str(_) => Ok(self.env.ctx.string()),

            Expr::Var(lvalue) => self.check_lvalue(lvalue, position),

            Expr::Op { op, left, right } => self.check_op(*op, left, right, position),

            Expr::Call { func, args } => self.check_call(func, args),

            Expr::Record { type_id, fields } => self.check_record(type_id, fields),

            Expr::Array {
                type_id,
                size,
                init,
            } => self.check_array(type_id, size, init),

            Expr::Assign { target, value } => {
                let target_ty = self.check_lvalue(target.val(), target.position())?;

                if let Lvalue::Simple(name) = target.val() {
                    if let Some(ValueEntry::Var {
                        read_only: true, ..
                    }) = self.env.value_env.lookup(name)
                    {
                        return Err(Located::at(
                            SemanticError::AssignToLoopVariable(name.clone()),
                            target.position(),
                        ));
                    }
                }

                let value_ty = self.check_expr(value)?;
                self.check_assignable(&target_ty, &value_ty, "Type mismatch in assignment", position)?;

                Ok(self.env.ctx.void())
            }

            Expr::If {
                test,
                then,
                otherwise,
            } => {
                let test_ty = self.check_expr(test)?;
                self.check_int(&test_ty, "If condition must be integer", test.position())?;

                let then_ty = self.check_expr(then)?;
                match otherwise {
                    Some(otherwise) => {
                        let else_ty = self.check_expr(otherwise)?;
                        if !types::equals(&then_ty, &else_ty) {
                            return Err(Located::at(
                                SemanticError::TypeMismatch {
                                    context: "If-then-else branches must have the same type",
                                    expected: then_ty,
                                    found: else_ty,
                                },
                                position,
                            ));
                        }

                        Ok(then_ty)
                    }

                    None => {
                        if !types::actual(&then_ty).is_void() {
                            return Err(Located::at(
                                SemanticError::TypeMismatch {
                                    context: "If-then without else must produce no value",
                                    expected: self.env.ctx.void(),
                                    found: then_ty,
                                },
                                then.position(),
                            ));
                        }

                        Ok(self.env.ctx.void())
                    }
                }
            }

            Expr::While { test, body } => {
                let test_ty = self.check_expr(test)?;
                self.check_int(&test_ty, "While condition must be integer", test.position())?;

                self.env.loop_depth += 1;
                let body_ty = self.check_expr(body);
                self.env.loop_depth -= 1;

                let body_ty = body_ty?;
                if !types::actual(&body_ty).is_void() {
                    return Err(Located::at(
                        SemanticError::TypeMismatch {
                            context: "While loop body must produce no value",
                            expected: self.env.ctx.void(),
                            found: body_ty,
                        },
                        body.position(),
                    ));
                }

                Ok(self.env.ctx.void())
            }

            Expr::For {
                var,
                lo,
                hi,
                body,
                ..
            } => {
                let lo_ty = self.check_expr(lo)?;
                let hi_ty = self.check_expr(hi)?;
                self.check_int(&lo_ty, "For loop lower bound must be int", lo.position())?;
                self.check_int(&hi_ty, "For loop upper bound must be int", hi.position())?;

                self.env.begin_scope();
                self.env
                    .enter_var(var.val().clone(), self.env.ctx.int(), true);

                self.env.loop_depth += 1;
                let body_ty = self.check_expr(body);
                self.env.loop_depth -= 1;
                self.env.end_scope();

                let body_ty = body_ty?;
                if !types::actual(&body_ty).is_void() {
                    return Err(Located::at(
                        SemanticError::TypeMismatch {
                            context: "For loop body must produce no value",
                            expected: self.env.ctx.void(),
                            found: body_ty,
                        },
                        body.position(),
                    ));
                }

                Ok(self.env.ctx.void())
            }

            Expr::Break => {
                if self.env.loop_depth == 0 {
                    return Err(Located::at(SemanticError::BreakOutsideLoop, position));
                }

                Ok(self.env.ctx.void())
            }

            Expr::Seq(exprs) => {
                let mut last = self.env.ctx.void();
                for expr in exprs {
                    last = self.check_expr(expr)?;
                }

                Ok(last)
            }

            Expr::Let { decls, body } => {
                self.env.begin_scope();
                let result = self.check_let(decls, body);
                self.env.end_scope();

                result
            }
        }
    }

    fn check_lvalue(&mut self, lvalue: &Lvalue, position: Position) -> Semantic<TyRef> {
        match lvalue {
            Lvalue::Simple(name) => match self.env.value_env.lookup(name) {
                Some(ValueEntry::Var { ty, .. }) => Ok(Rc::clone(ty)),

                // Mensaje distinto si el nombre existe en el otro rol
                Some(ValueEntry::Func { .. }) => Err(Located::at(
                    SemanticError::NotAVariable(name.clone()),
                    position,
                )),

                None => Err(Located::at(
                    SemanticError::UndefinedVariable(name.clone()),
                    position,
                )),
            },

            Lvalue::Field(base, field) => {
                let base_ty = self.check_lvalue(base.val(), base.position())?;
                let base_ty = types::actual(&base_ty);

                let field_ty = base_ty
                    .record_fields()
                    .ok_or_else(|| {
                        Located::at(SemanticError::NotARecord(Rc::clone(&base_ty)), position)
                    })?
                    .iter()
                    .find(|(name, _)| name == field.val())
                    .map(|(_, ty)| Rc::clone(ty));

                field_ty.ok_or_else(|| {
                    Located::at(
                        SemanticError::FieldNotFound(field.val().clone()),
                        field.position(),
                    )
                })
            }

            Lvalue::Subscript(base, index) => {
                let base_ty = self.check_lvalue(base.val(), base.position())?;
                let base_ty = types::actual(&base_ty);

                let element = base_ty.array_element().map(Rc::clone).ok_or_else(|| {
                    Located::at(SemanticError::NotAnArray(Rc::clone(&base_ty)), position)
                })?;

                let index_ty = self.check_expr(index)?;
                self.check_int(&index_ty, "Array index must be integer", index.position())?;

                Ok(element)
            }
        }
    }

    fn check_op(
        &mut self,
        op: Oper,
        left: &Located<Expr>,
        right: &Located<Expr>,
        position: Position,
    ) -> Semantic<TyRef> {
        let left_ty = self.check_expr(left)?;
        let right_ty = self.check_expr(right)?;

        match op {
            Oper::Plus | Oper::Minus | Oper::Times | Oper::Divide => {
                self.check_int(
                    &left_ty,
                    "Left operand of arithmetic operator must be int",
                    left.position(),
                )?;
                self.check_int(
                    &right_ty,
                    "Right operand of arithmetic operator must be int",
                    right.position(),
                )?;

                Ok(self.env.ctx.int())
            }

            Oper::Eq | Oper::Neq | Oper::Lt | Oper::Le | Oper::Gt | Oper::Ge => {
                if !types::equals(&left_ty, &right_ty) {
                    return Err(Located::at(
                        SemanticError::TypeMismatch {
                            context: "Comparison operands must have the same type",
                            expected: left_ty,
                            found: right_ty,
                        },
                        position,
                    ));
                }

                // El tipo de operando debe admitir comparación. Solo la
                // igualdad acepta nil, emparejado con un record.
                let mut operand = types::actual(&left_ty);
                if operand.is_nil() && matches!(op, Oper::Eq | Oper::Neq) {
                    operand = types::actual(&right_ty);
                }

                match &*operand {
                    Ty::Int | Ty::String | Ty::Record { .. } | Ty::Array { .. } => {
                        Ok(self.env.ctx.int())
                    }

                    _ => Err(Located::at(SemanticError::NotComparable(operand), position)),
                }
            }

            Oper::And | Oper::Or => {
                self.check_int(
                    &left_ty,
                    "Left operand of logical operator must be int",
                    left.position(),
                )?;
                self.check_int(
                    &right_ty,
                    "Right operand of logical operator must be int",
                    right.position(),
                )?;

                Ok(self.env.ctx.int())
            }
        }
    }

    fn check_call(
        &mut self,
        func: &Located<Symbol>,
        args: &[Located<Expr>],
    ) -> Semantic<TyRef> {
        let entry = match self.env.value_env.lookup(func.val()) {
            Some(ValueEntry::Func { ty }) => Rc::clone(ty),

            Some(ValueEntry::Var { .. }) => {
                return Err(Located::at(
                    SemanticError::NotAFunction(func.val().clone()),
                    func.position(),
                ))
            }

            None => {
                return Err(Located::at(
                    SemanticError::UndefinedFunction(func.val().clone()),
                    func.position(),
                ))
            }
        };

        let (params, result) = entry.as_function().expect("function entry without signature");

        if args.len() != params.len() {
            return Err(Located::at(
                SemanticError::ArityMismatch {
                    func: func.val().clone(),
                    expected: params.len(),
                    found: args.len(),
                },
                func.position(),
            ));
        }

        for (arg, param) in args.iter().zip(params) {
            let arg_ty = self.check_expr(arg)?;
            self.check_assignable(
                param,
                &arg_ty,
                "Argument type mismatch in call",
                arg.position(),
            )?;
        }

        Ok(Rc::clone(result))
    }

    fn check_record(
        &mut self,
        type_id: &Located<Symbol>,
        fields: &[(Located<Symbol>, Located<Expr>)],
    ) -> Semantic<TyRef> {
        let ty = self.lookup_type(type_id)?;
        let record = types::actual(&ty);

        let declared = record.record_fields().ok_or_else(|| {
            Located::at(
                SemanticError::NotARecordType(type_id.val().clone()),
                type_id.position(),
            )
        })?;

        if fields.len() != declared.len() {
            return Err(Located::at(
                SemanticError::RecordFieldCount {
                    expected: declared.len(),
                    found: fields.len(),
                },
                type_id.position(),
            ));
        }

        // Los campos se dan por nombre pero en el orden de declaración
        let declared: Vec<(Symbol, TyRef)> = declared.to_vec();
        for ((name, value), (declared_name, declared_ty)) in fields.iter().zip(&declared) {
            if name.val() != declared_name {
                return Err(Located::at(
                    SemanticError::RecordFieldName(name.val().clone()),
                    name.position(),
                ));
            }

            let value_ty = self.check_expr(value)?;
            self.check_assignable(
                declared_ty,
                &value_ty,
                "Type mismatch in record field",
                value.position(),
            )?;
        }

        Ok(ty)
    }

    fn check_array(
        &mut self,
        type_id: &Located<Symbol>,
        size: &Located<Expr>,
        init: &Located<Expr>,
    ) -> Semantic<TyRef> {
        let ty = self.lookup_type(type_id)?;
        let array = types::actual(&ty);

        let element = array.array_element().map(Rc::clone).ok_or_else(|| {
            Located::at(
                SemanticError::NotAnArrayType(type_id.val().clone()),
                type_id.position(),
            )
        })?;

        let size_ty = self.check_expr(size)?;
        self.check_int(&size_ty, "Array size must be integer", size.position())?;

        let init_ty = self.check_expr(init)?;
        self.check_assignable(
            &element,
            &init_ty,
            "Type mismatch in array initializer",
            init.position(),
        )?;

        Ok(ty)
    }

    /// Procesa las declaraciones de un `let` y luego su cuerpo.
    ///
    /// Las declaraciones se parten en corridas máximas consecutivas de
    /// una misma clase. Cada corrida de tipos o de funciones forma un
    /// lote mutuamente recursivo; las variables se procesan solas y
    /// cierran cualquier lote abierto.
    fn check_let(&mut self, decls: &[Located<Decl>], body: &[Located<Expr>]) -> Semantic<TyRef> {
        let mut i = 0;
        while i < decls.len() {
            match decls[i].val() {
                Decl::Type { .. } => {
                    let start = i;
                    while i < decls.len() && matches!(decls[i].val(), Decl::Type { .. }) {
                        i += 1;
                    }

                    self.check_type_batch(&decls[start..i])?;
                }

                Decl::Function { .. } => {
                    let start = i;
                    while i < decls.len() && matches!(decls[i].val(), Decl::Function { .. }) {
                        i += 1;
                    }

                    self.check_function_batch(&decls[start..i])?;
                }

                Decl::Var {
                    name,
                    type_id,
                    init,
                    ..
                } => {
                    self.check_var_decl(name, type_id.as_ref(), init)?;
                    i += 1;
                }
            }
        }

        let mut last = self.env.ctx.void();
        for expr in body {
            last = self.check_expr(expr)?;
        }

        Ok(last)
    }

    /// Lote de declaraciones de tipo mutuamente recursivas.
    fn check_type_batch(&mut self, batch: &[Located<Decl>]) -> Semantic<()> {
        let names: Vec<(&Located<Symbol>, &TypeAst)> = batch
            .iter()
            .map(|decl| match decl.val() {
                Decl::Type { name, ty } => (name, ty),
                _ => unreachable!("type batch contains a non-type declaration"),
            })
            .collect();

        // Dentro de un lote no se admiten nombres repetidos
        let mut seen = HashSet::new();
        for (name, _) in &names {
            if !seen.insert(name.val().clone()) {
                return Err(Located::at(
                    SemanticError::DuplicateName(name.val().clone()),
                    name.position(),
                ));
            }
        }

        // Fase 1: publicar un alias sin resolver por cada nombre, de
        // manera que toda definición del lote pueda verlos
        for (name, _) in &names {
            let alias = self.env.ctx.new_alias(name.val().clone());
            self.env.type_env.enter(name.val().clone(), alias);
        }

        // Fase 2: traducir las definiciones y atar cada alias
        for (name, ty_ast) in &names {
            let ty = self.translate_type(ty_ast)?;
            if let Some(alias) = self.env.type_env.lookup(name.val()) {
                alias.bind(ty);
            }
        }

        // Fase 3: rechazar ciclos de alias que nunca pasan por un
        // record o arreglo
        let mut checked = HashSet::new();
        for (name, _) in &names {
            if checked.contains(name.val()) {
                continue;
            }

            checked.insert(name.val().clone());

            let mut deps = HashSet::new();
            deps.insert(name.val().clone());
            let mut cycle = vec![name.val().to_string()];

            let mut current = match self.env.type_env.lookup(name.val()) {
                Some(ty) => Rc::clone(ty),
                None => continue,
            };

            loop {
                let binding = match current.alias_binding() {
                    Some(binding) => binding,
                    None => break,
                };

                match &*binding {
                    Ty::Name { name: dep, .. } => {
                        cycle.push(dep.to_string());
                        if !deps.insert(dep.clone()) {
                            return Err(Located::at(
                                SemanticError::TypeCycle(cycle.join(" -> ")),
                                name.position(),
                            ));
                        }
                    }

                    // La dependencia llegó a un tipo concreto
                    _ => break,
                }

                current = binding;
            }
        }

        Ok(())
    }

    /// Lote de declaraciones de función mutuamente recursivas.
    fn check_function_batch(&mut self, batch: &[Located<Decl>]) -> Semantic<()> {
        let mut seen = HashSet::new();

        // Fase 1: publicar todos los encabezados antes de chequear
        // cualquier cuerpo
        for decl in batch {
            let (name, params, result) = match decl.val() {
                Decl::Function {
                    name,
                    params,
                    result,
                    ..
                } => (name, params, result),
                _ => unreachable!("function batch contains a non-function declaration"),
            };

            if !seen.insert(name.val().clone()) {
                return Err(Located::at(
                    SemanticError::DuplicateName(name.val().clone()),
                    name.position(),
                ));
            }

            let param_tys = params
                .iter()
                .map(|param| self.lookup_type(&param.type_id))
                .collect::<Semantic<Vec<_>>>()?;

            let result_ty = match result {
                Some(type_id) => self.lookup_type(type_id)?,
                None => self.env.ctx.void(),
            };

            let ty = self.env.ctx.new_function(param_tys, result_ty);
            self.env
                .value_env
                .enter(name.val().clone(), ValueEntry::Func { ty });
        }

        // Fase 2: chequear los cuerpos con los parámetros en alcance
        for decl in batch {
            let (name, params, body) = match decl.val() {
                Decl::Function {
                    name, params, body, ..
                } => (name, params, body),
                _ => unreachable!(),
            };

            let entry = match self.env.value_env.lookup(name.val()) {
                Some(ValueEntry::Func { ty }) => Rc::clone(ty),
                _ => continue,
            };

            let (param_tys, result_ty) =
                entry.as_function().expect("function entry without signature");
            let param_tys: Vec<TyRef> = param_tys.iter().map(Rc::clone).collect();
            let result_ty = Rc::clone(result_ty);

            self.env.begin_scope();
            for (param, ty) in params.iter().zip(param_tys) {
                self.env.enter_var(param.name.val().clone(), ty, false);
            }

            let body_ty = self.check_expr(body);
            self.env.end_scope();

            let body_ty = body_ty?;

            // Un resultado void acepta cualquier cuerpo y descarta su valor
            if !types::actual(&result_ty).is_void() && !types::equals(&result_ty, &body_ty) {
                return Err(Located::at(
                    SemanticError::TypeMismatch {
                        context: "Function body type does not match declared result type",
                        expected: result_ty,
                        found: body_ty,
                    },
                    body.position(),
                ));
            }
        }

        Ok(())
    }

    fn check_var_decl(
        &mut self,
        name: &Located<Symbol>,
        type_id: Option<&Located<Symbol>>,
        init: &Located<Expr>,
    ) -> Semantic<()> {
        let init_ty = self.check_expr(init)?;

        let var_ty = match type_id {
            Some(type_id) => {
                let declared = self.lookup_type(type_id)?;
                self.check_assignable(
                    &declared,
                    &init_ty,
                    "Type mismatch in variable declaration",
                    init.position(),
                )?;

                declared
            }

            // Un inicializador nil requiere anotación: solo un record
            // puede acotarlo
            None if types::actual(&init_ty).is_nil() => {
                return Err(Located::at(
                    SemanticError::UnconstrainedNil(name.val().clone()),
                    name.position(),
                ));
            }

            None => init_ty,
        };

        self.env.enter_var(name.val().clone(), var_ty, false);
        Ok(())
    }

    /// Traduce el lado derecho de una declaración de tipo.
    fn translate_type(&mut self, ty_ast: &TypeAst) -> Semantic<TyRef> {
        match ty_ast {
            TypeAst::Name(name) => self.lookup_type(name),

            TypeAst::Record(fields) => {
                let fields = fields
                    .iter()
                    .map(|Field { name, type_id, .. }| {
                        Ok((name.val().clone(), self.lookup_type(type_id)?))
                    })
                    .collect::<Semantic<Vec<_>>>()?;

                Ok(self.env.ctx.new_record(fields))
            }

            TypeAst::Array(element) => {
                let element = self.lookup_type(element)?;
                Ok(self.env.ctx.new_array(element))
            }
        }
    }

    fn lookup_type(&self, name: &Located<Symbol>) -> Semantic<TyRef> {
        self.env
            .type_env
            .lookup(name.val())
            .map(Rc::clone)
            .ok_or_else(|| {
                Located::at(
                    SemanticError::UndefinedType(name.val().clone()),
                    name.position(),
                )
            })
    }

    fn check_int(&self, ty: &TyRef, context: &'static str, position: Position) -> Semantic<()> {
        if types::actual(ty).is_int() {
            Ok(())
        } else {
            Err(Located::at(
                SemanticError::TypeMismatch {
                    context,
                    expected: self.env.ctx.int(),
                    found: Rc::clone(ty),
                },
                position,
            ))
        }
    }

    fn check_assignable(
        &self,
        target: &TyRef,
        value: &TyRef,
        context: &'static str,
        position: Position,
    ) -> Semantic<()> {
        if types::is_assignable(target, value) {
            Ok(())
        } else {
            Err(Located::at(
                SemanticError::TypeMismatch {
                    context,
                    expected: Rc::clone(target),
                    found: Rc::clone(value),
                },
                position,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_table_searches_inner_scopes_first() {
        let mut table = SymbolTable::new();
        table.enter(Symbol::new("x"), 1);

        table.begin_scope();
        table.enter(Symbol::new("x"), 2);
        assert_eq!(table.lookup(&Symbol::new("x")), Some(&2));

        table.end_scope();
        assert_eq!(table.lookup(&Symbol::new("x")), Some(&1));
        assert_eq!(table.lookup(&Symbol::new("y")), None);
    }

    #[test]
    fn current_scope_membership_ignores_outer_scopes() {
        let mut table = SymbolTable::new();
        table.enter(Symbol::new("x"), 1);

        table.begin_scope();
        assert!(!table.exists_in_current_scope(&Symbol::new("x")));

        table.enter(Symbol::new("x"), 2);
        assert!(table.exists_in_current_scope(&Symbol::new("x")));
    }
}
