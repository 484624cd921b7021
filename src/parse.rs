//! Análisis sintáctico y árbol de sintaxis abstracta.
//!
//! El parser es de descenso recursivo, con un nivel por operador según
//! la precedencia usual de Tiger. El menos unario se reduce a `0 - e`
//! durante esta fase, por lo que las fases posteriores solo conocen
//! operadores binarios.
//!
//! Las banderas de escape (`Cell<bool>`) nacen en falso y son escritas
//! únicamente por el análisis de escape; el resto del compilador las
//! lee a través de referencias compartidas al árbol.

use std::cell::Cell;

use crate::{
    lex::{Keyword, Symbol, Token},
    source::{Located, Position},
};
use thiserror::Error;

/// Error de análisis sintáctico.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    /// La entrada terminó antes de completar un constructo.
    #[error("Unexpected end of input")]
    UnexpectedEof,

    /// Se esperaba otra cosa en esta posición.
    #[error("Expected {0}, found {1}")]
    Expected(&'static str, Token),
}

pub type Syntax<T> = Result<T, Located<ParserError>>;

/// Un operador binario.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Oper {
    Plus,
    Minus,
    Times,
    Divide,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Una expresión.
#[derive(Debug, Clone)]
pub enum Expr {
    Nil,
    Int(i64),
    Str(String),
    Var(Lvalue),

    Op {
        op: Oper,
        left: Box<Located<Expr>>,
        right: Box<Located<Expr>>,
    },

    Call {
        func: Located<Symbol>,
        args: Vec<Located<Expr>>,
    },

    Record {
        type_id: Located<Symbol>,
        fields: Vec<(Located<Symbol>, Located<Expr>)>,
    },

    Array {
        type_id: Located<Symbol>,
        size: Box<Located<Expr>>,
        init: Box<Located<Expr>>,
    },

    Assign {
        target: Located<Lvalue>,
        value: Box<Located<Expr>>,
    },

    If {
        test: Box<Located<Expr>>,
        then: Box<Located<Expr>>,
        otherwise: Option<Box<Located<Expr>>>,
    },

    While {
        test: Box<Located<Expr>>,
        body: Box<Located<Expr>>,
    },

    For {
        var: Located<Symbol>,
        escape: Cell<bool>,
        lo: Box<Located<Expr>>,
        hi: Box<Located<Expr>>,
        body: Box<Located<Expr>>,
    },

    Break,

    Let {
        decls: Vec<Located<Decl>>,
        body: Vec<Located<Expr>>,
    },

    Seq(Vec<Located<Expr>>),
}

/// Un destino de lectura o escritura.
#[derive(Debug, Clone)]
pub enum Lvalue {
    Simple(Symbol),
    Field(Box<Located<Lvalue>>, Located<Symbol>),
    Subscript(Box<Located<Lvalue>>, Box<Located<Expr>>),
}

/// Una declaración dentro de un `let`.
#[derive(Debug, Clone)]
pub enum Decl {
    Type {
        name: Located<Symbol>,
        ty: TypeAst,
    },

    Var {
        name: Located<Symbol>,
        type_id: Option<Located<Symbol>>,
        init: Located<Expr>,
        escape: Cell<bool>,
    },

    Function {
        name: Located<Symbol>,
        params: Vec<Field>,
        result: Option<Located<Symbol>>,
        body: Located<Expr>,
    },
}

/// El lado derecho de una declaración de tipo.
#[derive(Debug, Clone)]
pub enum TypeAst {
    Name(Located<Symbol>),
    Record(Vec<Field>),
    Array(Located<Symbol>),
}

/// Un campo nombrado y tipado.
///
/// Se usa tanto para parámetros de función como para campos de tipos
/// record. La bandera de escape solo tiene sentido para parámetros.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: Located<Symbol>,
    pub type_id: Located<Symbol>,
    pub escape: Cell<bool>,
}

/// Analiza una secuencia completa de tokens como un programa.
pub fn parse(tokens: Vec<Located<Token>>) -> Syntax<Located<Expr>> {
    let last = tokens
        .last()
        .map(|token| token.position())
        .unwrap_or_default();

    let mut parser = Parser {
        tokens,
        pos: 0,
        last,
    };

    let program = parser.parse_expr()?;
    if let Some(trailing) = parser.peek() {
        let trailing = trailing.clone();
        return Err(parser.expected("end of input", trailing));
    }

    Ok(program)
}

struct Parser {
    tokens: Vec<Located<Token>>,
    pos: usize,
    last: Position,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(Located::val)
    }

    fn position(&self) -> Position {
        self.tokens
            .get(self.pos)
            .map(Located::position)
            .unwrap_or(self.last)
    }

    fn next(&mut self) -> Syntax<&Located<Token>> {
        let token = self
            .tokens
            .get(self.pos)
            .ok_or_else(|| Located::at(ParserError::UnexpectedEof, self.last))?;

        self.pos += 1;
        Ok(token)
    }

    /// Consume el siguiente token si es exactamente el esperado.
    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expected(&self, what: &'static str, found: Token) -> Located<ParserError> {
        Located::at(ParserError::Expected(what, found), self.position())
    }

    fn expect(&mut self, token: Token, what: &'static str) -> Syntax<Position> {
        match self.peek() {
            Some(found) if *found == token => {
                let position = self.position();
                self.pos += 1;
                Ok(position)
            }

            Some(found) => {
                let found = found.clone();
                Err(self.expected(what, found))
            }

            None => Err(Located::at(ParserError::UnexpectedEof, self.last)),
        }
    }

    fn expect_id(&mut self, what: &'static str) -> Syntax<Located<Symbol>> {
        match self.peek() {
            Some(Token::Id(_)) => {
                let token = self.next()?;
                let position = token.position();
                match token.val() {
                    Token::Id(id) => Ok(Located::at(id.clone(), position)),
                    _ => unreachable!(),
                }
            }

            Some(found) => {
                let found = found.clone();
                Err(self.expected(what, found))
            }

            None => Err(Located::at(ParserError::UnexpectedEof, self.last)),
        }
    }

    // Exp -> ExpOr
    fn parse_expr(&mut self) -> Syntax<Located<Expr>> {
        self.parse_or()
    }

    // ExpOr -> ExpAnd { `|` ExpAnd }
    fn parse_or(&mut self) -> Syntax<Located<Expr>> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = binop(Oper::Or, left, right);
        }

        Ok(left)
    }

    // ExpAnd -> ExpCmp { `&` ExpCmp }
    fn parse_and(&mut self) -> Syntax<Located<Expr>> {
        let mut left = self.parse_comparison()?;
        while self.eat(&Token::And) {
            let right = self.parse_comparison()?;
            left = binop(Oper::And, left, right);
        }

        Ok(left)
    }

    // ExpCmp -> ExpAdd { (`=` | `<>` | `<` | `>` | `<=` | `>=`) ExpAdd }
    fn parse_comparison(&mut self) -> Syntax<Located<Expr>> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => Oper::Eq,
                Some(Token::Neq) => Oper::Neq,
                Some(Token::Lt) => Oper::Lt,
                Some(Token::Le) => Oper::Le,
                Some(Token::Gt) => Oper::Gt,
                Some(Token::Ge) => Oper::Ge,
                _ => break,
            };

            self.pos += 1;
            let right = self.parse_additive()?;
            left = binop(op, left, right);
        }

        Ok(left)
    }

    // ExpAdd -> ExpMul { (`+` | `-`) ExpMul }
    fn parse_additive(&mut self) -> Syntax<Located<Expr>> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => Oper::Plus,
                Some(Token::Minus) => Oper::Minus,
                _ => break,
            };

            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = binop(op, left, right);
        }

        Ok(left)
    }

    // ExpMul -> ExpUnary { (`*` | `/`) ExpUnary }
    fn parse_multiplicative(&mut self) -> Syntax<Located<Expr>> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Times) => Oper::Times,
                Some(Token::Divide) => Oper::Divide,
                _ => break,
            };

            self.pos += 1;
            let right = self.parse_unary()?;
            left = binop(op, left, right);
        }

        Ok(left)
    }

    // ExpUnary -> `-` ExpUnary | ExpPrimary
    //
    // El menos unario es azúcar sintáctico para `0 - e`.
    fn parse_unary(&mut self) -> Syntax<Located<Expr>> {
        if self.peek() == Some(&Token::Minus) {
            let position = self.position();
            self.pos += 1;

            let operand = self.parse_unary()?;
            let zero = Located::at(Expr::Int(0), position);
            return Ok(Located::at(
                Expr::Op {
                    op: Oper::Minus,
                    left: Box::new(zero),
                    right: Box::new(operand),
                },
                position,
            ));
        }

        self.parse_primary()
    }

    // ExpPrimary -> nil | entero | cadena | Lvalue [ `:=` Exp ]
    //             | id `(` [ Exp { `,` Exp } ] `)`
    //             | type-id `{` [ id `=` Exp { `,` id `=` Exp } ] `}`
    //             | type-id `[` Exp `]` of Exp
    //             | `(` ExpSeq `)` | IfExp | WhileExp | ForExp
    //             | break | LetExp
    fn parse_primary(&mut self) -> Syntax<Located<Expr>> {
        let position = self.position();

        match self.peek() {
            Some(Token::Keyword(Keyword::Nil)) => {
                self.pos += 1;
                Ok(Located::at(Expr::Nil, position))
            }

            Some(Token::IntLiteral(_)) => {
                let token = self.next()?;
                match token.val() {
                    Token::IntLiteral(value) => Ok(Located::at(Expr::Int(*value), position)),
                    _ => unreachable!(),
                }
            }

            Some(Token::StrLiteral(_)) => {
                let token = self.next()?;
                match token.val() {
                    Token::StrLiteral(value) => {
                        Ok(Located::at(Expr::Str(value.clone()), position))
                    }
                    _ => unreachable!(),
                }
            }

            Some(Token::Id(_)) => {
                let id = self.expect_id("an identifier")?;

                match self.peek() {
                    Some(Token::OpenParen) => self.parse_call(id),
                    Some(Token::OpenCurly) => self.parse_record(id),

                    // `id [ e ] of init` es creación de arreglo; si no
                    // aparece `of` tras el corchete, era un subscript
                    Some(Token::OpenBrack) => {
                        let saved = self.pos;
                        self.pos += 1;

                        let size = self.parse_expr()?;
                        if self.eat(&Token::CloseBrack)
                            && self.eat(&Token::Keyword(Keyword::Of))
                        {
                            let init = self.parse_expr()?;
                            return Ok(Located::at(
                                Expr::Array {
                                    type_id: id,
                                    size: Box::new(size),
                                    init: Box::new(init),
                                },
                                position,
                            ));
                        }

                        self.pos = saved;
                        self.parse_lvalue(id)
                    }

                    _ => self.parse_lvalue(id),
                }
            }

            Some(Token::OpenParen) => self.parse_seq(),
            Some(Token::Keyword(Keyword::If)) => self.parse_if(),
            Some(Token::Keyword(Keyword::While)) => self.parse_while(),
            Some(Token::Keyword(Keyword::For)) => self.parse_for(),
            Some(Token::Keyword(Keyword::Let)) => self.parse_let(),

            Some(Token::Keyword(Keyword::Break)) => {
                self.pos += 1;
                Ok(Located::at(Expr::Break, position))
            }

            Some(found) => {
                let found = found.clone();
                Err(self.expected("an expression", found))
            }

            None => Err(Located::at(ParserError::UnexpectedEof, self.last)),
        }
    }

    // Lvalue -> id { `.` id | `[` Exp `]` } [ `:=` Exp ]
    fn parse_lvalue(&mut self, id: Located<Symbol>) -> Syntax<Located<Expr>> {
        let (position, id) = id.split();
        let mut lvalue = Located::at(Lvalue::Simple(id), position);

        loop {
            if self.eat(&Token::Period) {
                let field = self.expect_id("a field name after `.`")?;
                lvalue = Located::at(Lvalue::Field(Box::new(lvalue), field), position);
            } else if self.eat(&Token::OpenBrack) {
                let index = self.parse_expr()?;
                self.expect(Token::CloseBrack, "`]` after array index")?;
                lvalue = Located::at(
                    Lvalue::Subscript(Box::new(lvalue), Box::new(index)),
                    position,
                );
            } else {
                break;
            }
        }

        if self.eat(&Token::Assign) {
            let value = self.parse_expr()?;
            return Ok(Located::at(
                Expr::Assign {
                    target: lvalue,
                    value: Box::new(value),
                },
                position,
            ));
        }

        Ok(lvalue.map(Expr::Var))
    }

    // CallExp -> id `(` [ Exp { `,` Exp } ] `)`
    fn parse_call(&mut self, func: Located<Symbol>) -> Syntax<Located<Expr>> {
        let position = func.position();
        self.expect(Token::OpenParen, "`(` after function name")?;

        let mut args = Vec::new();
        if self.peek() != Some(&Token::CloseParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }

        self.expect(Token::CloseParen, "`)` after function arguments")?;
        Ok(Located::at(Expr::Call { func, args }, position))
    }

    // RecordExp -> type-id `{` [ id `=` Exp { `,` id `=` Exp } ] `}`
    fn parse_record(&mut self, type_id: Located<Symbol>) -> Syntax<Located<Expr>> {
        let position = type_id.position();
        self.expect(Token::OpenCurly, "`{` for record creation")?;

        let mut fields = Vec::new();
        if self.peek() != Some(&Token::CloseCurly) {
            loop {
                let name = self.expect_id("a field name")?;
                self.expect(Token::Eq, "`=` after field name")?;
                let value = self.parse_expr()?;
                fields.push((name, value));

                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }

        self.expect(Token::CloseCurly, "`}` after record fields")?;
        Ok(Located::at(Expr::Record { type_id, fields }, position))
    }

    // SeqExp -> `(` [ Exp { `;` Exp } ] `)`
    fn parse_seq(&mut self) -> Syntax<Located<Expr>> {
        let position = self.position();
        self.expect(Token::OpenParen, "`(`")?;

        let mut exprs = Vec::new();
        if self.peek() != Some(&Token::CloseParen) {
            loop {
                exprs.push(self.parse_expr()?);
                if !self.eat(&Token::Semicolon) {
                    break;
                }
            }
        }

        self.expect(Token::CloseParen, "`)`")?;
        Ok(Located::at(Expr::Seq(exprs), position))
    }

    // IfExp -> if Exp then Exp [ else Exp ]
    fn parse_if(&mut self) -> Syntax<Located<Expr>> {
        let position = self.position();
        self.pos += 1;

        let test = self.parse_expr()?;
        self.expect(Token::Keyword(Keyword::Then), "`then` after if condition")?;
        let then = self.parse_expr()?;

        let otherwise = if self.eat(&Token::Keyword(Keyword::Else)) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };

        Ok(Located::at(
            Expr::If {
                test: Box::new(test),
                then: Box::new(then),
                otherwise,
            },
            position,
        ))
    }

    // WhileExp -> while Exp do Exp
    fn parse_while(&mut self) -> Syntax<Located<Expr>> {
        let position = self.position();
        self.pos += 1;

        let test = self.parse_expr()?;
        self.expect(Token::Keyword(Keyword::Do), "`do` after while condition")?;
        let body = self.parse_expr()?;

        Ok(Located::at(
            Expr::While {
                test: Box::new(test),
                body: Box::new(body),
            },
            position,
        ))
    }

    // ForExp -> for id `:=` Exp to Exp do Exp
    fn parse_for(&mut self) -> Syntax<Located<Expr>> {
        let position = self.position();
        self.pos += 1;

        let var = self.expect_id("a variable name after `for`")?;
        self.expect(Token::Assign, "`:=` after for variable")?;
        let lo = self.parse_expr()?;
        self.expect(Token::Keyword(Keyword::To), "`to` in for loop")?;
        let hi = self.parse_expr()?;
        self.expect(Token::Keyword(Keyword::Do), "`do` after for range")?;
        let body = self.parse_expr()?;

        Ok(Located::at(
            Expr::For {
                var,
                escape: Cell::new(false),
                lo: Box::new(lo),
                hi: Box::new(hi),
                body: Box::new(body),
            },
            position,
        ))
    }

    // LetExp -> let { Dec } in [ Exp { `;` Exp } ] end
    fn parse_let(&mut self) -> Syntax<Located<Expr>> {
        let position = self.position();
        self.pos += 1;

        let mut decls = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Keyword(Keyword::Type)) => decls.push(self.parse_type_decl()?),
                Some(Token::Keyword(Keyword::Var)) => decls.push(self.parse_var_decl()?),
                Some(Token::Keyword(Keyword::Function)) => {
                    decls.push(self.parse_function_decl()?)
                }
                _ => break,
            }
        }

        self.expect(Token::Keyword(Keyword::In), "`in` after let declarations")?;

        let mut body = Vec::new();
        if self.peek() != Some(&Token::Keyword(Keyword::End)) {
            loop {
                body.push(self.parse_expr()?);
                if !self.eat(&Token::Semicolon) {
                    break;
                }
            }
        }

        self.expect(Token::Keyword(Keyword::End), "`end` to terminate let")?;
        Ok(Located::at(Expr::Let { decls, body }, position))
    }

    // TypeDec -> type id `=` Ty
    fn parse_type_decl(&mut self) -> Syntax<Located<Decl>> {
        let position = self.position();
        self.pos += 1;

        let name = self.expect_id("a type name")?;
        self.expect(Token::Eq, "`=` after type name")?;
        let ty = self.parse_type()?;

        Ok(Located::at(Decl::Type { name, ty }, position))
    }

    // Ty -> type-id | `{` [ TyFields ] `}` | array of type-id
    fn parse_type(&mut self) -> Syntax<TypeAst> {
        if self.eat(&Token::OpenCurly) {
            let mut fields = Vec::new();
            if self.peek() != Some(&Token::CloseCurly) {
                fields = self.parse_type_fields()?;
            }

            self.expect(Token::CloseCurly, "`}` after record fields")?;
            return Ok(TypeAst::Record(fields));
        }

        if self.eat(&Token::Keyword(Keyword::Array)) {
            self.expect(Token::Keyword(Keyword::Of), "`of` in array type")?;
            let element = self.expect_id("an element type")?;
            return Ok(TypeAst::Array(element));
        }

        let name = self.expect_id("a type name")?;
        Ok(TypeAst::Name(name))
    }

    // VarDec -> var id [ `:` type-id ] `:=` Exp
    fn parse_var_decl(&mut self) -> Syntax<Located<Decl>> {
        let position = self.position();
        self.pos += 1;

        let name = self.expect_id("a variable name")?;
        let type_id = if self.eat(&Token::Colon) {
            Some(self.expect_id("a type name")?)
        } else {
            None
        };

        self.expect(Token::Assign, "`:=` in variable declaration")?;
        let init = self.parse_expr()?;

        Ok(Located::at(
            Decl::Var {
                name,
                type_id,
                init,
                escape: Cell::new(false),
            },
            position,
        ))
    }

    // FuncDec -> function id `(` [ TyFields ] `)` [ `:` type-id ] `=` Exp
    fn parse_function_decl(&mut self) -> Syntax<Located<Decl>> {
        let position = self.position();
        self.pos += 1;

        let name = self.expect_id("a function name")?;
        self.expect(Token::OpenParen, "`(` after function name")?;

        let mut params = Vec::new();
        if self.peek() != Some(&Token::CloseParen) {
            params = self.parse_type_fields()?;
        }

        self.expect(Token::CloseParen, "`)` after function parameters")?;

        let result = if self.eat(&Token::Colon) {
            Some(self.expect_id("a return type")?)
        } else {
            None
        };

        self.expect(Token::Eq, "`=` before function body")?;
        let body = self.parse_expr()?;

        Ok(Located::at(
            Decl::Function {
                name,
                params,
                result,
                body,
            },
            position,
        ))
    }

    // TyFields -> id `:` type-id { `,` id `:` type-id }
    fn parse_type_fields(&mut self) -> Syntax<Vec<Field>> {
        let mut fields = Vec::new();
        loop {
            let name = self.expect_id("a field name")?;
            self.expect(Token::Colon, "`:` after field name")?;
            let type_id = self.expect_id("a field type")?;

            fields.push(Field {
                name,
                type_id,
                escape: Cell::new(false),
            });

            if !self.eat(&Token::Comma) {
                break;
            }
        }

        Ok(fields)
    }
}

fn binop(op: Oper, left: Located<Expr>, right: Located<Expr>) -> Located<Expr> {
    let position = left.position();
    Located::at(
        Expr::Op {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        position,
    )
}
