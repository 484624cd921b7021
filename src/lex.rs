//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone el texto fuente
//! en unidades léxicas denominadas tokens. Los espacios en blanco y los
//! comentarios se descartan durante esta operación. Cada token emitido
//! está asociado a una posición en el código fuente original, lo cual
//! permite rastrear errores tanto en los tokens mismos como en
//! constructos más elevados de fases posteriores.
//!
//! # Reglas importantes del lenguaje
//! - Los identificadores comienzan con letra o `'_'` y continúan con
//!   letras, dígitos o `'_'`.
//! - Las constantes enteras son secuencias de dígitos decimales sin
//!   signo. El menos unario pertenece a la gramática, no al lexer.
//! - Las cadenas van entre comillas dobles. Se reconocen los escapes
//!   `\n`, `\t`, `\\` y `\"`; cualquier otro `\x` produce `x` literal.
//! - Los comentarios de bloque `/* ... */` anidan.
//!
//! # Errores
//! El lexer falla con el primer error encontrado. Un error léxico
//! impide el avance a las demás fases de la compilación.

use crate::source::{Located, Position};
use std::{
    fmt::{self, Display},
    rc::Rc,
    str::{Chars, FromStr},
};

use thiserror::Error;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LexerError {
    /// Carácter desconocido o inesperado en el flujo de entrada.
    #[error("Unexpected character {0:?} in input stream")]
    BadChar(char),

    /// Una constante entera se encuentra fuera de rango.
    #[error("Integer literal overflow")]
    IntOverflow,

    /// El archivo terminó en medio de una cadena.
    #[error("Unterminated string literal")]
    UnterminatedString,
}

/// Un identificador.
///
/// Los símbolos comparten su contenido, de manera que copiarlos y
/// compararlos durante las fases semánticas es barato.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol(Rc<str>);

impl Symbol {
    /// Construye a partir de texto arbitrario.
    pub fn new(name: &str) -> Self {
        Symbol(Rc::from(name))
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Symbol {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(fmt)
    }
}

/// Objeto resultante del análisis léxico.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identificador.
    Id(Symbol),

    /// Palabra clave.
    Keyword(Keyword),

    /// Literal de entero.
    IntLiteral(i64),

    /// Literal de cadena, ya sin escapes.
    StrLiteral(String),

    /// `+`
    Plus,

    /// `-`
    Minus,

    /// `*`
    Times,

    /// `/`
    Divide,

    /// `=`
    Eq,

    /// `<>`
    Neq,

    /// `<`
    Lt,

    /// `<=`
    Le,

    /// `>`
    Gt,

    /// `>=`
    Ge,

    /// `&`
    And,

    /// `|`
    Or,

    /// `:=`
    Assign,

    /// `:`
    Colon,

    /// `;`
    Semicolon,

    /// `,`
    Comma,

    /// `.`
    Period,

    /// `(`
    OpenParen,

    /// `)`
    CloseParen,

    /// `[`
    OpenBrack,

    /// `]`
    CloseBrack,

    /// `{`
    OpenCurly,

    /// `}`
    CloseCurly,
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Token::*;

        match self {
            Id(id) => write!(fmt, "identifier `{}`", id),
            Keyword(keyword) => write!(fmt, "keyword `{}`", keyword),
            IntLiteral(integer) => write!(fmt, "literal `{}`", integer),
            StrLiteral(string) => write!(fmt, "literal `\"{}\"`", string),
            Plus => fmt.write_str("`+`"),
            Minus => fmt.write_str("`-`"),
            Times => fmt.write_str("`*`"),
            Divide => fmt.write_str("`/`"),
            Eq => fmt.write_str("`=`"),
            Neq => fmt.write_str("`<>`"),
            Lt => fmt.write_str("`<`"),
            Le => fmt.write_str("`<=`"),
            Gt => fmt.write_str("`>`"),
            Ge => fmt.write_str("`>=`"),
            And => fmt.write_str("`&`"),
            Or => fmt.write_str("`|`"),
            Assign => fmt.write_str("`:=`"),
            Colon => fmt.write_str("`:`"),
            Semicolon => fmt.write_str("`;`"),
            Comma => fmt.write_str("`,`"),
            Period => fmt.write_str("`.`"),
            OpenParen => fmt.write_str("`(`"),
            CloseParen => fmt.write_str("`)`"),
            OpenBrack => fmt.write_str("`[`"),
            CloseBrack => fmt.write_str("`]`"),
            OpenCurly => fmt.write_str("`{`"),
            CloseCurly => fmt.write_str("`}`"),
        }
    }
}

/// Una palabra clave.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    Type,
    Var,
    Function,
    Array,
    If,
    Then,
    Else,
    While,
    Do,
    For,
    To,
    Let,
    In,
    End,
    Of,
    Break,
    Nil,
}

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Keyword::*;
        let string = match self {
            Type => "type",
            Var => "var",
            Function => "function",
            Array => "array",
            If => "if",
            Then => "then",
            Else => "else",
            While => "while",
            Do => "do",
            For => "for",
            To => "to",
            Let => "let",
            In => "in",
            End => "end",
            Of => "of",
            Break => "break",
            Nil => "nil",
        };

        fmt.write_str(string)
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        use Keyword::*;

        const KEYWORDS: &[(&str, Keyword)] = &[
            ("type", Type),
            ("var", Var),
            ("function", Function),
            ("array", Array),
            ("if", If),
            ("then", Then),
            ("else", Else),
            ("while", While),
            ("do", Do),
            ("for", For),
            ("to", To),
            ("let", Let),
            ("in", In),
            ("end", End),
            ("of", Of),
            ("break", Break),
            ("nil", Nil),
        ];

        KEYWORDS
            .iter()
            .find(|&&(name, _)| name == string)
            .map(|&(_, keyword)| keyword)
            .ok_or(())
    }
}

/// Escáner de texto fuente.
///
/// El lexer avanza carácter por carácter sobre el texto completo,
/// manteniendo la posición línea-columna de lo que está por leer.
pub struct Lexer<'a> {
    source: std::iter::Peekable<Chars<'a>>,
    position: Position,
}

impl<'a> Lexer<'a> {
    /// Crea un lexer en estado inicial a partir del texto fuente.
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source: source.chars().peekable(),
            position: Position::default(),
        }
    }

    /// Reduce la entrada completa a una secuencia de tokens.
    ///
    /// La operación falla con el primer error léxico que se encuentre.
    pub fn tokenize(mut self) -> Result<Vec<Located<Token>>, Located<LexerError>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();

            let start = self.position;
            let next = match self.source.peek() {
                None => break,
                Some(c) => *c,
            };

            let token = match next {
                '/' => {
                    self.bump();
                    if self.source.peek() == Some(&'*') {
                        self.bump();
                        self.skip_comment();
                        continue;
                    }

                    Token::Divide
                }

                c if c.is_ascii_digit() => self.scan_integer().map_err(|e| Located::at(e, start))?,
                c if c.is_ascii_alphabetic() || c == '_' => self.scan_word(),
                '"' => self.scan_string().map_err(|e| Located::at(e, start))?,

                c => {
                    self.bump();
                    match c {
                        '+' => Token::Plus,
                        '-' => Token::Minus,
                        '*' => Token::Times,
                        '=' => Token::Eq,
                        '&' => Token::And,
                        '|' => Token::Or,
                        ';' => Token::Semicolon,
                        ',' => Token::Comma,
                        '.' => Token::Period,
                        '(' => Token::OpenParen,
                        ')' => Token::CloseParen,
                        '[' => Token::OpenBrack,
                        ']' => Token::CloseBrack,
                        '{' => Token::OpenCurly,
                        '}' => Token::CloseCurly,

                        '<' => match self.source.peek() {
                            Some('=') => {
                                self.bump();
                                Token::Le
                            }
                            Some('>') => {
                                self.bump();
                                Token::Neq
                            }
                            _ => Token::Lt,
                        },

                        '>' => match self.source.peek() {
                            Some('=') => {
                                self.bump();
                                Token::Ge
                            }
                            _ => Token::Gt,
                        },

                        ':' => match self.source.peek() {
                            Some('=') => {
                                self.bump();
                                Token::Assign
                            }
                            _ => Token::Colon,
                        },

                        c => return Err(Located::at(LexerError::BadChar(c), start)),
                    }
                }
            };

            tokens.push(Located::at(token, start));
        }

        Ok(tokens)
    }

    /// Consume el siguiente carácter, ajustando la posición.
    fn bump(&mut self) -> Option<char> {
        let c = self.source.next()?;
        self.position = match c {
            '\n' => self.position.newline(),
            _ => self.position.advance(),
        };

        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.source.peek(), Some(c) if c.is_ascii_whitespace()) {
            self.bump();
        }
    }

    /// Descarta un comentario de bloque, respetando anidamiento.
    ///
    /// Se asume que el `/*` inicial ya fue consumido. Un comentario
    /// sin terminar consume el resto de la entrada.
    fn skip_comment(&mut self) {
        let mut nesting = 1;
        while let Some(c) = self.bump() {
            match c {
                '/' if self.source.peek() == Some(&'*') => {
                    self.bump();
                    nesting += 1;
                }

                '*' if self.source.peek() == Some(&'/') => {
                    self.bump();
                    nesting -= 1;
                    if nesting == 0 {
                        break;
                    }
                }

                _ => (),
            }
        }
    }

    /// Acumulación dígito por dígito de una constante entera.
    fn scan_integer(&mut self) -> Result<Token, LexerError> {
        let mut accumulated: i64 = 0;
        while matches!(self.source.peek(), Some(c) if c.is_ascii_digit()) {
            let digit = self.bump().unwrap().to_digit(10).unwrap() as i64;

            accumulated = accumulated
                .checked_mul(10)
                .and_then(|n| n.checked_add(digit))
                .ok_or(LexerError::IntOverflow)?;
        }

        Ok(Token::IntLiteral(accumulated))
    }

    /// Término que puede ser un identificador o una palabra clave.
    fn scan_word(&mut self) -> Token {
        let mut word = String::new();
        while matches!(self.source.peek(), Some(c) if is_word_char(*c)) {
            word.push(self.bump().unwrap());
        }

        match Keyword::from_str(&word) {
            Ok(keyword) => Token::Keyword(keyword),
            Err(()) => Token::Id(Symbol::new(&word)),
        }
    }

    /// Literal de cadena, resolviendo escapes.
    fn scan_string(&mut self) -> Result<Token, LexerError> {
        self.bump();

        let mut string = String::new();
        loop {
            match self.bump() {
                None => return Err(LexerError::UnterminatedString),
                Some('"') => break,

                Some('\\') => match self.bump() {
                    None => return Err(LexerError::UnterminatedString),
                    Some('n') => string.push('\n'),
                    Some('t') => string.push('\t'),
                    Some(c) => string.push(c),
                },

                Some(c) => string.push(c),
            }
        }

        Ok(Token::StrLiteral(string))
    }
}

/// Determina si un carácter puede pertenecer a un término.
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphabetic() || c.is_ascii_digit() || c == '_'
}
