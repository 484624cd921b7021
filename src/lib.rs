#[macro_use]
mod macros;

pub mod escape;
pub mod frame;
pub mod ir;
pub mod irgen;
pub mod lex;
pub mod parse;
pub mod semantic;
pub mod source;
pub mod temp;
pub mod translate;
pub mod types;
