//! Registros de activación para cada arquitectura objetivo.
//!
//! Este módulo expone la interfaz independiente de la máquina sobre
//! los registros de activación: dónde viven los formales y locales de
//! una función, cuál es el tamaño de palabra y cuáles temporales
//! juegan los papeles de frame pointer y valor de retorno. Cada
//! submódulo aporta la distribución concreta de una ABI. En general,
//! debe utilizarse la macro `dispatch_frame!()` para elegir una
//! implementación a partir de un valor [`Arch`].

use crate::ir::Stm;
use crate::temp::{Label, Temp, TempFactory};

/// Arquitectura objetivo.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Mips,
}

mod mips;
mod x86_64;

pub use mips::Mips;
pub use x86_64::X86_64;

/// Ubicación de una variable.
///
/// Las variables que escapan viven en el frame, a un offset fijo en
/// bytes respecto del frame pointer. Las demás viven en un registro
/// abstracto.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Access {
    InFrame(i64),
    InReg(Temp),
}

/// Descripción de un registro de activación.
///
/// Los tipos que implementan este trait conocen la convención de
/// llamada de su arquitectura: cuántos formales viajan en registros,
/// dónde quedan los que desbordan y hacia dónde crecen las locales.
/// El generador de IR consume esta interfaz y nunca asume una ABI
/// específica.
pub trait Frame: Sized {
    /// Tamaño natural de una palabra, en bytes.
    const WORD_SIZE: i64;

    /// Construye el frame de una función a partir de las banderas de
    /// escape de sus formales.
    ///
    /// El primer formal es el static link y siempre escapa.
    fn new(name: Label, formals: &[bool], temps: &mut TempFactory) -> Self;

    /// Etiqueta de la función dueña del frame.
    fn name(&self) -> &Label;

    /// Accesos de los formales, con el static link en el índice 0.
    fn formals(&self) -> &[Access];

    /// Reserva una local nueva, en stack o en registro según escape.
    fn alloc_local(&mut self, escape: bool, temps: &mut TempFactory) -> Access;

    /// El temporal que juega el papel de frame pointer.
    fn frame_pointer(&self) -> Temp;

    /// El temporal donde la función deja su valor de retorno.
    fn return_value(&self) -> Temp;

    fn word_size(&self) -> i64 {
        Self::WORD_SIZE
    }

    /// Envuelve un cuerpo con lo que el prólogo y epílogo de fases
    /// posteriores requieran. Por ahora es la identidad.
    fn proc_entry_exit(&self, body: Stm) -> Stm {
        body
    }
}
