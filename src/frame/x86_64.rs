//! Implementación para x86-64 (System V).

use crate::temp::{Label, Temp, TempFactory};

use super::Access;

/// Esta es una arquitectura de 64 bits.
const WORD_SIZE: i64 = 8;

/// La ABI indica que se coloquen los primeros 6 argumentos enteros en
/// los registros `%rdi`, `%rsi`, `%rdx`, `%rcx`, `%r8` y `%r9`. Los
/// demás se pasan por stack y quedan sobre la dirección de retorno,
/// a partir de `fp + 16`.
const MAX_REG_ARGS: usize = 6;

/// Registro de activación x86-64.
///
/// Las locales crecen hacia abajo desde el frame pointer. Un formal
/// de registro que escapa recibe una casa en stack; el consumidor lo
/// copia ahí al entrar a la función.
pub struct X86_64 {
    name: Label,
    formals: Vec<Access>,
    local_offset: i64,
    fp: Temp,
    rv: Temp,
}

impl super::Frame for X86_64 {
    const WORD_SIZE: i64 = WORD_SIZE;

    fn new(name: Label, formals: &[bool], temps: &mut TempFactory) -> Self {
        let mut frame = X86_64 {
            name,
            formals: Vec::new(),
            local_offset: 0,
            fp: temps.new_temp(),
            rv: temps.new_temp(),
        };

        for (i, &escape) in formals.iter().enumerate() {
            let access = if i >= MAX_REG_ARGS {
                // Los formales que desbordan la ventana de registros
                // ya se encuentran en stack, en posiciones fijas
                Access::InFrame(16 + (i - MAX_REG_ARGS) as i64 * WORD_SIZE)
            } else if escape {
                frame.push_local()
            } else {
                Access::InReg(temps.new_temp())
            };

            frame.formals.push(access);
        }

        frame
    }

    fn name(&self) -> &Label {
        &self.name
    }

    fn formals(&self) -> &[Access] {
        &self.formals
    }

    fn alloc_local(&mut self, escape: bool, temps: &mut TempFactory) -> Access {
        if escape {
            self.push_local()
        } else {
            Access::InReg(temps.new_temp())
        }
    }

    fn frame_pointer(&self) -> Temp {
        self.fp
    }

    fn return_value(&self) -> Temp {
        self.rv
    }
}

impl X86_64 {
    /// Reserva la siguiente palabra bajo el frame pointer.
    fn push_local(&mut self) -> Access {
        self.local_offset -= WORD_SIZE;
        Access::InFrame(self.local_offset)
    }
}
