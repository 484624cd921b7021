//! Implementación para MIPS32 (ABI O32).

use crate::temp::{Label, Temp, TempFactory};

use super::Access;

/// Esta es una arquitectura de 32 bits.
const WORD_SIZE: i64 = 4;

/// La ABI pasa los primeros 4 argumentos en `$a0`-`$a3`. Los demás
/// viajan por stack a partir de `fp + 16`.
const MAX_REG_ARGS: usize = 4;

/// O32 reserva 16 bytes de espacio de argumentos en el stack aunque
/// la función reciba 4 argumentos o menos. El ajuste corresponde al
/// prólogo, que pertenece a una fase posterior.
pub const ARG_SPACE: i64 = 16;

/// Registro de activación MIPS.
pub struct Mips {
    name: Label,
    formals: Vec<Access>,
    local_offset: i64,
    fp: Temp,
    rv: Temp,
}

impl super::Frame for Mips {
    const WORD_SIZE: i64 = WORD_SIZE;

    fn new(name: Label, formals: &[bool], temps: &mut TempFactory) -> Self {
        let mut frame = Mips {
            name,
            formals: Vec::new(),
            local_offset: 0,
            fp: temps.new_temp(),
            rv: temps.new_temp(),
        };

        for (i, &escape) in formals.iter().enumerate() {
            let access = if i >= MAX_REG_ARGS {
                Access::InFrame(ARG_SPACE + (i - MAX_REG_ARGS) as i64 * WORD_SIZE)
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

impl Mips {
    fn push_local(&mut self) -> Access {
        self.local_offset -= WORD_SIZE;
        Access::InFrame(self.local_offset)
    }
}
