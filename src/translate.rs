//! Niveles de anidamiento y los tres modos de expresión traducida.
//!
//! # Niveles
//! Cada función declarada vive en un [`Level`] que posee su frame y
//! apunta al nivel de la función que la encierra. El nivel más externo
//! corresponde al programa principal y no tiene padre. Los niveles se
//! comparten por referencia: los fragmentos emitidos y las entradas de
//! variables los retienen vivos hasta que el IR se consuma.
//!
//! # Los tres modos
//! Toda expresión traducida es una de tres cosas: produce un valor
//! ([`TransExp::Ex`]), es una sentencia sin valor ([`TransExp::Nx`]),
//! o es un condicional parametrizado por sus dos etiquetas de destino
//! ([`TransExp::Cx`]). Las conversiones `un_ex`, `un_nx` y `un_cx`
//! materializan cualquier modo en la forma que el contexto demanda,
//! lo cual permite que los operadores de cortocircuito y el control de
//! flujo bajen limpiamente sin reanalizar el árbol.

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use crate::{
    frame::{Access, Frame},
    ir::{self, Exp, RelOp, Stm},
    temp::{Label, TempFactory},
};

/// Un nivel de anidamiento de funciones.
pub struct Level<F: Frame> {
    parent: Option<Rc<Level<F>>>,
    frame: RefCell<F>,
}

impl<F: Frame> Level<F> {
    /// El nivel del programa principal, sin padre.
    pub fn outermost(temps: &mut TempFactory) -> Rc<Self> {
        let name = temps.named_label("_main");
        let frame = F::new(name, &[], temps);

        Rc::new(Level {
            parent: None,
            frame: RefCell::new(frame),
        })
    }

    /// Crea el nivel hijo para una función declarada.
    ///
    /// Antepone a los formales el static link, que siempre escapa.
    pub fn child(
        parent: &Rc<Self>,
        name: Label,
        formals: &[bool],
        temps: &mut TempFactory,
    ) -> Rc<Self> {
        let mut all_formals = vec![true];
        all_formals.extend_from_slice(formals);

        let frame = F::new(name, &all_formals, temps);
        Rc::new(Level {
            parent: Some(Rc::clone(parent)),
            frame: RefCell::new(frame),
        })
    }

    pub fn parent(&self) -> Option<&Rc<Level<F>>> {
        self.parent.as_ref()
    }

    pub fn frame(&self) -> Ref<'_, F> {
        self.frame.borrow()
    }

    /// Reserva una local en el frame de este nivel.
    pub fn alloc_local(&self, escape: bool, temps: &mut TempFactory) -> Access {
        self.frame.borrow_mut().alloc_local(escape, temps)
    }
}

/// Condicional pendiente de destinos: dadas las etiquetas de verdadero
/// y falso, produce la sentencia que salta según corresponda.
pub type CondFn = Box<dyn FnOnce(Label, Label, &mut TempFactory) -> Stm>;

/// Una expresión traducida, en uno de los tres modos.
pub enum TransExp {
    /// Produce un valor.
    Ex(Exp),

    /// Sentencia sin valor.
    Nx(Stm),

    /// Condicional parametrizado por las etiquetas de destino.
    Cx(CondFn),
}

impl TransExp {
    /// Materializa como expresión con valor.
    pub fn un_ex(self, temps: &mut TempFactory) -> Exp {
        match self {
            TransExp::Ex(exp) => exp,

            // Una sentencia no tiene valor; se recupera con cero
            TransExp::Nx(_) => Exp::Const(0),

            TransExp::Cx(cond) => {
                let r = temps.new_temp();
                let t = temps.new_label();
                let f = temps.new_label();
                let join = temps.new_label();
                let test = cond(t.clone(), f.clone(), temps);

                Exp::Eseq(
                    Box::new(ir::seq([
                        Stm::Move(Box::new(Exp::Temp(r)), Box::new(Exp::Const(1))),
                        test,
                        Stm::Label(f),
                        Stm::Move(Box::new(Exp::Temp(r)), Box::new(Exp::Const(0))),
                        ir::jump(join.clone()),
                        Stm::Label(t),
                        ir::jump(join.clone()),
                        Stm::Label(join),
                    ])),
                    Box::new(Exp::Temp(r)),
                )
            }
        }
    }

    /// Materializa como sentencia, descartando cualquier valor.
    pub fn un_nx(self, temps: &mut TempFactory) -> Stm {
        match self {
            TransExp::Ex(exp) => Stm::Exp(Box::new(exp)),
            TransExp::Nx(stm) => stm,

            TransExp::Cx(cond) => {
                let t = temps.new_label();
                let f = temps.new_label();
                let test = cond(t.clone(), f.clone(), temps);

                ir::seq([test, Stm::Label(t), Stm::Label(f)])
            }
        }
    }

    /// Materializa como salto condicional hacia las etiquetas dadas.
    pub fn un_cx(self, if_true: Label, if_false: Label, temps: &mut TempFactory) -> Stm {
        match self {
            // Un valor se compara contra cero
            TransExp::Ex(exp) => Stm::CJump(
                RelOp::Ne,
                Box::new(exp),
                Box::new(Exp::Const(0)),
                if_true,
                if_false,
            ),

            // Una sentencia no decide nada; se recupera saltando a falso
            TransExp::Nx(_) => ir::jump(if_false),

            TransExp::Cx(cond) => cond(if_true, if_false, temps),
        }
    }
}
