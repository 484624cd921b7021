//! Universo de tipos semánticos.
//!
//! El sistema de tipos de Tiger es nominal: cada declaración de record
//! o de arreglo acuña una identidad nueva, por lo cual dos
//! declaraciones sintácticamente idénticas producen tipos distintos.
//! Los tipos primitivos son singletons compartidos por todo el
//! programa.
//!
//! Los alias (`Ty::Name`) existen para soportar declaraciones
//! mutuamente recursivas: se crean sin resolver y se les ata su
//! definición verdadera en una segunda fase. `actual` atraviesa
//! cadenas de alias hasta llegar a un tipo concreto o a un alias
//! todavía sin resolver.

use std::{
    cell::{Cell, RefCell},
    fmt::{self, Display},
    rc::Rc,
};

use crate::lex::Symbol;

/// Referencia compartida a un tipo.
pub type TyRef = Rc<Ty>;

/// Un tipo del lenguaje.
pub enum Ty {
    Int,
    String,

    /// El tipo de `nil`. Comparable con cualquier record.
    Nil,

    /// El tipo de las expresiones que no producen valor.
    Void,

    /// Un record, con identidad propia y campos ordenados.
    Record {
        id: u32,
        fields: Vec<(Symbol, TyRef)>,
    },

    /// Un arreglo, con identidad propia.
    Array {
        id: u32,
        element: TyRef,
    },

    /// Un alias con resolución tardía.
    Name {
        name: Symbol,
        binding: RefCell<Option<TyRef>>,
    },

    /// La firma de una función.
    Function {
        params: Vec<TyRef>,
        result: TyRef,
    },
}

impl Ty {
    pub fn is_int(&self) -> bool {
        matches!(self, Ty::Int)
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Ty::Nil)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Ty::Void)
    }

    pub fn is_record(&self) -> bool {
        matches!(self, Ty::Record { .. })
    }

    /// Obtiene los campos ordenados si este tipo es un record.
    pub fn record_fields(&self) -> Option<&[(Symbol, TyRef)]> {
        match self {
            Ty::Record { fields, .. } => Some(fields),
            _ => None,
        }
    }

    /// Busca la posición de un campo dentro de un record.
    ///
    /// La posición determina el offset del campo en memoria.
    pub fn field_index(&self, name: &Symbol) -> Option<usize> {
        self.record_fields()?
            .iter()
            .position(|(field, _)| field == name)
    }

    /// Obtiene el tipo de elemento si este tipo es un arreglo.
    pub fn array_element(&self) -> Option<&TyRef> {
        match self {
            Ty::Array { element, .. } => Some(element),
            _ => None,
        }
    }

    /// Obtiene parámetros y resultado si este tipo es una firma.
    pub fn as_function(&self) -> Option<(&[TyRef], &TyRef)> {
        match self {
            Ty::Function { params, result } => Some((params, result)),
            _ => None,
        }
    }

    /// Ata un alias a su definición verdadera.
    ///
    /// No tiene efecto sobre tipos que no son alias.
    pub fn bind(&self, ty: TyRef) {
        if let Ty::Name { binding, .. } = self {
            *binding.borrow_mut() = Some(ty);
        }
    }

    /// Obtiene el alias destino si este alias ya fue resuelto.
    pub fn alias_binding(&self) -> Option<TyRef> {
        match self {
            Ty::Name { binding, .. } => binding.borrow().clone(),
            _ => None,
        }
    }
}

/// Atraviesa cadenas de alias hasta un tipo concreto.
///
/// Un alias sin resolver se retorna tal cual.
pub fn actual(ty: &TyRef) -> TyRef {
    let mut current = Rc::clone(ty);
    loop {
        let next = match &*current {
            Ty::Name { binding, .. } => match &*binding.borrow() {
                Some(next) => Rc::clone(next),
                None => break,
            },

            _ => break,
        };

        current = next;
    }

    current
}

/// Igualdad nominal de tipos.
///
/// `nil` es igual a cualquier record. Los alias sin resolver no son
/// iguales a nada.
pub fn equals(a: &TyRef, b: &TyRef) -> bool {
    let a = actual(a);
    let b = actual(b);

    match (&*a, &*b) {
        (Ty::Name { .. }, _) | (_, Ty::Name { .. }) => false,

        (Ty::Int, Ty::Int)
        | (Ty::String, Ty::String)
        | (Ty::Nil, Ty::Nil)
        | (Ty::Void, Ty::Void) => true,

        (Ty::Record { .. }, Ty::Nil) | (Ty::Nil, Ty::Record { .. }) => true,
        (Ty::Record { id: a, .. }, Ty::Record { id: b, .. }) => a == b,
        (Ty::Array { id: a, .. }, Ty::Array { id: b, .. }) => a == b,

        _ => false,
    }
}

/// Determina si un valor puede almacenarse en un destino de cierto tipo.
pub fn is_assignable(target: &TyRef, value: &TyRef) -> bool {
    equals(target, value) || (actual(value).is_nil() && actual(target).is_record())
}

impl Display for Ty {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Int => fmt.write_str("int"),
            Ty::String => fmt.write_str("string"),
            Ty::Nil => fmt.write_str("nil"),
            Ty::Void => fmt.write_str("void"),

            Ty::Record { fields, .. } => {
                fmt.write_str("{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        fmt.write_str(", ")?;
                    }
                    write!(fmt, "{}: {}", name, ty)?;
                }
                fmt.write_str("}")
            }

            Ty::Array { element, .. } => write!(fmt, "array of {}", element),

            // Los alias se muestran por nombre y sin expandir, ya que
            // su definición puede referirse cíclicamente a ellos mismos
            Ty::Name { name, .. } => name.fmt(fmt),

            Ty::Function { params, result } => {
                fmt.write_str("(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        fmt.write_str(", ")?;
                    }
                    param.fmt(fmt)?;
                }
                write!(fmt, ") -> {}", result)
            }
        }
    }
}

impl fmt::Debug for Ty {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        <Self as Display>::fmt(self, fmt)
    }
}

/// Fábrica y dueño de los tipos de una compilación.
///
/// Mantiene los singletons primitivos y los contadores que dan
/// identidad a records y arreglos. Cada trabajo de compilación usa
/// su propia instancia.
pub struct TypeContext {
    int: TyRef,
    string: TyRef,
    nil: TyRef,
    void: TyRef,
    next_record_id: Cell<u32>,
    next_array_id: Cell<u32>,
}

impl TypeContext {
    pub fn new() -> Self {
        TypeContext {
            int: Rc::new(Ty::Int),
            string: Rc::new(Ty::String),
            nil: Rc::new(Ty::Nil),
            void: Rc::new(Ty::Void),
            next_record_id: Cell::new(0),
            next_array_id: Cell::new(0),
        }
    }

    pub fn int(&self) -> TyRef {
        Rc::clone(&self.int)
    }

    pub fn string(&self) -> TyRef {
        Rc::clone(&self.string)
    }

    pub fn nil(&self) -> TyRef {
        Rc::clone(&self.nil)
    }

    pub fn void(&self) -> TyRef {
        Rc::clone(&self.void)
    }

    /// Acuña un record nuevo con identidad propia.
    pub fn new_record(&self, fields: Vec<(Symbol, TyRef)>) -> TyRef {
        let id = self.next_record_id.get();
        self.next_record_id.set(id + 1);
        Rc::new(Ty::Record { id, fields })
    }

    /// Acuña un arreglo nuevo con identidad propia.
    pub fn new_array(&self, element: TyRef) -> TyRef {
        let id = self.next_array_id.get();
        self.next_array_id.set(id + 1);
        Rc::new(Ty::Array { id, element })
    }

    /// Crea un alias sin resolver.
    pub fn new_alias(&self, name: Symbol) -> TyRef {
        Rc::new(Ty::Name {
            name,
            binding: RefCell::new(None),
        })
    }

    /// Crea una firma de función.
    pub fn new_function(&self, params: Vec<TyRef>, result: TyRef) -> TyRef {
        Rc::new(Ty::Function { params, result })
    }
}

impl Default for TypeContext {
    fn default() -> Self {
        TypeContext::new()
    }
}
