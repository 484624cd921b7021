//! Temporales y etiquetas.
//!
//! Un temporal es un registro abstracto, a materializar durante la
//! asignación de registros. Una etiqueta es una dirección simbólica de
//! memoria estática. Ambos se acuñan a partir de contadores que viven
//! en una fábrica por trabajo de compilación, nunca en estado global.

use std::fmt::{self, Display};
use std::rc::Rc;

/// Un registro abstracto, identificado por número.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Temp(u32);

impl Display for Temp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "t{}", self.0)
    }
}

/// Una dirección simbólica.
///
/// La igualdad y el hash son por nombre: fases posteriores usan
/// etiquetas como llaves de mapas.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Label(Rc<str>);

impl Label {
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Display for Label {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(fmt)
    }
}

/// Fábrica de temporales y etiquetas frescos.
#[derive(Default)]
pub struct TempFactory {
    temps: u32,
    labels: u32,
}

impl TempFactory {
    pub fn new() -> Self {
        TempFactory::default()
    }

    /// Acuña un temporal nunca antes visto.
    pub fn new_temp(&mut self) -> Temp {
        let temp = Temp(self.temps);
        self.temps += 1;
        temp
    }

    /// Acuña una etiqueta `L0`, `L1`, ...
    pub fn new_label(&mut self) -> Label {
        let label = Label(Rc::from(format!("L{}", self.labels)));
        self.labels += 1;
        label
    }

    /// Construye una etiqueta con nombre externo significativo.
    ///
    /// Se usa para nombres de función, funciones del runtime y
    /// fragmentos de cadena.
    pub fn named_label(&self, name: &str) -> Label {
        Label(Rc::from(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temps_are_sequential_and_distinct() {
        let mut temps = TempFactory::new();
        let a = temps.new_temp();
        let b = temps.new_temp();

        assert_ne!(a, b);
        assert_eq!(a.to_string(), "t0");
        assert_eq!(b.to_string(), "t1");
    }

    #[test]
    fn labels_compare_by_name() {
        let mut temps = TempFactory::new();
        let fresh = temps.new_label();

        assert_eq!(fresh.to_string(), "L0");
        assert_eq!(temps.named_label("print"), temps.named_label("print"));
        assert_ne!(temps.named_label("print"), fresh);
    }
}
