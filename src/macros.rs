/// Monomorfiza una expresión sobre la arquitectura objetivo.
///
/// El identificador dado queda ligado, dentro de la expresión, al tipo
/// de frame concreto que corresponde al valor [`Arch`](crate::frame::Arch).
#[macro_export]
macro_rules! dispatch_frame {
    ($type:ident: $arch:expr => $expr:expr) => {{
        use $crate::frame::{Arch, Mips, X86_64};

        match $arch {
            Arch::X86_64 => {
                type $type = X86_64;
                $expr
            }

            Arch::Mips => {
                type $type = Mips;
                $expr
            }
        }
    }};
}
