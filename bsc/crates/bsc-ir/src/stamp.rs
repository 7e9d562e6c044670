//! Value stamps
//!
//! A stamp is the static type of a node's value as far as barrier insertion cares:
//! is it an object reference, and if so is it held in narrow (compressed) form.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stamp {
    /// No value (stores, barriers without a result)
    Void,
    /// Integer of the given bit width
    Int { bits: u8 },
    /// Raw machine word (addresses)
    Word,
    /// Object reference
    Object { non_null: bool, narrow: bool },
}

impl Stamp {
    pub const fn object() -> Self {
        Stamp::Object {
            non_null: false,
            narrow: false,
        }
    }

    pub const fn non_null_object() -> Self {
        Stamp::Object {
            non_null: true,
            narrow: false,
        }
    }

    pub const fn narrow_object() -> Self {
        Stamp::Object {
            non_null: false,
            narrow: true,
        }
    }

    pub const fn int(bits: u8) -> Self {
        Stamp::Int { bits }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Stamp::Object { .. })
    }

    pub fn is_narrow_object(&self) -> bool {
        matches!(self, Stamp::Object { narrow: true, .. })
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, Stamp::Object { non_null: true, .. })
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stamp::Void => write!(f, "void"),
            Stamp::Int { bits } => write!(f, "i{}", bits),
            Stamp::Word => write!(f, "word"),
            Stamp::Object { non_null, narrow } => {
                write!(f, "{}obj", if *narrow { "n" } else { "" })?;
                if *non_null {
                    write!(f, "!")?;
                }
                Ok(())
            }
        }
    }
}
