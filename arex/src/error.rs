//! Error taxonomy, with a bidirectional code/name/message table.

use std::cell::Cell;
use std::rc::Rc;

use thiserror::Error;

/// Sticky error slot shared by the compile (or execute) pipeline. The first
/// error recorded wins; everything downstream checks the slot and
/// short-circuits without touching half-built structures.
pub(crate) type ErrSlot = Rc<Cell<Option<Error>>>;

pub(crate) fn new_err_slot() -> ErrSlot {
    Rc::new(Cell::new(None))
}

/// Everything that can go wrong while compiling or executing a regular
/// expression.
///
/// `NoMatch` never escapes the public API (searches return `Option`), but it
/// participates in the code table because the dissector uses it internally
/// and embedders may want to round-trip codes.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("failed to match")]
    NoMatch,
    #[error("invalid regexp")]
    BadPat,
    #[error("invalid collating element")]
    Collate,
    #[error("invalid character class")]
    Ctype,
    #[error("invalid escape \\ sequence")]
    Escape,
    #[error("invalid backreference number")]
    Subreg,
    #[error("brackets [] not balanced")]
    Brack,
    #[error("parentheses () not balanced")]
    Paren,
    #[error("braces {{}} not balanced")]
    Brace,
    #[error("invalid repetition count(s)")]
    BadBr,
    #[error("invalid character range")]
    Range,
    #[error("out of memory")]
    Space,
    #[error("quantifier operand invalid")]
    BadRpt,
    #[error("\"can't happen\" -- you found a bug")]
    Assert,
    #[error("invalid argument to regex function")]
    InvArg,
    #[error("character widths of regex and string differ")]
    Mixed,
    #[error("invalid embedded option")]
    BadOpt,
    #[error("nfa has too many states")]
    TooBig,
    #[error("too many colors")]
    Colors,
    #[error("operation cancelled")]
    Cancel,
}

/// code, name, variant -- one row per error, `NoMatch` first like the
/// original table (code 0 is reserved for "no error").
const TABLE: &[(u32, &str, Error)] = &[
    (1, "REG_NOMATCH", Error::NoMatch),
    (2, "REG_BADPAT", Error::BadPat),
    (3, "REG_ECOLLATE", Error::Collate),
    (4, "REG_ECTYPE", Error::Ctype),
    (5, "REG_EESCAPE", Error::Escape),
    (6, "REG_ESUBREG", Error::Subreg),
    (7, "REG_EBRACK", Error::Brack),
    (8, "REG_EPAREN", Error::Paren),
    (9, "REG_EBRACE", Error::Brace),
    (10, "REG_BADBR", Error::BadBr),
    (11, "REG_ERANGE", Error::Range),
    (12, "REG_ESPACE", Error::Space),
    (13, "REG_BADRPT", Error::BadRpt),
    (15, "REG_ASSERT", Error::Assert),
    (16, "REG_INVARG", Error::InvArg),
    (17, "REG_MIXED", Error::Mixed),
    (18, "REG_BADOPT", Error::BadOpt),
    (19, "REG_ETOOBIG", Error::TooBig),
    (20, "REG_ECOLORS", Error::Colors),
    (21, "REG_CANCEL", Error::Cancel),
];

impl Error {
    /// Numeric code, compatible with the classic `REG_*` numbering.
    pub fn code(self) -> u32 {
        TABLE.iter().find(|r| r.2 == self).map(|r| r.0).unwrap_or(0)
    }

    /// Symbolic name, e.g. `"REG_EPAREN"`.
    pub fn name(self) -> &'static str {
        TABLE.iter().find(|r| r.2 == self).map(|r| r.1).unwrap_or("")
    }

    /// Reverse lookup by numeric code.
    pub fn from_code(code: u32) -> Option<Error> {
        TABLE.iter().find(|r| r.0 == code).map(|r| r.2)
    }

    /// Reverse lookup by symbolic name.
    pub fn from_name(name: &str) -> Option<Error> {
        TABLE.iter().find(|r| r.1 == name).map(|r| r.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        for &(code, name, err) in TABLE {
            assert_eq!(err.code(), code);
            assert_eq!(err.name(), name);
            assert_eq!(Error::from_code(code), Some(err));
            assert_eq!(Error::from_name(name), Some(err));
        }
        assert_eq!(Error::from_code(0), None);
        assert_eq!(Error::from_name("REG_BOGUS"), None);
    }

    #[test]
    fn messages() {
        assert_eq!(Error::Paren.to_string(), "parentheses () not balanced");
        assert_eq!(Error::Space.to_string(), "out of memory");
    }
}
