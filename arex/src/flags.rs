//! Flag sets for compilation and execution, plus the post-compile
//! information bits.

use bitflags::bitflags;

bitflags! {
    /// Compile-time flags.
    ///
    /// `BASIC` (the empty set) selects POSIX BREs. `EXTENDED` selects EREs,
    /// and `ADVANCED` enables the full ARE syntax (non-greedy quantifiers,
    /// lookahead, escapes). `ADVF` on its own is rejected by
    /// [`compile`](crate::compile()).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Flags: u32 {
        /// POSIX extended REs.
        const EXTENDED = 0o000001;
        /// Advanced features (must be combined with `EXTENDED`).
        const ADVF = 0o000002;
        /// Advanced REs: `EXTENDED | ADVF`.
        const ADVANCED = 0o000003;
        /// The pattern is a literal string.
        const QUOTE = 0o000004;
        /// Case-insensitive matching.
        const ICASE = 0o000010;
        /// Don't care about subexpression match ranges.
        const NOSUB = 0o000020;
        /// Expanded syntax: whitespace and `#` comments are ignored.
        const EXPANDED = 0o000040;
        /// `.` and `[^...]` stop at newline.
        const NLSTOP = 0o000100;
        /// `^` and `$` also match around newlines.
        const NLANCH = 0o000200;
        /// Newline-sensitive matching: `NLSTOP | NLANCH`.
        const NEWLINE = 0o000300;
        /// Execution will want the cold-start hint in
        /// [`Details`](crate::Details).
        const EXPECT = 0o001000;
        /// The pattern is implicitly anchored at the beginning of the
        /// string (an invisible `\A` is prepended).
        const BOSONLY = 0o002000;
        /// Dump the compiled artifact (via `log::debug!`).
        const DUMP = 0o004000;
        /// Trace the compilation passes (via `log::debug!`).
        const PROGRESS = 0o020000;
    }
}

impl Flags {
    /// Basic REs: no flag bits at all.
    pub const BASIC: Flags = Flags::empty();
}

bitflags! {
    /// Execution-time flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ExecFlags: u32 {
        /// The start of the text is not the beginning of a line.
        const NOTBOL = 0o0001;
        /// The end of the text is not the end of a line.
        const NOTEOL = 0o0002;
        /// Trace the DFA simulation (via `log::trace!`).
        const FTRACE = 0o0010;
        /// Trace the dissector (via `log::trace!`).
        const MTRACE = 0o0020;
        /// Restrict the DFA cache to very few state sets.
        const SMALL = 0o0040;
    }
}

bitflags! {
    /// Information bits reported by [`Compiled::info`](crate::Compiled::info),
    /// accumulated while parsing.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Info: u32 {
        /// The RE uses backreferences.
        const UBACKREF = 0o000001;
        /// The RE uses lookahead constraints.
        const ULOOKAHEAD = 0o000002;
        /// The RE uses `{...}` bounds.
        const UBOUNDS = 0o000004;
        /// The RE contains an unquantified `{`.
        const UBRACES = 0o000010;
        /// The RE contains a backslashed alphanumeric.
        const UBSALNUM = 0o000020;
        /// The RE relies on the unmatched-`)` specification botch.
        const UPBOTCH = 0o000040;
        /// The RE contains a backslash inside brackets.
        const UBBS = 0o000100;
        /// The RE uses non-POSIX features.
        const UNONPOSIX = 0o000200;
        /// The RE has unspecified POSIX behavior.
        const UUNSPEC = 0o000400;
        /// The RE uses unportable constructs.
        const UUNPORT = 0o001000;
        /// The RE uses locale-dependent constructs.
        const ULOCALE = 0o002000;
        /// The RE can match an empty string.
        const UEMPTYMATCH = 0o004000;
        /// The RE cannot match anything.
        const UIMPOSSIBLE = 0o010000;
        /// The RE prefers the shortest match overall.
        const USHORTEST = 0o020000;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advanced_implies_extended() {
        assert!(Flags::ADVANCED.contains(Flags::EXTENDED));
        assert!(Flags::ADVANCED.contains(Flags::ADVF));
        assert_eq!(Flags::NEWLINE, Flags::NLSTOP | Flags::NLANCH);
    }

    #[test]
    fn basic_is_empty() {
        assert!(Flags::BASIC.is_empty());
    }
}
