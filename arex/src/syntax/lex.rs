//! Lexical analyzer.
//!
//! Tokenization is heavily modal: the same character means different things
//! in the ERE mainline, the BRE mainline, a quoted literal, a `{...}`
//! bound, a bracket expression or the `[. [= [:` sub-contexts. Class-escape
//! shorthands (`\d` and friends) are expanded by "nesting": the lexer
//! temporarily redirects itself into a canned bracket-expression string and
//! pops back at its end. One level of nesting suffices.

use crate::error::Error;
use crate::flags::{Flags, Info};

use super::Vars;

/// Lexical contexts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Lexcon {
    /// Mainline ERE/ARE.
    Ere,
    /// Mainline BRE.
    Bre,
    /// Literal string.
    Q,
    /// ERE/ARE bound.
    EBnd,
    /// BRE bound.
    BBnd,
    /// Bracket expression.
    Brack,
    /// Collating element.
    Cel,
    /// Equivalence class.
    Ecl,
    /// Character class.
    Ccl,
}

/// Lexer tokens. Quantifier tokens carry their greediness, `(` carries
/// whether it captures, `[` whether it is complemented.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Tok {
    /// No token present yet.
    Empty,
    Eos,
    Plain(char),
    /// Digit inside a bound.
    Digit(u32),
    Backref(u32),
    /// Start of `[.`, `[=`, `[:`.
    Collel,
    Eclass,
    Cclass,
    /// End of `[.` `[=` `[:`.
    End,
    /// `-` within `[]` which might be a range delimiter.
    Range,
    /// Lookahead constraint, positive or negative.
    Lacon(bool),
    Wbdry,
    Nwbdry,
    /// `\A` and `\Z`.
    Sbegin,
    Send,
    Or,
    Star(bool),
    Plus(bool),
    Quest(bool),
    LBrace,
    RBrace(bool),
    Comma,
    LParen(bool),
    RParen,
    LBracket(bool),
    RBracket,
    /// `[[:<:]]` and `[[:>:]]` word boundaries.
    Lt,
    Gt,
    Caret,
    Dollar,
    Dot,
    /// Internal: a class-escape shorthand out of `lexescape`; always
    /// intercepted and expanded before the parser can see it.
    ClassEsc(char),
}

/// Strings interpolated as expansions of things like `\d`. The `\w` set is
/// alnum plus the connector punctuation.
const BACKD: &str = "[[:digit:]]";
const BACK_D: &str = "[^[:digit:]]";
const BRBACKD: &str = "[:digit:]";
const BACKS: &str = "[[:space:]]";
const BACK_S: &str = "[^[:space:]]";
const BRBACKS: &str = "[:space:]";
const BACKW: &str =
    "[[:alnum:]_\u{203f}\u{2040}\u{2054}\u{fe33}\u{fe34}\u{fe4d}\u{fe4e}\u{fe4f}\u{ff3f}]";
const BACK_W: &str =
    "[^[:alnum:]_\u{203f}\u{2040}\u{2054}\u{fe33}\u{fe34}\u{fe4d}\u{fe4e}\u{fe4f}\u{ff3f}]";
const BRBACKW: &str =
    "[:alnum:]_\u{203f}\u{2040}\u{2054}\u{fe33}\u{fe34}\u{fe4d}\u{fe4e}\u{fe4f}\u{ff3f}";

impl Vars {
    fn src(&self) -> &[char] {
        match &self.nest {
            Some(n) => n,
            None => &self.pattern,
        }
    }

    fn ateos(&self) -> bool {
        self.now >= self.stop
    }

    fn have(&self, n: usize) -> bool {
        self.stop - self.now >= n
    }

    fn peek(&self, off: usize) -> char {
        self.src()[self.now + off]
    }

    fn next1(&self, c: char) -> bool {
        !self.ateos() && self.peek(0) == c
    }

    fn next2(&self, a: char, b: char) -> bool {
        self.have(2) && self.peek(0) == a && self.peek(1) == b
    }

    fn next3(&self, a: char, b: char, c: char) -> bool {
        self.have(3) && self.peek(0) == a && self.peek(1) == b && self.peek(2) == c
    }

    fn getc(&mut self) -> char {
        let c = self.peek(0);
        self.now += 1;
        c
    }

    fn set(&mut self, t: Tok) {
        self.nexttype = t;
    }

    /// Record an error; the lexer yields `Eos` forever after.
    pub(crate) fn fail(&mut self, e: Error) {
        self.nexttype = Tok::Eos;
        if self.err.get().is_none() {
            self.err.set(Some(e));
        }
    }

    pub(crate) fn iserr(&self) -> bool {
        self.err.get().is_some()
    }

    pub(crate) fn note(&mut self, b: Info) {
        self.info |= b;
    }

    /// Set up lexical stuff and scan leading options.
    pub(crate) fn lexstart(&mut self) {
        self.prefixes();
        if self.iserr() {
            return;
        }
        if self.cflags.contains(Flags::QUOTE) {
            debug_assert!(!self
                .cflags
                .intersects(Flags::ADVANCED | Flags::EXPANDED | Flags::NEWLINE));
            self.lexcon = Lexcon::Q;
        } else if self.cflags.contains(Flags::EXTENDED) {
            self.lexcon = Lexcon::Ere;
        } else {
            debug_assert!(!self.cflags.intersects(Flags::QUOTE | Flags::ADVF));
            self.lexcon = Lexcon::Bre;
        }
        self.nexttype = Tok::Empty; // remember we were at the start
        self.next();
    }

    /// Implement the `***` and `(?opts)` prefixes.
    fn prefixes(&mut self) {
        // Literal strings get none of this.
        if self.cflags.contains(Flags::QUOTE) {
            return;
        }

        // Initial "***" gets special things.
        if self.have(4) && self.next3('*', '*', '*') {
            match self.peek(3) {
                '?' => {
                    // "***?" is an error whose message shows the version.
                    self.fail(Error::BadPat);
                    return;
                }
                '=' => {
                    // "***=" shifts to literal string.
                    self.note(Info::UNONPOSIX);
                    self.cflags |= Flags::QUOTE;
                    self.cflags &= !(Flags::ADVANCED | Flags::EXPANDED | Flags::NEWLINE);
                    self.now += 4;
                    return; // and there can be no more prefixes
                }
                ':' => {
                    // "***:" shifts to AREs.
                    self.note(Info::UNONPOSIX);
                    self.cflags |= Flags::ADVANCED;
                    self.now += 4;
                }
                _ => {
                    // otherwise "***" is just an error
                    self.fail(Error::BadRpt);
                    return;
                }
            }
        }

        // BREs and EREs don't get embedded options.
        if !self.cflags.contains(Flags::ADVANCED) {
            return;
        }

        // Embedded options (AREs only).
        if self.have(3) && self.next2('(', '?') && self.peek(2).is_alphabetic() {
            self.note(Info::UNONPOSIX);
            self.now += 2;
            while !self.ateos() && self.peek(0).is_alphabetic() {
                match self.getc() {
                    'b' => self.cflags &= !(Flags::ADVANCED | Flags::QUOTE),
                    'c' => self.cflags &= !Flags::ICASE,
                    'e' => {
                        self.cflags |= Flags::EXTENDED;
                        self.cflags &= !(Flags::ADVF | Flags::QUOTE);
                    }
                    'i' => self.cflags |= Flags::ICASE,
                    // 'm' is a Perloid synonym for 'n'
                    'm' | 'n' => self.cflags |= Flags::NEWLINE,
                    'p' => {
                        self.cflags |= Flags::NLSTOP;
                        self.cflags &= !Flags::NLANCH;
                    }
                    'q' => {
                        self.cflags |= Flags::QUOTE;
                        self.cflags &= !Flags::ADVANCED;
                    }
                    's' => self.cflags &= !Flags::NEWLINE,
                    't' => self.cflags &= !Flags::EXPANDED,
                    'w' => {
                        self.cflags &= !Flags::NLSTOP;
                        self.cflags |= Flags::NLANCH;
                    }
                    'x' => self.cflags |= Flags::EXPANDED,
                    _ => {
                        self.fail(Error::BadOpt);
                        return;
                    }
                }
            }
            if !self.next1(')') {
                self.fail(Error::BadOpt);
                return;
            }
            self.now += 1;
            if self.cflags.contains(Flags::QUOTE) {
                self.cflags &= !(Flags::EXPANDED | Flags::NEWLINE);
            }
        }
    }

    /// "Call a subroutine" at the lexical level: interpolate a canned
    /// string. Only one level of nesting is ever needed.
    fn lexnest(&mut self, s: &str) {
        debug_assert!(self.nest.is_none());
        self.savenow = self.now;
        self.savestop = self.stop;
        let chars: Vec<char> = s.chars().collect();
        self.now = 0;
        self.stop = chars.len();
        self.nest = Some(chars);
    }

    /// Interpolate the word-characters bracket expression.
    pub(crate) fn lexword(&mut self) {
        self.lexnest(BACKW);
    }

    /// Get the next token.
    pub(crate) fn next(&mut self) {
        // Errors yield an infinite sequence of failures.
        if self.iserr() {
            return; // the error has set nexttype to Eos
        }

        self.lasttype = self.nexttype;

        // At the very start of a BOSONLY RE, fake a leading \A.
        if self.nexttype == Tok::Empty && self.cflags.contains(Flags::BOSONLY) {
            self.set(Tok::Sbegin);
            return;
        }

        // If we're nested and we've hit end, return to the outer level.
        if self.nest.is_some() && self.ateos() {
            self.now = self.savenow;
            self.stop = self.savestop;
            self.nest = None;
        }

        // Skip white space etc. if appropriate (not in literals or []).
        if self.cflags.contains(Flags::EXPANDED) {
            match self.lexcon {
                Lexcon::Ere | Lexcon::Bre | Lexcon::EBnd | Lexcon::BBnd => self.skip(),
                _ => {}
            }
        }

        // Handle end of string, depending on context.
        if self.ateos() {
            match self.lexcon {
                Lexcon::Ere | Lexcon::Bre | Lexcon::Q => {
                    self.set(Tok::Eos);
                    return;
                }
                Lexcon::EBnd | Lexcon::BBnd => {
                    self.fail(Error::Brace);
                    return;
                }
                Lexcon::Brack | Lexcon::Cel | Lexcon::Ecl | Lexcon::Ccl => {
                    self.fail(Error::Brack);
                    return;
                }
            }
        }

        let c = self.getc();

        // The easy contexts; EREs are handled below.
        match self.lexcon {
            Lexcon::Bre => {
                self.brenext(c);
                return;
            }
            Lexcon::Ere => {} // see below
            Lexcon::Q => {
                self.set(Tok::Plain(c));
                return;
            }
            Lexcon::EBnd | Lexcon::BBnd => {
                match c {
                    '0'..='9' => self.set(Tok::Digit(c.to_digit(10).unwrap())),
                    ',' => self.set(Tok::Comma),
                    '}' => {
                        // An ERE bound ends with `}`.
                        if self.lexcon == Lexcon::EBnd {
                            self.lexcon = Lexcon::Ere;
                            if self.cflags.contains(Flags::ADVF) && self.next1('?') {
                                self.now += 1;
                                self.note(Info::UNONPOSIX);
                                self.set(Tok::RBrace(false));
                            } else {
                                self.set(Tok::RBrace(true));
                            }
                        } else {
                            self.fail(Error::BadBr);
                        }
                    }
                    '\\' => {
                        // A BRE bound ends with `\}`.
                        if self.lexcon == Lexcon::BBnd && self.next1('}') {
                            self.now += 1;
                            self.lexcon = Lexcon::Bre;
                            self.set(Tok::RBrace(true));
                        } else {
                            self.fail(Error::BadBr);
                        }
                    }
                    _ => self.fail(Error::BadBr),
                }
                return;
            }
            Lexcon::Brack => {
                match c {
                    ']' => {
                        if matches!(self.lasttype, Tok::LBracket(_)) {
                            self.set(Tok::Plain(c));
                        } else {
                            self.lexcon = if self.cflags.contains(Flags::EXTENDED) {
                                Lexcon::Ere
                            } else {
                                Lexcon::Bre
                            };
                            self.set(Tok::RBracket);
                        }
                    }
                    '\\' => {
                        self.note(Info::UBBS);
                        if !self.cflags.contains(Flags::ADVF) {
                            self.set(Tok::Plain(c));
                            return;
                        }
                        self.note(Info::UNONPOSIX);
                        if self.ateos() {
                            self.fail(Error::Escape);
                            return;
                        }
                        self.lexescape();
                        match self.nexttype {
                            Tok::Plain(_) => return,
                            Tok::ClassEsc(esc) => {
                                // Not all escapes are okay here.
                                match esc {
                                    'd' => self.lexnest(BRBACKD),
                                    's' => self.lexnest(BRBACKS),
                                    'w' => self.lexnest(BRBACKW),
                                    _ => {
                                        self.fail(Error::Escape);
                                        return;
                                    }
                                }
                                // lexnest done, back up and try again.
                                self.nexttype = self.lasttype;
                                self.next();
                            }
                            _ => self.fail(Error::Escape),
                        }
                    }
                    '-' => {
                        if matches!(self.lasttype, Tok::LBracket(_)) || self.next1(']') {
                            self.set(Tok::Plain(c));
                        } else {
                            self.set(Tok::Range);
                        }
                    }
                    '[' => {
                        if self.ateos() {
                            self.fail(Error::Brack);
                            return;
                        }
                        match self.getc() {
                            '.' => {
                                self.lexcon = Lexcon::Cel;
                                // Might or might not be locale-specific.
                                self.set(Tok::Collel);
                            }
                            '=' => {
                                self.lexcon = Lexcon::Ecl;
                                self.note(Info::ULOCALE);
                                self.set(Tok::Eclass);
                            }
                            ':' => {
                                self.lexcon = Lexcon::Ccl;
                                self.note(Info::ULOCALE);
                                self.set(Tok::Cclass);
                            }
                            _ => {
                                // oops
                                self.now -= 1;
                                self.set(Tok::Plain(c));
                            }
                        }
                    }
                    _ => self.set(Tok::Plain(c)),
                }
                return;
            }
            Lexcon::Cel => {
                if c == '.' && self.next1(']') {
                    self.now += 1;
                    self.lexcon = Lexcon::Brack;
                    self.set(Tok::End);
                } else {
                    self.set(Tok::Plain(c));
                }
                return;
            }
            Lexcon::Ecl => {
                if c == '=' && self.next1(']') {
                    self.now += 1;
                    self.lexcon = Lexcon::Brack;
                    self.set(Tok::End);
                } else {
                    self.set(Tok::Plain(c));
                }
                return;
            }
            Lexcon::Ccl => {
                if c == ':' && self.next1(']') {
                    self.now += 1;
                    self.lexcon = Lexcon::Brack;
                    self.set(Tok::End);
                } else {
                    self.set(Tok::Plain(c));
                }
                return;
            }
        }

        // That got rid of everything except EREs and AREs.
        debug_assert_eq!(self.lexcon, Lexcon::Ere);

        match c {
            '|' => {
                self.set(Tok::Or);
                return;
            }
            '*' => {
                if self.cflags.contains(Flags::ADVF) && self.next1('?') {
                    self.now += 1;
                    self.note(Info::UNONPOSIX);
                    self.set(Tok::Star(false));
                } else {
                    self.set(Tok::Star(true));
                }
                return;
            }
            '+' => {
                if self.cflags.contains(Flags::ADVF) && self.next1('?') {
                    self.now += 1;
                    self.note(Info::UNONPOSIX);
                    self.set(Tok::Plus(false));
                } else {
                    self.set(Tok::Plus(true));
                }
                return;
            }
            '?' => {
                if self.cflags.contains(Flags::ADVF) && self.next1('?') {
                    self.now += 1;
                    self.note(Info::UNONPOSIX);
                    self.set(Tok::Quest(false));
                } else {
                    self.set(Tok::Quest(true));
                }
                return;
            }
            '{' => {
                // Bound start, or a plain character.
                if self.cflags.contains(Flags::EXPANDED) {
                    self.skip();
                }
                if self.ateos() || !self.peek(0).is_ascii_digit() {
                    self.note(Info::UBRACES);
                    self.note(Info::UUNSPEC);
                    self.set(Tok::Plain(c));
                } else {
                    self.note(Info::UBOUNDS);
                    self.lexcon = Lexcon::EBnd;
                    self.set(Tok::LBrace);
                }
                return;
            }
            '(' => {
                // Parenthesis, or advanced extension.
                if self.cflags.contains(Flags::ADVF) && self.next1('?') {
                    self.note(Info::UNONPOSIX);
                    self.now += 1;
                    if self.ateos() {
                        self.fail(Error::BadRpt);
                        return;
                    }
                    match self.getc() {
                        ':' => self.set(Tok::LParen(false)),
                        '#' => {
                            // comment
                            while !self.ateos() && self.peek(0) != ')' {
                                self.now += 1;
                            }
                            if !self.ateos() {
                                self.now += 1;
                            }
                            debug_assert_eq!(self.nexttype, self.lasttype);
                            self.next();
                        }
                        '=' => {
                            self.note(Info::ULOOKAHEAD);
                            self.set(Tok::Lacon(true));
                        }
                        '!' => {
                            self.note(Info::ULOOKAHEAD);
                            self.set(Tok::Lacon(false));
                        }
                        _ => self.fail(Error::BadRpt),
                    }
                    return;
                }
                if self.cflags.contains(Flags::NOSUB) {
                    self.set(Tok::LParen(false)); // all parens non-capturing
                } else {
                    self.set(Tok::LParen(true));
                }
                return;
            }
            ')' => {
                if matches!(self.lasttype, Tok::LParen(_)) {
                    self.note(Info::UUNSPEC);
                }
                self.set(Tok::RParen);
                return;
            }
            '[' => {
                // Easy except for [[:<:]] and [[:>:]].
                if self.have(6)
                    && self.peek(0) == '['
                    && self.peek(1) == ':'
                    && (self.peek(2) == '<' || self.peek(2) == '>')
                    && self.peek(3) == ':'
                    && self.peek(4) == ']'
                    && self.peek(5) == ']'
                {
                    let dir = self.peek(2);
                    self.now += 6;
                    self.note(Info::UNONPOSIX);
                    self.set(if dir == '<' { Tok::Lt } else { Tok::Gt });
                    return;
                }
                self.lexcon = Lexcon::Brack;
                if self.next1('^') {
                    self.now += 1;
                    self.set(Tok::LBracket(false));
                } else {
                    self.set(Tok::LBracket(true));
                }
                return;
            }
            '.' => {
                self.set(Tok::Dot);
                return;
            }
            '^' => {
                self.set(Tok::Caret);
                return;
            }
            '$' => {
                self.set(Tok::Dollar);
                return;
            }
            '\\' => {
                // Mostly punt backslashes to the code below.
                if self.ateos() {
                    self.fail(Error::Escape);
                    return;
                }
            }
            _ => {
                // ordinary character
                self.set(Tok::Plain(c));
                return;
            }
        }

        // ERE/ARE backslash handling; backslash already eaten.
        debug_assert!(!self.ateos());
        if !self.cflags.contains(Flags::ADVF) {
            // Only AREs have non-trivial escapes.
            if self.peek(0).is_alphanumeric() {
                self.note(Info::UBSALNUM);
                self.note(Info::UUNSPEC);
            }
            let c = self.getc();
            self.set(Tok::Plain(c));
            return;
        }
        self.lexescape();
        if self.iserr() {
            self.fail(Error::Escape);
            return;
        }
        if let Tok::ClassEsc(esc) = self.nexttype {
            // fudge at the lexical level
            match esc {
                'd' => self.lexnest(BACKD),
                'D' => self.lexnest(BACK_D),
                's' => self.lexnest(BACKS),
                'S' => self.lexnest(BACK_S),
                'w' => self.lexnest(BACKW),
                'W' => self.lexnest(BACK_W),
                _ => {
                    self.fail(Error::Assert);
                    return;
                }
            }
            // lexnest done, back up and try again.
            self.nexttype = self.lasttype;
            self.next();
        }
        // Otherwise, lexescape has already done the work.
    }

    /// Parse an ARE backslash escape (backslash already eaten).
    fn lexescape(&mut self) {
        debug_assert!(self.cflags.contains(Flags::ADVF));
        debug_assert!(!self.ateos());
        let c = self.getc();
        if !c.is_alphanumeric() {
            self.set(Tok::Plain(c));
            return;
        }

        self.note(Info::UNONPOSIX);
        match c {
            'a' => self.set(Tok::Plain('\u{7}')),
            'A' => self.set(Tok::Sbegin),
            'b' => self.set(Tok::Plain('\u{8}')),
            'B' => self.set(Tok::Plain('\\')),
            'c' => {
                self.note(Info::UUNPORT);
                if self.ateos() {
                    self.fail(Error::Escape);
                    return;
                }
                let ctl = (self.getc() as u32) & 0o37;
                self.set(Tok::Plain(char::from_u32(ctl).unwrap_or('\u{0}')));
            }
            'd' | 'D' => {
                self.note(Info::ULOCALE);
                self.set(Tok::ClassEsc(c));
            }
            'e' => {
                self.note(Info::UUNPORT);
                self.set(Tok::Plain('\u{1b}'));
            }
            'f' => self.set(Tok::Plain('\u{c}')),
            'm' => self.set(Tok::Lt),
            'M' => self.set(Tok::Gt),
            'n' => self.set(Tok::Plain('\n')),
            'r' => self.set(Tok::Plain('\r')),
            's' | 'S' => {
                self.note(Info::ULOCALE);
                self.set(Tok::ClassEsc(c));
            }
            't' => self.set(Tok::Plain('\t')),
            'u' => {
                let n = self.lexdigits(16, 1, 4);
                if self.iserr() {
                    self.fail(Error::Escape);
                    return;
                }
                self.set(Tok::Plain(char::from_u32(n).unwrap_or('\u{fffd}')));
            }
            'U' => {
                let n = self.lexdigits(16, 1, 8);
                if self.iserr() {
                    self.fail(Error::Escape);
                    return;
                }
                self.set(Tok::Plain(char::from_u32(n).unwrap_or('\u{fffd}')));
            }
            'v' => self.set(Tok::Plain('\u{b}')),
            'w' | 'W' => {
                self.note(Info::ULOCALE);
                self.set(Tok::ClassEsc(c));
            }
            'x' => {
                self.note(Info::UUNPORT);
                let n = self.lexdigits(16, 1, 2);
                if self.iserr() {
                    self.fail(Error::Escape);
                    return;
                }
                self.set(Tok::Plain(char::from_u32(n).unwrap_or('\u{fffd}')));
            }
            'y' => {
                self.note(Info::ULOCALE);
                self.set(Tok::Wbdry);
            }
            'Y' => {
                self.note(Info::ULOCALE);
                self.set(Tok::Nwbdry);
            }
            'Z' => self.set(Tok::Send),
            '1'..='9' => {
                let save = self.now;
                self.now -= 1; // put the first digit back
                let n = self.lexdigits(10, 1, 255);
                if self.iserr() {
                    self.fail(Error::Escape);
                    return;
                }
                // Ugly heuristic: a single digit, or a number no larger
                // than the capture count so far, is a backref; otherwise
                // the digits are an octal character code.
                if self.now == save || (n > 0 && n as usize <= self.nsubexp) {
                    self.note(Info::UBACKREF);
                    self.set(Tok::Backref(n));
                    return;
                }
                self.now = save;
                self.octal_escape();
            }
            '0' => self.octal_escape(),
            _ => {
                debug_assert!(c.is_alphabetic());
                self.fail(Error::Escape); // unknown alphabetic escape
            }
        }
    }

    fn octal_escape(&mut self) {
        self.note(Info::UUNPORT);
        self.now -= 1; // put the first digit back
        let mut n = self.lexdigits(8, 1, 3);
        if self.iserr() {
            self.fail(Error::Escape);
            return;
        }
        if n > 0xff {
            // out of range, so we handled one digit too much
            self.now -= 1;
            n >>= 3;
        }
        self.set(Tok::Plain(char::from_u32(n).unwrap_or('\u{fffd}')));
    }

    /// Slurp up digits and return their value.
    fn lexdigits(&mut self, base: u32, minlen: usize, maxlen: usize) -> u32 {
        let mut n: u32 = 0;
        let mut len = 0;
        while len < maxlen && !self.ateos() {
            if n > 0x10fff {
                // stop when continuing would otherwise overflow
                break;
            }
            let c = self.getc();
            let d = match c.to_digit(16) {
                Some(d) if d < base => d,
                _ => {
                    self.now -= 1; // not a plausible digit
                    break;
                }
            };
            n = n * base + d;
            len += 1;
        }
        if len < minlen {
            self.fail(Error::Escape);
        }
        n
    }

    /// Get the next BRE token. Much like EREs except for all the
    /// backslashes and the context-dependency of some things.
    fn brenext(&mut self, c: char) {
        match c {
            '*' => {
                if matches!(self.lasttype, Tok::Empty | Tok::LParen(_) | Tok::Caret) {
                    self.set(Tok::Plain(c));
                } else {
                    self.set(Tok::Star(true));
                }
                return;
            }
            '[' => {
                if self.have(6)
                    && self.peek(0) == '['
                    && self.peek(1) == ':'
                    && (self.peek(2) == '<' || self.peek(2) == '>')
                    && self.peek(3) == ':'
                    && self.peek(4) == ']'
                    && self.peek(5) == ']'
                {
                    let dir = self.peek(2);
                    self.now += 6;
                    self.note(Info::UNONPOSIX);
                    self.set(if dir == '<' { Tok::Lt } else { Tok::Gt });
                    return;
                }
                self.lexcon = Lexcon::Brack;
                if self.next1('^') {
                    self.now += 1;
                    self.set(Tok::LBracket(false));
                } else {
                    self.set(Tok::LBracket(true));
                }
                return;
            }
            '.' => {
                self.set(Tok::Dot);
                return;
            }
            '^' => {
                if self.lasttype == Tok::Empty {
                    self.set(Tok::Caret);
                    return;
                }
                if matches!(self.lasttype, Tok::LParen(_)) {
                    self.note(Info::UUNSPEC);
                    self.set(Tok::Caret);
                    return;
                }
                self.set(Tok::Plain(c));
                return;
            }
            '$' => {
                if self.cflags.contains(Flags::EXPANDED) {
                    self.skip();
                }
                if self.ateos() {
                    self.set(Tok::Dollar);
                    return;
                }
                if self.next2('\\', ')') {
                    self.note(Info::UUNSPEC);
                    self.set(Tok::Dollar);
                    return;
                }
                self.set(Tok::Plain(c));
                return;
            }
            '\\' => {} // see below
            _ => {
                self.set(Tok::Plain(c));
                return;
            }
        }

        debug_assert_eq!(c, '\\');
        if self.ateos() {
            self.fail(Error::Escape);
            return;
        }

        let c = self.getc();
        match c {
            '{' => {
                self.lexcon = Lexcon::BBnd;
                self.note(Info::UBOUNDS);
                self.set(Tok::LBrace);
            }
            '(' => self.set(Tok::LParen(true)),
            ')' => self.set(Tok::RParen),
            '<' => {
                self.note(Info::UNONPOSIX);
                self.set(Tok::Lt);
            }
            '>' => {
                self.note(Info::UNONPOSIX);
                self.set(Tok::Gt);
            }
            '1'..='9' => {
                self.note(Info::UBACKREF);
                self.set(Tok::Backref(c.to_digit(10).unwrap()));
            }
            _ => {
                if c.is_alphanumeric() {
                    self.note(Info::UBSALNUM);
                    self.note(Info::UUNSPEC);
                }
                self.set(Tok::Plain(c));
            }
        }
    }

    /// Skip white space and comments in expanded form.
    fn skip(&mut self) {
        let start = self.now;
        debug_assert!(self.cflags.contains(Flags::EXPANDED));

        loop {
            while !self.ateos() && self.peek(0).is_whitespace() {
                self.now += 1;
            }
            if self.ateos() || self.peek(0) != '#' {
                break;
            }
            while !self.ateos() && self.peek(0) != '\n' {
                self.now += 1;
            }
            // Leave the newline to be picked up by the whitespace loop.
        }

        if self.now != start {
            self.note(Info::UNONPOSIX);
        }
    }
}

/// The chr for a newline.
pub(crate) fn newline() -> char {
    '\n'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::Vars;

    fn toks(pattern: &str, flags: Flags) -> Vec<Tok> {
        let mut v = Vars::for_test(pattern, flags);
        v.lexstart();
        let mut out = Vec::new();
        loop {
            out.push(v.nexttype);
            if matches!(v.nexttype, Tok::Eos) || v.iserr() {
                break;
            }
            v.next();
        }
        out
    }

    #[test]
    fn plain_are() {
        let ts = toks("ab|c", Flags::ADVANCED);
        assert_eq!(
            ts,
            vec![
                Tok::Plain('a'),
                Tok::Plain('b'),
                Tok::Or,
                Tok::Plain('c'),
                Tok::Eos
            ]
        );
    }

    #[test]
    fn quantifiers() {
        let ts = toks("a*?b+{2", Flags::ADVANCED);
        assert_eq!(ts[0], Tok::Plain('a'));
        assert_eq!(ts[1], Tok::Star(false));
        assert_eq!(ts[2], Tok::Plain('b'));
        assert_eq!(ts[3], Tok::Plus(true));
        assert_eq!(ts[4], Tok::LBrace);
        assert_eq!(ts[5], Tok::Digit(2));
    }

    #[test]
    fn escapes() {
        let ts = toks(r"\n\t\x41\101", Flags::ADVANCED);
        assert_eq!(
            &ts[..4],
            &[
                Tok::Plain('\n'),
                Tok::Plain('\t'),
                Tok::Plain('A'),
                Tok::Plain('A')
            ]
        );
    }

    #[test]
    fn class_escape_expands() {
        // \d becomes the [[:digit:]] bracket token stream.
        let ts = toks(r"\d", Flags::ADVANCED);
        assert_eq!(ts[0], Tok::LBracket(true));
        assert_eq!(ts[1], Tok::Cclass);
    }

    #[test]
    fn backref_vs_octal() {
        // With no captures open, \7 is octal.
        let ts = toks(r"\7", Flags::ADVANCED);
        assert_eq!(ts[0], Tok::Backref(7)); // single digit: backref always
        let ts = toks(r"\10", Flags::ADVANCED);
        assert_eq!(ts[0], Tok::Plain('\u{8}')); // octal 10
    }

    #[test]
    fn bre_star_context() {
        let ts = toks("*a*", Flags::BASIC);
        assert_eq!(ts[0], Tok::Plain('*')); // leading * is literal in BREs
        assert_eq!(ts[1], Tok::Plain('a'));
        assert_eq!(ts[2], Tok::Star(true));
    }

    #[test]
    fn quote_mode() {
        let ts = toks("a*b", Flags::QUOTE);
        assert_eq!(
            ts,
            vec![
                Tok::Plain('a'),
                Tok::Plain('*'),
                Tok::Plain('b'),
                Tok::Eos
            ]
        );
    }

    #[test]
    fn expanded_skips_whitespace() {
        let ts = toks("a b # comment", Flags::ADVANCED | Flags::EXPANDED);
        assert_eq!(ts, vec![Tok::Plain('a'), Tok::Plain('b'), Tok::Eos]);
    }

    #[test]
    fn embedded_options() {
        let mut v = Vars::for_test("(?i)x", Flags::ADVANCED);
        v.lexstart();
        assert!(v.cflags.contains(Flags::ICASE));
        assert_eq!(v.nexttype, Tok::Plain('x'));
    }

    #[test]
    fn triple_star_prefixes() {
        let mut v = Vars::for_test("***=a*b", Flags::ADVANCED);
        v.lexstart();
        assert!(v.cflags.contains(Flags::QUOTE));
        assert_eq!(v.nexttype, Tok::Plain('a'));

        let mut v = Vars::for_test("***?", Flags::ADVANCED);
        v.lexstart();
        assert!(v.iserr());
    }

    #[test]
    fn bad_brace() {
        let mut v = Vars::for_test("a{2,", Flags::ADVANCED);
        v.lexstart();
        while !matches!(v.nexttype, Tok::Eos) && !v.iserr() {
            v.next();
        }
        assert_eq!(v.err.get(), Some(Error::Brace));
    }
}
