//! Ergonomic `&str`-oriented wrapper over [`compile`]/[`Compiled`].
//!
//! ## Example
//! ```
//! use arex::Regex;
//!
//! let re = Regex::builder("a(b+)c").build().unwrap();
//! let m = re.find("zzabbbc").unwrap();
//! assert_eq!((m.start(), m.end()), (2, 7));
//!
//! let re = Regex::builder("raki.suta").case_insensitive(true).build().unwrap();
//! assert!(re.is_match("RAKI*SUTA"));
//! ```

use std::ops::Range;

use bon::bon;

use crate::compile::{compile, Compiled};
use crate::error::Error;
use crate::exec::Span;
use crate::flags::{ExecFlags, Flags, Info};

/// A successful match, with byte offsets into the haystack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Match {
    pub(crate) start: usize,
    pub(crate) end: usize,
}

impl Match {
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// A compiled regular expression bound to the `&str` API.
pub struct Regex {
    compiled: Compiled,
}

#[bon]
impl Regex {
    /// Compile a pattern. The default syntax is ARE (advanced); the
    /// `basic`, `extended` and `quote` toggles select the other flavors.
    #[builder]
    pub fn new(
        #[builder(start_fn)] pattern: &str,

        /// POSIX BRE syntax.
        #[builder(default = false)]
        basic: bool,

        /// POSIX ERE syntax without the advanced extensions.
        #[builder(default = false)]
        extended: bool,

        /// Treat the pattern as a literal string.
        #[builder(default = false)]
        quote: bool,

        #[builder(default = false)] case_insensitive: bool,

        /// Newline-sensitive matching: `.` and complemented brackets stop
        /// at newline, and `^`/`$` match around it.
        #[builder(default = false)]
        newline: bool,

        /// Ignore whitespace and `#` comments in the pattern.
        #[builder(default = false)]
        expanded: bool,

        /// Don't track capture ranges.
        #[builder(default = false)]
        no_sub: bool,

        /// Anchor the pattern at the beginning of the string.
        #[builder(default = false)]
        bos_only: bool,
    ) -> Result<Regex, Error> {
        let mut flags = if quote {
            Flags::QUOTE
        } else if basic {
            Flags::BASIC
        } else if extended {
            Flags::EXTENDED
        } else {
            Flags::ADVANCED
        };
        if case_insensitive {
            flags |= Flags::ICASE;
        }
        if newline {
            flags |= Flags::NEWLINE;
        }
        if expanded {
            flags |= Flags::EXPANDED;
        }
        if no_sub {
            flags |= Flags::NOSUB;
        }
        if bos_only {
            flags |= Flags::BOSONLY;
        }
        Ok(Regex {
            compiled: compile(pattern, flags)?,
        })
    }
}

impl Regex {
    /// Information bits accumulated during compilation.
    pub fn info(&self) -> Info {
        self.compiled.info()
    }

    /// Number of capturing groups.
    pub fn nsub(&self) -> usize {
        self.compiled.nsub()
    }

    /// Returns true if and only if the pattern matches somewhere in the
    /// haystack.
    pub fn is_match(&self, haystack: &str) -> bool {
        let chars: Vec<char> = haystack.chars().collect();
        self.compiled
            .execute(&chars, 0, ExecFlags::empty(), None)
            .map(|m| m.is_some())
            .unwrap_or(false)
    }

    /// Find the leftmost match.
    pub fn find(&self, haystack: &str) -> Option<Match> {
        self.try_find(haystack).expect("internal matching error")
    }

    /// Find the leftmost match, surfacing internal errors.
    pub fn try_find(&self, haystack: &str) -> Result<Option<Match>, Error> {
        let (chars, offsets) = decompose(haystack);
        let m = self.compiled.execute(&chars, 1, ExecFlags::empty(), None)?;
        Ok(m.and_then(|v| v.first().cloned().flatten())
            .map(|r| to_match(&offsets, r)))
    }

    /// Find the leftmost match and all capture-group spans. Slot 0 is the
    /// overall match; unmatched groups are `None`.
    pub fn captures(&self, haystack: &str) -> Option<Vec<Option<Match>>> {
        self.try_captures(haystack).expect("internal matching error")
    }

    /// Like [`Regex::captures`], surfacing internal errors.
    pub fn try_captures(&self, haystack: &str) -> Result<Option<Vec<Option<Match>>>, Error> {
        let (chars, offsets) = decompose(haystack);
        let m = self
            .compiled
            .execute(&chars, self.compiled.nsub() + 1, ExecFlags::empty(), None)?;
        Ok(m.map(|v| {
            v.into_iter()
                .map(|s: Span| s.map(|r| to_match(&offsets, r)))
                .collect()
        }))
    }
}

/// Split a haystack into chars plus a char-index -> byte-offset table (one
/// extra entry for the end).
fn decompose(haystack: &str) -> (Vec<char>, Vec<usize>) {
    let mut chars = Vec::with_capacity(haystack.len());
    let mut offsets = Vec::with_capacity(haystack.len() + 1);
    for (i, c) in haystack.char_indices() {
        chars.push(c);
        offsets.push(i);
    }
    offsets.push(haystack.len());
    (chars, offsets)
}

fn to_match(offsets: &[usize], r: Range<usize>) -> Match {
    Match {
        start: offsets[r.start],
        end: offsets[r.end],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_match(m: Option<Match>, expected: Option<(usize, usize)>) {
        assert_eq!(m.map(|m| (m.start(), m.end())), expected);
    }

    #[test]
    fn find() {
        let re = Regex::builder("b+").build().unwrap();
        assert_match(re.find("abbbc"), Some((1, 4)));
        assert_match(re.find("xyz"), None);
    }

    #[test]
    fn find_multibyte_offsets() {
        let re = Regex::builder("すた").build().unwrap();
        // Offsets come back in bytes of the original string.
        assert_match(re.find("らき☆すた"), Some((9, 15)));
    }

    #[test]
    fn captures() {
        let re = Regex::builder("(a+)(b+)?").build().unwrap();
        let caps = re.captures("xaab").unwrap();
        assert_eq!(caps[0].as_ref().unwrap().range(), 1..4);
        assert_eq!(caps[1].as_ref().unwrap().range(), 1..3);
        assert_eq!(caps[2].as_ref().unwrap().range(), 3..4);
        let caps = re.captures("xaa!").unwrap();
        assert_eq!(caps[0].as_ref().unwrap().range(), 1..3);
        assert!(caps[2].is_none());
    }

    #[test]
    fn case_insensitive() {
        let re = Regex::builder("abc").case_insensitive(true).build().unwrap();
        assert!(re.is_match("xAbCx"));
        let re = Regex::builder("abc").build().unwrap();
        assert!(!re.is_match("xAbCx"));
    }

    #[test]
    fn quote_literal() {
        let re = Regex::builder("a.*b").quote(true).build().unwrap();
        assert!(re.is_match("xa.*bx"));
        assert!(!re.is_match("axxb"));
    }

    #[test]
    fn newline_mode() {
        let re = Regex::builder(".+").newline(true).build().unwrap();
        assert_match(re.find("ab\ncd"), Some((0, 2)));
        let re = Regex::builder("^cd$").newline(true).build().unwrap();
        assert!(re.is_match("ab\ncd"));
    }

    #[test]
    fn expanded_mode() {
        let re = Regex::builder("a b c # trailing comment")
            .expanded(true)
            .build()
            .unwrap();
        assert!(re.is_match("abc"));
    }

    #[test]
    fn bos_only() {
        let re = Regex::builder("bc").bos_only(true).build().unwrap();
        assert!(!re.is_match("abc"));
        assert!(re.is_match("bcd"));
    }

    #[test]
    fn build_error() {
        assert_eq!(Regex::builder("(").build().err(), Some(Error::Paren));
    }
}
