//! Character classification and case folding.
//!
//! The engine maps locale-style queries (POSIX character classes, case
//! complements, collating elements) onto `char` classification. Only
//! single-character collating elements and equivalence classes are
//! supported; multi-character collation is out of scope.

use crate::error::Error;

/// Lowercase a character through the simple (1:1) mapping only. Characters
/// whose lowercase expansion is longer than one char are left alone, so a
/// chr always folds to exactly one chr.
pub(crate) fn mono_lowercase(c: char) -> char {
    let mut it = c.to_lowercase();
    match (it.next(), it.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

/// Uppercase counterpart of [`mono_lowercase`].
pub(crate) fn mono_uppercase(c: char) -> char {
    let mut it = c.to_uppercase();
    match (it.next(), it.next()) {
        (Some(u), None) => u,
        _ => c,
    }
}

/// All case variants of a character: itself plus its simple upper/lower
/// images. At most three distinct chars.
pub(crate) fn all_cases(c: char) -> Vec<char> {
    let mut out = vec![c];
    for v in [mono_lowercase(c), mono_uppercase(c)] {
        if !out.contains(&v) {
            out.push(v);
        }
    }
    out
}

/// Exact comparison of two equal-length char slices.
pub(crate) fn cmp(a: &[char], b: &[char]) -> bool {
    a == b
}

/// Case-folded comparison of two equal-length char slices.
pub(crate) fn casecmp(a: &[char], b: &[char]) -> bool {
    a.iter()
        .zip(b)
        .all(|(&x, &y)| mono_lowercase(x) == mono_lowercase(y))
}

/// Named POSIX character classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CharClass {
    Alpha,
    Digit,
    Alnum,
    Upper,
    Lower,
    Space,
    Punct,
    Cntrl,
    Graph,
    Print,
    Xdigit,
    Blank,
}

impl CharClass {
    pub(crate) fn lookup(name: &[char]) -> Result<CharClass, Error> {
        let name: String = name.iter().collect();
        Ok(match name.as_str() {
            "alpha" => CharClass::Alpha,
            "digit" => CharClass::Digit,
            "alnum" => CharClass::Alnum,
            "upper" => CharClass::Upper,
            "lower" => CharClass::Lower,
            "space" => CharClass::Space,
            "punct" => CharClass::Punct,
            "cntrl" => CharClass::Cntrl,
            "graph" => CharClass::Graph,
            "print" => CharClass::Print,
            "xdigit" => CharClass::Xdigit,
            "blank" => CharClass::Blank,
            _ => return Err(Error::Ctype),
        })
    }

    pub(crate) fn contains(self, c: char) -> bool {
        match self {
            CharClass::Alpha => c.is_alphabetic(),
            CharClass::Digit => c.is_ascii_digit(),
            CharClass::Alnum => c.is_alphanumeric(),
            CharClass::Upper => c.is_uppercase(),
            CharClass::Lower => c.is_lowercase(),
            CharClass::Space => c.is_whitespace(),
            CharClass::Punct => c.is_ascii_punctuation() || is_unicode_punct(c),
            CharClass::Cntrl => c.is_control(),
            CharClass::Graph => !c.is_whitespace() && !c.is_control(),
            CharClass::Print => !c.is_control(),
            CharClass::Xdigit => c.is_ascii_hexdigit(),
            CharClass::Blank => c == ' ' || c == '\t',
        }
    }

    /// Collect the class as a set of inclusive char ranges by scanning the
    /// scalar-value space once. Costs about a millisecond, and classes
    /// appear a handful of times per pattern at most.
    pub(crate) fn ranges(self) -> Vec<(char, char)> {
        ranges_of(|c| self.contains(c))
    }
}

fn is_unicode_punct(c: char) -> bool {
    // Beyond ASCII we only recognize the common punctuation blocks; the
    // original engine's locale tables had similar partial coverage.
    matches!(c,
        '\u{A1}'..='\u{BF}'
        | '\u{2010}'..='\u{2027}'
        | '\u{2030}'..='\u{205E}'
        | '\u{3001}'..='\u{3003}'
        | '\u{FF01}'..='\u{FF0F}')
        && !c.is_alphanumeric()
}

/// Contiguous inclusive ranges of scalar values satisfying `pred`.
pub(crate) fn ranges_of(pred: impl Fn(char) -> bool) -> Vec<(char, char)> {
    let mut out = Vec::new();
    let mut start: Option<char> = None;
    let mut prev = '\0';
    for u in 0..=char::MAX as u32 {
        let Some(c) = char::from_u32(u) else {
            continue;
        };
        if pred(c) {
            if start.is_none() {
                start = Some(c);
            }
            prev = c;
        } else if let Some(s) = start.take() {
            out.push((s, prev));
        }
    }
    if let Some(s) = start {
        out.push((s, prev));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_fold() {
        assert_eq!(mono_lowercase('A'), 'a');
        assert_eq!(mono_uppercase('a'), 'A');
        assert_eq!(mono_lowercase('Σ'), 'σ');
        // 'ß' uppercases to "SS"; the mono fold must leave it alone
        assert_eq!(mono_uppercase('ß'), 'ß');
    }

    #[test]
    fn cases() {
        let cs = all_cases('a');
        assert!(cs.contains(&'a') && cs.contains(&'A'));
        assert_eq!(all_cases('+'), vec!['+']);
    }

    #[test]
    fn classes() {
        assert!(CharClass::lookup(&['a', 'l', 'p', 'h', 'a']).is_ok());
        assert_eq!(
            CharClass::lookup(&['b', 'o', 'g', 'u', 's']),
            Err(Error::Ctype)
        );
        assert!(CharClass::Alnum.contains('x'));
        assert!(CharClass::Alnum.contains('7'));
        assert!(!CharClass::Alnum.contains(' '));
        assert!(CharClass::Blank.contains('\t'));
    }

    #[test]
    fn digit_ranges() {
        let r = CharClass::Digit.ranges();
        assert_eq!(r, vec![('0', '9')]);
    }

    #[test]
    fn compare_hooks() {
        assert!(cmp(&['a', 'b'], &['a', 'b']));
        assert!(!cmp(&['a', 'b'], &['A', 'b']));
        assert!(casecmp(&['a', 'B'], &['A', 'b']));
    }
}
