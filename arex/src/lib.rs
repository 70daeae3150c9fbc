/*!
An advanced regular-expression engine.

The pipeline compiles an extended-regex source string into an optimized
automaton and runs it over character input with subexpression capture and
backreference support:

- A modal lexer and recursive-descent parser produce a subexpression tree
  plus an NFA over character equivalence classes ("colors").
- The NFA transform pipeline eliminates ε-arcs, breaks constraint-only
  loops, migrates zero-width constraints to the string boundaries, and
  compacts each tree node into a flat read-only automaton.
- The executor drives on-demand DFA simulation with a bounded LRU cache of
  state sets, in both longest- and shortest-preferring variants; a
  recursive dissector resolves captures and verifies backreferences by
  re-running child DFAs at candidate split points.

## Syntax

Three flavors are supported, selected by [`Flags`]: POSIX BREs and EREs,
and AREs (the default for [`Regex`]) with non-greedy quantifiers,
lookahead constraints `(?=...)`/`(?!...)`, word boundaries `\y`/`\Y`,
class shorthands `\d \s \w`, embedded options `(?imq...)` and the `***`
director prefixes.

## Usage

```
use arex::Regex;

let re = Regex::builder(r"(\w+)@(\w+)").build().unwrap();
let caps = re.captures("mail to: user@example").unwrap();
assert_eq!(&"mail to: user@example"[caps[1].as_ref().unwrap().range()], "user");
assert_eq!(&"mail to: user@example"[caps[2].as_ref().unwrap().range()], "example");
```

The lower-level [`compile`]/[`Compiled::execute`] interface works in char
offsets and exposes the full flag set, the information bits and the
cold-start details.

```
use arex::{compile, ExecFlags, Flags};

let c = compile("a(b+)c", Flags::ADVANCED).unwrap();
let hay: Vec<char> = "xabbc".chars().collect();
let m = c.execute(&hay, 2, ExecFlags::empty(), None).unwrap().unwrap();
assert_eq!(m[0], Some(1..5));
assert_eq!(m[1], Some(2..4));
```

A [`Compiled`] value is read-only after compilation and may be shared
freely between concurrent searches; each `execute` call carries its own
scratch state.
*/

mod color;
mod compile;
mod error;
mod exec;
mod flags;
mod nfa;
mod regex;
mod syntax;
mod tree;
mod unicode;

pub use compile::{compile, Compiled};
pub use error::Error;
pub use exec::{Details, Span};
pub use flags::{ExecFlags, Flags, Info};
pub use regex::{Match, Regex};

#[cfg(test)]
mod tests {
    use super::*;

    fn run(pattern: &str, flags: Flags, hay: &str) -> Option<Vec<Span>> {
        let c = compile(pattern, flags).expect("pattern must compile");
        let chars: Vec<char> = hay.chars().collect();
        c.execute(&chars, c.nsub() + 1, ExecFlags::empty(), None)
            .expect("execution must not error")
    }

    fn span(pattern: &str, flags: Flags, hay: &str) -> Option<(usize, usize)> {
        run(pattern, flags, hay).map(|v| {
            let r = v[0].clone().expect("slot 0 is the overall match");
            (r.start, r.end)
        })
    }

    #[test]
    fn literal_and_quantifier() {
        assert_eq!(span("a(b+)c", Flags::ADVANCED, "abbbc"), Some((0, 5)));
        let m = run("a(b+)c", Flags::ADVANCED, "abbbc").unwrap();
        assert_eq!(m[1], Some(1..4));
    }

    #[test]
    fn alternation_iteration() {
        let m = run("(a|b)*abb", Flags::ADVANCED, "ababb").unwrap();
        assert_eq!(m[0], Some(0..5));
        // Only the final iteration of the group is reported.
        assert_eq!(m[1], Some(1..2));
    }

    #[test]
    fn backref() {
        let m = run(r"(.+)\1", Flags::ADVANCED, "abcabc").unwrap();
        assert_eq!(m[0], Some(0..6));
        assert_eq!(m[1], Some(0..3));
    }

    #[test]
    fn lookahead_positive() {
        assert_eq!(span("a(?=b)b", Flags::ADVANCED, "ab"), Some((0, 2)));
        assert_eq!(span("a(?=b)b", Flags::ADVANCED, "ac"), None);
    }

    #[test]
    fn lookahead_negative() {
        assert_eq!(span("a(?!b).", Flags::ADVANCED, "ac"), Some((0, 2)));
        assert_eq!(span("a(?!b).", Flags::ADVANCED, "ab"), None);
    }

    #[test]
    fn word_boundaries() {
        assert_eq!(span(r"\y\w+\y", Flags::ADVANCED, "  foo bar "), Some((2, 5)));
        assert_eq!(span(r"\mbar\M", Flags::ADVANCED, "foo bar"), Some((4, 7)));
        assert_eq!(span(r"\ybar\y", Flags::ADVANCED, "foobar"), None);
    }

    #[test]
    fn shortest_preference() {
        assert_eq!(span("a{2,4}?", Flags::ADVANCED, "aaaaa"), Some((0, 2)));
        assert_eq!(span("a{2,4}", Flags::ADVANCED, "aaaaa"), Some((0, 4)));
    }

    #[test]
    fn newline_stops_complement() {
        assert_eq!(
            span("[^x]*", Flags::ADVANCED | Flags::NEWLINE, "ab\ncd"),
            Some((0, 2))
        );
    }

    #[test]
    fn empty_match() {
        let c = compile("(a|)*", Flags::ADVANCED).unwrap();
        assert!(c.info().contains(Info::UEMPTYMATCH));
        let m = c
            .execute(&[], 2, ExecFlags::empty(), None)
            .unwrap()
            .unwrap();
        assert_eq!(m[0], Some(0..0));
    }

    #[test]
    fn unbalanced_paren_fails() {
        assert_eq!(compile("(", Flags::ADVANCED).err(), Some(Error::Paren));
    }

    // Property-style checks.

    #[test]
    fn anchors_bracket_whole_string() {
        for (pat, hay) in [("a+b", "aab"), ("x", "x"), ("a(b|c)d", "acd")] {
            let anchored = format!("^{}$", pat);
            assert_eq!(
                span(&anchored, Flags::ADVANCED, hay),
                Some((0, hay.chars().count()))
            );
            let plain = span(pat, Flags::ADVANCED, hay).unwrap();
            assert_eq!(plain, (0, hay.chars().count()));
        }
        // And ^P$ must reject a proper superstring that P alone accepts.
        assert_eq!(span("^a+$", Flags::ADVANCED, "aab"), None);
        assert!(span("a+", Flags::ADVANCED, "aab").is_some());
    }

    #[test]
    fn shortest_never_longer() {
        for (greedy, lazy, hay) in [
            ("a*", "a*?", "aaa"),
            ("ab{1,3}", "ab{1,3}?", "abbb"),
            ("x(a|b)*", "x(a|b)*?", "xabab"),
        ] {
            let g = span(greedy, Flags::ADVANCED, hay).unwrap();
            let l = span(lazy, Flags::ADVANCED, hay).unwrap();
            assert!(l.1 <= g.1, "{lazy} matched longer than {greedy}");
        }
    }

    #[test]
    fn dissection_agrees_with_dfa() {
        // Stripping captures and re-running must reproduce the outer span.
        for (pat, nopat, hay) in [
            ("a(b+)c", "ab+c", "zabbc"),
            ("(a|b)+x", "(?:a|b)+x", "babax!"),
            ("(\\w+) (\\w+)", "\\w+ \\w+", "hello world"),
        ] {
            let with = span(pat, Flags::ADVANCED, hay);
            let bare = span(nopat, Flags::ADVANCED, hay);
            assert_eq!(with, bare);
            // NOSUB agrees on existence.
            let c = compile(pat, Flags::ADVANCED | Flags::NOSUB).unwrap();
            let chars: Vec<char> = hay.chars().collect();
            let found = c
                .execute(&chars, 0, ExecFlags::empty(), None)
                .unwrap()
                .is_some();
            assert_eq!(found, with.is_some());
        }
    }

    #[test]
    fn backref_equality_holds() {
        let hay = "abcabc";
        let m = run(r"(.+)\1", Flags::ADVANCED, hay).unwrap();
        let whole = m[0].clone().unwrap();
        let cap = m[1].clone().unwrap();
        let chars: Vec<char> = hay.chars().collect();
        let first: Vec<char> = chars[cap.clone()].to_vec();
        let second: Vec<char> = chars[cap.end..whole.end].to_vec();
        assert_eq!(first, second);

        // Case-folded comparison under ICASE.
        let m = run(r"(.+)\1", Flags::ADVANCED | Flags::ICASE, "aBcAbC").unwrap();
        assert_eq!(m[0], Some(0..6));
    }

    #[test]
    fn empty_negative_lookahead_with_word_boundary() {
        // A never-matching lookahead must not disturb the boundary
        // constraints it is stacked against.
        assert_eq!(span(r"foo\y(?!p)", Flags::ADVANCED, "foo bar"), Some((0, 3)));
        assert_eq!(span(r"a(?!)", Flags::ADVANCED, "ab"), None);
        assert_eq!(span(r"\yfoo\y(?! bar)", Flags::ADVANCED, "foo baz"), Some((0, 3)));
        assert_eq!(span(r"\yfoo\y(?! bar)", Flags::ADVANCED, "foo bar"), None);
    }

    #[test]
    fn bre_flavor() {
        assert_eq!(span(r"a\(b\)c", Flags::BASIC, "abc"), Some((0, 3)));
        assert_eq!(span("a*", Flags::BASIC, "*aa"), Some((0, 0)));
        // Interval bounds use backslashed braces in BREs.
        assert_eq!(span(r"ab\{2,3\}", Flags::BASIC, "xabbb"), Some((1, 5)));
    }

    #[test]
    fn ere_flavor() {
        // No ARE escapes: \y is just a literal y in EREs.
        assert_eq!(span(r"a\yb", Flags::EXTENDED, "ayb"), Some((0, 3)));
        // Non-greedy syntax does not exist in plain EREs either.
        assert_eq!(compile("a+?", Flags::EXTENDED).err(), Some(Error::BadRpt));
    }

    #[test]
    fn bracket_classes() {
        assert_eq!(span("[[:digit:]]+", Flags::ADVANCED, "ab123c"), Some((2, 5)));
        assert_eq!(span("[a-f]+", Flags::ADVANCED, "zzabcfq"), Some((2, 6)));
        assert_eq!(span("[^a-f]+", Flags::ADVANCED, "abzzzb"), Some((2, 5)));
        assert_eq!(span("[[.tab.]]", Flags::ADVANCED, "a\tb"), Some((1, 2)));
        assert_eq!(span("[[=a=]]+", Flags::ADVANCED | Flags::ICASE, "bAaB"), Some((1, 3)));
    }

    #[test]
    fn icase_ranges() {
        assert_eq!(
            span("[a-d]+", Flags::ADVANCED | Flags::ICASE, "xxBcD!"),
            Some((2, 5))
        );
    }

    #[test]
    fn unicode_input() {
        assert_eq!(span("すた", Flags::ADVANCED, "らき☆すた"), Some((3, 5)));
        assert_eq!(span(r"\w+", Flags::ADVANCED, "…héllo…"), Some((1, 6)));
    }

    #[test]
    fn deep_quantifier_stack() {
        // Nested bounded repeats expand without blowing the compile-space
        // budget or the tree invariants.
        let c = compile("(a{2,3}){2,3}b", Flags::ADVANCED).unwrap();
        let chars: Vec<char> = "aaaaab".chars().collect();
        let m = c.execute(&chars, 2, ExecFlags::empty(), None).unwrap().unwrap();
        assert_eq!(m[0], Some(0..6));
    }

    #[test]
    fn compile_space_budget() {
        // A pathological repetition pyramid must fail cleanly, not hang or
        // exhaust memory.
        let e = compile("(((a{100}){100}){100})b", Flags::ADVANCED).err();
        assert!(matches!(e, Some(Error::TooBig | Error::Space)));
    }
}
