//! Subexpression tree.
//!
//! The parser produces a tree of `Subre` nodes over the NFA. A node whose
//! subtree contains captures, backrefs or mixed preference is "messy": the
//! DFA alone cannot resolve it and the dissector must recurse through it at
//! match time. Everything else collapses to a single DFA-driven node.

use bitflags::bitflags;

use crate::nfa::compact::Cnfa;
use crate::nfa::StateId;

/// Maximum finite repetition count.
pub(crate) const DUPMAX: u16 = 255;
/// "Infinity" for repetition bounds.
pub(crate) const DUPINF: u16 = DUPMAX + 1;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub(crate) struct SubFlags: u8 {
        /// Prefers longer match.
        const LONGER = 0o01;
        /// Prefers shorter match.
        const SHORTER = 0o02;
        /// Mixed preference below.
        const MIXED = 0o04;
        /// Capturing parens below.
        const CAP = 0o10;
        /// Back reference below.
        const BACKR = 0o20;
    }
}

/// Preference bits do not propagate upward.
const NOPROP: SubFlags = SubFlags::LONGER.union(SubFlags::SHORTER);

/// Flags as seen from a parent node: preferences stripped, with MIXED set
/// if both were present.
pub(crate) fn up(f: SubFlags) -> SubFlags {
    let mut r = f.difference(NOPROP);
    if f.contains(SubFlags::LONGER) && f.contains(SubFlags::SHORTER) {
        r |= SubFlags::MIXED;
    }
    r
}

pub(crate) fn messy(f: SubFlags) -> bool {
    f.intersects(SubFlags::MIXED | SubFlags::CAP | SubFlags::BACKR)
}

pub(crate) fn pref(f: SubFlags) -> SubFlags {
    f.intersection(NOPROP)
}

fn pref2(f1: SubFlags, f2: SubFlags) -> SubFlags {
    if !pref(f1).is_empty() {
        pref(f1)
    } else {
        pref(f2)
    }
}

/// Merge two flag sets: united and propagated, keeping the dominant
/// preference.
pub(crate) fn combine(f1: SubFlags, f2: SubFlags) -> SubFlags {
    up(f1 | f2) | pref2(f1, f2)
}

/// Node operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Op {
    /// Plain regex with no interesting substructure; a DFA suffices.
    Eq,
    /// Back reference (no substructure either).
    Backref,
    /// Capture: records the match of its single child.
    Capture,
    /// Concatenation: a match for left, then a match for right.
    Concat,
    /// Alternation: left or right. The right child is another alternation
    /// or `None`, so an N-way branch is a right-spine of N nodes.
    Alt,
    /// Iteration: some number of matches of its single child.
    Iter,
}

#[derive(Debug)]
pub(crate) struct Subre {
    pub op: Op,
    pub flags: SubFlags,
    /// Tree-node id, assigned by numbering once the tree is final.
    pub id: usize,
    /// Subexpression number, for `Capture` and `Backref`.
    pub subno: usize,
    /// Repetition bounds for `Iter`, and for a directly quantified
    /// `Backref` (the counts are folded into the backref node; there is no
    /// point searching for division points between identical copies).
    pub min: u16,
    pub max: u16,
    pub left: Option<Box<Subre>>,
    pub right: Option<Box<Subre>>,
    /// Outarcs from here...
    pub begin: StateId,
    /// ...ending in inarcs here.
    pub end: StateId,
    /// Compacted NFA for this node, once built.
    pub cnfa: Cnfa,
}

impl Subre {
    pub fn new(op: Op, flags: SubFlags, begin: StateId, end: StateId) -> Box<Subre> {
        Box::new(Subre {
            op,
            flags,
            id: 0,
            subno: 0,
            min: 1,
            max: 1,
            left: None,
            right: None,
            begin,
            end,
            cnfa: Cnfa::default(),
        })
    }

    /// Number the tree preorder starting at `start`; returns the next free
    /// number.
    pub fn number(&mut self, start: usize) -> usize {
        let mut i = start;
        self.id = i;
        i += 1;
        if let Some(l) = self.left.as_mut() {
            i = l.number(i);
        }
        if let Some(r) = self.right.as_mut() {
            i = r.number(i);
        }
        i
    }
}

/// A lookahead constraint: a parenthesized sub-NFA referenced from the main
/// NFA by a LACON-typed arc carrying its index.
#[derive(Debug)]
pub(crate) struct Lacon {
    pub begin: StateId,
    pub end: StateId,
    /// Positive (`(?=`) or negative (`(?!`) sense.
    pub positive: bool,
    pub cnfa: Cnfa,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_algebra() {
        assert_eq!(up(SubFlags::LONGER), SubFlags::empty());
        assert_eq!(
            up(SubFlags::LONGER | SubFlags::SHORTER),
            SubFlags::MIXED
        );
        assert!(messy(SubFlags::CAP));
        assert!(messy(SubFlags::BACKR));
        assert!(!messy(SubFlags::LONGER));
        // The left operand's preference dominates.
        let c = combine(SubFlags::SHORTER, SubFlags::LONGER | SubFlags::CAP);
        assert!(c.contains(SubFlags::SHORTER));
        assert!(!c.contains(SubFlags::LONGER));
        assert!(c.contains(SubFlags::CAP));
        assert!(c.contains(SubFlags::MIXED));
    }

    #[test]
    fn numbering() {
        let mut t = Subre::new(Op::Concat, SubFlags::empty(), StateId(0), StateId(1));
        t.left = Some(Subre::new(Op::Eq, SubFlags::empty(), StateId(0), StateId(1)));
        t.right = Some(Subre::new(Op::Eq, SubFlags::empty(), StateId(0), StateId(1)));
        let next = t.number(1);
        assert_eq!(next, 4);
        assert_eq!(t.id, 1);
        assert_eq!(t.left.as_ref().unwrap().id, 2);
        assert_eq!(t.right.as_ref().unwrap().id, 3);
    }
}
