//! Compile driver: runs the parse, carves a compacted NFA per tree node,
//! compiles the lookahead constraints, builds the search NFA and packages
//! the read-only artifact.

use std::cell::Cell;
use std::rc::Rc;

use log::debug;

use crate::color::{ok_colors, rainbow, Colormap, COLORLESS};
use crate::error::{new_err_slot, Error};
use crate::flags::{Flags, Info};
use crate::nfa::compact::{compact, Cnfa};
use crate::nfa::optimize::optimize;
use crate::nfa::{dup_into, ArcType, Nfa, StateId};
use crate::syntax::lex::newline;
use crate::syntax::{ReType, Stop, Vars};
use crate::tree::{Lacon, Op, SubFlags, Subre};
use crate::unicode::{casecmp, cmp};

/// A compiled regular expression: a colormap, the fast search automaton,
/// the subexpression tree with one compact NFA per node, the lookahead
/// constraints and the comparison predicate. Read-only once built; it may
/// be shared between concurrent executions, each of which carries its own
/// scratch state.
pub struct Compiled {
    pub(crate) cflags: Flags,
    pub(crate) info: Info,
    pub(crate) nsub: usize,
    pub(crate) tree: Box<Subre>,
    /// Number of tree nodes, plus one.
    pub(crate) ntree: usize,
    /// For fast preliminary search.
    pub(crate) search: Cnfa,
    pub(crate) cmap: Colormap,
    pub(crate) lacons: Vec<Lacon>,
    /// Case-sensitive or case-folded substring equality.
    pub(crate) compare: fn(&[char], &[char]) -> bool,
}

impl Compiled {
    /// Information bits accumulated during compilation.
    pub fn info(&self) -> Info {
        self.info
    }

    /// Number of capturing subexpressions.
    pub fn nsub(&self) -> usize {
        self.nsub
    }

    /// The compile flags, after any embedded options took effect.
    pub fn flags(&self) -> Flags {
        self.cflags
    }
}

/// Compile a regular expression.
pub fn compile(pattern: &str, flags: Flags) -> Result<Compiled, Error> {
    // Sanity checks.
    if flags.contains(Flags::QUOTE)
        && flags.intersects(Flags::ADVANCED | Flags::EXPANDED | Flags::NEWLINE)
    {
        return Err(Error::InvArg);
    }
    if !flags.contains(Flags::EXTENDED) && flags.contains(Flags::ADVF) {
        return Err(Error::InvArg);
    }

    let err = new_err_slot();
    let space = Rc::new(Cell::new(0usize));
    let mut v = Vars::new(pattern, flags, err.clone(), space);

    macro_rules! cnoerr {
        () => {
            if let Some(e) = err.get() {
                return Err(e);
            }
        };
    }

    // Parsing.
    v.lexstart(); // also handles prefixes
    if v.cflags.intersects(Flags::NLSTOP | Flags::NLANCH) && !v.iserr() {
        // Assign newline a unique color.
        v.nlcolor = v.cm.subcolor(newline());
        ok_colors(&mut v.nfa, &mut v.cm);
    }
    cnoerr!();
    let (init, fin) = (v.nfa.init, v.nfa.fin);
    let tree = v.parse(Stop::Eos, ReType::Plain, init, fin);
    cnoerr!();
    let mut tree = tree.ok_or(Error::Assert)?;

    // Finish setup of the NFA and its subre tree.
    v.nfa.special_colors(&mut v.cm, None);
    cnoerr!();
    let ntree = tree.number(1);

    // Build compacted NFAs for the tree and the lookahead constraints.
    let top_info = nfatree(&mut v, &mut tree);
    cnoerr!();
    for i in 1..v.lacons.len() {
        let (begin, end) = (v.lacons[i].begin, v.lacons[i].end);
        let (_info, cnfa) = nfanode(&mut v, begin, end);
        v.lacons[i].cnfa = cnfa;
    }
    cnoerr!();
    if tree.flags.contains(SubFlags::SHORTER) {
        v.info |= Info::USHORTEST;
    }

    // The main NFA can be sacrificed now, so use it as the work area for
    // the search automaton.
    if v.cflags.contains(Flags::PROGRESS) {
        let (nstates, narcs) = v.nfa.counts();
        debug!("pre-optimize: {} states, {} arcs", nstates, narcs);
    }
    optimize(&mut v.nfa, &mut v.cm);
    cnoerr!();
    makesearch(&mut v);
    cnoerr!();
    if v.cflags.contains(Flags::PROGRESS) {
        let (nstates, narcs) = v.nfa.counts();
        debug!("search nfa: {} states, {} arcs", nstates, narcs);
    }
    let search = compact(&mut v.nfa, &v.cm);
    cnoerr!();

    // Looks okay, package it up.
    let compiled = Compiled {
        cflags: v.cflags,
        info: v.info | top_info,
        nsub: v.nsubexp,
        tree,
        ntree,
        search,
        cmap: v.cm,
        lacons: v.lacons,
        compare: if v.cflags.contains(Flags::ICASE) {
            casecmp
        } else {
            cmp
        },
    };

    if flags.contains(Flags::DUMP) {
        dump(&compiled);
    }

    debug_assert!(err.get().is_none());
    Ok(compiled)
}

/// Turn the subre tree into a tree of compacted NFAs, bottom-up. Returns
/// the top node's analysis bits.
fn nfatree(v: &mut Vars, t: &mut Subre) -> Info {
    if let Some(l) = t.left.as_deref_mut() {
        nfatree(v, l);
    }
    if let Some(r) = t.right.as_deref_mut() {
        nfatree(v, r);
    }
    let (info, cnfa) = nfanode(v, t.begin, t.end);
    t.cnfa = cnfa;
    info
}

/// Carve one node's sub-NFA out of the parse NFA, optimize it on its own
/// and compact it.
fn nfanode(v: &mut Vars, begin: StateId, end: StateId) -> (Info, Cnfa) {
    let mut nfa = Nfa::new(v.err.clone(), v.nfa.space.clone(), &mut v.cm, true);
    if v.iserr() {
        return (Info::empty(), Cnfa::default());
    }
    let (sinit, sfin) = (nfa.init, nfa.fin);
    dup_into(&mut v.nfa, &mut nfa, &mut v.cm, begin, end, sinit, sfin);
    let mut info = Info::empty();
    if !v.iserr() {
        let (bos, eos) = (v.nfa.bos, v.nfa.eos);
        nfa.special_colors(&mut v.cm, Some((&bos, &eos)));
        info = optimize(&mut nfa, &mut v.cm);
    }
    let cnfa = if !v.iserr() {
        compact(&mut nfa, &v.cm)
    } else {
        Cnfa::default()
    };
    (info, cnfa)
}

/// Turn the (already optimized) main NFA into a search NFA: an implicit
/// prepended `.*?`, plus splitting of states the DFA could revisit after
/// making progress, so no-progress state sets stay recognizable for
/// cold-start tracking.
fn makesearch(v: &mut Vars) {
    let pre = v.nfa.pre;

    // No loops are needed if it's anchored: every pre outarc on a BOS/BOL
    // color only.
    let mut anchored = true;
    let mut aid = v.nfa.st(pre).outs;
    while let Some(id) = aid {
        let a = v.nfa.arc(id);
        debug_assert_eq!(a.ty, ArcType::Plain);
        if a.co != v.nfa.bos[0] && a.co != v.nfa.bos[1] {
            anchored = false;
            break;
        }
        aid = a.out_next;
    }
    if !anchored {
        // Add an implicit .* in front, and ^* and \A* too -- not always
        // necessary, but harmless.
        rainbow(&mut v.nfa, &mut v.cm, ArcType::Plain, COLORLESS, pre, pre);
        let (b0, b1) = (v.nfa.bos[0], v.nfa.bos[1]);
        v.nfa.new_arc(&mut v.cm, ArcType::Plain, b0, pre, pre);
        v.nfa.new_arc(&mut v.cm, ArcType::Plain, b1, pre, pre);
    }

    // Now the subtle part. Knowing you were in the pre state usually tells
    // you little; it's the next states that are informative. But some of
    // them may have other inarcs, i.e. the DFA might make progress and
    // then return to one of them. Such states must be split into progress
    // and no-progress versions.

    // First, list the states in question, linked through tmp with the
    // first entry self-marked.
    let mut slist: Option<StateId> = None;
    let mut aid = v.nfa.st(pre).outs;
    while let Some(id) = aid {
        let s = v.nfa.arc(id).to;
        let mut other = false;
        let mut bid = v.nfa.st(s).ins;
        while let Some(b) = bid {
            if v.nfa.arc(b).from != pre {
                other = true;
                break;
            }
            bid = v.nfa.arc(b).in_next;
        }
        if other && v.nfa.st(s).tmp.is_none() {
            v.nfa.st_mut(s).tmp = Some(slist.unwrap_or(s));
            slist = Some(s);
        }
        aid = v.nfa.arc(id).out_next;
    }

    // Do the splits.
    let mut sid = slist;
    while let Some(s) = sid {
        let Some(s2) = v.nfa.new_state() else { return };
        v.nfa.copy_outs(&mut v.cm, s, s2);
        if v.iserr() {
            return;
        }
        let mut aid = v.nfa.st(s).ins;
        while let Some(id) = aid {
            let next = v.nfa.arc(id).in_next;
            if v.nfa.arc(id).from != pre {
                let from = v.nfa.arc(id).from;
                v.nfa.cp_arc(&mut v.cm, id, from, s2);
                v.nfa.free_arc(&mut v.cm, id);
            }
            aid = next;
        }
        sid = match v.nfa.st(s).tmp {
            Some(t) if t != s => Some(t),
            _ => None,
        };
        v.nfa.st_mut(s).tmp = None; // clean up while we're at it
    }
}

/// Log a human-readable sketch of a compiled RE under `Flags::DUMP`.
fn dump(c: &Compiled) {
    debug!(
        "compiled: nsub {}, info {:?}, ntree {}, lacons {}, search states {}, colors {}",
        c.nsub,
        c.info,
        c.ntree,
        c.lacons.len().saturating_sub(1),
        c.search.nstates,
        c.search.ncolors,
    );
    fn dump_node(t: &Subre, depth: usize) {
        let op = match t.op {
            Op::Eq => '=',
            Op::Backref => 'b',
            Op::Capture => '(',
            Op::Concat => '.',
            Op::Alt => '|',
            Op::Iter => '*',
        };
        debug!(
            "{:indent$}{}. `{}` {:?} (#{}) {{{},{}}} states {}",
            "",
            t.id,
            op,
            t.flags,
            t.subno,
            t.min,
            t.max,
            t.cnfa.nstates,
            indent = depth * 2,
        );
        if let Some(l) = t.left.as_deref() {
            dump_node(l, depth + 1);
        }
        if let Some(r) = t.right.as_deref() {
            dump_node(r, depth + 1);
        }
    }
    dump_node(&c.tree, 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_simple() {
        let c = compile("a(b+)c", Flags::ADVANCED).unwrap();
        assert_eq!(c.nsub(), 1);
        assert!(!c.search.is_null());
        assert!(c.info().contains(Info::UBOUNDS) == false);
    }

    fn err_of(pattern: &str, flags: Flags) -> Error {
        compile(pattern, flags).map(|_| ()).unwrap_err()
    }

    #[test]
    fn compile_errors() {
        assert_eq!(err_of("(", Flags::ADVANCED), Error::Paren);
        assert_eq!(err_of("a{1,", Flags::ADVANCED), Error::Brace);
        assert_eq!(err_of("a[b", Flags::ADVANCED), Error::Brack);
        assert_eq!(err_of("*a", Flags::ADVANCED), Error::BadRpt);
        assert_eq!(err_of(r"(x)\7", Flags::ADVANCED), Error::Subreg);
        assert_eq!(err_of("[[:bogus:]]", Flags::ADVANCED), Error::Ctype);
        // QUOTE conflicts with ADVANCED.
        assert_eq!(err_of("a", Flags::QUOTE | Flags::ADVANCED), Error::InvArg);
        // ADVF without EXTENDED is nonsense.
        assert_eq!(err_of("a", Flags::ADVF), Error::InvArg);
    }

    #[test]
    fn info_bits() {
        let c = compile(r"(.+)\1", Flags::ADVANCED).unwrap();
        assert!(c.info().contains(Info::UBACKREF));
        let c = compile("a(?=b)", Flags::ADVANCED).unwrap();
        assert!(c.info().contains(Info::ULOOKAHEAD));
        let c = compile("(a|)*", Flags::ADVANCED).unwrap();
        assert!(c.info().contains(Info::UEMPTYMATCH));
        let c = compile("a{2,4}?", Flags::ADVANCED).unwrap();
        assert!(c.info().contains(Info::USHORTEST));
        assert!(c.info().contains(Info::UBOUNDS));
    }

    #[test]
    fn determinism() {
        // Compiling the same pattern twice produces isomorphic compact
        // NFAs; with deterministic numbering they are outright equal.
        let a = compile("(a|b)*abb", Flags::ADVANCED).unwrap();
        let b = compile("(a|b)*abb", Flags::ADVANCED).unwrap();
        assert_eq!(a.search.nstates, b.search.nstates);
        assert_eq!(a.search.arcs, b.search.arcs);
        assert_eq!(a.search.states, b.search.states);
    }

    #[test]
    fn compile_is_reusable() {
        // Compile-and-drop in a loop: lifecycle-bounded allocation means
        // nothing accumulates or double-frees.
        for _ in 0..3 {
            let c = compile("(a(b)c|d)+x?y{2,3}", Flags::ADVANCED).unwrap();
            drop(c);
        }
    }
}
