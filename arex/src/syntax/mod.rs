//! Pattern parsing: a recursive-descent parser over the token stream,
//! building the subexpression tree and the NFA skeleton in lockstep.
//!
//! The grammar levels are `parse` (a chain of `|` branches), `parse_branch`
//! (a concatenation) and `parse_qatom` (one quantified atom or constraint).
//! Quantified atoms with no interesting substructure are expanded inline in
//! the NFA; captures, backrefs and preference clashes force tree structure
//! that the dissector walks at match time.

pub(crate) mod lex;

use crate::color::cvec::Cvec;
use crate::color::{color_complement, ok_colors, rainbow, sub_range, Color, Colormap, COLORLESS};
use crate::error::{ErrSlot, Error};
use crate::flags::{Flags, Info};
use crate::nfa::{ArcType, Nfa, SpaceCounter, StateId};
use crate::tree::{combine, messy, pref, up, Lacon, Op, SubFlags, Subre, DUPINF, DUPMAX};
use crate::unicode::{all_cases, CharClass};

use self::lex::{Lexcon, Tok};

/// What ends the current parse level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Stop {
    Paren,
    Eos,
}

/// Whether we are parsing the main RE or a lookahead-constraint sub-RE.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ReType {
    Plain,
    Lacon,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum AtomKind {
    Other,
    Capture,
    Backref,
}

/// All transient compilation state, bundled for easy passing around: the
/// scan position and lexical context, the NFA and colormap under
/// construction, capture bookkeeping and the lookahead-constraint table.
pub(crate) struct Vars {
    pub cflags: Flags,
    pub info: Info,
    pub err: ErrSlot,
    pattern: Vec<char>,
    /// Scan index into the active source.
    now: usize,
    stop: usize,
    /// Saved position for the one level of lexical nesting.
    savenow: usize,
    savestop: usize,
    nest: Option<Vec<char>>,
    pub lasttype: Tok,
    pub nexttype: Tok,
    lexcon: Lexcon,
    /// Subexpression count.
    pub nsubexp: usize,
    /// Capture-body endpoints, indexed by subexpression number, for later
    /// replication by backrefs.
    pub subs: Vec<Option<(StateId, StateId)>>,
    pub nfa: Nfa,
    pub cm: Colormap,
    /// Color of newline under NLSTOP/NLANCH.
    pub nlcolor: Color,
    /// State holding the word-character outarcs, built on first use.
    wordchrs: Option<StateId>,
    /// Lookahead constraints; slot 0 is unused.
    pub lacons: Vec<Lacon>,
}

impl Vars {
    pub fn new(pattern: &str, flags: Flags, err: ErrSlot, space: SpaceCounter) -> Vars {
        let mut cm = Colormap::new(err.clone());
        let nfa = Nfa::new(err.clone(), space, &mut cm, false);
        let pattern: Vec<char> = pattern.chars().collect();
        let stop = pattern.len();
        Vars {
            cflags: flags,
            info: Info::empty(),
            err,
            pattern,
            now: 0,
            stop,
            savenow: 0,
            savestop: 0,
            nest: None,
            lasttype: Tok::Empty,
            nexttype: Tok::Empty,
            lexcon: Lexcon::Ere,
            nsubexp: 0,
            subs: vec![None; 10],
            nfa,
            cm,
            nlcolor: COLORLESS,
            wordchrs: None,
            lacons: Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_test(pattern: &str, flags: Flags) -> Vars {
        Vars::new(
            pattern,
            flags,
            crate::error::new_err_slot(),
            std::rc::Rc::new(std::cell::Cell::new(0)),
        )
    }

    fn newarc(&mut self, ty: ArcType, co: Color, from: StateId, to: StateId) {
        self.nfa.new_arc(&mut self.cm, ty, co, from, to);
    }

    fn empty_arc(&mut self, from: StateId, to: StateId) {
        self.newarc(ArcType::Empty, 0, from, to);
    }

    fn newstate(&mut self) -> Option<StateId> {
        self.nfa.new_state()
    }

    fn see_stop(&self, stopper: Stop) -> bool {
        match stopper {
            Stop::Paren => matches!(self.nexttype, Tok::RParen),
            Stop::Eos => matches!(self.nexttype, Tok::Eos),
        }
    }

    fn see_eos(&self) -> bool {
        matches!(self.nexttype, Tok::Eos)
    }

    fn eat_or(&mut self) -> bool {
        if matches!(self.nexttype, Tok::Or) {
            self.next();
            true
        } else {
            false
        }
    }

    fn eat_comma(&mut self) -> bool {
        if matches!(self.nexttype, Tok::Comma) {
            self.next();
            true
        } else {
            false
        }
    }

    /// Parse an RE: a bunch of branches tied together with `|`, appearing
    /// in the tree as the left children of a right-spine of `Alt` nodes.
    pub(crate) fn parse(
        &mut self,
        stopper: Stop,
        ty: ReType,
        init: StateId,
        final_: StateId,
    ) -> Option<Box<Subre>> {
        let mut items: Vec<(Box<Subre>, SubFlags)> = Vec::new();
        loop {
            // Scaffolding for this branch.
            let left = self.newstate()?;
            let right = self.newstate()?;
            self.empty_arc(init, left);
            self.empty_arc(right, final_);
            if self.iserr() {
                return None;
            }
            let b = self.parse_branch(stopper, ty, left, right, false)?;
            let f = SubFlags::LONGER | up(SubFlags::LONGER | b.flags);
            items.push((b, f));
            if !self.eat_or() {
                break;
            }
        }
        debug_assert!(self.see_stop(stopper) || self.see_eos());

        if !self.see_stop(stopper) {
            debug_assert!(stopper == Stop::Paren && self.see_eos());
            self.fail(Error::Paren);
            return None;
        }

        // Only one branch: no alternation node needed at all.
        if items.len() == 1 {
            return Some(items.pop().unwrap().0);
        }

        // Each Alt node's flags cover the branches in its own subtree, i.e.
        // its own branch and everything to its right.
        let mut total = SubFlags::empty();
        let mut chain: Option<Box<Subre>> = None;
        for (b, f) in items.into_iter().rev() {
            total |= f;
            let mut node = Subre::new(Op::Alt, total, init, final_);
            node.left = Some(b);
            node.right = chain.take();
            chain = Some(node);
        }
        let mut branches = chain.unwrap();

        if !messy(branches.flags) {
            // No interesting innards, a single DFA node covers the lot.
            branches.left = None;
            branches.right = None;
            branches.op = Op::Eq;
        }

        Some(branches)
    }

    /// Parse one branch: mostly concatenation management, working closely
    /// with `parse_qatom` (whose recursion may swallow the rest of the
    /// branch).
    fn parse_branch(
        &mut self,
        stopper: Stop,
        ty: ReType,
        left: StateId,
        right: StateId,
        partial: bool,
    ) -> Option<Box<Subre>> {
        let mut lp = left;
        let mut seencontent = false;
        let mut t = Subre::new(Op::Eq, SubFlags::empty(), left, right); // op is tentative

        while !matches!(self.nexttype, Tok::Or) && !self.see_stop(stopper) && !self.see_eos() {
            if seencontent {
                // implicit concat operator
                let lpn = self.newstate()?;
                self.nfa.move_ins(&mut self.cm, right, lpn);
                lp = lpn;
            }
            seencontent = true;

            self.parse_qatom(stopper, ty, lp, right, &mut t);
            if self.iserr() {
                return None;
            }
        }

        if !seencontent {
            // empty branch
            if !partial {
                self.note(Info::UUNSPEC);
            }
            debug_assert_eq!(lp, left);
            self.empty_arc(left, right);
        }

        Some(t)
    }

    /// Parse one quantified atom or constraint. The bookkeeping near the
    /// end cooperates closely with `parse_branch`: a messy atom splits the
    /// branch node and recursively parses the remainder of the branch
    /// itself.
    fn parse_qatom(&mut self, stopper: Stop, ty: ReType, lp: StateId, rp: StateId, top: &mut Subre) {
        debug_assert_eq!(self.nfa.st(lp).nouts, 0); // must string new code
        debug_assert_eq!(self.nfa.st(rp).nins, 0); // between lp and rp

        let mut atom: Option<Box<Subre>> = None;
        let mut kind = AtomKind::Other;
        let mut subno = 0usize;

        match self.nexttype {
            // First, constraints, which end by returning.
            Tok::Caret => {
                self.newarc(ArcType::Caret, 1, lp, rp);
                if self.cflags.contains(Flags::NLANCH) {
                    let nl = self.nlcolor;
                    self.newarc(ArcType::Behind, nl, lp, rp);
                }
                self.next();
                return;
            }
            Tok::Dollar => {
                self.newarc(ArcType::Dollar, 1, lp, rp);
                if self.cflags.contains(Flags::NLANCH) {
                    let nl = self.nlcolor;
                    self.newarc(ArcType::Ahead, nl, lp, rp);
                }
                self.next();
                return;
            }
            Tok::Sbegin => {
                self.newarc(ArcType::Caret, 1, lp, rp); // BOL
                self.newarc(ArcType::Caret, 0, lp, rp); // or BOS
                self.next();
                return;
            }
            Tok::Send => {
                self.newarc(ArcType::Dollar, 1, lp, rp); // EOL
                self.newarc(ArcType::Dollar, 0, lp, rp); // or EOS
                self.next();
                return;
            }
            Tok::Lt => {
                self.wordchrs(); // does next()
                let Some(s) = self.newstate() else { return };
                self.nonword(ArcType::Behind, lp, s);
                self.word(ArcType::Ahead, s, rp);
                return;
            }
            Tok::Gt => {
                self.wordchrs(); // does next()
                let Some(s) = self.newstate() else { return };
                self.word(ArcType::Behind, lp, s);
                self.nonword(ArcType::Ahead, s, rp);
                return;
            }
            Tok::Wbdry => {
                self.wordchrs(); // does next()
                let Some(s) = self.newstate() else { return };
                self.nonword(ArcType::Behind, lp, s);
                self.word(ArcType::Ahead, s, rp);
                let Some(s) = self.newstate() else { return };
                self.word(ArcType::Behind, lp, s);
                self.nonword(ArcType::Ahead, s, rp);
                return;
            }
            Tok::Nwbdry => {
                self.wordchrs(); // does next()
                let Some(s) = self.newstate() else { return };
                self.word(ArcType::Behind, lp, s);
                self.word(ArcType::Ahead, s, rp);
                let Some(s) = self.newstate() else { return };
                self.nonword(ArcType::Behind, lp, s);
                self.nonword(ArcType::Ahead, s, rp);
                return;
            }
            Tok::Lacon(pos) => {
                self.next();
                let Some(s) = self.newstate() else { return };
                let Some(s2) = self.newstate() else { return };
                // The sub-RE's internal tree structure is irrelevant, only
                // its NFA matters.
                let _ = self.parse(Stop::Paren, ReType::Lacon, s, s2);
                debug_assert!(matches!(self.nexttype, Tok::RParen) || self.iserr());
                self.next();
                let n = self.new_lacon(s, s2, pos);
                if self.iserr() {
                    return;
                }
                self.newarc(ArcType::Lacon, n as Color, lp, rp);
                return;
            }

            // Then errors, to get them out of the way.
            Tok::Star(_) | Tok::Plus(_) | Tok::Quest(_) | Tok::LBrace => {
                self.fail(Error::BadRpt);
                return;
            }

            // Then plain characters, and minor variants on that theme.
            Tok::RParen => {
                // Unbalanced paren: legal in plain EREs due to a
                // specification botch.
                if self.cflags.contains(Flags::ADVF) || !self.cflags.contains(Flags::EXTENDED) {
                    self.fail(Error::Paren);
                    return;
                }
                self.note(Info::UPBOTCH);
                self.onechr(')', lp, rp);
                ok_colors(&mut self.nfa, &mut self.cm);
                if self.iserr() {
                    return;
                }
                self.next();
            }
            Tok::Plain(c) => {
                self.onechr(c, lp, rp);
                ok_colors(&mut self.nfa, &mut self.cm);
                if self.iserr() {
                    return;
                }
                self.next();
            }
            Tok::LBracket(normal) => {
                if normal {
                    self.bracket(lp, rp);
                } else {
                    self.cbracket(lp, rp);
                }
                debug_assert!(matches!(self.nexttype, Tok::RBracket) || self.iserr());
                self.next();
            }
            Tok::Dot => {
                let but = if self.cflags.contains(Flags::NLSTOP) {
                    self.nlcolor
                } else {
                    COLORLESS
                };
                rainbow(&mut self.nfa, &mut self.cm, ArcType::Plain, but, lp, rp);
                self.next();
            }

            // And finally the ugly stuff.
            Tok::LParen(capturing) => {
                let cap = if ty == ReType::Lacon { false } else { capturing };
                if cap {
                    self.nsubexp += 1;
                    subno = self.nsubexp;
                    if subno >= self.subs.len() {
                        self.moresubs(subno);
                    }
                    kind = AtomKind::Capture;
                }
                self.next();

                // New endpoints, because the tree will hold them.
                let Some(s) = self.newstate() else { return };
                let Some(s2) = self.newstate() else { return };
                self.empty_arc(lp, s);
                self.empty_arc(s2, rp);
                if self.iserr() {
                    return;
                }
                let Some(a) = self.parse(Stop::Paren, ReType::Plain, s, s2) else {
                    return;
                };
                debug_assert!(matches!(self.nexttype, Tok::RParen) || self.iserr());
                self.next();
                if self.iserr() {
                    return;
                }
                if cap {
                    // Remember the body's endpoints so later backrefs can
                    // replicate it.
                    self.subs[subno] = Some((a.begin, a.end));
                    let mut t = Subre::new(Op::Capture, a.flags | SubFlags::CAP, lp, rp);
                    t.subno = subno;
                    t.left = Some(a);
                    atom = Some(t);
                } else {
                    atom = Some(a);
                }
                // Postpone everything else pending a possible {0}.
            }
            Tok::Backref(n) => {
                // the Feature From The Black Lagoon
                if ty == ReType::Lacon {
                    self.fail(Error::Subreg);
                    return;
                }
                let n = n as usize;
                if n >= self.subs.len() || self.subs[n].is_none() {
                    self.fail(Error::Subreg);
                    return;
                }
                debug_assert!(n > 0);
                let mut t = Subre::new(Op::Backref, SubFlags::BACKR, lp, rp);
                t.subno = n;
                subno = n;
                atom = Some(t);
                kind = AtomKind::Backref;
                self.empty_arc(lp, rp); // temporarily, so there's something
                self.next();
            }
            _ => {
                self.fail(Error::Assert);
                return;
            }
        }

        // ...and an atom may be followed by a quantifier.
        let (m, n, qprefer) = match self.nexttype {
            Tok::Star(g) => {
                self.next();
                (0, DUPINF, greed(g))
            }
            Tok::Plus(g) => {
                self.next();
                (1, DUPINF, greed(g))
            }
            Tok::Quest(g) => {
                self.next();
                (0, 1, greed(g))
            }
            Tok::LBrace => {
                self.next();
                let m = self.scannum();
                let (n, bounded_pair) = if self.eat_comma() {
                    let n = if matches!(self.nexttype, Tok::Digit(_)) {
                        self.scannum()
                    } else {
                        DUPINF
                    };
                    if m > n {
                        self.fail(Error::BadBr);
                        return;
                    }
                    (n, true)
                } else {
                    (m, false)
                };
                match self.nexttype {
                    // {m,n} exercises preference even if it's {m,m};
                    // {m} passes the operand's preference through.
                    Tok::RBrace(g) => {
                        let q = if bounded_pair { greed(g) } else { SubFlags::empty() };
                        self.next();
                        (m, n, q)
                    }
                    _ => {
                        // catches errors too
                        self.fail(Error::BadBr);
                        return;
                    }
                }
            }
            _ => (1, 1, SubFlags::empty()), // no quantifier
        };

        // Annoying special case: {0} or {0,0} cancels everything.
        if m == 0 && n == 0 {
            drop(atom);
            if kind == AtomKind::Capture {
                self.subs[subno] = None;
            }
            self.nfa.del_sub(&mut self.cm, lp, rp);
            self.empty_arc(lp, rp);
            return;
        }

        // If not a messy case, avoid the hard part.
        debug_assert!(!messy(top.flags));
        let f = top.flags | qprefer | atom.as_ref().map_or(SubFlags::empty(), |a| a.flags);
        if kind == AtomKind::Other && !messy(up(f)) {
            if !(m == 1 && n == 1) {
                self.repeat(lp, rp, m, n);
            }
            drop(atom);
            top.flags = f;
            return;
        }

        // Hard part: capturing parens, a back reference, a short/long
        // clash, or an atom with substructure containing one of those.
        let mut atom = match atom {
            Some(a) => a,
            None => Subre::new(Op::Eq, SubFlags::empty(), lp, rp),
        };

        // Prepare a general-purpose state skeleton:
        //
        //   [lp] -> [s] -prefix-> [begin] -atom-> [end] -rest-> [rp]
        //
        // where prefix is some repetitions of the atom; in the general case
        //
        //   [lp] -> [s] -iterator-> [s2] -rest-> [rp]
        //
        // where the iterator wraps [begin] -atom-> [end].
        let Some(s) = self.newstate() else { return };
        let Some(s2) = self.newstate() else { return };
        self.nfa.move_outs(&mut self.cm, lp, s);
        self.nfa.move_ins(&mut self.cm, rp, s2);
        if self.iserr() {
            return;
        }
        atom.begin = s;
        atom.end = s2;
        let Some(s) = self.newstate() else { return };
        self.empty_arc(lp, s);
        if self.iserr() {
            return;
        }

        // Break the remaining sub-RE into x{...} and what follows.
        let mut t = Subre::new(Op::Concat, combine(qprefer, atom.flags), lp, rp);

        // Split the branch node into prefix and remainder; the actual
        // attachment happens at the bottom, once t is fully built.
        debug_assert!(top.op == Op::Eq && top.left.is_none() && top.right.is_none());
        let prefix = Subre::new(Op::Eq, top.flags, top.begin, lp);

        // If it's a backref, now is the time to replicate the sub-NFA. It
        // could not be done at parse time: the capture body's skeleton had
        // to be complete first.
        if kind == AtomKind::Backref {
            debug_assert_eq!(self.nfa.st(atom.begin).nouts, 1); // just the EMPTY
            self.nfa.del_sub(&mut self.cm, atom.begin, atom.end);
            let (sb, se) = self.subs[subno].expect("backref checked at atom parse");
            self.nfa.dup_nfa(&mut self.cm, sb, se, atom.begin, atom.end);
            if self.iserr() {
                return;
            }
        }

        // Quantifier time.
        let s2_rest;
        if kind == AtomKind::Backref {
            // Special case: backrefs have internal quantifiers.
            self.empty_arc(s, atom.begin); // empty prefix
            let (ab, ae) = (atom.begin, atom.end);
            self.repeat(ab, ae, m, n);
            atom.min = m;
            atom.max = n;
            atom.flags |= combine(qprefer, atom.flags);
            s2_rest = ae;
            t.left = Some(atom);
        } else if m == 1 && n == 1 {
            // No or vacuous quantifier: done.
            self.empty_arc(s, atom.begin); // empty prefix
            s2_rest = atom.end;
            t.left = Some(atom);
        } else if m > 0 && !atom.flags.contains(SubFlags::BACKR) {
            // With no backrefs involved, x{m,n} becomes x{m-1,n-1}x with
            // capturing parens only in the second x: only the final
            // iteration's captures are visible, and the backref-free prefix
            // makes a plain DFA node.
            let (ab, ae) = (atom.begin, atom.end);
            self.nfa.dup_nfa(&mut self.cm, ab, ae, s, ab);
            debug_assert!(m >= 1 && m != DUPINF && n >= 1);
            self.repeat(s, ab, m - 1, if n == DUPINF { n } else { n - 1 });
            let f2 = combine(qprefer, atom.flags);
            let mut t2 = Subre::new(Op::Concat, f2, s, ae); // prefix and atom
            t2.left = Some(Subre::new(Op::Eq, pref(f2), s, ab));
            t2.right = Some(atom);
            t.left = Some(t2);
            s2_rest = ae;
        } else {
            // General case: need an iteration node.
            let Some(s2n) = self.newstate() else { return };
            let (ab, ae) = (atom.begin, atom.end);
            self.nfa.move_outs(&mut self.cm, ae, s2n);
            if self.iserr() {
                return;
            }
            self.nfa.dup_nfa(&mut self.cm, ab, ae, s, s2n);
            self.repeat(s, s2n, m, n);
            let f2 = combine(qprefer, atom.flags);
            let mut t2 = Subre::new(Op::Iter, f2, s, s2n);
            t2.min = m;
            t2.max = n;
            t2.left = Some(atom);
            t.left = Some(t2);
            s2_rest = s2n;
        }
        if self.iserr() {
            return;
        }

        // And finally, look after that postponed recursion: the rest of
        // this branch belongs under t.
        if !(matches!(self.nexttype, Tok::Or) || self.see_stop(stopper) || self.see_eos()) {
            let Some(rest) = self.parse_branch(stopper, ty, s2_rest, rp, true) else {
                return;
            };
            t.right = Some(rest);
        } else {
            self.empty_arc(s2_rest, rp);
            t.right = Some(Subre::new(Op::Eq, SubFlags::empty(), s2_rest, rp));
        }
        if self.iserr() {
            return;
        }
        debug_assert!(matches!(self.nexttype, Tok::Or) || self.see_stop(stopper) || self.see_eos());
        t.flags |= combine(t.flags, t.right.as_ref().unwrap().flags);
        top.op = Op::Concat;
        top.left = Some(prefix);
        top.flags |= combine(top.flags, t.flags);
        top.right = Some(t);
    }

    /// Generate arcs for a non-word character ahead or behind.
    fn nonword(&mut self, dir: ArcType, lp: StateId, rp: StateId) {
        debug_assert!(dir == ArcType::Ahead || dir == ArcType::Behind);
        let anchor = if dir == ArcType::Ahead {
            ArcType::Dollar
        } else {
            ArcType::Caret
        };
        self.newarc(anchor, 1, lp, rp);
        self.newarc(anchor, 0, lp, rp);
        let Some(wc) = self.wordchrs else { return };
        color_complement(&mut self.nfa, &mut self.cm, dir, wc, lp, rp);
        // (no need for special attention to \n)
    }

    /// Generate arcs for a word character ahead or behind.
    fn word(&mut self, dir: ArcType, lp: StateId, rp: StateId) {
        debug_assert!(dir == ArcType::Ahead || dir == ArcType::Behind);
        let Some(wc) = self.wordchrs else { return };
        self.nfa.clone_outs(&mut self.cm, wc, lp, rp, dir);
    }

    /// Scan a number in a bound.
    fn scannum(&mut self) -> u16 {
        let mut n: u32 = 0;
        while let Tok::Digit(d) = self.nexttype {
            if n >= DUPMAX as u32 {
                break;
            }
            n = n * 10 + d;
            self.next();
        }
        if matches!(self.nexttype, Tok::Digit(_)) || n > DUPMAX as u32 {
            self.fail(Error::BadBr);
            return 0;
        }
        n as u16
    }

    /// Rewrite the sub-NFA strung from `lp` to `rp` to match m..n
    /// repetitions of its contents, dispatching on the reduced shape of
    /// the bounds.
    fn repeat(&mut self, lp: StateId, rp: StateId, m: u16, n: u16) {
        const SOME: u16 = 2;
        const INF: u16 = 3;
        fn reduce(x: u16) -> u16 {
            if x == DUPINF {
                INF
            } else if x > 1 {
                SOME
            } else {
                x
            }
        }
        let (rm, rn) = (reduce(m), reduce(n));

        match (rm, rn) {
            (0, 0) => {
                // empty string only
                self.nfa.del_sub(&mut self.cm, lp, rp);
                self.empty_arc(lp, rp);
            }
            (0, 1) => {
                // do as x|
                self.empty_arc(lp, rp);
            }
            (0, SOME) => {
                // do as x{1,n}|
                self.repeat(lp, rp, 1, n);
                if self.iserr() {
                    return;
                }
                self.empty_arc(lp, rp);
            }
            (0, INF) => {
                // loop x around
                let Some(s) = self.newstate() else { return };
                self.nfa.move_outs(&mut self.cm, lp, s);
                self.nfa.move_ins(&mut self.cm, rp, s);
                self.empty_arc(lp, s);
                self.empty_arc(s, rp);
            }
            (1, 1) => {
                // no action required
            }
            (1, SOME) => {
                // do as x{0,n-1}x = (x{1,n-1}|)x
                let Some(s) = self.newstate() else { return };
                self.nfa.move_outs(&mut self.cm, lp, s);
                self.nfa.dup_nfa(&mut self.cm, s, rp, lp, s);
                if self.iserr() {
                    return;
                }
                self.repeat(lp, s, 1, n - 1);
                if self.iserr() {
                    return;
                }
                self.empty_arc(lp, s);
            }
            (1, INF) => {
                // add a loopback arc
                let Some(s) = self.newstate() else { return };
                let Some(s2) = self.newstate() else { return };
                self.nfa.move_outs(&mut self.cm, lp, s);
                self.nfa.move_ins(&mut self.cm, rp, s2);
                self.empty_arc(lp, s);
                self.empty_arc(s2, rp);
                self.empty_arc(s2, s);
            }
            (SOME, SOME) => {
                // do as x{m-1,n-1}x
                let Some(s) = self.newstate() else { return };
                self.nfa.move_outs(&mut self.cm, lp, s);
                self.nfa.dup_nfa(&mut self.cm, s, rp, lp, s);
                if self.iserr() {
                    return;
                }
                self.repeat(lp, s, m - 1, n - 1);
            }
            (SOME, INF) => {
                // do as x{m-1,}x
                let Some(s) = self.newstate() else { return };
                self.nfa.move_outs(&mut self.cm, lp, s);
                self.nfa.dup_nfa(&mut self.cm, s, rp, lp, s);
                if self.iserr() {
                    return;
                }
                self.repeat(lp, s, m - 1, n);
            }
            _ => self.fail(Error::Assert),
        }
    }

    /// Handle a non-complemented bracket expression; also the working half
    /// of `cbracket`.
    fn bracket(&mut self, lp: StateId, rp: StateId) {
        debug_assert!(matches!(self.nexttype, Tok::LBracket(_)));
        self.next();
        while !matches!(self.nexttype, Tok::RBracket) && !self.see_eos() {
            self.brackpart(lp, rp);
        }
        debug_assert!(matches!(self.nexttype, Tok::RBracket) || self.iserr());
        ok_colors(&mut self.nfa, &mut self.cm);
    }

    /// Handle a complemented bracket expression: run the ordinary bracket
    /// against dummy endpoints, then emit the complement of the colors it
    /// produced.
    fn cbracket(&mut self, lp: StateId, rp: StateId) {
        let Some(left) = self.newstate() else { return };
        let Some(right) = self.newstate() else { return };
        if self.iserr() {
            return;
        }
        self.bracket(left, right);
        if self.cflags.contains(Flags::NLSTOP) {
            // exclude newline from the complement
            let nl = self.nlcolor;
            self.newarc(ArcType::Plain, nl, left, right);
        }
        if self.iserr() {
            return;
        }

        debug_assert_eq!(self.nfa.st(lp).nouts, 0); // all outarcs will be ours
        color_complement(&mut self.nfa, &mut self.cm, ArcType::Plain, left, lp, rp);
        if self.iserr() {
            return;
        }
        self.nfa.drop_state(&mut self.cm, left);
        debug_assert_eq!(self.nfa.st(right).nins, 0);
        self.nfa.free_state(right);
    }

    /// Handle one item (or range) within a bracket expression.
    fn brackpart(&mut self, lp: StateId, rp: StateId) {
        let icase = self.cflags.contains(Flags::ICASE);
        let startc: char;

        match self.nexttype {
            Tok::Range => {
                // a-b-c or other botch
                self.fail(Error::Range);
                return;
            }
            Tok::Plain(c) => {
                self.next();
                // Shortcut for an ordinary chr that isn't a range start.
                if !matches!(self.nexttype, Tok::Range) {
                    self.onechr(c, lp, rp);
                    return;
                }
                startc = c;
            }
            Tok::Collel => {
                let name = self.scanplain();
                if name.is_empty() {
                    self.fail(Error::Collate);
                    return;
                }
                if self.iserr() {
                    return;
                }
                let Some(c) = self.element(&name) else { return };
                startc = c;
            }
            Tok::Eclass => {
                let name = self.scanplain();
                if name.is_empty() {
                    self.fail(Error::Collate);
                    return;
                }
                if self.iserr() {
                    return;
                }
                let Some(c) = self.element(&name) else { return };
                let cv = self.eclass_cvec(c, icase);
                self.dovec(&cv, lp, rp);
                return;
            }
            Tok::Cclass => {
                let name = self.scanplain();
                if name.is_empty() {
                    self.fail(Error::Ctype);
                    return;
                }
                if self.iserr() {
                    return;
                }
                let Some(cv) = self.cclass_cvec(&name, icase) else {
                    return;
                };
                self.dovec(&cv, lp, rp);
                return;
            }
            _ => {
                self.fail(Error::Assert);
                return;
            }
        }

        let endc = if matches!(self.nexttype, Tok::Range) {
            self.next();
            match self.nexttype {
                Tok::Plain(c) => {
                    self.next();
                    match self.element(&[c]) {
                        Some(c) => c,
                        None => return,
                    }
                }
                Tok::Range => {
                    self.next();
                    '-'
                }
                Tok::Collel => {
                    let name = self.scanplain();
                    if name.is_empty() {
                        self.fail(Error::Collate);
                        return;
                    }
                    if self.iserr() {
                        return;
                    }
                    match self.element(&name) {
                        Some(c) => c,
                        None => return,
                    }
                }
                _ => {
                    self.fail(Error::Range);
                    return;
                }
            }
        } else {
            startc
        };

        // Ranges are unportable.
        if startc != endc {
            self.note(Info::UUNPORT);
        }
        let cv = self.range_cvec(startc, endc, icase);
        if self.iserr() {
            return;
        }
        self.dovec(&cv, lp, rp);
    }

    /// Scan the PLAIN contents of `[.`, `[=` or `[:`.
    fn scanplain(&mut self) -> Vec<char> {
        debug_assert!(matches!(
            self.nexttype,
            Tok::Collel | Tok::Eclass | Tok::Cclass
        ));
        self.next();
        let mut out = Vec::new();
        while let Tok::Plain(c) = self.nexttype {
            out.push(c);
            self.next();
        }
        debug_assert!(matches!(self.nexttype, Tok::End) || self.iserr());
        self.next();
        out
    }

    /// Fill in arcs for a plain character, with case complements under
    /// ICASE. Mostly a shortcut for efficient handling of the common case.
    fn onechr(&mut self, c: char, lp: StateId, rp: StateId) {
        if !self.cflags.contains(Flags::ICASE) {
            let sco = self.cm.subcolor(c);
            self.newarc(ArcType::Plain, sco, lp, rp);
            return;
        }
        let mut cv = Cvec::with_capacity(4, 0);
        for v in all_cases(c) {
            cv.add_chr(v);
        }
        self.dovec(&cv, lp, rp);
    }

    /// Fill in arcs for each element of a cvec.
    fn dovec(&mut self, cv: &Cvec, lp: StateId, rp: StateId) {
        for &ch in &cv.chrs {
            let sco = self.cm.subcolor(ch);
            self.newarc(ArcType::Plain, sco, lp, rp);
        }
        for &(from, to) in &cv.ranges {
            if from <= to {
                sub_range(&mut self.nfa, &mut self.cm, from, to, lp, rp);
            }
        }
    }

    /// Look up a collating element; only single characters and the
    /// standard character names are recognized.
    fn element(&mut self, name: &[char]) -> Option<char> {
        if name.len() == 1 {
            return Some(name[0]);
        }
        let name: String = name.iter().collect();
        let c = match name.as_str() {
            "NUL" => '\u{0}',
            "alert" | "BEL" => '\u{7}',
            "backspace" | "BS" => '\u{8}',
            "tab" | "HT" => '\t',
            "newline" | "LF" => '\n',
            "vertical-tab" | "VT" => '\u{b}',
            "form-feed" | "FF" => '\u{c}',
            "carriage-return" | "CR" => '\r',
            "ESC" => '\u{1b}',
            "space" => ' ',
            "hyphen" | "hyphen-minus" => '-',
            "DEL" => '\u{7f}',
            _ => {
                self.fail(Error::Collate);
                return None;
            }
        };
        Some(c)
    }

    /// The set of chars in a range, expanded with case variants under
    /// ICASE.
    fn range_cvec(&mut self, a: char, b: char, cases: bool) -> Cvec {
        if !cases {
            let mut cv = Cvec::with_capacity(2, 1);
            if a == b {
                cv.add_chr(a);
            } else {
                cv.add_range(a, b);
            }
            return cv;
        }
        let mut cv = Cvec::with_capacity(16, 0);
        let mut u = a as u32;
        while u <= b as u32 {
            if let Some(c) = char::from_u32(u) {
                for v in all_cases(c) {
                    cv.add_chr(v);
                }
            }
            u += 1;
        }
        cv
    }

    /// The equivalence class of a chr: just its own case variants, since
    /// multi-character collation is out of scope.
    fn eclass_cvec(&mut self, c: char, cases: bool) -> Cvec {
        let mut cv = Cvec::with_capacity(4, 0);
        if cases {
            for v in all_cases(c) {
                cv.add_chr(v);
            }
        } else {
            cv.add_chr(c);
        }
        cv
    }

    /// The set of chars in a named character class.
    fn cclass_cvec(&mut self, name: &[char], cases: bool) -> Option<Cvec> {
        let mut cls = match CharClass::lookup(name) {
            Ok(c) => c,
            Err(e) => {
                self.fail(e);
                return None;
            }
        };
        // Case-insensitively, upper and lower degenerate to alpha.
        if cases && matches!(cls, CharClass::Upper | CharClass::Lower) {
            cls = CharClass::Alpha;
        }
        let ranges = cls.ranges();
        let mut cv = Cvec::with_capacity(0, ranges.len());
        for (f, t) in ranges {
            cv.add_range(f, t);
        }
        Some(cv)
    }

    /// Set up the word-chr state for word-boundary constraints, if needed.
    /// The list is kept as a bunch of arcs between two dummy states,
    /// disposed of by the unreachable-states sweep in NFA optimization.
    /// Consumes the current token (like `next()`).
    fn wordchrs(&mut self) {
        if self.wordchrs.is_some() {
            self.next(); // for consistency
            return;
        }

        let Some(left) = self.newstate() else { return };
        let Some(right) = self.newstate() else { return };
        if self.iserr() {
            return;
        }

        // Implemented with [::], and the lexer has noted ULOCALE.
        self.lexword();
        self.next();
        debug_assert!(self.nest.is_some() && matches!(self.nexttype, Tok::LBracket(_)));
        self.bracket(left, right);
        debug_assert!(
            (self.nest.is_some() && matches!(self.nexttype, Tok::RBracket)) || self.iserr()
        );
        self.next();
        if self.iserr() {
            return;
        }
        self.wordchrs = Some(left);
    }

    /// Allocate a lookahead-constraint slot; index 0 stays unused so LACON
    /// arc colors are always distinguishable.
    fn new_lacon(&mut self, begin: StateId, end: StateId, positive: bool) -> usize {
        if self.lacons.is_empty() {
            self.lacons.push(Lacon {
                begin,
                end,
                positive: false,
                cnfa: Default::default(),
            });
        }
        self.lacons.push(Lacon {
            begin,
            end,
            positive,
            cnfa: Default::default(),
        });
        self.lacons.len() - 1
    }

    fn moresubs(&mut self, wanted: usize) {
        debug_assert!(wanted >= self.subs.len());
        let n = wanted * 3 / 2 + 1;
        self.subs.resize(n, None);
    }
}

fn greed(g: bool) -> SubFlags {
    if g {
        SubFlags::LONGER
    } else {
        SubFlags::SHORTER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(pattern: &str, flags: Flags) -> (Vars, Box<Subre>) {
        let mut v = Vars::for_test(pattern, flags);
        v.lexstart();
        let (init, fin) = (v.nfa.init, v.nfa.fin);
        let t = v.parse(Stop::Eos, ReType::Plain, init, fin);
        assert!(!v.iserr(), "unexpected error: {:?}", v.err.get());
        (v, t.unwrap())
    }

    #[test]
    fn simple_tree_is_flat() {
        let (v, t) = parsed("abc", Flags::ADVANCED);
        assert_eq!(t.op, Op::Eq);
        assert!(t.left.is_none() && t.right.is_none());
        assert_eq!(v.nsubexp, 0);
    }

    #[test]
    fn capture_builds_structure() {
        let (v, t) = parsed("a(b+)c", Flags::ADVANCED);
        assert_eq!(v.nsubexp, 1);
        assert!(t.flags.contains(SubFlags::CAP));
        assert_eq!(t.op, Op::Concat);
        // somewhere below there must be a Capture node with subno 1
        fn find_cap(t: &Subre) -> Option<usize> {
            if t.op == Op::Capture {
                return Some(t.subno);
            }
            t.left
                .as_deref()
                .and_then(find_cap)
                .or_else(|| t.right.as_deref().and_then(find_cap))
        }
        assert_eq!(find_cap(&t), Some(1));
    }

    #[test]
    fn backref_names_group() {
        let (v, t) = parsed(r"(x)\1", Flags::ADVANCED);
        assert!(t.flags.contains(SubFlags::BACKR));
        assert!(v.info.contains(Info::UBACKREF));
        fn find_br(t: &Subre) -> Option<usize> {
            if t.op == Op::Backref {
                return Some(t.subno);
            }
            t.left
                .as_deref()
                .and_then(find_br)
                .or_else(|| t.right.as_deref().and_then(find_br))
        }
        assert_eq!(find_br(&t), Some(1));
    }

    #[test]
    fn bad_backref() {
        let mut v = Vars::for_test(r"(x)\2", Flags::ADVANCED);
        v.lexstart();
        let (init, fin) = (v.nfa.init, v.nfa.fin);
        let _ = v.parse(Stop::Eos, ReType::Plain, init, fin);
        assert_eq!(v.err.get(), Some(Error::Subreg));
    }

    #[test]
    fn unbalanced_paren() {
        let mut v = Vars::for_test("(", Flags::ADVANCED);
        v.lexstart();
        let (init, fin) = (v.nfa.init, v.nfa.fin);
        let _ = v.parse(Stop::Eos, ReType::Plain, init, fin);
        assert_eq!(v.err.get(), Some(Error::Paren));
    }

    #[test]
    fn bad_repetition() {
        let mut v = Vars::for_test("*a", Flags::ADVANCED);
        v.lexstart();
        let (init, fin) = (v.nfa.init, v.nfa.fin);
        let _ = v.parse(Stop::Eos, ReType::Plain, init, fin);
        assert_eq!(v.err.get(), Some(Error::BadRpt));
    }

    #[test]
    fn bound_too_big() {
        let mut v = Vars::for_test("a{2,1}", Flags::ADVANCED);
        v.lexstart();
        let (init, fin) = (v.nfa.init, v.nfa.fin);
        let _ = v.parse(Stop::Eos, ReType::Plain, init, fin);
        assert_eq!(v.err.get(), Some(Error::BadBr));
    }

    #[test]
    fn nongreedy_sets_shorter() {
        let (_v, t) = parsed("a+?", Flags::ADVANCED);
        assert!(t.flags.contains(SubFlags::SHORTER));
    }

    #[test]
    fn lacon_table_filled() {
        let (v, _t) = parsed("a(?=b)", Flags::ADVANCED);
        assert_eq!(v.lacons.len(), 2); // dummy + one real
        assert!(v.lacons[1].positive);
        assert!(v.info.contains(Info::ULOOKAHEAD));
        let (v, _t) = parsed("a(?!b)", Flags::ADVANCED);
        assert!(!v.lacons[1].positive);
    }

    #[test]
    fn zero_bound_cancels_capture() {
        let (v, _t) = parsed("(a){0}x", Flags::ADVANCED);
        // {0} wiped the capture body, so subs[1] is gone again.
        assert_eq!(v.subs[1], None);
    }

    #[test]
    fn alternation_spine() {
        let (_v, t) = parsed("(a)|b|c", Flags::ADVANCED);
        assert_eq!(t.op, Op::Alt);
        let r = t.right.as_ref().unwrap();
        assert_eq!(r.op, Op::Alt);
        assert!(r.right.is_some());
    }
}
