//! Character colors.
//!
//! As soon as possible, chrs are mapped into equivalence classes called
//! "colors": two characters get the same color exactly when every transition
//! in the automaton treats them identically. This collapses the alphabet
//! from a million scalar values to (typically) a handful, so DFA transition
//! vectors can be indexed by color.
//!
//! The map itself is a three-level trie keyed by the bytes of the scalar
//! value. Unaltered regions share "fill" blocks, and a color that owns a
//! whole 256-entry block shares one "solid" block across all branches that
//! use it; every other block has exactly one parent and may be mutated in
//! place. Splitting a color goes through an open *subcolor* which is
//! promoted (or folded back) by [`ok_colors`] once the enclosing bracket
//! expression has been fully scanned.

pub(crate) mod cvec;

use crate::error::{Error, ErrSlot};
use crate::nfa::{ArcId, ArcType, Nfa, StateId};

/// An equivalence class of characters.
pub(crate) type Color = i16;

/// Impossible color, also the list terminator in compact NFAs.
pub(crate) const COLORLESS: Color = -1;
/// Default color, parent of all others.
pub(crate) const WHITE: Color = 0;
/// "No open subcolor" marker.
pub(crate) const NOSUB: Color = COLORLESS;
pub(crate) const MAX_COLOR: Color = i16::MAX;

const BYTBITS: u32 = 8;
const BYTTAB: usize = 1 << BYTBITS;
const BYTMASK: u32 = (BYTTAB - 1) as u32;
/// Three byte levels cover scalar values up to 0x10FFFF.
const NBYTS: u32 = 3;

/// Number of raw code points tracked by the map. Surrogate slots are
/// carried in the counts like any other; they are simply never looked up.
const NCHRS: u32 = 0x110000;

/// Root pointer block.
const ROOT: u32 = 0;
/// Fill pointer block for the middle level.
const FILL_PTR: u32 = 1;
/// Fill color block for the bottom level (solid white).
const FILL_COLOR: u32 = 0;

fn byte(u: u32, level: u32) -> usize {
    ((u >> (BYTBITS * (NBYTS - 1 - level))) & BYTMASK) as usize
}

/// Per-color bookkeeping.
#[derive(Clone, Debug)]
pub(crate) struct ColorDesc {
    /// Number of chars of this color.
    pub nchrs: u32,
    /// Open subcolor (self = is an open subcolor); free-chain link when free.
    pub sub: Color,
    /// Head of this color's arc chain.
    pub arcs: Option<ArcId>,
    pub free: bool,
    /// Pseudocolor: represents an anchor context, no real chars.
    pub pseudo: bool,
    /// Index of this color's solid block, if it owns one.
    pub block: Option<u32>,
}

impl ColorDesc {
    fn new() -> ColorDesc {
        ColorDesc {
            nchrs: 0,
            sub: NOSUB,
            arcs: None,
            free: false,
            pseudo: false,
            block: None,
        }
    }
}

pub(crate) struct Colormap {
    /// Pointer blocks; entries index either `ptrs` (level 0) or `colors`
    /// (level 1).
    ptrs: Vec<Box<[u32; BYTTAB]>>,
    /// Leaf blocks of colors.
    colors: Vec<Box<[Color; BYTTAB]>>,
    pub cd: Vec<ColorDesc>,
    /// Highest color in use.
    pub max: Color,
    /// Head of the free chain (0 = none; WHITE is never freed).
    free: Color,
    pub err: ErrSlot,
}

impl Colormap {
    pub fn new(err: ErrSlot) -> Colormap {
        let mut white = ColorDesc::new();
        white.nchrs = NCHRS;
        white.block = Some(FILL_COLOR);

        Colormap {
            ptrs: vec![
                Box::new([FILL_PTR; BYTTAB]),
                Box::new([FILL_COLOR; BYTTAB]),
            ],
            colors: vec![Box::new([WHITE; BYTTAB])],
            cd: vec![white],
            max: WHITE,
            free: 0,
            err,
        }
    }

    fn iserr(&self) -> bool {
        self.err.get().is_some()
    }

    fn seterr(&self, e: Error) {
        if self.err.get().is_none() {
            self.err.set(Some(e));
        }
    }

    pub fn get_color(&self, c: char) -> Color {
        let u = c as u32;
        let p1 = self.ptrs[ROOT as usize][byte(u, 0)];
        let cb = self.ptrs[p1 as usize][byte(u, 1)];
        self.colors[cb as usize][byte(u, 2)]
    }

    /// Is this leaf block shared (a fill block, or some color's solid
    /// block)? Shared blocks must be cloned before mutation.
    fn color_block_shared(&self, cb: u32) -> bool {
        if cb == FILL_COLOR {
            return true;
        }
        let first = self.colors[cb as usize][0];
        first >= 0 && self.cd[first as usize].block == Some(cb)
    }

    /// Walk to the leaf block for `u`, cloning shared blocks along the way
    /// so the result is mutable in place. Returns the leaf block index.
    fn own_leaf(&mut self, u: u32) -> Option<u32> {
        let b2 = byte(u, 0);
        let mut p1 = self.ptrs[ROOT as usize][b2];
        if p1 == FILL_PTR {
            let copy = self.ptrs[FILL_PTR as usize].clone();
            p1 = self.ptrs.len() as u32;
            self.ptrs.push(copy);
            self.ptrs[ROOT as usize][b2] = p1;
        }
        let b1 = byte(u, 1);
        let mut cb = self.ptrs[p1 as usize][b1];
        if self.color_block_shared(cb) {
            let copy = self.colors[cb as usize].clone();
            cb = self.colors.len() as u32;
            self.colors.push(copy);
            self.ptrs[p1 as usize][b1] = cb;
        }
        Some(cb)
    }

    /// Set the color of a character, returning its previous color.
    pub fn set_color(&mut self, c: char, co: Color) -> Color {
        if self.iserr() || co == COLORLESS {
            return COLORLESS;
        }
        let u = c as u32;
        let Some(cb) = self.own_leaf(u) else {
            return COLORLESS;
        };
        let slot = &mut self.colors[cb as usize][byte(u, 2)];
        std::mem::replace(slot, co)
    }

    pub fn max_color(&self) -> Color {
        if self.iserr() {
            COLORLESS
        } else {
            self.max
        }
    }

    /// Allocate a fresh color (caller must give it chars or mark it pseudo
    /// at once).
    pub fn new_color(&mut self) -> Color {
        if self.iserr() {
            return COLORLESS;
        }
        if self.free != 0 {
            let co = self.free;
            debug_assert!(self.cd[co as usize].free);
            debug_assert!(self.cd[co as usize].arcs.is_none());
            self.free = self.cd[co as usize].sub;
            self.cd[co as usize] = ColorDesc::new();
            return co;
        }
        if self.max == MAX_COLOR {
            self.seterr(Error::Colors);
            return COLORLESS;
        }
        self.max += 1;
        if self.cd.len() <= self.max as usize {
            self.cd.resize(self.max as usize + 1, ColorDesc::new());
        }
        self.cd[self.max as usize] = ColorDesc::new();
        self.max
    }

    /// Free a color; it must have no arcs, no subcolor and no chars.
    pub fn free_color(&mut self, co: Color) {
        assert!(co >= 0);
        if co == WHITE {
            return;
        }
        let cd = &mut self.cd[co as usize];
        debug_assert!(cd.arcs.is_none());
        debug_assert_eq!(cd.sub, NOSUB);
        debug_assert_eq!(cd.nchrs, 0);
        cd.free = true;
        cd.block = None;

        if co == self.max {
            while self.max > WHITE && self.cd[self.max as usize].free {
                self.max -= 1;
            }
            // Purge now-dead entries from the free chain.
            while self.free > self.max {
                self.free = self.cd[self.free as usize].sub;
            }
            if self.free > 0 {
                let mut pco = self.free;
                let mut nco = self.cd[pco as usize].sub;
                while nco > 0 {
                    if nco > self.max {
                        nco = self.cd[nco as usize].sub;
                        self.cd[pco as usize].sub = nco;
                    } else {
                        pco = nco;
                        nco = self.cd[pco as usize].sub;
                    }
                }
            }
        } else {
            self.cd[co as usize].sub = self.free;
            self.free = co;
        }
    }

    /// Allocate a false color for an anchor context; it owns no real chars.
    pub fn pseudo_color(&mut self) -> Color {
        let co = self.new_color();
        if self.iserr() {
            return COLORLESS;
        }
        self.cd[co as usize].nchrs = 1;
        self.cd[co as usize].pseudo = true;
        co
    }

    /// Allocate (if needed) a subcolor for this chr and move the chr into
    /// it. Idempotent within one bracket scan: a chr already in an open
    /// subcolor stays put.
    pub fn subcolor(&mut self, c: char) -> Color {
        let co = self.get_color(c);
        let sco = self.new_sub(co);
        if self.iserr() {
            return COLORLESS;
        }
        debug_assert!(sco != COLORLESS);
        if co == sco {
            return co;
        }
        self.cd[co as usize].nchrs -= 1;
        self.cd[sco as usize].nchrs += 1;
        self.set_color(c, sco);
        sco
    }

    /// Open (or fetch the open) subcolor of a color.
    pub fn new_sub(&mut self, co: Color) -> Color {
        let mut sco = self.cd[co as usize].sub;
        if sco == NOSUB {
            if self.cd[co as usize].nchrs == 1 {
                return co;
            }
            sco = self.new_color();
            if sco == COLORLESS {
                debug_assert!(self.iserr());
                return COLORLESS;
            }
            self.cd[co as usize].sub = sco;
            // An open subcolor points to itself.
            self.cd[sco as usize].sub = sco;
        }
        debug_assert!(sco != NOSUB);
        sco
    }
}

/// Allocate new subcolors to a range of chrs, filling in arcs. Whole
/// 256-entry blocks are recolored via shared solid blocks rather than chr
/// by chr.
pub(crate) fn sub_range(
    nfa: &mut Nfa,
    cm: &mut Colormap,
    from: char,
    to: char,
    lp: StateId,
    rp: StateId,
) {
    debug_assert!(from <= to);
    let mut from = from as u32;
    let to = to as u32;

    // Align "from" on a block boundary.
    let mut i = from.next_multiple_of(BYTTAB as u32) - from;
    while from <= to && i > 0 {
        if let Some(c) = char::from_u32(from) {
            let sco = cm.subcolor(c);
            nfa.new_arc(cm, ArcType::Plain, sco, lp, rp);
        }
        i -= 1;
        from += 1;
    }
    if from > to {
        return;
    }

    // Whole blocks.
    while to - from >= BYTTAB as u32 {
        sub_block(nfa, cm, from, lp, rp);
        from += BYTTAB as u32;
    }

    // Remaining partial block.
    while from <= to {
        if let Some(c) = char::from_u32(from) {
            let sco = cm.subcolor(c);
            nfa.new_arc(cm, ArcType::Plain, sco, lp, rp);
        }
        from += 1;
    }
}

/// Allocate new subcolors for one whole tree block of chrs, filling in arcs.
fn sub_block(nfa: &mut Nfa, cm: &mut Colormap, start: u32, lp: StateId, rp: StateId) {
    debug_assert_eq!(start % BYTTAB as u32, 0);

    // Find its leaf block, cloning pointer blocks as needed but leaving a
    // shared leaf alone for now.
    let b2 = byte(start, 0);
    let mut p1 = cm.ptrs[ROOT as usize][b2];
    if p1 == FILL_PTR {
        let copy = cm.ptrs[FILL_PTR as usize].clone();
        p1 = cm.ptrs.len() as u32;
        cm.ptrs.push(copy);
        cm.ptrs[ROOT as usize][b2] = p1;
    }
    let b1 = byte(start, 1);
    let cb = cm.ptrs[p1 as usize][b1];

    // Fill block or solid block: swing the pointer to the subcolor's solid
    // block, recoloring all 256 chrs at once.
    if cm.color_block_shared(cb) {
        let co = cm.colors[cb as usize][0];
        let sco = cm.new_sub(co);
        if cm.iserr() {
            return;
        }
        let sblock = match cm.cd[sco as usize].block {
            Some(b) => b,
            None => {
                let b = cm.colors.len() as u32;
                cm.colors.push(Box::new([sco; BYTTAB]));
                cm.cd[sco as usize].block = Some(b);
                b
            }
        };
        cm.ptrs[p1 as usize][b1] = sblock;
        nfa.new_arc(cm, ArcType::Plain, sco, lp, rp);
        cm.cd[co as usize].nchrs -= BYTTAB as u32;
        cm.cd[sco as usize].nchrs += BYTTAB as u32;
        return;
    }

    // General case: a mixed block, altered in place run by run.
    let mut i = 0;
    while i < BYTTAB {
        let co = cm.colors[cb as usize][i];
        let sco = cm.new_sub(co);
        if cm.iserr() {
            return;
        }
        nfa.new_arc(cm, ArcType::Plain, sco, lp, rp);
        let previ = i;
        loop {
            cm.colors[cb as usize][i] = sco;
            i += 1;
            if i >= BYTTAB || cm.colors[cb as usize][i] != co {
                break;
            }
        }
        let ndone = (i - previ) as u32;
        cm.cd[co as usize].nchrs -= ndone;
        cm.cd[sco as usize].nchrs += ndone;
    }
}

/// Promote subcolors to full colors once a bracket scan is complete. A
/// parent left empty hands its arcs over to the subcolor; otherwise the
/// parent's arcs gain parallel subcolor arcs.
pub(crate) fn ok_colors(nfa: &mut Nfa, cm: &mut Colormap) {
    for co in 0..=cm.max {
        let cd = &cm.cd[co as usize];
        let sco = cd.sub;
        if cd.free || sco == NOSUB {
            // No subcolor, no further action.
        } else if sco == co {
            // Is a subcolor, let the parent deal with it.
        } else if cd.nchrs == 0 {
            // Parent is now empty: its arcs change color to the subcolor.
            cm.cd[co as usize].sub = NOSUB;
            debug_assert!(cm.cd[sco as usize].nchrs > 0);
            debug_assert_eq!(cm.cd[sco as usize].sub, sco);
            cm.cd[sco as usize].sub = NOSUB;
            while let Some(a) = cm.cd[co as usize].arcs {
                debug_assert_eq!(nfa.arc(a).co, co);
                nfa.uncolorchain(cm, a);
                nfa.recolor_arc(a, sco);
                nfa.colorchain(cm, a);
            }
            cm.free_color(co);
        } else {
            // Parent keeps chars: its arcs gain parallel subcolor arcs.
            cm.cd[co as usize].sub = NOSUB;
            debug_assert!(cm.cd[sco as usize].nchrs > 0);
            debug_assert_eq!(cm.cd[sco as usize].sub, sco);
            cm.cd[sco as usize].sub = NOSUB;
            let mut aid = cm.cd[co as usize].arcs;
            while let Some(a) = aid {
                let arc = nfa.arc(a);
                debug_assert_eq!(arc.co, co);
                let (ty, from, to, next) = (arc.ty, arc.from, arc.to, arc.color_next);
                nfa.new_arc(cm, ty, sco, from, to);
                aid = next;
            }
        }
    }
}

/// Add arcs of all full colors (except `but` and pseudocolors) between two
/// states. This is how `.` and bracket complements expand in O(colors).
pub(crate) fn rainbow(
    nfa: &mut Nfa,
    cm: &mut Colormap,
    ty: ArcType,
    but: Color,
    from: StateId,
    to: StateId,
) {
    for co in 0..=cm.max {
        if cm.iserr() {
            break;
        }
        let cd = &cm.cd[co as usize];
        if !cd.free && cd.sub != co && co != but && !cd.pseudo {
            nfa.new_arc(cm, ty, co, from, to);
        }
    }
}

/// Add arcs of every color for which `of` has no PLAIN outarc.
pub(crate) fn color_complement(
    nfa: &mut Nfa,
    cm: &mut Colormap,
    ty: ArcType,
    of: StateId,
    from: StateId,
    to: StateId,
) {
    debug_assert!(of != from);
    for co in 0..=cm.max {
        if cm.iserr() {
            break;
        }
        let cd = &cm.cd[co as usize];
        if !cd.free && !cd.pseudo && nfa.find_arc(of, ArcType::Plain, co).is_none() {
            nfa.new_arc(cm, ty, co, from, to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::new_err_slot;

    fn cmap() -> Colormap {
        Colormap::new(new_err_slot())
    }

    #[test]
    fn initial_white() {
        let cm = cmap();
        assert_eq!(cm.get_color('a'), WHITE);
        assert_eq!(cm.get_color('\u{10FFFF}'), WHITE);
        assert_eq!(cm.max_color(), WHITE);
    }

    #[test]
    fn set_and_get() {
        let mut cm = cmap();
        let co = cm.new_color();
        assert_eq!(cm.set_color('x', co), WHITE);
        assert_eq!(cm.get_color('x'), co);
        assert_eq!(cm.get_color('y'), WHITE);
        // A distant character must not share the mutated leaf.
        assert_eq!(cm.get_color('\u{4E00}'), WHITE);
    }

    #[test]
    fn subcolor_idempotent() {
        let mut cm = cmap();
        let s1 = cm.subcolor('q');
        let s2 = cm.subcolor('q');
        assert_eq!(s1, s2);
        assert_eq!(cm.get_color('q'), s1);
        assert_eq!(cm.cd[s1 as usize].nchrs, 1);
    }

    #[test]
    fn free_color_reuse() {
        let mut cm = cmap();
        let a = cm.new_color();
        let b = cm.new_color();
        assert_ne!(a, b);
        cm.free_color(a);
        let c = cm.new_color();
        assert_eq!(c, a);
    }
}
