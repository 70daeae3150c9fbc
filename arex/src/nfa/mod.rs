//! NFA representation and surgery.
//!
//! The NFA is a mutable directed multigraph: states in an arena addressed by
//! [`StateId`], arcs in an arena addressed by [`ArcId`]. Every arc is
//! doubly linked into its from-state's out chain, its to-state's in chain
//! and (for colored arcs of the primary NFA) its color's chain in the
//! colormap. Freed states and arcs go on free lists and are reused; the
//! arenas are only reclaimed when the NFA is dropped.
//!
//! No two arcs ever share `(from, to, type, color)`: [`Nfa::new_arc`]
//! suppresses duplicates, checking whichever endpoint chain is shorter.
//! Bulk transfers switch to a sort-merge once either side holds more than
//! about 32 arcs, since pairwise dedup goes quadratic during big fusions.

pub(crate) mod compact;
pub(crate) mod optimize;

use std::cell::Cell;
use std::rc::Rc;

use itertools::{EitherOrBoth, Itertools};

use crate::color::{Color, Colormap, COLORLESS};
use crate::error::{Error, ErrSlot};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct StateId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ArcId(pub u32);

/// Arc types. `Caret` and `Dollar` carry 0/1 in their color slot to
/// distinguish string anchors from line anchors; `Lacon` carries the
/// lookahead-constraint index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum ArcType {
    Plain,
    Empty,
    Ahead,
    Behind,
    Caret,
    Dollar,
    Lacon,
}

impl ArcType {
    /// Colored arcs live on the colormap's per-color chains.
    fn colored(self) -> bool {
        matches!(self, ArcType::Plain | ArcType::Ahead | ArcType::Behind)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Arc {
    pub ty: ArcType,
    pub co: Color,
    pub from: StateId,
    pub to: StateId,
    pub out_next: Option<ArcId>,
    pub out_prev: Option<ArcId>,
    pub in_next: Option<ArcId>,
    pub in_prev: Option<ArcId>,
    pub color_next: Option<ArcId>,
    pub color_prev: Option<ArcId>,
    /// Free arcs keep their slot but leave the chains.
    pub live: bool,
}

pub(crate) const FREESTATE: i32 = -1;

/// Special-state flags.
pub(crate) const FLAG_PRE: u8 = b'>';
pub(crate) const FLAG_POST: u8 = b'@';

#[derive(Clone, Debug)]
pub(crate) struct State {
    /// State number; `FREESTATE` when on the free list.
    pub no: i32,
    pub flag: u8,
    pub nins: u32,
    pub nouts: u32,
    pub ins: Option<ArcId>,
    pub outs: Option<ArcId>,
    /// Scratch slot for traversal algorithms.
    pub tmp: Option<StateId>,
    /// Live-state chain (reused as the free-chain link).
    pub next: Option<StateId>,
    pub prev: Option<StateId>,
}

/// Transient compile-space accounting, shared between the primary NFA and
/// the per-node sub-NFAs. States are charged more heavily than arcs,
/// mirroring the original's state/arc-batch byte budget.
pub(crate) type SpaceCounter = Rc<Cell<usize>>;

const STATE_COST: usize = 10;
const ARC_COST: usize = 1;
pub(crate) const MAX_COMPILE_SPACE: usize = 2_000_000;

/// Above this, pairwise dedup is abandoned for sort-merge. With fewer than
/// 4 source arcs the sort can never pay for itself.
fn bulk_arc_op_use_sort(nsrc: u32, ndst: u32) -> bool {
    if nsrc < 4 {
        false
    } else {
        nsrc > 32 || ndst > 32
    }
}

const DUPTRAVERSE_MAX_DEPTH: u32 = 15000;

pub(crate) struct Nfa {
    states: Vec<State>,
    arcs: Vec<Arc>,
    free_arcs: Option<ArcId>,
    free_states: Option<StateId>,
    /// Live-state chain, in creation order.
    head: Option<StateId>,
    tail: Option<StateId>,
    /// Counter for numbering states.
    pub nstates: i32,
    pub pre: StateId,
    pub init: StateId,
    pub fin: StateId,
    pub post: StateId,
    /// Colors assigned to BOS and BOL, if any.
    pub bos: [Color; 2],
    /// Colors assigned to EOS and EOL, if any.
    pub eos: [Color; 2],
    /// Sub-NFAs (carved out per tree node) do not maintain color chains.
    is_sub: bool,
    pub err: ErrSlot,
    pub space: SpaceCounter,
}

impl Nfa {
    /// Set up an NFA with its four special states and the "match can start
    /// and end anywhere" connector arcs.
    pub fn new(err: ErrSlot, space: SpaceCounter, cm: &mut Colormap, is_sub: bool) -> Nfa {
        let mut nfa = Nfa {
            states: Vec::new(),
            arcs: Vec::new(),
            free_arcs: None,
            free_states: None,
            head: None,
            tail: None,
            nstates: 0,
            pre: StateId(0),
            init: StateId(0),
            fin: StateId(0),
            post: StateId(0),
            bos: [COLORLESS; 2],
            eos: [COLORLESS; 2],
            is_sub,
            err,
            space,
        };
        nfa.post = nfa.new_fstate(FLAG_POST).unwrap_or(StateId(0));
        nfa.pre = nfa.new_fstate(FLAG_PRE).unwrap_or(StateId(0));
        nfa.init = nfa.new_state().unwrap_or(StateId(0));
        nfa.fin = nfa.new_state().unwrap_or(StateId(0));
        if nfa.iserr() {
            return nfa;
        }
        let (pre, init, fin, post) = (nfa.pre, nfa.init, nfa.fin, nfa.post);
        crate::color::rainbow(&mut nfa, cm, ArcType::Plain, COLORLESS, pre, init);
        nfa.new_arc(cm, ArcType::Caret, 1, pre, init);
        nfa.new_arc(cm, ArcType::Caret, 0, pre, init);
        crate::color::rainbow(&mut nfa, cm, ArcType::Plain, COLORLESS, fin, post);
        nfa.new_arc(cm, ArcType::Dollar, 1, fin, post);
        nfa.new_arc(cm, ArcType::Dollar, 0, fin, post);
        nfa
    }

    pub fn iserr(&self) -> bool {
        self.err.get().is_some()
    }

    pub fn seterr(&self, e: Error) {
        if self.err.get().is_none() {
            self.err.set(Some(e));
        }
    }

    pub fn st(&self, id: StateId) -> &State {
        &self.states[id.0 as usize]
    }

    pub fn st_mut(&mut self, id: StateId) -> &mut State {
        &mut self.states[id.0 as usize]
    }

    pub fn arc(&self, id: ArcId) -> &Arc {
        &self.arcs[id.0 as usize]
    }

    fn arc_mut(&mut self, id: ArcId) -> &mut Arc {
        &mut self.arcs[id.0 as usize]
    }

    pub fn first_state(&self) -> Option<StateId> {
        self.head
    }

    pub fn next_state(&self, id: StateId) -> Option<StateId> {
        self.st(id).next
    }

    /// Allocate a state with zero flag value.
    pub fn new_state(&mut self) -> Option<StateId> {
        let id = if let Some(id) = self.free_states {
            self.free_states = self.st(id).next;
            id
        } else {
            if self.space.get() >= MAX_COMPILE_SPACE {
                self.seterr(Error::TooBig);
                return None;
            }
            self.space.set(self.space.get() + STATE_COST);
            let id = StateId(self.states.len() as u32);
            self.states.push(State {
                no: 0,
                flag: 0,
                nins: 0,
                nouts: 0,
                ins: None,
                outs: None,
                tmp: None,
                next: None,
                prev: None,
            });
            id
        };
        debug_assert!(self.nstates >= 0);
        let no = self.nstates;
        self.nstates += 1;
        let tail = self.tail;
        {
            let s = self.st_mut(id);
            s.no = no;
            s.flag = 0;
            s.nins = 0;
            s.ins = None;
            s.nouts = 0;
            s.outs = None;
            s.tmp = None;
            s.next = None;
            s.prev = tail;
        }
        if let Some(t) = tail {
            self.st_mut(t).next = Some(id);
        } else {
            self.head = Some(id);
        }
        self.tail = Some(id);
        Some(id)
    }

    /// Allocate a state with a specific flag value.
    pub fn new_fstate(&mut self, flag: u8) -> Option<StateId> {
        let id = self.new_state()?;
        self.st_mut(id).flag = flag;
        Some(id)
    }

    /// Delete a state's in- and out-arcs, then free it.
    pub fn drop_state(&mut self, cm: &mut Colormap, s: StateId) {
        while let Some(a) = self.st(s).ins {
            self.free_arc(cm, a);
        }
        while let Some(a) = self.st(s).outs {
            self.free_arc(cm, a);
        }
        self.free_state(s);
    }

    /// Free a state that has no arcs left.
    pub fn free_state(&mut self, s: StateId) {
        debug_assert!(self.st(s).nins == 0 && self.st(s).nouts == 0);
        let (next, prev) = (self.st(s).next, self.st(s).prev);
        match next {
            Some(n) => self.st_mut(n).prev = prev,
            None => {
                debug_assert_eq!(self.tail, Some(s));
                self.tail = prev;
            }
        }
        match prev {
            Some(p) => self.st_mut(p).next = next,
            None => {
                debug_assert_eq!(self.head, Some(s));
                self.head = next;
            }
        }
        let free = self.free_states;
        {
            let st = self.st_mut(s);
            st.no = FREESTATE;
            st.flag = 0;
            st.prev = None;
            st.next = free;
        }
        self.free_states = Some(s);
    }

    /// Set up a new arc, suppressing duplicates.
    pub fn new_arc(&mut self, cm: &mut Colormap, ty: ArcType, co: Color, from: StateId, to: StateId) {
        // Check for a duplicate, using whichever chain is shorter.
        if self.st(from).nouts <= self.st(to).nins {
            let mut aid = self.st(from).outs;
            while let Some(id) = aid {
                let a = self.arc(id);
                if a.to == to && a.co == co && a.ty == ty {
                    return;
                }
                aid = a.out_next;
            }
        } else {
            let mut aid = self.st(to).ins;
            while let Some(id) = aid {
                let a = self.arc(id);
                if a.from == from && a.co == co && a.ty == ty {
                    return;
                }
                aid = a.in_next;
            }
        }
        self.create_arc(cm, ty, co, from, to);
    }

    /// Create an arc. Only for use when the caller has verified there is no
    /// identical arc already.
    fn create_arc(&mut self, cm: &mut Colormap, ty: ArcType, co: Color, from: StateId, to: StateId) {
        let Some(id) = self.alloc_arc() else {
            return;
        };
        {
            let a = self.arc_mut(id);
            a.ty = ty;
            a.co = co;
            a.from = from;
            a.to = to;
            a.live = true;
            a.color_next = None;
            a.color_prev = None;
        }
        // New arcs go on the front of the chains; see the walk logic in the
        // bulk operations and fixempties, which relies on that.
        let old_in = self.st(to).ins;
        {
            let a = self.arc_mut(id);
            a.in_next = old_in;
            a.in_prev = None;
        }
        if let Some(oi) = old_in {
            self.arc_mut(oi).in_prev = Some(id);
        }
        self.st_mut(to).ins = Some(id);
        let old_out = self.st(from).outs;
        {
            let a = self.arc_mut(id);
            a.out_next = old_out;
            a.out_prev = None;
        }
        if let Some(oo) = old_out {
            self.arc_mut(oo).out_prev = Some(id);
        }
        self.st_mut(from).outs = Some(id);
        self.st_mut(from).nouts += 1;
        self.st_mut(to).nins += 1;

        if ty.colored() && !self.is_sub {
            self.colorchain(cm, id);
        }
    }

    fn alloc_arc(&mut self) -> Option<ArcId> {
        if let Some(id) = self.free_arcs {
            self.free_arcs = self.arc(id).out_next;
            return Some(id);
        }
        if self.space.get() >= MAX_COMPILE_SPACE {
            self.seterr(Error::TooBig);
            return None;
        }
        self.space.set(self.space.get() + ARC_COST);
        let id = ArcId(self.arcs.len() as u32);
        self.arcs.push(Arc {
            ty: ArcType::Empty,
            co: 0,
            from: StateId(0),
            to: StateId(0),
            out_next: None,
            out_prev: None,
            in_next: None,
            in_prev: None,
            color_next: None,
            color_prev: None,
            live: false,
        });
        Some(id)
    }

    /// Free an arc, unlinking it from all three chains.
    pub fn free_arc(&mut self, cm: &mut Colormap, victim: ArcId) {
        debug_assert!(self.arc(victim).live);
        let (ty, from, to) = {
            let a = self.arc(victim);
            (a.ty, a.from, a.to)
        };

        if ty.colored() && !self.is_sub {
            self.uncolorchain(cm, victim);
        }

        // Out chain.
        let (out_prev, out_next) = {
            let a = self.arc(victim);
            (a.out_prev, a.out_next)
        };
        match out_prev {
            None => {
                debug_assert_eq!(self.st(from).outs, Some(victim));
                self.st_mut(from).outs = out_next;
            }
            Some(p) => self.arc_mut(p).out_next = out_next,
        }
        if let Some(n) = out_next {
            self.arc_mut(n).out_prev = out_prev;
        }
        self.st_mut(from).nouts -= 1;

        // In chain.
        let (in_prev, in_next) = {
            let a = self.arc(victim);
            (a.in_prev, a.in_next)
        };
        match in_prev {
            None => {
                debug_assert_eq!(self.st(to).ins, Some(victim));
                self.st_mut(to).ins = in_next;
            }
            Some(p) => self.arc_mut(p).in_next = in_next,
        }
        if let Some(n) = in_next {
            self.arc_mut(n).in_prev = in_prev;
        }
        self.st_mut(to).nins -= 1;

        let free = self.free_arcs;
        {
            let a = self.arc_mut(victim);
            a.live = false;
            a.in_next = None;
            a.in_prev = None;
            a.out_prev = None;
            a.out_next = free;
        }
        self.free_arcs = Some(victim);
    }

    /// Flip an arc to a different to-state. Caller must have verified there
    /// is no pre-existing duplicate.
    fn change_arc_target(&mut self, id: ArcId, newto: StateId) {
        let (oldto, in_prev, in_next) = {
            let a = self.arc(id);
            (a.to, a.in_prev, a.in_next)
        };
        debug_assert!(oldto != newto);
        match in_prev {
            None => {
                debug_assert_eq!(self.st(oldto).ins, Some(id));
                self.st_mut(oldto).ins = in_next;
            }
            Some(p) => self.arc_mut(p).in_next = in_next,
        }
        if let Some(n) = in_next {
            self.arc_mut(n).in_prev = in_prev;
        }
        self.st_mut(oldto).nins -= 1;

        let old_in = self.st(newto).ins;
        {
            let a = self.arc_mut(id);
            a.to = newto;
            a.in_next = old_in;
            a.in_prev = None;
        }
        if let Some(oi) = old_in {
            self.arc_mut(oi).in_prev = Some(id);
        }
        self.st_mut(newto).ins = Some(id);
        self.st_mut(newto).nins += 1;
    }

    /// Used by `ok_colors` when a parent color becomes empty and hands its
    /// arcs to the promoted subcolor. Chains are untouched; only the color
    /// changes (the caller moves the arc between color chains itself).
    pub(crate) fn recolor_arc(&mut self, id: ArcId, co: Color) {
        self.arc_mut(id).co = co;
    }

    pub fn has_nonempty_out(&self, s: StateId) -> bool {
        let mut aid = self.st(s).outs;
        while let Some(id) = aid {
            let a = self.arc(id);
            if a.ty != ArcType::Empty {
                return true;
            }
            aid = a.out_next;
        }
        false
    }

    /// Find an outarc of `s` with the given type and color, if any.
    pub fn find_arc(&self, s: StateId, ty: ArcType, co: Color) -> Option<ArcId> {
        let mut aid = self.st(s).outs;
        while let Some(id) = aid {
            let a = self.arc(id);
            if a.ty == ty && a.co == co {
                return Some(id);
            }
            aid = a.out_next;
        }
        None
    }

    /// Copy an arc's type and color onto a new endpoint pair.
    pub fn cp_arc(&mut self, cm: &mut Colormap, old: ArcId, from: StateId, to: StateId) {
        let (ty, co) = {
            let a = self.arc(old);
            (a.ty, a.co)
        };
        self.new_arc(cm, ty, co, from, to);
    }

    pub(crate) fn colorchain(&mut self, cm: &mut Colormap, id: ArcId) {
        let co = self.arc(id).co as usize;
        let head = cm.cd[co].arcs;
        if let Some(h) = head {
            self.arc_mut(h).color_prev = Some(id);
        }
        {
            let a = self.arc_mut(id);
            a.color_next = head;
            a.color_prev = None;
        }
        cm.cd[co].arcs = Some(id);
    }

    pub(crate) fn uncolorchain(&mut self, cm: &mut Colormap, id: ArcId) {
        let co = self.arc(id).co as usize;
        let (prev, next) = {
            let a = self.arc(id);
            (a.color_prev, a.color_next)
        };
        match prev {
            None => {
                debug_assert_eq!(cm.cd[co].arcs, Some(id));
                cm.cd[co].arcs = next;
            }
            Some(p) => self.arc_mut(p).color_next = next,
        }
        if let Some(n) = next {
            self.arc_mut(n).color_prev = prev;
        }
        let a = self.arc_mut(id);
        a.color_next = None;
        a.color_prev = None;
    }

    fn collect_ins(&self, s: StateId) -> Vec<ArcId> {
        let mut v = Vec::with_capacity(self.st(s).nins as usize);
        let mut aid = self.st(s).ins;
        while let Some(id) = aid {
            v.push(id);
            aid = self.arc(id).in_next;
        }
        v
    }

    fn collect_outs(&self, s: StateId) -> Vec<ArcId> {
        let mut v = Vec::with_capacity(self.st(s).nouts as usize);
        let mut aid = self.st(s).outs;
        while let Some(id) = aid {
            v.push(id);
            aid = self.arc(id).out_next;
        }
        v
    }

    fn in_key(&self, id: ArcId) -> (u32, Color, ArcType) {
        let a = self.arc(id);
        (a.from.0, a.co, a.ty)
    }

    fn out_key(&self, id: ArcId) -> (u32, Color, ArcType) {
        let a = self.arc(id);
        (a.to.0, a.co, a.ty)
    }

    /// Move all in arcs of a state to another state, deduplicating.
    pub fn move_ins(&mut self, cm: &mut Colormap, old: StateId, new: StateId) {
        debug_assert!(old != new);
        if !bulk_arc_op_use_sort(self.st(old).nins, self.st(new).nins) {
            while let Some(a) = self.st(old).ins {
                let from = self.arc(a).from;
                self.cp_arc(cm, a, from, new);
                self.free_arc(cm, a);
            }
        } else {
            if self.iserr() {
                return;
            }
            let mut oa = self.collect_ins(old);
            let mut na = self.collect_ins(new);
            oa.sort_unstable_by_key(|&a| self.in_key(a));
            na.sort_unstable_by_key(|&a| self.in_key(a));
            let merged: Vec<EitherOrBoth<ArcId, ArcId>> = oa
                .into_iter()
                .merge_join_by(na, |&a, &b| self.in_key(a).cmp(&self.in_key(b)))
                .collect();
            for item in merged {
                match item {
                    // No match in new's chain; just relink the arc.
                    EitherOrBoth::Left(a) => self.change_arc_target(a, new),
                    // Duplicate; drop old's copy.
                    EitherOrBoth::Both(a, _) => self.free_arc(cm, a),
                    EitherOrBoth::Right(_) => {}
                }
            }
        }
        debug_assert_eq!(self.st(old).nins, 0);
        debug_assert!(self.st(old).ins.is_none());
    }

    /// Copy in arcs of a state to another state.
    pub fn copy_ins(&mut self, cm: &mut Colormap, old: StateId, new: StateId) {
        debug_assert!(old != new);
        if !bulk_arc_op_use_sort(self.st(old).nins, self.st(new).nins) {
            let arcs = self.collect_ins(old);
            for a in arcs {
                let from = self.arc(a).from;
                self.cp_arc(cm, a, from, new);
            }
        } else {
            if self.iserr() {
                return;
            }
            let mut oa = self.collect_ins(old);
            let mut na = self.collect_ins(new);
            oa.sort_unstable_by_key(|&a| self.in_key(a));
            na.sort_unstable_by_key(|&a| self.in_key(a));
            let fresh: Vec<ArcId> = oa
                .into_iter()
                .merge_join_by(na, |&a, &b| self.in_key(a).cmp(&self.in_key(b)))
                .filter_map(|item| item.just_left())
                .collect();
            for a in fresh {
                let (ty, co, from) = {
                    let arc = self.arc(a);
                    (arc.ty, arc.co, arc.from)
                };
                self.create_arc(cm, ty, co, from, new);
            }
        }
    }

    /// Merge a list of inarcs (not guaranteed unique) into a state.
    pub fn merge_ins(&mut self, cm: &mut Colormap, s: StateId, mut arcarray: Vec<ArcId>) {
        if arcarray.is_empty() || self.iserr() {
            return;
        }
        arcarray.sort_unstable_by_key(|&a| self.in_key(a));
        arcarray.dedup_by_key(|&mut a| self.in_key(a));
        let mut na = self.collect_ins(s);
        na.sort_unstable_by_key(|&a| self.in_key(a));
        let fresh: Vec<ArcId> = arcarray
            .into_iter()
            .merge_join_by(na, |&a, &b| self.in_key(a).cmp(&self.in_key(b)))
            .filter_map(|item| item.just_left())
            .collect();
        for a in fresh {
            let (ty, co, from) = {
                let arc = self.arc(a);
                (arc.ty, arc.co, arc.from)
            };
            self.create_arc(cm, ty, co, from, s);
        }
    }

    /// Move all out arcs of a state to another state, deduplicating.
    pub fn move_outs(&mut self, cm: &mut Colormap, old: StateId, new: StateId) {
        debug_assert!(old != new);
        if !bulk_arc_op_use_sort(self.st(old).nouts, self.st(new).nouts) {
            while let Some(a) = self.st(old).outs {
                let to = self.arc(a).to;
                self.cp_arc(cm, a, new, to);
                self.free_arc(cm, a);
            }
        } else {
            if self.iserr() {
                return;
            }
            let mut oa = self.collect_outs(old);
            let mut na = self.collect_outs(new);
            oa.sort_unstable_by_key(|&a| self.out_key(a));
            na.sort_unstable_by_key(|&a| self.out_key(a));
            let merged: Vec<EitherOrBoth<ArcId, ArcId>> = oa
                .into_iter()
                .merge_join_by(na, |&a, &b| self.out_key(a).cmp(&self.out_key(b)))
                .collect();
            for item in merged {
                match item {
                    EitherOrBoth::Left(a) => {
                        let (ty, co, to) = {
                            let arc = self.arc(a);
                            (arc.ty, arc.co, arc.to)
                        };
                        self.create_arc(cm, ty, co, new, to);
                        self.free_arc(cm, a);
                    }
                    EitherOrBoth::Both(a, _) => self.free_arc(cm, a),
                    EitherOrBoth::Right(_) => {}
                }
            }
        }
        debug_assert_eq!(self.st(old).nouts, 0);
        debug_assert!(self.st(old).outs.is_none());
    }

    /// Copy out arcs of a state to another state.
    pub fn copy_outs(&mut self, cm: &mut Colormap, old: StateId, new: StateId) {
        debug_assert!(old != new);
        if !bulk_arc_op_use_sort(self.st(old).nouts, self.st(new).nouts) {
            let arcs = self.collect_outs(old);
            for a in arcs {
                let to = self.arc(a).to;
                self.cp_arc(cm, a, new, to);
            }
        } else {
            if self.iserr() {
                return;
            }
            let mut oa = self.collect_outs(old);
            let mut na = self.collect_outs(new);
            oa.sort_unstable_by_key(|&a| self.out_key(a));
            na.sort_unstable_by_key(|&a| self.out_key(a));
            let fresh: Vec<ArcId> = oa
                .into_iter()
                .merge_join_by(na, |&a, &b| self.out_key(a).cmp(&self.out_key(b)))
                .filter_map(|item| item.just_left())
                .collect();
            for a in fresh {
                let (ty, co, to) = {
                    let arc = self.arc(a);
                    (arc.ty, arc.co, arc.to)
                };
                self.create_arc(cm, ty, co, new, to);
            }
        }
    }

    /// Copy out arcs of `old` as arcs of the given type from `from` to `to`.
    pub fn clone_outs(
        &mut self,
        cm: &mut Colormap,
        old: StateId,
        from: StateId,
        to: StateId,
        ty: ArcType,
    ) {
        debug_assert!(old != from);
        let arcs = self.collect_outs(old);
        for a in arcs {
            let co = self.arc(a).co;
            self.new_arc(cm, ty, co, from, to);
        }
    }

    /// Delete a sub-NFA strung between `lp` and `rp` (exclusive of both).
    pub fn del_sub(&mut self, cm: &mut Colormap, lp: StateId, rp: StateId) {
        debug_assert!(lp != rp);
        self.st_mut(rp).tmp = Some(rp); // mark end
        self.del_traverse(cm, lp, lp);
        debug_assert!(self.st(lp).nouts == 0 && self.st(rp).nins == 0);
        debug_assert!(self.st(lp).no != FREESTATE && self.st(rp).no != FREESTATE);
        self.st_mut(rp).tmp = None;
        self.st_mut(lp).tmp = None;
    }

    fn del_traverse(&mut self, cm: &mut Colormap, leftend: StateId, s: StateId) {
        if self.st(s).nouts == 0 {
            return;
        }
        if self.st(s).tmp.is_some() {
            return; // already in progress
        }
        self.st_mut(s).tmp = Some(s);
        while let Some(a) = self.st(s).outs {
            let to = self.arc(a).to;
            self.del_traverse(cm, leftend, to);
            debug_assert!(self.st(to).nouts == 0 || self.st(to).tmp.is_some());
            self.free_arc(cm, a);
            if self.st(to).nins == 0 && self.st(to).tmp.is_none() {
                debug_assert_eq!(self.st(to).nouts, 0);
                self.free_state(to);
            }
        }
        debug_assert!(self.st(s).no != FREESTATE);
        debug_assert!(s == leftend || self.st(s).nins != 0);
        debug_assert_eq!(self.st(s).nouts, 0);
        self.st_mut(s).tmp = None;
    }

    /// Duplicate the sub-NFA between `start` and `stop`, stringing the copy
    /// from `from` to `to`.
    pub fn dup_nfa(
        &mut self,
        cm: &mut Colormap,
        start: StateId,
        stop: StateId,
        from: StateId,
        to: StateId,
    ) {
        if start == stop {
            self.new_arc(cm, ArcType::Empty, 0, from, to);
            return;
        }
        self.st_mut(stop).tmp = Some(to);
        self.dup_traverse(cm, start, Some(from), 0);
        self.st_mut(stop).tmp = None;
        self.clear_traverse(start);
    }

    fn dup_traverse(&mut self, cm: &mut Colormap, s: StateId, stmp: Option<StateId>, depth: u32) {
        if self.st(s).tmp.is_some() {
            return; // already done
        }
        let dup = match stmp {
            Some(d) => d,
            None => match self.new_state() {
                Some(d) => d,
                None => {
                    debug_assert!(self.iserr());
                    return;
                }
            },
        };
        self.st_mut(s).tmp = Some(dup);

        if depth + 1 > DUPTRAVERSE_MAX_DEPTH {
            self.seterr(Error::Space);
        }

        let mut aid = self.st(s).outs;
        while let Some(id) = aid {
            if self.iserr() {
                break;
            }
            let to = self.arc(id).to;
            let next = self.arc(id).out_next;
            self.dup_traverse(cm, to, None, depth + 1);
            if self.iserr() {
                break;
            }
            let totmp = self.st(to).tmp.expect("duplicate exists");
            let stmp = self.st(s).tmp.unwrap();
            self.cp_arc(cm, id, stmp, totmp);
            aid = next;
        }
    }

    /// Clean up the tmp pointers left behind by a duplication traversal.
    pub(crate) fn clear_traverse(&mut self, s: StateId) {
        if self.st(s).tmp.is_none() {
            return;
        }
        self.st_mut(s).tmp = None;
        let mut aid = self.st(s).outs;
        while let Some(id) = aid {
            let to = self.arc(id).to;
            let next = self.arc(id).out_next;
            self.clear_traverse(to);
            aid = next;
        }
    }

    /// Count live states and arcs, for tests and dumps.
    pub fn counts(&self) -> (usize, usize) {
        let mut nstates = 0;
        let mut narcs = 0;
        let mut sid = self.head;
        while let Some(s) = sid {
            nstates += 1;
            narcs += self.st(s).nouts as usize;
            sid = self.st(s).next;
        }
        (nstates, narcs)
    }

    /// Assign the false colors for BOS/BOL and EOS/EOL. A sub-NFA inherits
    /// the primary NFA's pseudocolors.
    pub fn special_colors(&mut self, cm: &mut Colormap, parent: Option<(&[Color; 2], &[Color; 2])>) {
        match parent {
            None => {
                self.bos[0] = cm.pseudo_color();
                self.bos[1] = cm.pseudo_color();
                self.eos[0] = cm.pseudo_color();
                self.eos[1] = cm.pseudo_color();
            }
            Some((bos, eos)) => {
                debug_assert!(bos[0] != COLORLESS && bos[1] != COLORLESS);
                debug_assert!(eos[0] != COLORLESS && eos[1] != COLORLESS);
                self.bos = *bos;
                self.eos = *eos;
            }
        }
    }
}

/// Duplicate the sub-NFA between `start` and `stop` of `src` into `dst`,
/// stringing the copy from `from` to `to` (both states of `dst`). This is
/// how each tree node gets its own NFA carved out of the parse result.
/// Traversal marks live in `src`; fresh states and arcs land in `dst`.
pub(crate) fn dup_into(
    src: &mut Nfa,
    dst: &mut Nfa,
    cm: &mut Colormap,
    start: StateId,
    stop: StateId,
    from: StateId,
    to: StateId,
) {
    if start == stop {
        dst.new_arc(cm, ArcType::Empty, 0, from, to);
        return;
    }
    src.st_mut(stop).tmp = Some(to);
    dup_into_traverse(src, dst, cm, start, Some(from), 0);
    src.st_mut(stop).tmp = None;
    src.clear_traverse(start);
}

fn dup_into_traverse(
    src: &mut Nfa,
    dst: &mut Nfa,
    cm: &mut Colormap,
    s: StateId,
    stmp: Option<StateId>,
    depth: u32,
) {
    if src.st(s).tmp.is_some() {
        return; // already done
    }
    let dup = match stmp {
        Some(d) => d,
        None => match dst.new_state() {
            Some(d) => d,
            None => {
                debug_assert!(dst.iserr());
                return;
            }
        },
    };
    src.st_mut(s).tmp = Some(dup);

    if depth + 1 > DUPTRAVERSE_MAX_DEPTH {
        dst.seterr(Error::Space);
    }

    let mut aid = src.st(s).outs;
    while let Some(id) = aid {
        if dst.iserr() {
            break;
        }
        let (ty, co, sto, next) = {
            let a = src.arc(id);
            (a.ty, a.co, a.to, a.out_next)
        };
        dup_into_traverse(src, dst, cm, sto, None, depth + 1);
        if dst.iserr() {
            break;
        }
        let totmp = src.st(sto).tmp.expect("duplicate exists");
        let smine = src.st(s).tmp.unwrap();
        dst.new_arc(cm, ty, co, smine, totmp);
        aid = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::new_err_slot;

    fn setup() -> (Nfa, Colormap) {
        let err = new_err_slot();
        let mut cm = Colormap::new(err.clone());
        let nfa = Nfa::new(err, Rc::new(Cell::new(0)), &mut cm, false);
        (nfa, cm)
    }

    #[test]
    fn connectors() {
        let (nfa, _cm) = setup();
        // pre -> init: WHITE rainbow plus the two '^' arcs.
        assert_eq!(nfa.st(nfa.pre).nouts, 3);
        assert_eq!(nfa.st(nfa.post).nins, 3);
        assert_eq!(nfa.st(nfa.pre).flag, FLAG_PRE);
        assert_eq!(nfa.st(nfa.post).flag, FLAG_POST);
    }

    #[test]
    fn arc_dedup() {
        let (mut nfa, mut cm) = setup();
        let a = nfa.new_state().unwrap();
        let b = nfa.new_state().unwrap();
        nfa.new_arc(&mut cm, ArcType::Plain, 0, a, b);
        nfa.new_arc(&mut cm, ArcType::Plain, 0, a, b);
        assert_eq!(nfa.st(a).nouts, 1);
        nfa.new_arc(&mut cm, ArcType::Empty, 0, a, b);
        assert_eq!(nfa.st(a).nouts, 2);
    }

    #[test]
    fn move_ins_dedups() {
        let (mut nfa, mut cm) = setup();
        let a = nfa.new_state().unwrap();
        let x = nfa.new_state().unwrap();
        let y = nfa.new_state().unwrap();
        nfa.new_arc(&mut cm, ArcType::Plain, 0, a, x);
        nfa.new_arc(&mut cm, ArcType::Plain, 0, a, y);
        nfa.move_ins(&mut cm, x, y);
        assert_eq!(nfa.st(x).nins, 0);
        assert_eq!(nfa.st(y).nins, 1);
    }

    #[test]
    fn bulk_move_ins_dedups() {
        let (mut nfa, mut cm) = setup();
        let x = nfa.new_state().unwrap();
        let y = nfa.new_state().unwrap();
        let mut sources = Vec::new();
        for _ in 0..40 {
            let s = nfa.new_state().unwrap();
            nfa.new_arc(&mut cm, ArcType::Plain, 0, s, x);
            sources.push(s);
        }
        // Half of them also point at y already.
        for &s in &sources[..20] {
            nfa.new_arc(&mut cm, ArcType::Plain, 0, s, y);
        }
        nfa.move_ins(&mut cm, x, y);
        assert_eq!(nfa.st(x).nins, 0);
        assert_eq!(nfa.st(y).nins, 40);
    }

    #[test]
    fn dup_nfa_copies_structure() {
        let (mut nfa, mut cm) = setup();
        let s1 = nfa.new_state().unwrap();
        let s2 = nfa.new_state().unwrap();
        let s3 = nfa.new_state().unwrap();
        nfa.new_arc(&mut cm, ArcType::Plain, 0, s1, s2);
        nfa.new_arc(&mut cm, ArcType::Plain, 0, s2, s3);
        let f = nfa.new_state().unwrap();
        let t = nfa.new_state().unwrap();
        let before = nfa.counts();
        nfa.dup_nfa(&mut cm, s1, s3, f, t);
        let after = nfa.counts();
        // One new interior state, two new arcs.
        assert_eq!(after.0, before.0 + 1);
        assert_eq!(after.1, before.1 + 2);
        assert_eq!(nfa.st(f).nouts, 1);
        assert_eq!(nfa.st(t).nins, 1);
    }

    #[test]
    fn del_sub_removes_interior() {
        let (mut nfa, mut cm) = setup();
        let lp = nfa.new_state().unwrap();
        let mid = nfa.new_state().unwrap();
        let rp = nfa.new_state().unwrap();
        nfa.new_arc(&mut cm, ArcType::Plain, 0, lp, mid);
        nfa.new_arc(&mut cm, ArcType::Plain, 0, mid, rp);
        nfa.del_sub(&mut cm, lp, rp);
        assert_eq!(nfa.st(lp).nouts, 0);
        assert_eq!(nfa.st(rp).nins, 0);
        assert_eq!(nfa.st(mid).no, FREESTATE);
    }
}
