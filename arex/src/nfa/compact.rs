//! Compacted NFAs.
//!
//! Once optimized, an NFA is flattened into a read-only form sized for the
//! executor: one shared arc array, a per-state offset into it, and a
//! terminator arc with `co == COLORLESS` ending each state's list. Each
//! state's arcs are sorted by `(color, to)`. LACON arcs live in the same
//! lists, encoded as `co = ncolors + lacon_index`, so a plain arc is
//! distinguished by `co < ncolors`.

use crate::color::{Color, Colormap, COLORLESS};
use crate::error::Error;
use crate::nfa::{ArcType, Nfa};

/// Flag bit for a no-progress state (reachable without consuming input).
pub(crate) const CNFA_NOPROGRESS: u8 = 0o1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Carc {
    /// `COLORLESS` is the list terminator.
    pub co: Color,
    /// Next-state number.
    pub to: u32,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Cnfa {
    pub nstates: usize,
    pub ncolors: usize,
    pub has_lacons: bool,
    /// Setup and teardown state numbers.
    pub pre: usize,
    pub post: usize,
    pub bos: [Color; 2],
    pub eos: [Color; 2],
    /// Per-state flag bytes.
    pub stflags: Vec<u8>,
    /// Per-state start offset into `arcs`.
    pub states: Vec<usize>,
    pub arcs: Vec<Carc>,
}

impl Cnfa {
    pub fn is_null(&self) -> bool {
        self.nstates == 0
    }

    /// The outarc list of a state, including its terminator.
    pub fn state_arcs(&self, no: usize) -> &[Carc] {
        &self.arcs[self.states[no]..]
    }
}

/// Construct the compact representation of an optimized NFA. State numbers
/// must already be dense (the final cleanup renumbers them).
pub(crate) fn compact(nfa: &mut Nfa, cm: &Colormap) -> Cnfa {
    debug_assert!(!nfa.iserr());

    let mut nstates = 0;
    let mut narcs = 0;
    let mut sid = nfa.first_state();
    while let Some(s) = sid {
        nstates += 1;
        narcs += nfa.st(s).nouts as usize + 1; // + one endmarker
        sid = nfa.next_state(s);
    }

    let mut cnfa = Cnfa {
        nstates,
        ncolors: (cm.max_color() + 1) as usize,
        has_lacons: false,
        pre: nfa.st(nfa.pre).no as usize,
        post: nfa.st(nfa.post).no as usize,
        bos: nfa.bos,
        eos: nfa.eos,
        stflags: vec![0; nstates],
        states: vec![0; nstates],
        arcs: Vec::with_capacity(narcs),
    };

    let mut sid = nfa.first_state();
    while let Some(s) = sid {
        let no = nfa.st(s).no as usize;
        debug_assert!(no < nstates);
        cnfa.states[no] = cnfa.arcs.len();
        let first = cnfa.arcs.len();
        let mut aid = nfa.st(s).outs;
        while let Some(id) = aid {
            let a = nfa.arc(id);
            match a.ty {
                ArcType::Plain => cnfa.arcs.push(Carc {
                    co: a.co,
                    to: nfa.st(a.to).no as u32,
                }),
                ArcType::Lacon => {
                    debug_assert!(no != cnfa.pre);
                    cnfa.arcs.push(Carc {
                        co: cnfa.ncolors as Color + a.co,
                        to: nfa.st(a.to).no as u32,
                    });
                    cnfa.has_lacons = true;
                }
                _ => {
                    nfa.seterr(Error::Assert);
                }
            }
            aid = nfa.arc(id).out_next;
        }
        cnfa.arcs[first..].sort_unstable_by_key(|ca| (ca.co, ca.to));
        cnfa.arcs.push(Carc { co: COLORLESS, to: 0 });
        sid = nfa.next_state(s);
    }
    debug_assert!(cnfa.nstates != 0);

    // Mark no-progress states: the pre state and everything it reaches
    // directly.
    let mut aid = nfa.st(nfa.pre).outs;
    while let Some(id) = aid {
        let a = nfa.arc(id);
        cnfa.stflags[nfa.st(a.to).no as usize] = CNFA_NOPROGRESS;
        aid = a.out_next;
    }
    cnfa.stflags[nfa.st(nfa.pre).no as usize] = CNFA_NOPROGRESS;

    cnfa
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::new_err_slot;
    use crate::nfa::optimize::optimize;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn compact_single_char() {
        let err = new_err_slot();
        let mut cm = Colormap::new(err.clone());
        let mut nfa = Nfa::new(err, Rc::new(Cell::new(0)), &mut cm, false);
        let co = cm.subcolor('a');
        let (init, fin) = (nfa.init, nfa.fin);
        nfa.new_arc(&mut cm, ArcType::Plain, co, init, fin);
        crate::color::ok_colors(&mut nfa, &mut cm);
        nfa.special_colors(&mut cm, None);
        optimize(&mut nfa, &mut cm);
        let cnfa = compact(&mut nfa, &cm);
        assert!(!cnfa.is_null());
        assert_ne!(cnfa.pre, cnfa.post);
        assert_eq!(cnfa.stflags[cnfa.pre] & CNFA_NOPROGRESS, CNFA_NOPROGRESS);
        // Arc lists are sorted and terminated.
        for no in 0..cnfa.nstates {
            let arcs = cnfa.state_arcs(no);
            let mut last: Option<(Color, u32)> = None;
            for ca in arcs {
                if ca.co == COLORLESS {
                    break;
                }
                if let Some(l) = last {
                    assert!((ca.co, ca.to) > l);
                }
                last = Some((ca.co, ca.to));
            }
        }
    }
}
