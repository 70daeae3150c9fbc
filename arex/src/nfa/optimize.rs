//! NFA optimization.
//!
//! Less "optimization" than normalization: the executor's compact format
//! can only express PLAIN and LACON arcs, so the EMPTY arcs and the
//! `^`/`$`/AHEAD/BEHIND constraint arcs produced by the parser must all be
//! eliminated here. The hard part of either job is circular chains of the
//! target arc type, which would also let the executor spin without
//! consuming input.
//!
//! The pipeline runs in a fixed order: initial cleanup, EMPTY elimination,
//! constraint-loop breaking, pullback of `^`/BEHIND, push-forward of
//! `$`/AHEAD, final cleanup and renumbering, then analysis.

use log::trace;

use crate::color::{Color, Colormap};
use crate::error::Error;
use crate::flags::Info;
use crate::nfa::{ArcId, ArcType, Nfa, StateId};

pub(crate) fn is_constraint_arc(ty: ArcType) -> bool {
    matches!(
        ty,
        ArcType::Caret | ArcType::Dollar | ArcType::Behind | ArcType::Ahead | ArcType::Lacon
    )
}

fn has_constraint_out(nfa: &Nfa, s: StateId) -> bool {
    let mut aid = nfa.st(s).outs;
    while let Some(id) = aid {
        let a = nfa.arc(id);
        if is_constraint_arc(a.ty) {
            return true;
        }
        aid = a.out_next;
    }
    false
}

/// Reduce the NFA to executable form and report analysis bits.
pub(crate) fn optimize(nfa: &mut Nfa, cm: &mut Colormap) -> Info {
    trace!("initial cleanup");
    cleanup(nfa, cm);
    trace!("empties");
    fix_empties(nfa, cm);
    trace!("constraints");
    fix_constraint_loops(nfa, cm);
    pull_back(nfa, cm);
    push_fwd(nfa, cm);
    trace!("final cleanup");
    cleanup(nfa, cm);
    analyze(nfa)
}

/// Outcome of landing a constraint on an arc.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Combine {
    /// The pair cannot both hold; the arc is destroyed.
    Incompatible,
    /// The arc already implies the constraint.
    Satisfied,
    /// The pair commutes; the constraint is re-stacked via an intermediate
    /// state.
    Compatible,
}

fn combine(nfa: &Nfa, con: ArcId, a: ArcId) -> Combine {
    let (ct, cc) = {
        let c = nfa.arc(con);
        (c.ty, c.co)
    };
    let (at, ac) = {
        let x = nfa.arc(a);
        (x.ty, x.co)
    };
    use ArcType::*;
    match (ct, at) {
        // Newlines are handled separately, so a line anchor meeting a plain
        // color is simply unsatisfiable.
        (Caret, Plain) | (Dollar, Plain) => Combine::Incompatible,
        // Color constraints meet colors.
        (Ahead, Plain) | (Behind, Plain) => {
            if cc == ac {
                Combine::Satisfied
            } else {
                Combine::Incompatible
            }
        }
        // Collision of similar constraints.
        (Caret, Caret) | (Dollar, Dollar) | (Ahead, Ahead) | (Behind, Behind) => {
            if cc == ac {
                Combine::Satisfied
            } else {
                Combine::Incompatible
            }
        }
        // Collision of dissimilar constraints looking the same way.
        (Caret, Behind) | (Behind, Caret) | (Dollar, Ahead) | (Ahead, Dollar) => {
            Combine::Incompatible
        }
        // Constraints passing each other.
        (Caret, Dollar)
        | (Caret, Ahead)
        | (Behind, Dollar)
        | (Behind, Ahead)
        | (Dollar, Caret)
        | (Dollar, Behind)
        | (Ahead, Caret)
        | (Ahead, Behind)
        | (Caret, Lacon)
        | (Behind, Lacon)
        | (Dollar, Lacon)
        | (Ahead, Lacon) => Combine::Compatible,
        _ => {
            nfa.seterr(Error::Assert);
            Combine::Incompatible
        }
    }
}

/// Pull `^` and BEHIND constraints backward until they die out or reach the
/// pre state, where they become PLAIN arcs on the BOS/BOL pseudocolors.
fn pull_back(nfa: &mut Nfa, cm: &mut Colormap) {
    loop {
        let mut progress = false;
        let mut sid = nfa.first_state();
        while let Some(s) = sid {
            if nfa.iserr() {
                break;
            }
            let nexts = nfa.next_state(s);
            let mut intermediates: Option<StateId> = None;
            let mut aid = nfa.st(s).outs;
            while let Some(id) = aid {
                if nfa.iserr() {
                    break;
                }
                let next_a = nfa.arc(id).out_next;
                let ty = nfa.arc(id).ty;
                if matches!(ty, ArcType::Caret | ArcType::Behind)
                    && pull(nfa, cm, id, &mut intermediates)
                {
                    progress = true;
                }
                aid = next_a;
            }
            while let Some(i) = intermediates {
                intermediates = nfa.st(i).tmp;
                nfa.st_mut(i).tmp = None;
            }
            if (nfa.st(s).nins == 0 || nfa.st(s).nouts == 0) && nfa.st(s).flag == 0 {
                nfa.drop_state(cm, s);
            }
            sid = nexts;
        }
        if !progress || nfa.iserr() {
            break;
        }
    }
    if nfa.iserr() {
        return;
    }

    // '^' arcs that made it to the pre state become PLAIN arcs on the
    // BOS/BOL colors. No other '^' or BEHIND arcs should remain (compact
    // will complain if any do).
    let mut aid = nfa.st(nfa.pre).outs;
    while let Some(id) = aid {
        let next_a = nfa.arc(id).out_next;
        if nfa.arc(id).ty == ArcType::Caret {
            let (co, from, to) = {
                let a = nfa.arc(id);
                (a.co, a.from, a.to)
            };
            debug_assert!(co == 0 || co == 1);
            let bos = nfa.bos[co as usize];
            nfa.new_arc(cm, ArcType::Plain, bos, from, to);
            nfa.free_arc(cm, id);
        }
        aid = next_a;
    }
}

/// Pull one back-constraint past its source state. Deletes no pre-existing
/// states and no outarcs of the source except the constraint itself, which
/// keeps the caller's iteration safe; useless states are left for the
/// caller to drop.
fn pull(nfa: &mut Nfa, cm: &mut Colormap, mut con: ArcId, intermediates: &mut Option<StateId>) -> bool {
    let mut from = nfa.arc(con).from;
    let to = nfa.arc(con).to;

    debug_assert!(from != to); // constraint loops are already gone
    if nfa.st(from).flag != 0 {
        return false; // can't pull back beyond the start state
    }
    if nfa.st(from).nins == 0 {
        nfa.free_arc(cm, con); // unreachable
        return true;
    }

    // Clone the source state if it has other outarcs; the clone will be
    // dropped again once its arcs migrate.
    if nfa.st(from).nouts > 1 {
        let Some(s) = nfa.new_state() else {
            return false;
        };
        nfa.copy_ins(cm, from, s);
        nfa.cp_arc(cm, con, s, to);
        nfa.free_arc(cm, con);
        if nfa.iserr() {
            return false;
        }
        from = s;
        con = nfa.st(from).outs.expect("constraint was just moved here");
    }
    debug_assert_eq!(nfa.st(from).nouts, 1);

    // Propagate the constraint into the source state's inarcs.
    let mut aid = nfa.st(from).ins;
    while let Some(id) = aid {
        if nfa.iserr() {
            return false;
        }
        let next_a = nfa.arc(id).in_next;
        match combine(nfa, con, id) {
            Combine::Incompatible => nfa.free_arc(cm, id),
            Combine::Satisfied => {}
            Combine::Compatible => {
                // Swap the two arcs, reusing an intermediate state if one
                // fits this predecessor/successor pair.
                let afrom = nfa.arc(id).from;
                let mut s = *intermediates;
                while let Some(i) = s {
                    debug_assert!(nfa.st(i).nins > 0 && nfa.st(i).nouts > 0);
                    let ifrom = nfa.arc(nfa.st(i).ins.unwrap()).from;
                    let ito = nfa.arc(nfa.st(i).outs.unwrap()).to;
                    if ifrom == afrom && ito == to {
                        break;
                    }
                    s = nfa.st(i).tmp;
                }
                let s = match s {
                    Some(i) => i,
                    None => {
                        let Some(i) = nfa.new_state() else {
                            return false;
                        };
                        nfa.st_mut(i).tmp = *intermediates;
                        *intermediates = Some(i);
                        i
                    }
                };
                nfa.cp_arc(cm, con, afrom, s);
                nfa.cp_arc(cm, id, s, to);
                nfa.free_arc(cm, id);
            }
        }
        aid = next_a;
    }

    // Remaining inarcs, if any, incorporate the constraint.
    nfa.move_ins(cm, from, to);
    nfa.free_arc(cm, con);
    // The source state is now useless, but the caller cleans that up.
    true
}

/// Push `$` and AHEAD constraints forward until they die out or reach the
/// post state, where they become PLAIN arcs on the EOS/EOL pseudocolors.
fn push_fwd(nfa: &mut Nfa, cm: &mut Colormap) {
    loop {
        let mut progress = false;
        let mut sid = nfa.first_state();
        while let Some(s) = sid {
            if nfa.iserr() {
                break;
            }
            let nexts = nfa.next_state(s);
            let mut intermediates: Option<StateId> = None;
            let mut aid = nfa.st(s).ins;
            while let Some(id) = aid {
                if nfa.iserr() {
                    break;
                }
                let next_a = nfa.arc(id).in_next;
                let ty = nfa.arc(id).ty;
                if matches!(ty, ArcType::Dollar | ArcType::Ahead)
                    && push(nfa, cm, id, &mut intermediates)
                {
                    progress = true;
                }
                aid = next_a;
            }
            while let Some(i) = intermediates {
                intermediates = nfa.st(i).tmp;
                nfa.st_mut(i).tmp = None;
            }
            if (nfa.st(s).nins == 0 || nfa.st(s).nouts == 0) && nfa.st(s).flag == 0 {
                nfa.drop_state(cm, s);
            }
            sid = nexts;
        }
        if !progress || nfa.iserr() {
            break;
        }
    }
    if nfa.iserr() {
        return;
    }

    let mut aid = nfa.st(nfa.post).ins;
    while let Some(id) = aid {
        let next_a = nfa.arc(id).in_next;
        if nfa.arc(id).ty == ArcType::Dollar {
            let (co, from, to) = {
                let a = nfa.arc(id);
                (a.co, a.from, a.to)
            };
            debug_assert!(co == 0 || co == 1);
            let eos = nfa.eos[co as usize];
            nfa.new_arc(cm, ArcType::Plain, eos, from, to);
            nfa.free_arc(cm, id);
        }
        aid = next_a;
    }
}

/// Mirror image of [`pull`]: push one forward constraint past its
/// destination state.
fn push(nfa: &mut Nfa, cm: &mut Colormap, mut con: ArcId, intermediates: &mut Option<StateId>) -> bool {
    let from = nfa.arc(con).from;
    let mut to = nfa.arc(con).to;

    debug_assert!(to != from);
    if nfa.st(to).flag != 0 {
        return false; // can't push forward beyond the end state
    }
    if nfa.st(to).nouts == 0 {
        nfa.free_arc(cm, con); // dead end
        return true;
    }

    if nfa.st(to).nins > 1 {
        let Some(s) = nfa.new_state() else {
            return false;
        };
        nfa.copy_outs(cm, to, s);
        nfa.cp_arc(cm, con, from, s);
        nfa.free_arc(cm, con);
        if nfa.iserr() {
            return false;
        }
        to = s;
        con = nfa.st(to).ins.expect("constraint was just moved here");
    }
    debug_assert_eq!(nfa.st(to).nins, 1);

    let mut aid = nfa.st(to).outs;
    while let Some(id) = aid {
        if nfa.iserr() {
            return false;
        }
        let next_a = nfa.arc(id).out_next;
        match combine(nfa, con, id) {
            Combine::Incompatible => nfa.free_arc(cm, id),
            Combine::Satisfied => {}
            Combine::Compatible => {
                let ato = nfa.arc(id).to;
                let mut s = *intermediates;
                while let Some(i) = s {
                    debug_assert!(nfa.st(i).nins > 0 && nfa.st(i).nouts > 0);
                    let ifrom = nfa.arc(nfa.st(i).ins.unwrap()).from;
                    let ito = nfa.arc(nfa.st(i).outs.unwrap()).to;
                    if ifrom == from && ito == ato {
                        break;
                    }
                    s = nfa.st(i).tmp;
                }
                let s = match s {
                    Some(i) => i,
                    None => {
                        let Some(i) = nfa.new_state() else {
                            return false;
                        };
                        nfa.st_mut(i).tmp = *intermediates;
                        *intermediates = Some(i);
                        i
                    }
                };
                nfa.cp_arc(cm, con, s, ato);
                nfa.cp_arc(cm, id, from, s);
                nfa.free_arc(cm, id);
            }
        }
        aid = next_a;
    }

    nfa.move_outs(cm, to, from);
    nfa.free_arc(cm, con);
    true
}

/// Get rid of EMPTY arcs.
fn fix_empties(nfa: &mut Nfa, cm: &mut Colormap) {
    // First, drop states whose sole outarc is an EMPTY; they are just
    // aliases for their successor. The parser makes enough of these for the
    // special case to pay off.
    let mut sid = nfa.first_state();
    while let Some(s) = sid {
        if nfa.iserr() {
            return;
        }
        let nexts = nfa.next_state(s);
        sid = nexts;
        if nfa.st(s).flag != 0 || nfa.st(s).nouts != 1 {
            continue;
        }
        let a = nfa.st(s).outs.unwrap();
        debug_assert!(nfa.arc(a).out_next.is_none());
        if nfa.arc(a).ty != ArcType::Empty {
            continue;
        }
        let to = nfa.arc(a).to;
        if s != to {
            nfa.move_ins(cm, s, to);
        }
        nfa.drop_state(cm, s);
    }

    // Similarly for states with a single EMPTY inarc.
    let mut sid = nfa.first_state();
    while let Some(s) = sid {
        if nfa.iserr() {
            return;
        }
        let nexts = nfa.next_state(s);
        sid = nexts;
        debug_assert!(nfa.st(s).tmp.is_none());
        if nfa.st(s).flag != 0 || nfa.st(s).nins != 1 {
            continue;
        }
        let a = nfa.st(s).ins.unwrap();
        debug_assert!(nfa.arc(a).in_next.is_none());
        if nfa.arc(a).ty != ArcType::Empty {
            continue;
        }
        let from = nfa.arc(a).from;
        if s != from {
            nfa.move_outs(cm, s, from);
        }
        nfa.drop_state(cm, s);
    }

    // For each remaining state, find every state that can reach it by a
    // chain of EMPTY arcs and copy those states' *original* non-EMPTY
    // inarcs forward. Only arcs that existed at the start of this phase
    // participate; without that snapshot, inarcs copied to one chain member
    // get copied again from it to the next, and the phase goes cubic on
    // long chains. New arcs always land at the front of the in chains, so
    // each state's original arcs are exactly the tail starting at its
    // remembered first inarc.
    let nstates = nfa.nstates as usize;
    let mut inarcs_orig: Vec<Option<ArcId>> = vec![None; nstates];
    let mut sid = nfa.first_state();
    while let Some(s) = sid {
        inarcs_orig[nfa.st(s).no as usize] = nfa.st(s).ins;
        sid = nfa.next_state(s);
    }

    let mut sid = nfa.first_state();
    while let Some(s) = sid {
        if nfa.iserr() {
            break;
        }
        sid = nfa.next_state(s);

        // States with only EMPTY outarcs will be useless when the empties
        // go away; no point updating their inchains.
        if nfa.st(s).flag == 0 && !nfa.has_nonempty_out(s) {
            continue;
        }

        // Find predecessor states and accumulate their original inarcs.
        let mut arcarray: Vec<ArcId> = Vec::new();
        let mut s2 = empty_reachable(nfa, s, s, &inarcs_orig);
        while s2 != s {
            let mut aid = inarcs_orig[nfa.st(s2).no as usize];
            while let Some(id) = aid {
                let a = nfa.arc(id);
                if a.ty != ArcType::Empty {
                    arcarray.push(id);
                }
                aid = a.in_next;
            }
            let nexts = nfa.st(s2).tmp.unwrap();
            nfa.st_mut(s2).tmp = None;
            s2 = nexts;
        }
        nfa.st_mut(s).tmp = None;

        let prev_nins = nfa.st(s).nins;
        nfa.merge_ins(cm, s, arcarray);

        // The merge prepended fresh arcs; step over them to re-anchor the
        // original-arcs pointer.
        let mut nskip = nfa.st(s).nins - prev_nins;
        let mut a = nfa.st(s).ins;
        while nskip > 0 {
            a = nfa.arc(a.unwrap()).in_next;
            nskip -= 1;
        }
        inarcs_orig[nfa.st(s).no as usize] = a;
    }

    if nfa.iserr() {
        return;
    }

    // Now the EMPTY arcs themselves can go.
    let mut sid = nfa.first_state();
    while let Some(s) = sid {
        let mut aid = nfa.st(s).outs;
        while let Some(id) = aid {
            let next_a = nfa.arc(id).out_next;
            if nfa.arc(id).ty == ArcType::Empty {
                nfa.free_arc(cm, id);
            }
            aid = next_a;
        }
        sid = nfa.next_state(s);
    }

    // And any states that became useless. Not very thorough; the final
    // cleanup() catches the rest.
    let mut sid = nfa.first_state();
    while let Some(s) = sid {
        let nexts = nfa.next_state(s);
        if (nfa.st(s).nins == 0 || nfa.st(s).nouts == 0) && nfa.st(s).flag == 0 {
            nfa.drop_state(cm, s);
        }
        sid = nexts;
    }
}

/// Recursively find all states that can reach `s` by EMPTY arcs, linking
/// them through their tmp fields; returns the last one found. Only the
/// snapshot arcs in `inarcs_orig` are walked, which also skips all arcs
/// added during this phase.
fn empty_reachable(
    nfa: &mut Nfa,
    s: StateId,
    lastfound: StateId,
    inarcs_orig: &[Option<ArcId>],
) -> StateId {
    nfa.st_mut(s).tmp = Some(lastfound);
    let mut lastfound = s;
    let mut aid = inarcs_orig[nfa.st(s).no as usize];
    while let Some(id) = aid {
        let (ty, from, next) = {
            let a = nfa.arc(id);
            (a.ty, a.from, a.in_next)
        };
        if ty == ArcType::Empty && nfa.st(from).tmp.is_none() {
            lastfound = empty_reachable(nfa, from, lastfound, inarcs_orig);
        }
        aid = next;
    }
    lastfound
}

/// Get rid of loops containing only constraint arcs. Passing around such a
/// loop makes no forward progress, and pullback/pushfwd would chase it
/// forever.
fn fix_constraint_loops(nfa: &mut Nfa, cm: &mut Colormap) {
    // Trivial self-loops first; they are far more common than longer loops.
    let mut has_constraints = false;
    let mut sid = nfa.first_state();
    while let Some(s) = sid {
        if nfa.iserr() {
            return;
        }
        let nexts = nfa.next_state(s);
        debug_assert!(nfa.st(s).tmp.is_none());
        let mut aid = nfa.st(s).outs;
        while let Some(id) = aid {
            let next_a = nfa.arc(id).out_next;
            if is_constraint_arc(nfa.arc(id).ty) {
                if nfa.arc(id).to == s {
                    nfa.free_arc(cm, id);
                } else {
                    has_constraints = true;
                }
            }
            aid = next_a;
        }
        if nfa.st(s).nouts == 0 && nfa.st(s).flag == 0 {
            nfa.drop_state(cm, s);
        }
        sid = nexts;
    }

    if nfa.iserr() || !has_constraints {
        return;
    }

    // Search outward from each state for a loop; break it and start over.
    // Multi-state constraint loops are rare enough that retained state
    // between scans isn't worth the complication.
    'restart: loop {
        let mut sid = nfa.first_state();
        while let Some(s) = sid {
            if nfa.iserr() {
                return;
            }
            if find_constraint_loop(nfa, cm, s) {
                continue 'restart;
            }
            sid = nfa.next_state(s);
        }
        break;
    }

    if nfa.iserr() {
        return;
    }

    // findconstraintloop leaves proven-loop-free marks behind; clear them
    // and drop any states that became useless.
    let mut sid = nfa.first_state();
    while let Some(s) = sid {
        let nexts = nfa.next_state(s);
        nfa.st_mut(s).tmp = None;
        if (nfa.st(s).nins == 0 || nfa.st(s).nouts == 0) && nfa.st(s).flag == 0 {
            nfa.drop_state(cm, s);
        }
        sid = nexts;
    }
}

/// Recursively hunt for a constraint loop reachable from `s`; break the
/// first one found. On failure, states proven loop-free are marked with a
/// self-pointing tmp so later probes skip them.
fn find_constraint_loop(nfa: &mut Nfa, cm: &mut Colormap, s: StateId) -> bool {
    if let Some(t) = nfa.st(s).tmp {
        if t == s {
            // Already proven uninteresting.
            return false;
        }
        // Found a loop involving s; tmp fields are cleaned up by the break.
        break_constraint_loop(nfa, cm, s);
        return true;
    }
    let mut aid = nfa.st(s).outs;
    while let Some(id) = aid {
        let (ty, sto, next) = {
            let a = nfa.arc(id);
            (a.ty, a.to, a.out_next)
        };
        if is_constraint_arc(ty) {
            debug_assert!(sto != s);
            nfa.st_mut(s).tmp = Some(sto);
            if find_constraint_loop(nfa, cm, sto) {
                return true;
            }
        }
        aid = next;
    }
    nfa.st_mut(s).tmp = Some(s);
    false
}

/// Break a loop of constraint arcs. Each loop member's tmp field links to
/// its successor within the loop. The break clones one member's successor
/// subgraph so the loop arcs can be redirected into the clone tree, whose
/// construction drops all back-arcs.
fn break_constraint_loop(nfa: &mut Nfa, cm: &mut Colormap, sinitial: StateId) {
    // Pick the loop step to break at, preferring one crossed by a single
    // constraint arc: that constraint is then known satisfied inside every
    // clone, which lets similarly-labeled successors merge.
    let mut refarc: Option<ArcId> = None;
    let mut s = sinitial;
    loop {
        let nexts = nfa.st(s).tmp.unwrap();
        debug_assert!(nexts != s);
        if refarc.is_none() {
            let mut narcs = 0;
            let mut aid = nfa.st(s).outs;
            while let Some(id) = aid {
                let a = nfa.arc(id);
                if a.to == nexts && is_constraint_arc(a.ty) {
                    refarc = Some(id);
                    narcs += 1;
                }
                aid = a.out_next;
            }
            debug_assert!(narcs > 0);
            if narcs > 1 {
                refarc = None; // multiple constraint arcs here, no good
            }
        }
        s = nexts;
        if s == sinitial {
            break;
        }
    }

    let (shead, stail) = match refarc {
        Some(ra) => {
            let a = nfa.arc(ra);
            debug_assert_eq!(nfa.st(a.from).tmp, Some(a.to));
            (a.from, a.to)
        }
        // For lack of a better idea, break after sinitial.
        None => (sinitial, nfa.st(sinitial).tmp.unwrap()),
    };
    let ref_label = refarc.map(|ra| {
        let a = nfa.arc(ra);
        (a.ty, a.co)
    });

    // Free the tmp fields for clonesuccessorstates' own use; the
    // interrupted loop search is abandoned anyway.
    let mut sid = nfa.first_state();
    while let Some(st) = sid {
        nfa.st_mut(st).tmp = None;
        sid = nfa.next_state(st);
    }

    let Some(sclone) = nfa.new_state() else {
        return;
    };
    let nstates = nfa.nstates as usize;
    clone_successor_states(nfa, cm, stail, sclone, shead, ref_label, None, None, nstates);
    if nfa.iserr() {
        return;
    }

    // A clone with no outarcs means nothing interesting lies through the
    // loop arcs; they can simply be dropped.
    let sclone = if nfa.st(sclone).nouts == 0 {
        nfa.free_state(sclone);
        None
    } else {
        Some(sclone)
    };

    let mut aid = nfa.st(shead).outs;
    while let Some(id) = aid {
        let next_a = nfa.arc(id).out_next;
        let a = nfa.arc(id);
        if a.to == stail && is_constraint_arc(a.ty) {
            if let Some(sc) = sclone {
                nfa.cp_arc(cm, id, shead, sc);
            }
            nfa.free_arc(cm, id);
            if nfa.iserr() {
                break;
            }
        }
        aid = next_a;
    }
}

/// Build the tree of constraint-arc successor clones for
/// [`break_constraint_loop`].
///
/// Each clone carries a "donemap" of source states already visited on its
/// behalf, which blocks both infinite recursion and redundant subtree
/// visits. `curdonemap` is `None` when entering a freshly created clone;
/// `outerdonemap` is the parent clone's map (or `None` at top level).
/// During the first pass, child clones are tagged by pointing their tmp
/// field at the source state they clone; the second pass recurses into them
/// and clears the tags.
#[allow(clippy::too_many_arguments)]
fn clone_successor_states(
    nfa: &mut Nfa,
    cm: &mut Colormap,
    ssource: StateId,
    sclone: StateId,
    spredecessor: StateId,
    ref_label: Option<(ArcType, Color)>,
    curdonemap: Option<&mut Vec<bool>>,
    outerdonemap: Option<&[bool]>,
    nstates: usize,
) {
    let outermost = curdonemap.is_none();
    let mut owned;
    let donemap: &mut Vec<bool> = match curdonemap {
        Some(m) => m,
        None => {
            owned = match outerdonemap {
                // Copy the outer map so states being visited at outer
                // levels, or already merged into predecessors, are seen as
                // off-limits.
                Some(o) => o.to_vec(),
                None => {
                    let mut v = vec![false; nstates];
                    v[nfa.st(spredecessor).no as usize] = true;
                    v
                }
            };
            &mut owned
        }
    };

    debug_assert!((nfa.st(ssource).no as usize) < nstates);
    debug_assert!(!donemap[nfa.st(ssource).no as usize]);
    donemap[nfa.st(ssource).no as usize] = true;

    // First pass: clone all of ssource's outarcs, creating child clone
    // states as needed but not descending into them yet. That guarantees
    // one child clone per reachable source state even with parallel arcs,
    // and means each child's inarc set is complete before it is visited,
    // which the constraint-already-checked merge test relies on.
    let outs: Vec<ArcId> = {
        let mut v = Vec::new();
        let mut aid = nfa.st(ssource).outs;
        while let Some(id) = aid {
            v.push(id);
            aid = nfa.arc(id).out_next;
        }
        v
    };
    for id in outs {
        if nfa.iserr() {
            break;
        }
        let (aty, aco, sto) = {
            let a = nfa.arc(id);
            (a.ty, a.co, a.to)
        };
        if is_constraint_arc(aty) && has_constraint_out(nfa, sto) {
            // Back-link constraint arcs must not be followed, nor states
            // already merged into this clone.
            debug_assert!((nfa.st(sto).no as usize) < nstates);
            if donemap[nfa.st(sto).no as usize] {
                continue;
            }

            // Do we already have a child clone for this source state?
            let mut prevclone = None;
            let mut a2 = nfa.st(sclone).outs;
            while let Some(id2) = a2 {
                let to2 = nfa.arc(id2).to;
                if nfa.st(to2).tmp == Some(sto) {
                    prevclone = Some(to2);
                    break;
                }
                a2 = nfa.arc(id2).out_next;
            }

            // If this arc carries the refarc label, or the label of any arc
            // that must have been traversed to reach sclone, nothing more
            // needs to hold to reach sto: merge it into sclone.
            let canmerge = if ref_label == Some((aty, aco)) {
                true
            } else {
                let mut found = false;
                let mut s = sclone;
                while let Some(ins) = nfa.st(s).ins {
                    let ia = nfa.arc(ins);
                    if nfa.st(s).nins == 1 && ia.ty == aty && ia.co == aco {
                        found = true;
                        break;
                    }
                    s = ia.from;
                }
                found
            };

            if canmerge {
                // A child clone made earlier for sto is now moot (this can
                // happen when ssource has several pathways to sto and only
                // this one proved to be a no-op).
                if let Some(pc) = prevclone {
                    nfa.drop_state(cm, pc); // kills our outarc, too
                }
                clone_successor_states(
                    nfa,
                    cm,
                    sto,
                    sclone,
                    spredecessor,
                    ref_label,
                    Some(&mut *donemap),
                    outerdonemap,
                    nstates,
                );
                debug_assert!(nfa.iserr() || donemap[nfa.st(sto).no as usize]);
            } else if let Some(pc) = prevclone {
                nfa.new_arc(cm, aty, aco, sclone, pc);
            } else {
                let Some(stoclone) = nfa.new_state() else {
                    break;
                };
                nfa.st_mut(stoclone).tmp = Some(sto);
                nfa.new_arc(cm, aty, aco, sclone, stoclone);
            }
        } else {
            // Non-constraint outarcs, and arcs to states with no constraint
            // outarc, are linked as-is: such targets cannot be part of a
            // constraint loop (this also keeps the post state unclonable).
            nfa.new_arc(cm, aty, aco, sclone, sto);
        }
    }

    // Second pass, only at the clone's outermost call: recurse into the
    // child clones, untagging them as we go. Parallel arcs to one child
    // recurse once.
    if outermost {
        let souts: Vec<ArcId> = {
            let mut v = Vec::new();
            let mut aid = nfa.st(sclone).outs;
            while let Some(id) = aid {
                v.push(id);
                aid = nfa.arc(id).out_next;
            }
            v
        };
        for id in souts {
            if nfa.iserr() {
                break;
            }
            let stoclone = nfa.arc(id).to;
            if let Some(sto) = nfa.st(stoclone).tmp {
                nfa.st_mut(stoclone).tmp = None;
                clone_successor_states(
                    nfa,
                    cm,
                    sto,
                    stoclone,
                    spredecessor,
                    ref_label,
                    None,
                    Some(donemap.as_slice()),
                    nstates,
                );
            }
        }
    }
}

/// Clear out unreachable and dead-end states, then renumber the survivors.
pub(crate) fn cleanup(nfa: &mut Nfa, cm: &mut Colormap) {
    let (pre, post) = (nfa.pre, nfa.post);
    mark_reachable(nfa, pre, None, pre);
    mark_canreach(nfa, post, Some(pre), post);
    let mut sid = nfa.first_state();
    while let Some(s) = sid {
        let nexts = nfa.next_state(s);
        if nfa.st(s).tmp != Some(post) && nfa.st(s).flag == 0 {
            nfa.drop_state(cm, s);
        }
        sid = nexts;
    }
    debug_assert!(nfa.st(post).nins == 0 || nfa.st(post).tmp == Some(post));
    nfa.clear_traverse(pre);
    debug_assert!(nfa.st(post).nins == 0 || nfa.st(post).tmp.is_none());
    // The final-unreachable (nins == 0) case is caught by analyze().

    let mut n = 0;
    let mut sid = nfa.first_state();
    while let Some(s) = sid {
        nfa.st_mut(s).no = n;
        n += 1;
        sid = nfa.next_state(s);
    }
    nfa.nstates = n;
}

fn mark_reachable(nfa: &mut Nfa, s: StateId, okay: Option<StateId>, mark: StateId) {
    if nfa.st(s).tmp != okay {
        return;
    }
    nfa.st_mut(s).tmp = Some(mark);
    let mut aid = nfa.st(s).outs;
    while let Some(id) = aid {
        let (to, next) = {
            let a = nfa.arc(id);
            (a.to, a.out_next)
        };
        mark_reachable(nfa, to, okay, mark);
        aid = next;
    }
}

fn mark_canreach(nfa: &mut Nfa, s: StateId, okay: Option<StateId>, mark: StateId) {
    if nfa.st(s).tmp != okay {
        return;
    }
    nfa.st_mut(s).tmp = Some(mark);
    let mut aid = nfa.st(s).ins;
    while let Some(id) = aid {
        let (from, next) = {
            let a = nfa.arc(id);
            (a.from, a.in_next)
        };
        mark_canreach(nfa, from, okay, mark);
        aid = next;
    }
}

/// Ascertain potentially-useful facts about an optimized NFA.
fn analyze(nfa: &Nfa) -> Info {
    if nfa.st(nfa.pre).outs.is_none() {
        return Info::UIMPOSSIBLE;
    }
    let mut aid = nfa.st(nfa.pre).outs;
    while let Some(id) = aid {
        let a = nfa.arc(id);
        let mut aaid = nfa.st(a.to).outs;
        while let Some(id2) = aaid {
            let aa = nfa.arc(id2);
            if aa.to == nfa.post {
                return Info::UEMPTYMATCH;
            }
            aaid = aa.out_next;
        }
        aid = a.out_next;
    }
    Info::empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::new_err_slot;
    use std::cell::Cell;
    use std::rc::Rc;

    fn setup() -> (Nfa, Colormap) {
        let err = new_err_slot();
        let mut cm = Colormap::new(err.clone());
        let nfa = Nfa::new(err, Rc::new(Cell::new(0)), &mut cm, false);
        (nfa, cm)
    }

    fn finish(nfa: &mut Nfa, cm: &mut Colormap) -> Info {
        nfa.special_colors(cm, None);
        optimize(nfa, cm)
    }

    #[test]
    fn single_char_nfa() {
        let (mut nfa, mut cm) = setup();
        let co = cm.subcolor('a');
        let (init, fin) = (nfa.init, nfa.fin);
        nfa.new_arc(&mut cm, ArcType::Plain, co, init, fin);
        crate::color::ok_colors(&mut nfa, &mut cm);
        let info = finish(&mut nfa, &mut cm);
        assert!(info.is_empty());
        assert!(!nfa.iserr());
        // All arcs must now be PLAIN.
        let mut sid = nfa.first_state();
        while let Some(s) = sid {
            let mut aid = nfa.st(s).outs;
            while let Some(id) = aid {
                assert_eq!(nfa.arc(id).ty, ArcType::Plain);
                aid = nfa.arc(id).out_next;
            }
            sid = nfa.next_state(s);
        }
    }

    #[test]
    fn empty_chain_collapses() {
        let (mut nfa, mut cm) = setup();
        // init -e-> m1 -e-> m2 -a-> fin
        let m1 = nfa.new_state().unwrap();
        let m2 = nfa.new_state().unwrap();
        let (init, fin) = (nfa.init, nfa.fin);
        nfa.new_arc(&mut cm, ArcType::Empty, 0, init, m1);
        nfa.new_arc(&mut cm, ArcType::Empty, 0, m1, m2);
        let co = cm.subcolor('a');
        nfa.new_arc(&mut cm, ArcType::Plain, co, m2, fin);
        crate::color::ok_colors(&mut nfa, &mut cm);
        let info = finish(&mut nfa, &mut cm);
        assert!(info.is_empty());
        // No EMPTY arcs survive.
        let mut sid = nfa.first_state();
        while let Some(s) = sid {
            let mut aid = nfa.st(s).outs;
            while let Some(id) = aid {
                assert_ne!(nfa.arc(id).ty, ArcType::Empty);
                aid = nfa.arc(id).out_next;
            }
            sid = nfa.next_state(s);
        }
    }

    #[test]
    fn impossible_when_disconnected() {
        let (mut nfa, mut cm) = setup();
        // Sever init from fin entirely: no arc between them at all, so
        // nothing can reach post once dead ends are pruned.
        let info = finish(&mut nfa, &mut cm);
        assert!(info.contains(Info::UIMPOSSIBLE));
    }

    #[test]
    fn empty_match_detected() {
        let (mut nfa, mut cm) = setup();
        let (init, fin) = (nfa.init, nfa.fin);
        nfa.new_arc(&mut cm, ArcType::Empty, 0, init, fin);
        let info = finish(&mut nfa, &mut cm);
        assert!(info.contains(Info::UEMPTYMATCH));
    }

    #[test]
    fn constraint_self_loop_dropped() {
        let (mut nfa, mut cm) = setup();
        let (init, fin) = (nfa.init, nfa.fin);
        let s = nfa.new_state().unwrap();
        nfa.new_arc(&mut cm, ArcType::Empty, 0, init, s);
        nfa.new_arc(&mut cm, ArcType::Ahead, 0, s, s);
        let co = cm.subcolor('a');
        nfa.new_arc(&mut cm, ArcType::Plain, co, s, fin);
        crate::color::ok_colors(&mut nfa, &mut cm);
        finish(&mut nfa, &mut cm);
        assert!(!nfa.iserr());
        // The self-loop is gone; 'a' still reaches fin.
        let mut found_self = false;
        let mut sid = nfa.first_state();
        while let Some(st) = sid {
            let mut aid = nfa.st(st).outs;
            while let Some(id) = aid {
                if nfa.arc(id).to == st {
                    found_self = true;
                }
                aid = nfa.arc(id).out_next;
            }
            sid = nfa.next_state(st);
        }
        assert!(!found_self);
    }
}
