//! Lazy DFA simulation.
//!
//! A `Dfa` runs on-the-fly subset construction over a compact NFA, caching
//! state sets in a bounded LRU. Each cached set holds a bitvector of NFA
//! states, an outarc vector indexed by color, and back-links from every
//! set that points at it, so eviction can sever the transition web
//! cleanly. Transitions that crossed a lookahead constraint are never
//! cached, since their validity depends on the input position.

use log::trace;

use crate::color::{Color, Colormap, COLORLESS};
use crate::error::Error;
use crate::flags::ExecFlags;
use crate::nfa::compact::{Cnfa, CNFA_NOPROGRESS};

use super::Exec;

pub(crate) const STARTER: u8 = 0o01;
pub(crate) const POSTSTATE: u8 = 0o02;
pub(crate) const LOCKED: u8 = 0o04;
pub(crate) const NOPROGRESS: u8 = 0o10;

/// Cache size under `ExecFlags::SMALL`.
const SMALL_SSETS: usize = 7;

/// A "pointer" to an outarc: which state set, on which color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ArcP {
    pub ss: Option<u32>,
    pub co: Color,
}

impl ArcP {
    const NONE: ArcP = ArcP { ss: None, co: 0 };
}

/// A cached state set.
pub(crate) struct Sset {
    /// Bitvector of NFA states.
    pub states: Box<[u64]>,
    pub hash: u64,
    pub flags: u8,
    /// Chain of inarcs pointing here.
    pub ins: ArcP,
    /// Position last entered on arrival here.
    pub lastseen: Option<usize>,
    /// Outarc vector indexed by color.
    pub outs: Box<[Option<u32>]>,
    /// Chain-pointer vector paralleling `outs`.
    pub inchain: Box<[ArcP]>,
}

pub(crate) struct Dfa<'a> {
    /// Cache capacity.
    nssets: usize,
    /// Entries occupied so far.
    pub nssused: usize,
    nstates: usize,
    ncolors: usize,
    wordsper: usize,
    pub ssets: Vec<Sset>,
    /// Scratch bitvector for image computation.
    work: Vec<u64>,
    pub cnfa: &'a Cnfa,
    pub cm: &'a Colormap,
    /// Position of the last cache-flushed success.
    lastpost: Option<usize>,
    /// Position of the last cache-flushed no-progress set.
    lastnopr: Option<usize>,
    /// Replacement-search cursor.
    search: usize,
}

fn bset(v: &mut [u64], n: usize) {
    v[n / 64] |= 1u64 << (n % 64);
}

fn isbset(v: &[u64], n: usize) -> bool {
    v[n / 64] & (1u64 << (n % 64)) != 0
}

fn hash(v: &[u64]) -> u64 {
    v.iter().fold(0, |h, w| h ^ w)
}

impl<'a> Dfa<'a> {
    pub fn new(ex: &Exec<'a>, cnfa: &'a Cnfa) -> Dfa<'a> {
        debug_assert!(cnfa.nstates != 0);
        let nss = if ex.eflags.contains(ExecFlags::SMALL) {
            SMALL_SSETS
        } else {
            cnfa.nstates * 2
        };
        Dfa {
            nssets: nss,
            nssused: 0,
            nstates: cnfa.nstates,
            ncolors: cnfa.ncolors,
            wordsper: cnfa.nstates.div_ceil(64),
            ssets: Vec::new(),
            work: vec![0; cnfa.nstates.div_ceil(64)],
            cnfa,
            cm: &ex.g.cmap,
            lastpost: None,
            lastnopr: None,
            search: 0,
        }
    }
}

/// Longest-preferred matching engine: scan forward from `start`, remember
/// every position at which a success set was entered, and report the last
/// one at or before `stop`.
pub(crate) fn longest(
    ex: &Exec,
    d: &mut Dfa,
    start: usize,
    stop: usize,
    mut hitstopp: Option<&mut bool>,
) -> Option<usize> {
    let len = ex.input.len();
    let realstop = if stop == len { stop } else { stop + 1 };

    let mut css = initialize(ex, d, start);
    let mut cp = start;
    if let Some(h) = hitstopp.as_deref_mut() {
        *h = false;
    }

    // Startup: consume the context (the char before `start`, or BOS/BOL).
    let co = if cp == 0 {
        d.cnfa.bos[if ex.eflags.contains(ExecFlags::NOTBOL) { 0 } else { 1 }]
    } else {
        d.cm.get_color(ex.input[cp - 1])
    };
    if ex.eflags.contains(ExecFlags::FTRACE) {
        trace!("+++ startup at {} color {}", cp, co);
    }
    css = miss(ex, d, css, co, cp, start)?;
    d.ssets[css as usize].lastseen = Some(cp);

    // Main loop.
    while cp < realstop {
        let co = d.cm.get_color(ex.input[cp]);
        let ss = match d.ssets[css as usize].outs[co as usize] {
            Some(ss) => ss,
            None => match miss(ex, d, css, co, cp + 1, start) {
                Some(ss) => ss,
                None => break,
            },
        };
        cp += 1;
        d.ssets[ss as usize].lastseen = Some(cp);
        css = ss;
    }

    // Shutdown: the virtual EOS transition.
    if cp == len && stop == len {
        if let Some(h) = hitstopp.as_deref_mut() {
            *h = true;
        }
        let co = d.cnfa.eos[if ex.eflags.contains(ExecFlags::NOTEOL) { 0 } else { 1 }];
        if let Some(ss) = miss(ex, d, css, co, cp, start) {
            // Special case: match ended at eol?
            if d.ssets[ss as usize].flags & POSTSTATE != 0 {
                return Some(cp);
            }
            d.ssets[ss as usize].lastseen = Some(cp); // to be tidy
        }
    }

    // Find the last match, if any.
    let mut post = d.lastpost;
    for ss in d.ssets[..d.nssused].iter() {
        if ss.flags & POSTSTATE != 0 {
            if let Some(ls) = ss.lastseen {
                if post.map_or(true, |p| p < ls) {
                    post = Some(ls);
                }
            }
        }
    }
    post.and_then(|p| p.checked_sub(1))
}

/// Shortest-preferred matching engine: report the first position in
/// `[min, max]` at which a success set is entered.
pub(crate) fn shortest(
    ex: &Exec,
    d: &mut Dfa,
    start: usize,
    min: usize,
    max: usize,
    coldp: Option<&mut Option<usize>>,
    mut hitstopp: Option<&mut bool>,
) -> Option<usize> {
    let len = ex.input.len();
    let realmin = if min == len { min } else { min + 1 };
    let realmax = if max == len { max } else { max + 1 };

    let mut css = initialize(ex, d, start);
    let mut cp = start;
    if let Some(h) = hitstopp.as_deref_mut() {
        *h = false;
    }

    // Startup.
    let co = if cp == 0 {
        d.cnfa.bos[if ex.eflags.contains(ExecFlags::NOTBOL) { 0 } else { 1 }]
    } else {
        d.cm.get_color(ex.input[cp - 1])
    };
    if ex.eflags.contains(ExecFlags::FTRACE) {
        trace!("--- startup at {} color {}", cp, co);
    }
    css = miss(ex, d, css, co, cp, start)?;
    d.ssets[css as usize].lastseen = Some(cp);
    let mut ss: Option<u32> = Some(css);

    // Main loop.
    while cp < realmax {
        let co = d.cm.get_color(ex.input[cp]);
        let next = match d.ssets[css as usize].outs[co as usize] {
            Some(n) => Some(n),
            None => miss(ex, d, css, co, cp + 1, start),
        };
        ss = next;
        let Some(n) = next else { break };
        cp += 1;
        d.ssets[n as usize].lastseen = Some(cp);
        css = n;
        if d.ssets[n as usize].flags & POSTSTATE != 0 && cp >= realmin {
            break;
        }
    }

    ss?;

    if let Some(c) = coldp {
        // Report the last no-progress state set seen, for cold-start
        // tracking.
        *c = Some(last_cold(d));
    }

    let mut ss = ss;
    if d.ssets[ss.unwrap() as usize].flags & POSTSTATE != 0 && cp > min {
        debug_assert!(cp >= realmin);
        cp -= 1;
    } else if cp == len && max == len {
        let co = d.cnfa.eos[if ex.eflags.contains(ExecFlags::NOTEOL) { 0 } else { 1 }];
        ss = miss(ex, d, css, co, cp, start);
        // The match might have ended at eol.
        let post = ss.map_or(false, |s| d.ssets[s as usize].flags & POSTSTATE != 0);
        if !post {
            if let Some(h) = hitstopp.as_deref_mut() {
                *h = true;
            }
        }
    }

    match ss {
        Some(s) if d.ssets[s as usize].flags & POSTSTATE != 0 => Some(cp),
        _ => None,
    }
}

/// Last point at which no progress had been made.
fn last_cold(d: &Dfa) -> usize {
    let mut nopr = d.lastnopr.unwrap_or(0);
    for ss in d.ssets[..d.nssused].iter() {
        if ss.flags & NOPROGRESS != 0 {
            if let Some(ls) = ss.lastseen {
                if nopr < ls {
                    nopr = ls;
                }
            }
        }
    }
    nopr
}

/// Hand-craft the locked starter cache entry, or revive it; reset scan
/// bookkeeping.
fn initialize(ex: &Exec, d: &mut Dfa, start: usize) -> u32 {
    let ss = if d.nssused > 0 && d.ssets[0].flags & STARTER != 0 {
        0
    } else {
        let ss = get_vacant_ss(ex, d, start, start);
        let s = &mut d.ssets[ss as usize];
        s.states.fill(0);
        bset(&mut s.states, d.cnfa.pre);
        s.hash = hash(&s.states);
        debug_assert!(d.cnfa.pre != d.cnfa.post);
        s.flags = STARTER | LOCKED | NOPROGRESS;
        ss
    };

    for s in d.ssets[..d.nssused].iter_mut() {
        s.lastseen = None;
    }
    d.ssets[ss as usize].lastseen = Some(start); // maybe untrue, but harmless
    d.lastpost = None;
    d.lastnopr = None;
    ss
}

/// Handle a cache miss: compute the transition image, close over lookahead
/// constraints, find or install the resulting state set, and (unless a
/// lookahead was involved) link the new transition into the web.
fn miss(ex: &Exec, d: &mut Dfa, css: u32, co: Color, cp: usize, start: usize) -> Option<u32> {
    // For convenience, we can be called even if it might not be a miss.
    if let Some(p) = d.ssets[css as usize].outs[co as usize] {
        return Some(p);
    }

    let cnfa = d.cnfa;
    // What set of states would we end up in?
    d.work.fill(0);
    let mut ispost = false;
    let mut noprogress = true;
    let mut gotstate = false;
    for i in 0..d.nstates {
        if isbset(&d.ssets[css as usize].states, i) {
            for ca in cnfa.state_arcs(i) {
                if ca.co == COLORLESS {
                    break;
                }
                if ca.co == co {
                    bset(&mut d.work, ca.to as usize);
                    gotstate = true;
                    if ca.to as usize == cnfa.post {
                        ispost = true;
                    }
                    if cnfa.stflags[ca.to as usize] & CNFA_NOPROGRESS == 0 {
                        noprogress = false;
                    }
                }
            }
        }
    }

    // Transitive closure over LACON arcs, testing each lookahead at the
    // current position.
    let mut do_lacons = gotstate && cnfa.has_lacons;
    let mut saw_lacons = false;
    while do_lacons {
        do_lacons = false;
        for i in 0..d.nstates {
            if !isbset(&d.work, i) {
                continue;
            }
            for j in 0..cnfa.state_arcs(i).len() {
                let ca = cnfa.state_arcs(i)[j];
                if ca.co == COLORLESS {
                    break;
                }
                if (ca.co as usize) < cnfa.ncolors {
                    continue;
                }
                saw_lacons = true;
                if isbset(&d.work, ca.to as usize) {
                    continue;
                }
                if !check_la_constraint(ex, cnfa, cp, ca.co) {
                    continue;
                }
                bset(&mut d.work, ca.to as usize);
                do_lacons = true;
                if ca.to as usize == cnfa.post {
                    ispost = true;
                }
                if cnfa.stflags[ca.to as usize] & CNFA_NOPROGRESS == 0 {
                    noprogress = false;
                }
            }
        }
    }

    if !gotstate {
        return None;
    }
    let h = hash(&d.work);

    // Is the image already cached?
    let mut found = None;
    for (i, ss) in d.ssets[..d.nssused].iter().enumerate() {
        if ss.hash == h && *ss.states == *d.work {
            found = Some(i as u32);
            break;
        }
    }
    let p = match found {
        Some(p) => p,
        None => {
            let p = get_vacant_ss(ex, d, cp, start);
            debug_assert!(p != css);
            let s = &mut d.ssets[p as usize];
            s.states.copy_from_slice(&d.work);
            s.hash = h;
            s.flags = if ispost { POSTSTATE } else { 0 };
            if noprogress {
                s.flags |= NOPROGRESS;
            }
            // lastseen is dealt with by the caller
            p
        }
    };

    if !saw_lacons {
        // Lookahead conditions always miss, so their transitions must not
        // be linked into the cache.
        let pins = d.ssets[p as usize].ins;
        d.ssets[css as usize].outs[co as usize] = Some(p);
        d.ssets[css as usize].inchain[co as usize] = pins;
        d.ssets[p as usize].ins = ArcP { ss: Some(css), co };
    }
    Some(p)
}

/// Lookahead-constraint checker for `miss`: run the constraint's own DFA
/// from the current position and apply its sense.
fn check_la_constraint(ex: &Exec, pcnfa: &Cnfa, cp: usize, co: Color) -> bool {
    let n = co as usize - pcnfa.ncolors;
    debug_assert!(n < ex.g.lacons.len());
    let sub = &ex.g.lacons[n];
    if ex.eflags.contains(ExecFlags::FTRACE) {
        trace!("=== testing lacon {} at {}", n, cp);
    }
    let mut d = Dfa::new(ex, &sub.cnfa);
    let end = longest(ex, &mut d, cp, ex.input.len(), None);
    if sub.positive {
        end.is_some()
    } else {
        end.is_none()
    }
}

/// Get a vacant state set, evicting if the cache is full. Clears the
/// victim's transition links in both directions but leaves its innards to
/// the caller.
fn get_vacant_ss(ex: &Exec, d: &mut Dfa, cp: usize, start: usize) -> u32 {
    let ss = pick_next_ss(ex, d, cp, start);
    debug_assert!(d.ssets[ss as usize].flags & LOCKED == 0);

    // Clear out its inarcs, including self-referential ones.
    let mut ap = d.ssets[ss as usize].ins;
    while let Some(p) = ap.ss {
        let co = ap.co as usize;
        d.ssets[p as usize].outs[co] = None;
        ap = d.ssets[p as usize].inchain[co];
        d.ssets[p as usize].inchain[co] = ArcP::NONE;
    }
    d.ssets[ss as usize].ins = ArcP::NONE;

    // Take it off the inarc chains of the sets reached by its outarcs.
    for i in 0..d.ncolors {
        let Some(p) = d.ssets[ss as usize].outs[i] else {
            continue;
        };
        debug_assert!(p != ss); // not self-referential
        let pins = d.ssets[p as usize].ins;
        let replacement = d.ssets[ss as usize].inchain[i];
        if pins.ss == Some(ss) && pins.co as usize == i {
            d.ssets[p as usize].ins = replacement;
        } else {
            debug_assert!(pins.ss.is_some());
            let mut ap = pins;
            let mut lastap = ArcP::NONE;
            while let Some(q) = ap.ss {
                if q == ss && ap.co as usize == i {
                    break;
                }
                lastap = ap;
                ap = d.ssets[q as usize].inchain[ap.co as usize];
            }
            debug_assert!(ap.ss.is_some());
            let l = lastap.ss.expect("chain has a predecessor");
            d.ssets[l as usize].inchain[lastap.co as usize] = replacement;
        }
        d.ssets[ss as usize].outs[i] = None;
        d.ssets[ss as usize].inchain[i] = ArcP::NONE;
    }

    // If the victim was a success or no-progress set, remember where.
    let (flags, lastseen) = {
        let s = &d.ssets[ss as usize];
        (s.flags, s.lastseen)
    };
    if flags & POSTSTATE != 0 {
        if let Some(ls) = lastseen {
            if d.lastpost.map_or(true, |lp| lp < ls) {
                d.lastpost = Some(ls);
            }
        }
    }
    if flags & NOPROGRESS != 0 {
        if let Some(ls) = lastseen {
            if d.lastnopr.map_or(true, |lp| lp < ls) {
                d.lastnopr = Some(ls);
            }
        }
    }

    ss
}

/// Pick the next state set to be used: a fresh slot while the cache is
/// filling, else an oldest unlocked set whose last visit is outside the
/// recent two-thirds of the scan window.
fn pick_next_ss(ex: &Exec, d: &mut Dfa, cp: usize, start: usize) -> u32 {
    if d.nssused < d.nssets {
        let i = d.nssused;
        d.nssused += 1;
        d.ssets.push(Sset {
            states: vec![0; d.wordsper].into_boxed_slice(),
            hash: 0,
            flags: 0,
            ins: ArcP::NONE,
            lastseen: None,
            outs: vec![None; d.ncolors].into_boxed_slice(),
            inchain: vec![ArcP::NONE; d.ncolors].into_boxed_slice(),
        });
        return i as u32;
    }

    // Look for the oldest, or old enough anyway.
    let ancient = if cp - start > d.nssets * 2 / 3 {
        // the oldest third is expendable
        cp - d.nssets * 2 / 3
    } else {
        start
    };
    let expendable = |s: &Sset| {
        s.lastseen.map_or(true, |ls| ls < ancient) && s.flags & LOCKED == 0
    };
    for i in d.search..d.nssets {
        if expendable(&d.ssets[i]) {
            d.search = i + 1;
            return i as u32;
        }
    }
    for i in 0..d.search {
        if expendable(&d.ssets[i]) {
            d.search = i + 1;
            return i as u32;
        }
    }

    // Nobody's old enough?!? -- something's really wrong.
    ex.seterr(Error::Assert);
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;
    use crate::flags::Flags;

    fn exec_for<'a>(
        c: &'a crate::compile::Compiled,
        hay: &'a [char],
        eflags: ExecFlags,
    ) -> Exec<'a> {
        Exec {
            g: c,
            input: hay,
            eflags,
            err: crate::error::new_err_slot(),
        }
    }

    fn run_longest(pattern: &str, hay: &str) -> Option<usize> {
        let c = compile(pattern, Flags::ADVANCED).unwrap();
        let chars: Vec<char> = hay.chars().collect();
        let ex = exec_for(&c, &chars, ExecFlags::empty());
        let mut d = Dfa::new(&ex, &c.tree.cnfa);
        longest(&ex, &mut d, 0, chars.len(), None)
    }

    #[test]
    fn longest_anchored_prefix() {
        // The tree DFA is anchored at the match start.
        assert_eq!(run_longest("a+", "aaab"), Some(3));
        assert_eq!(run_longest("a+", "baaa"), None);
        assert_eq!(run_longest("ab", "ab"), Some(2));
        assert_eq!(run_longest("ab", "ax"), None);
    }

    #[test]
    fn shortest_prefers_min() {
        let c = compile("a+", Flags::ADVANCED).unwrap();
        let chars: Vec<char> = "aaa".chars().collect();
        let ex = exec_for(&c, &chars, ExecFlags::empty());
        let mut d = Dfa::new(&ex, &c.tree.cnfa);
        let end = shortest(&ex, &mut d, 0, 0, chars.len(), None, None);
        assert_eq!(end, Some(1));
    }

    #[test]
    fn search_dfa_finds_interior_match() {
        let c = compile("b", Flags::ADVANCED).unwrap();
        let chars: Vec<char> = "aaab".chars().collect();
        let ex = exec_for(&c, &chars, ExecFlags::empty());
        let mut d = Dfa::new(&ex, &c.search);
        let mut cold = None;
        let close = shortest(&ex, &mut d, 0, 0, chars.len(), Some(&mut cold), None);
        assert_eq!(close, Some(4));
        // Cold start: a fresh match attempt could still begin at 3.
        assert_eq!(cold, Some(3));
    }

    #[test]
    fn cache_pressure_small() {
        // Exercise LRU eviction under the SMALL cache bound.
        let c = compile("(a|b|c|d)*x", Flags::ADVANCED | Flags::NOSUB).unwrap();
        let hay: String = "abcdabcdabcd".repeat(20) + "x";
        let chars: Vec<char> = hay.chars().collect();
        let ex = exec_for(&c, &chars, ExecFlags::SMALL);
        let mut d = Dfa::new(&ex, &c.tree.cnfa);
        let end = longest(&ex, &mut d, 0, chars.len(), None);
        assert_eq!(end, Some(chars.len()));
        assert!(!ex.iserr());
    }
}
