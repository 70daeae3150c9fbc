//! Matching.
//!
//! Execution is two-tiered. The DFA layer proves feasibility fast: a
//! search automaton locates a candidate window, and each tree node's own
//! DFA can certify whether a substring is acceptable to that node. For
//! "messy" trees (captures, backrefs, mixed preference) the dissector then
//! recursively pins down submatch boundaries, re-running child DFAs at
//! candidate split points; backtracking is confined to those nodes.

pub(crate) mod dfa;

use std::ops::Range;

use log::trace;

use crate::compile::Compiled;
use crate::error::{new_err_slot, ErrSlot, Error};
use crate::flags::{ExecFlags, Flags, Info};
use crate::tree::{Op, SubFlags, Subre, DUPINF};

use self::dfa::{longest, shortest, Dfa};

/// One capture slot: the matched range, or `None` if unmatched.
pub type Span = Option<Range<usize>>;

/// Extra outputs of an execution, populated under [`Flags::EXPECT`].
#[derive(Clone, Debug, Default)]
pub struct Details {
    /// Where a partial match could still be extended: starts at the
    /// cold-start point, ends at the end of the text.
    pub extend: Range<usize>,
}

/// Per-execution context: the compiled artifact, the input window and the
/// execution flags, plus the sticky error slot.
pub(crate) struct Exec<'a> {
    pub g: &'a Compiled,
    pub input: &'a [char],
    pub eflags: ExecFlags,
    pub err: ErrSlot,
}

impl Exec<'_> {
    pub fn iserr(&self) -> bool {
        self.err.get().is_some()
    }

    pub fn seterr(&self, e: Error) {
        if self.err.get().is_none() {
            self.err.set(Some(e));
        }
    }

    fn check(&self) -> Result<(), Error> {
        match self.err.get() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Compiled {
    /// Execute against `text` (offsets are in chars), filling up to
    /// `nmatch` capture slots. Returns `Ok(None)` on no match; slot 0 of a
    /// successful match is the overall span, unmatched slots are `None`.
    pub fn execute(
        &self,
        text: &[char],
        nmatch: usize,
        flags: ExecFlags,
        mut details: Option<&mut Details>,
    ) -> Result<Option<Vec<Span>>, Error> {
        if self.cflags.contains(Flags::EXPECT) && details.is_none() {
            return Err(Error::InvArg);
        }
        if self.info.contains(Info::UIMPOSSIBLE) {
            return Ok(None);
        }
        let backref = self.info.contains(Info::UBACKREF);
        let nmatch = if self.cflags.contains(Flags::NOSUB) {
            0 // override the caller
        } else {
            nmatch
        };

        // Backrefs need every capture resolved, whether asked for or not.
        let vlen = if backref { self.nsub + 1 } else { nmatch };
        let mut pmatch: Vec<Span> = vec![None; vlen];

        let ex = Exec {
            g: self,
            input: text,
            eflags: flags,
            err: new_err_slot(),
        };

        let found = if backref {
            complicated_find(&ex, &mut pmatch, &mut details)?
        } else {
            simple_find(&ex, &mut pmatch, nmatch, &mut details)?
        };

        if !found {
            return Ok(None);
        }
        pmatch.truncate(nmatch);
        pmatch.resize(nmatch, None);
        Ok(Some(pmatch))
    }
}

/// Find a match for the main automaton, no-complications case.
fn simple_find(
    ex: &Exec,
    pmatch: &mut Vec<Span>,
    nmatch: usize,
    details: &mut Option<&mut Details>,
) -> Result<bool, Error> {
    let len = ex.input.len();
    let shorter = ex.g.tree.flags.contains(SubFlags::SHORTER);

    // First, a shot with the search automaton.
    let mut cold = None;
    let close = {
        let mut s = Dfa::new(ex, &ex.g.search);
        shortest(ex, &mut s, 0, 0, len, Some(&mut cold), None)
    };
    ex.check()?;
    if ex.g.cflags.contains(Flags::EXPECT) {
        let d = details.as_deref_mut().expect("checked at entry");
        d.extend = cold.unwrap_or(len)..len;
    }
    let Some(close) = close else {
        return Ok(false); // not found
    };
    if nmatch == 0 {
        return Ok(true); // found, don't need the exact location
    }

    // Find the starting point and match.
    let open = cold.expect("search success implies a cold point");
    let mut cold = None;
    let mut d = Dfa::new(ex, &ex.g.tree.cnfa);
    let mut begin = open;
    let mut end = None;
    while begin <= close {
        let mut hitend = false;
        end = if shorter {
            shortest(ex, &mut d, begin, begin, len, None, Some(&mut hitend))
        } else {
            longest(ex, &mut d, begin, len, Some(&mut hitend))
        };
        ex.check()?;
        if hitend && cold.is_none() {
            cold = Some(begin);
        }
        if end.is_some() {
            break;
        }
        begin += 1;
    }
    let Some(end) = end else {
        // The search automaton said yes, so this should not happen.
        return Err(Error::Assert);
    };

    // And pin down the details.
    debug_assert!(nmatch > 0);
    pmatch[0] = Some(begin..end);
    if ex.g.cflags.contains(Flags::EXPECT) {
        let d = details.as_deref_mut().expect("checked at entry");
        d.extend = cold.unwrap_or(len)..len;
    }
    if nmatch == 1 {
        return Ok(true); // no need for submatches
    }

    zapallsubs(pmatch);
    let mut dis = Dissector::new(ex, pmatch);
    dis.cdissect(&ex.g.tree, begin, end)
}

/// Find a match for the main automaton, with backrefs in play: candidate
/// spans must be verified by full dissection before they count.
fn complicated_find(
    ex: &Exec,
    pmatch: &mut Vec<Span>,
    details: &mut Option<&mut Details>,
) -> Result<bool, Error> {
    let mut s = Dfa::new(ex, &ex.g.search);
    let mut d = Dfa::new(ex, &ex.g.tree.cnfa);
    let mut cold = None;

    let ret = complicated_find_loop(ex, pmatch, &mut d, &mut s, &mut cold);

    if ex.g.cflags.contains(Flags::EXPECT) {
        let det = details.as_deref_mut().expect("checked at entry");
        det.extend = cold.unwrap_or(ex.input.len())..ex.input.len();
    }
    ret
}

fn complicated_find_loop(
    ex: &Exec,
    pmatch: &mut Vec<Span>,
    d: &mut Dfa,
    s: &mut Dfa,
    coldp: &mut Option<usize>,
) -> Result<bool, Error> {
    let len = ex.input.len();
    let shorter = ex.g.tree.flags.contains(SubFlags::SHORTER);
    let mut cold = None;
    let mut close = 0;
    let mut dis = Dissector::new(ex, pmatch);

    loop {
        let Some(c) = shortest(ex, s, close, close, len, Some(&mut cold), None) else {
            break;
        };
        ex.check()?;
        close = c;
        let open = cold.expect("search success implies a cold point");
        cold = None;
        for begin in open..=close {
            let mut estart = begin;
            let mut estop = len;
            loop {
                let mut hitend = false;
                let end = if shorter {
                    shortest(ex, d, begin, estart, estop, None, Some(&mut hitend))
                } else {
                    longest(ex, d, begin, estop, Some(&mut hitend))
                };
                ex.check()?;
                if hitend && cold.is_none() {
                    cold = Some(begin);
                }
                let Some(end) = end else { break };

                // Tentative span; dissection has the final say.
                zapallsubs(dis.pmatch);
                let er = dis.cdissect(&ex.g.tree, begin, end);
                match er {
                    Ok(true) => {
                        if !dis.pmatch.is_empty() {
                            dis.pmatch[0] = Some(begin..end);
                        }
                        *coldp = cold;
                        return Ok(true);
                    }
                    Ok(false) => {}
                    Err(e) => {
                        *coldp = cold;
                        return Err(e);
                    }
                }
                if if shorter { end == estop } else { end == begin } {
                    break;
                }
                // Go around and try again.
                if shorter {
                    estart = end + 1;
                } else {
                    estop = end - 1;
                }
            }
        }
        if close >= len {
            break;
        }
    }

    *coldp = cold;
    Ok(false)
}

/// Initialize all subexpression slots to "no match".
fn zapallsubs(p: &mut [Span]) {
    for slot in p.iter_mut().skip(1) {
        *slot = None;
    }
}

/// The recursive match-point splitter. Owns the per-node DFA cache for one
/// execution; before any level of `cdissect` is entered, the caller has
/// already run the node's DFA over the proposed substring.
struct Dissector<'a, 'b> {
    ex: &'b Exec<'a>,
    pmatch: &'b mut Vec<Span>,
    /// Per-subre DFAs, created once per execution, indexed by node id.
    subdfas: Vec<Option<Dfa<'a>>>,
}

impl<'a, 'b> Dissector<'a, 'b> {
    fn new(ex: &'b Exec<'a>, pmatch: &'b mut Vec<Span>) -> Dissector<'a, 'b> {
        let n = ex.g.ntree;
        Dissector {
            ex,
            pmatch,
            subdfas: (0..n).map(|_| None).collect(),
        }
    }

    fn mtrace(&self, msg: impl FnOnce() -> String) {
        if self.ex.eflags.contains(ExecFlags::MTRACE) {
            trace!("{}", msg());
        }
    }

    /// Run the node's DFA, longest-preferred, over `[start, stop]`.
    fn longest_sub(&mut self, t: &'a Subre, start: usize, stop: usize) -> Option<usize> {
        if self.subdfas[t.id].is_none() {
            debug_assert!(t.cnfa.nstates > 0);
            self.subdfas[t.id] = Some(Dfa::new(self.ex, &t.cnfa));
        }
        let ex = self.ex;
        let d = self.subdfas[t.id].as_mut().unwrap();
        longest(ex, d, start, stop, None)
    }

    /// Run the node's DFA, shortest-preferred.
    fn shortest_sub(&mut self, t: &'a Subre, start: usize, min: usize, max: usize) -> Option<usize> {
        if self.subdfas[t.id].is_none() {
            debug_assert!(t.cnfa.nstates > 0);
            self.subdfas[t.id] = Some(Dfa::new(self.ex, &t.cnfa));
        }
        let ex = self.ex;
        let d = self.subdfas[t.id].as_mut().unwrap();
        shortest(ex, d, start, min, max, None, None)
    }

    /// Check backrefs and determine subexpression matches for the proposed
    /// span `[begin, end)`.
    fn cdissect(&mut self, t: &'a Subre, begin: usize, end: usize) -> Result<bool, Error> {
        self.ex.check()?;
        self.mtrace(|| format!("cdissect {:?} {}-{}", t.op, begin, end));

        let er = match t.op {
            Op::Eq => {
                // Terminal node: no action, the parent ran the DFA.
                debug_assert!(t.left.is_none() && t.right.is_none());
                Ok(true)
            }
            Op::Backref => {
                debug_assert!(t.left.is_none() && t.right.is_none());
                self.cbrdissect(t, begin, end)
            }
            Op::Concat => {
                debug_assert!(t.left.is_some() && t.right.is_some());
                if t.left.as_ref().unwrap().flags.contains(SubFlags::SHORTER) {
                    self.crevcondissect(t, begin, end)
                } else {
                    self.ccondissect(t, begin, end)
                }
            }
            Op::Alt => {
                debug_assert!(t.left.is_some());
                self.caltdissect(Some(t), begin, end)
            }
            Op::Iter => {
                debug_assert!(t.left.is_some());
                if t.left.as_ref().unwrap().flags.contains(SubFlags::SHORTER) {
                    self.creviterdissect(t, begin, end)
                } else {
                    self.citerdissect(t, begin, end)
                }
            }
            Op::Capture => {
                debug_assert!(t.left.is_some() && t.right.is_none());
                debug_assert!(t.subno > 0);
                let er = self.cdissect(t.left.as_deref().unwrap(), begin, end)?;
                if er {
                    self.subset(t, begin, end);
                }
                Ok(er)
            }
        };

        // A match failure can only come from backrefs lurking below;
        // otherwise either the caller failed to check the DFA, or the DFA
        // and the node's innards disagree.
        if let Ok(ok) = er {
            debug_assert!(ok || t.flags.contains(SubFlags::BACKR));
        }
        er
    }

    /// Concatenation: probe midpoints longest-first.
    fn ccondissect(&mut self, t: &'a Subre, begin: usize, end: usize) -> Result<bool, Error> {
        let left = t.left.as_deref().unwrap();
        let right = t.right.as_deref().unwrap();
        debug_assert!(!left.flags.contains(SubFlags::SHORTER));

        let Some(mut mid) = self.longest_sub(left, begin, end) else {
            return Ok(false);
        };
        self.mtrace(|| format!("cconcat {}: tentative midpoint {}", t.id, mid));

        loop {
            // Try this midpoint on for size.
            if self.longest_sub(right, mid, end) == Some(end) {
                let er = self.cdissect(left, begin, mid)?;
                if er && self.cdissect(right, mid, end)? {
                    return Ok(true);
                }
            }
            self.ex.check()?;

            // That midpoint didn't work, find a new one.
            if mid == begin {
                // All possibilities exhausted.
                return Ok(false);
            }
            let Some(newmid) = self.longest_sub(left, begin, mid - 1) else {
                return Ok(false);
            };
            mid = newmid;
            self.mtrace(|| format!("cconcat {}: new midpoint {}", t.id, mid));
            self.zaptreesubs(left);
            self.zaptreesubs(right);
        }
    }

    /// Concatenation with a shortest-preferring left child: probe
    /// midpoints shortest-first.
    fn crevcondissect(&mut self, t: &'a Subre, begin: usize, end: usize) -> Result<bool, Error> {
        let left = t.left.as_deref().unwrap();
        let right = t.right.as_deref().unwrap();
        debug_assert!(left.flags.contains(SubFlags::SHORTER));

        let Some(mut mid) = self.shortest_sub(left, begin, begin, end) else {
            return Ok(false);
        };
        self.mtrace(|| format!("crevcon {}: tentative midpoint {}", t.id, mid));

        loop {
            if self.longest_sub(right, mid, end) == Some(end) {
                let er = self.cdissect(left, begin, mid)?;
                if er && self.cdissect(right, mid, end)? {
                    return Ok(true);
                }
            }
            self.ex.check()?;

            if mid == end {
                return Ok(false);
            }
            let Some(newmid) = self.shortest_sub(left, begin, mid + 1, end) else {
                return Ok(false);
            };
            mid = newmid;
            self.mtrace(|| format!("crevcon {}: new midpoint {}", t.id, mid));
            self.zaptreesubs(left);
            self.zaptreesubs(right);
        }
    }

    /// Backref node: the span must be a whole number of copies of the
    /// captured string, within the node's repetition bounds.
    fn cbrdissect(&mut self, t: &'a Subre, begin: usize, end: usize) -> Result<bool, Error> {
        debug_assert_eq!(t.op, Op::Backref);
        let n = t.subno;
        let (min, max) = (t.min, t.max);
        debug_assert!(n < self.pmatch.len());

        self.mtrace(|| format!("cbackref {} {}{{{}-{}}}", t.id, n, min, max));

        let Some(br) = self.pmatch[n].clone() else {
            return Ok(false);
        };
        let brlen = br.len();

        // Special cases for zero-length strings: an empty capture matches
        // only an empty target (with any number of repetitions deemed
        // present), and an empty target needs zero repetitions allowed.
        if brlen == 0 {
            return Ok(begin == end && min <= max);
        }
        if begin == end {
            return Ok(min == 0);
        }

        let tlen = end - begin;
        if tlen % brlen != 0 {
            return Ok(false);
        }
        let numreps = (tlen / brlen) as u32;
        if numreps < min as u32 || (numreps > max as u32 && max != DUPINF) {
            return Ok(false);
        }

        // Okay, compare the actual string contents.
        let brstring = &self.ex.input[br];
        let mut p = begin;
        for _ in 0..numreps {
            if !(self.ex.g.compare)(brstring, &self.ex.input[p..p + brlen]) {
                return Ok(false);
            }
            p += brlen;
        }

        self.mtrace(|| format!("cbackref {} matched", t.id));
        Ok(true)
    }

    /// Alternation: walk the right-spine, first branch whose DFA accepts
    /// the whole span and whose dissection succeeds wins.
    fn caltdissect(
        &mut self,
        mut t: Option<&'a Subre>,
        begin: usize,
        end: usize,
    ) -> Result<bool, Error> {
        while let Some(node) = t {
            debug_assert_eq!(node.op, Op::Alt);
            let left = node.left.as_deref().unwrap();
            debug_assert!(left.cnfa.nstates > 0);

            if self.longest_sub(left, begin, end) == Some(end) {
                self.mtrace(|| format!("calt {} matched", node.id));
                if self.cdissect(left, begin, end)? {
                    return Ok(true);
                }
            }
            self.ex.check()?;
            t = node.right.as_deref();
        }
        Ok(false)
    }

    /// Iteration: find a set of sub-match endpoints the child DFA accepts,
    /// then verify each sub-match by recursion, backtracking the last
    /// endpoint on failure. `nverified` avoids re-dissecting unchanged
    /// prefix sub-matches.
    fn citerdissect(&mut self, t: &'a Subre, begin: usize, end: usize) -> Result<bool, Error> {
        debug_assert_eq!(t.op, Op::Iter);
        let left = t.left.as_deref().unwrap();
        debug_assert!(!left.flags.contains(SubFlags::SHORTER));
        debug_assert!(begin <= end);

        // If zero matches are allowed and the target is empty, declare
        // victory; otherwise zero matches can't work, so pretend min is 1.
        let mut min_matches = t.min as usize;
        if min_matches == 0 {
            if begin == end {
                return Ok(true);
            }
            min_matches = 1;
        }

        // Normally only nonzero-length sub-matches are considered, so
        // there can be at most end-begin of them; a larger min forces
        // zero-length sub-matches into play. endpts[0] holds "begin", the
        // sub-match endpoints live in endpts[1..=max_matches].
        let mut max_matches = end - begin;
        if max_matches > t.max as usize && t.max != DUPINF {
            max_matches = t.max as usize;
        }
        if max_matches < min_matches {
            max_matches = min_matches;
        }
        let mut endpts = vec![0usize; max_matches + 1];
        endpts[0] = begin;

        self.mtrace(|| format!("citer {}", t.id));

        let mut nverified = 0usize;
        let mut k = 1usize;
        let mut limit = end;

        while k > 0 {
            // Try to find an endpoint for the k'th sub-match.
            let found = self.longest_sub(left, endpts[k - 1], limit);
            self.ex.check()?;
            let backtrack = match found {
                None => {
                    // No match possible; shorten the previous one.
                    k -= 1;
                    true
                }
                Some(e) => {
                    endpts[k] = e;
                    // The k'th sub-match is no longer verified.
                    if nverified >= k {
                        nverified = k - 1;
                    }
                    if endpts[k] != end {
                        // Haven't reached the end; another iteration?
                        if k >= max_matches {
                            k -= 1;
                            true
                        } else if endpts[k] == endpts[k - 1]
                            && (k >= min_matches || min_matches - k < end - endpts[k])
                        {
                            // Zero-length sub-match, not needed for min.
                            true
                        } else {
                            k += 1;
                            limit = end;
                            continue;
                        }
                    } else if k < min_matches {
                        true
                    } else {
                        // The child DFA accepts this division; now the
                        // slow part, verifying each sub-match.
                        self.mtrace(|| {
                            format!("citer {}: verifying {}..{}", t.id, nverified + 1, k)
                        });
                        let mut ok = true;
                        for i in nverified + 1..=k {
                            self.zaptreesubs(left);
                            if self.cdissect(left, endpts[i - 1], endpts[i])? {
                                nverified = i;
                            } else {
                                ok = false;
                                break;
                            }
                        }
                        if ok {
                            self.mtrace(|| format!("citer {} successful", t.id));
                            return Ok(true);
                        }
                        true
                    }
                }
            };

            if backtrack {
                // Consider shorter versions of the current sub-match,
                // asking for a zero-length one only if necessary.
                while k > 0 {
                    let prev_end = endpts[k - 1];
                    if endpts[k] > prev_end {
                        limit = endpts[k] - 1;
                        if limit > prev_end
                            || (k < min_matches && min_matches - k >= end - prev_end)
                        {
                            break;
                        }
                    }
                    k -= 1;
                }
            }
        }

        self.mtrace(|| format!("citer {} failed", t.id));
        Ok(false)
    }

    /// Iteration with a shortest-preferring child: endpoints probed
    /// shortest-first and lengthened on failure.
    fn creviterdissect(&mut self, t: &'a Subre, begin: usize, end: usize) -> Result<bool, Error> {
        debug_assert_eq!(t.op, Op::Iter);
        let left = t.left.as_deref().unwrap();
        debug_assert!(left.flags.contains(SubFlags::SHORTER));
        debug_assert!(begin <= end);

        let mut min_matches = t.min as usize;
        if min_matches == 0 {
            if begin == end {
                return Ok(true);
            }
            min_matches = 1;
        }

        let mut max_matches = end - begin;
        if max_matches > t.max as usize && t.max != DUPINF {
            max_matches = t.max as usize;
        }
        if max_matches < min_matches {
            max_matches = min_matches;
        }
        let mut endpts = vec![0usize; max_matches + 1];
        endpts[0] = begin;

        self.mtrace(|| format!("creviter {}", t.id));

        let mut nverified = 0usize;
        let mut k = 1usize;
        let mut limit = begin;

        while k > 0 {
            // Disallow a zero-length sub-match unless necessary for min.
            if limit == endpts[k - 1]
                && limit != end
                && (k >= min_matches || min_matches - k < end - limit)
            {
                limit += 1;
            }
            // The last allowed sub-match must reach the end.
            if k >= max_matches {
                limit = end;
            }

            let found = self.shortest_sub(left, endpts[k - 1], limit, end);
            self.ex.check()?;
            let backtrack = match found {
                None => {
                    // No match possible; lengthen the previous one.
                    k -= 1;
                    true
                }
                Some(e) => {
                    endpts[k] = e;
                    if nverified >= k {
                        nverified = k - 1;
                    }
                    if endpts[k] != end {
                        if k >= max_matches {
                            k -= 1;
                            true
                        } else {
                            k += 1;
                            limit = endpts[k - 1];
                            continue;
                        }
                    } else if k < min_matches {
                        true
                    } else {
                        self.mtrace(|| {
                            format!("creviter {}: verifying {}..{}", t.id, nverified + 1, k)
                        });
                        let mut ok = true;
                        for i in nverified + 1..=k {
                            self.zaptreesubs(left);
                            if self.cdissect(left, endpts[i - 1], endpts[i])? {
                                nverified = i;
                            } else {
                                ok = false;
                                break;
                            }
                        }
                        if ok {
                            self.mtrace(|| format!("creviter {} successful", t.id));
                            return Ok(true);
                        }
                        true
                    }
                }
            };

            if backtrack {
                // Consider longer versions of the current sub-match.
                while k > 0 {
                    if endpts[k] < end {
                        limit = endpts[k] + 1;
                        break;
                    }
                    k -= 1;
                }
            }
        }

        self.mtrace(|| format!("creviter {} failed", t.id));
        Ok(false)
    }

    /// Record a successful capture.
    fn subset(&mut self, sub: &Subre, begin: usize, end: usize) {
        let n = sub.subno;
        debug_assert!(n > 0);
        if n >= self.pmatch.len() {
            return;
        }
        self.mtrace(|| format!("setting {}", n));
        self.pmatch[n] = Some(begin..end);
    }

    /// Initialize the subtree's capture slots to "no match".
    fn zaptreesubs(&mut self, t: &'a Subre) {
        if t.op == Op::Capture {
            let n = t.subno;
            debug_assert!(n > 0);
            if n < self.pmatch.len() {
                self.pmatch[n] = None;
            }
        }
        if let Some(l) = t.left.as_deref() {
            self.zaptreesubs(l);
        }
        if let Some(r) = t.right.as_deref() {
            self.zaptreesubs(r);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;

    fn exec(pattern: &str, hay: &str, flags: Flags) -> Option<Vec<Span>> {
        let c = compile(pattern, flags).unwrap();
        let chars: Vec<char> = hay.chars().collect();
        c.execute(&chars, c.nsub() + 1, ExecFlags::empty(), None)
            .unwrap()
    }

    fn span0(pattern: &str, hay: &str) -> Option<Range<usize>> {
        exec(pattern, hay, Flags::ADVANCED).and_then(|v| v[0].clone())
    }

    #[test]
    fn finds_leftmost_longest() {
        assert_eq!(span0("a+", "xxaaab"), Some(2..5));
        assert_eq!(span0("a|ab", "xab"), Some(1..3));
        assert_eq!(span0("q", "xxaaab"), None);
    }

    #[test]
    fn captures_resolved() {
        let m = exec("a(b+)c", "zzabbbc", Flags::ADVANCED).unwrap();
        assert_eq!(m[0], Some(2..7));
        assert_eq!(m[1], Some(3..6));
    }

    #[test]
    fn backref_loop() {
        let m = exec(r"(ab)\1+", "xababab!", Flags::ADVANCED).unwrap();
        assert_eq!(m[0], Some(1..7));
        assert_eq!(m[1], Some(1..3));
    }

    #[test]
    fn unmatched_group_is_none() {
        let m = exec("(a)|(b)", "b", Flags::ADVANCED).unwrap();
        assert_eq!(m[0], Some(0..1));
        assert_eq!(m[1], None);
        assert_eq!(m[2], Some(0..1));
    }

    #[test]
    fn nosub_suppresses_captures() {
        let c = compile("(a)(b)", Flags::ADVANCED | Flags::NOSUB).unwrap();
        let chars: Vec<char> = "ab".chars().collect();
        let m = c.execute(&chars, 3, ExecFlags::empty(), None).unwrap();
        assert_eq!(m, Some(vec![]));
    }

    #[test]
    fn notbol_suppresses_caret() {
        let c = compile("^a", Flags::ADVANCED).unwrap();
        let chars: Vec<char> = "ab".chars().collect();
        assert!(c
            .execute(&chars, 1, ExecFlags::empty(), None)
            .unwrap()
            .is_some());
        assert!(c
            .execute(&chars, 1, ExecFlags::NOTBOL, None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn expect_details() {
        let c = compile("abcd", Flags::ADVANCED | Flags::EXPECT).unwrap();
        let chars: Vec<char> = "xxab".chars().collect();
        let mut det = Details::default();
        let m = c
            .execute(&chars, 1, ExecFlags::empty(), Some(&mut det))
            .unwrap();
        assert!(m.is_none());
        // A match could still begin at offset 2.
        assert_eq!(det.extend, 2..4);
        // Details are required once compiled with EXPECT.
        assert_eq!(
            c.execute(&chars, 1, ExecFlags::empty(), None).unwrap_err(),
            Error::InvArg
        );
    }
}
