//! Finite-state grammar: the graph the search walks, plus its own text
//! serialization (spec §6 FSG text format) — both read and write, since
//! testable property 8 (round-trip) is about the core's own data model,
//! not the out-of-scope JSGF grammar parser.

use crate::error::DecoderError;
use crate::logmath::LogMath;
use std::collections::HashMap;

pub const EPSILON_WORD: &str = "<eps>";

#[derive(Debug, Clone)]
pub struct Transition {
    pub from: usize,
    pub to: usize,
    /// Natural-log arc probability (0.0 = certain). Converted to the
    /// scaled-log domain by the search via the shared [`LogMath`].
    pub logprob: f64,
    /// `None` means an epsilon arc (spec §4.5 "Arcs labeled epsilon").
    pub word: Option<String>,
}

pub struct Fsg {
    name: String,
    n_states: usize,
    start_state: usize,
    final_states: Vec<bool>,
    /// `from -> list of transition indices`
    out_arcs: Vec<Vec<usize>>,
    transitions: Vec<Transition>,
    /// `(from, to, word)` -> transition index, for duplicate-link folding.
    index: HashMap<(usize, usize, Option<String>), usize>,
    /// Precomputed epsilon-closure: state -> set of states reachable via
    /// epsilon arcs only (spec §4.5: "at most one hop is needed").
    epsilon_closure: Vec<Vec<usize>>,
}

impl Fsg {
    pub fn new(name: impl Into<String>, n_states: usize, start_state: usize) -> Result<Self, DecoderError> {
        if start_state >= n_states {
            return Err(DecoderError::Configuration(format!(
                "start state {start_state} out of range for {n_states} states"
            )));
        }
        Ok(Self {
            name: name.into(),
            n_states,
            start_state,
            final_states: vec![false; n_states],
            out_arcs: vec![Vec::new(); n_states],
            transitions: Vec::new(),
            index: HashMap::new(),
            epsilon_closure: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn n_states(&self) -> usize {
        self.n_states
    }

    pub fn start_state(&self) -> usize {
        self.start_state
    }

    pub fn set_final(&mut self, state: usize, is_final: bool) -> Result<(), DecoderError> {
        if state >= self.n_states {
            return Err(DecoderError::Configuration(format!("state {state} out of range")));
        }
        self.final_states[state] = is_final;
        Ok(())
    }

    pub fn is_final(&self, state: usize) -> bool {
        self.final_states.get(state).copied().unwrap_or(false)
    }

    /// Add a transition. If one already exists for this exact
    /// `(from, to, word)` triple, keep the higher (less negative, more
    /// probable) `logprob` instead of adding a parallel arc — ported
    /// from `original_source/src/fsg_model.c`'s `fsg_model_trans_add`
    /// duplicate-link folding, load-bearing for testable property 8.
    pub fn add_transition(
        &mut self,
        from: usize,
        to: usize,
        logprob: f64,
        word: Option<String>,
    ) -> Result<(), DecoderError> {
        if from >= self.n_states || to >= self.n_states {
            return Err(DecoderError::Configuration(format!(
                "transition {from}->{to} out of range for {} states",
                self.n_states
            )));
        }
        let key = (from, to, word.clone());
        if let Some(&existing) = self.index.get(&key) {
            if logprob > self.transitions[existing].logprob {
                self.transitions[existing].logprob = logprob;
            }
            return Ok(());
        }
        let idx = self.transitions.len();
        self.transitions.push(Transition { from, to, logprob, word });
        self.out_arcs[from].push(idx);
        self.index.insert(key, idx);
        self.epsilon_closure.clear(); // stale, recomputed lazily
        Ok(())
    }

    /// Add a self-loop transition labeled `word` to `state` (or to every
    /// state, if `state` is `None`), at natural-log probability `prob` —
    /// ported from `original_source/src/fsg_model.c`'s
    /// `fsg_model_add_silence`. Spec §3's FSG invariant requires silence
    /// and filler self-loops "inserted on every state at construction";
    /// `install_fsg` calls this once per filler word right after the
    /// grammar is built, gated on `fsgusefiller`. Returns the number of
    /// transitions added.
    pub fn add_silence(
        &mut self,
        word: impl Into<String>,
        state: Option<usize>,
        prob: f64,
    ) -> Result<usize, DecoderError> {
        let word = word.into();
        let logprob = prob.ln();
        let states: Vec<usize> = match state {
            Some(s) => vec![s],
            None => (0..self.n_states).collect(),
        };
        let mut added = 0;
        for s in states {
            self.add_transition(s, s, logprob, Some(word.clone()))?;
            added += 1;
        }
        Ok(added)
    }

    /// Duplicate every transition labeled `baseword` as a parallel arc
    /// labeled `altword`, same `from`/`to`/`logprob` — ported from
    /// `original_source/src/fsg_model.c`'s `fsg_model_add_alt`. Lets an
    /// alternate word form (e.g. a second spelling or a variant lexicon
    /// entry) ride the same arcs as the word it's an alternate of.
    /// Returns the number of transitions added.
    pub fn add_alt(&mut self, baseword: &str, altword: &str) -> Result<usize, DecoderError> {
        let matches: Vec<(usize, usize, f64)> = self
            .transitions
            .iter()
            .filter(|t| t.word.as_deref() == Some(baseword))
            .map(|t| (t.from, t.to, t.logprob))
            .collect();
        let mut added = 0;
        for (from, to, logprob) in matches {
            self.add_transition(from, to, logprob, Some(altword.to_string()))?;
            added += 1;
        }
        Ok(added)
    }

    /// Outgoing transition indices of `state`, in stable enumeration
    /// order (spec §4.5 "the enumeration order is stable across runs").
    pub fn out_arcs(&self, state: usize) -> &[usize] {
        self.out_arcs.get(state).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn transition(&self, idx: usize) -> &Transition {
        &self.transitions[idx]
    }

    pub fn n_transitions(&self) -> usize {
        self.transitions.len()
    }

    /// States reachable from `state` by following only epsilon arcs,
    /// including `state` itself. Computed on first use and cached.
    pub fn epsilon_closure(&mut self, state: usize) -> &[usize] {
        if self.epsilon_closure.is_empty() {
            self.epsilon_closure = (0..self.n_states).map(|s| self.compute_closure(s)).collect();
        }
        &self.epsilon_closure[state]
    }

    fn compute_closure(&self, start: usize) -> Vec<usize> {
        let mut seen = vec![false; self.n_states];
        let mut stack = vec![start];
        let mut out = Vec::new();
        seen[start] = true;
        while let Some(s) = stack.pop() {
            out.push(s);
            for &arc_idx in &self.out_arcs[s] {
                let t = &self.transitions[arc_idx];
                if t.word.is_none() && !seen[t.to] {
                    seen[t.to] = true;
                    stack.push(t.to);
                }
            }
        }
        out.sort_unstable();
        out
    }

    /// Write the text FSG format (spec §6): `FSG_BEGIN name` /
    /// `NUM_STATES n` / `START_STATE n` / `FINAL_STATE n` (one per final
    /// state) / `TRANSITION from to prob [word]` body / `FSG_END`.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("FSG_BEGIN {}\n", self.name));
        out.push_str(&format!("NUM_STATES {}\n", self.n_states));
        out.push_str(&format!("START_STATE {}\n", self.start_state));
        for (s, &is_final) in self.final_states.iter().enumerate() {
            if is_final {
                out.push_str(&format!("FINAL_STATE {s}\n"));
            }
        }
        for t in &self.transitions {
            match &t.word {
                Some(w) => out.push_str(&format!("TRANSITION {} {} {} {}\n", t.from, t.to, t.logprob, w)),
                None => out.push_str(&format!("TRANSITION {} {} {}\n", t.from, t.to, t.logprob)),
            }
        }
        out.push_str("FSG_END\n");
        out
    }

    /// Parse the text FSG format written by [`Fsg::to_text`].
    pub fn from_text(text: &str) -> Result<Self, DecoderError> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty() && !l.starts_with('#'));
        let header = lines.next().ok_or_else(|| DecoderError::Configuration("empty FSG text".into()))?;
        let name = header
            .strip_prefix("FSG_BEGIN")
            .map(str::trim)
            .ok_or_else(|| DecoderError::Configuration("expected FSG_BEGIN".into()))?;

        let mut n_states = None;
        let mut start_state = None;
        let mut finals = Vec::new();
        let mut pending_transitions = Vec::new();

        for line in lines {
            if line == "FSG_END" {
                break;
            }
            let mut parts = line.split_whitespace();
            match parts.next() {
                Some("NUM_STATES") => {
                    n_states = Some(parse_usize(parts.next(), "NUM_STATES")?);
                }
                Some("START_STATE") => {
                    start_state = Some(parse_usize(parts.next(), "START_STATE")?);
                }
                Some("FINAL_STATE") => {
                    finals.push(parse_usize(parts.next(), "FINAL_STATE")?);
                }
                Some("TRANSITION") => {
                    let from = parse_usize(parts.next(), "TRANSITION from")?;
                    let to = parse_usize(parts.next(), "TRANSITION to")?;
                    let prob_str = parts
                        .next()
                        .ok_or_else(|| DecoderError::Configuration("TRANSITION missing prob".into()))?;
                    let prob: f64 = prob_str
                        .parse()
                        .map_err(|_| DecoderError::Configuration(format!("bad probability '{prob_str}'")))?;
                    let word = parts.next().map(str::to_string);
                    pending_transitions.push((from, to, prob, word));
                }
                Some(other) => {
                    return Err(DecoderError::Configuration(format!("unexpected FSG directive '{other}'")))
                }
                None => {}
            }
        }

        let n_states = n_states.ok_or_else(|| DecoderError::Configuration("missing NUM_STATES".into()))?;
        let start_state =
            start_state.ok_or_else(|| DecoderError::Configuration("missing START_STATE".into()))?;
        let mut fsg = Fsg::new(name, n_states, start_state)?;
        for s in finals {
            fsg.set_final(s, true)?;
        }
        for (from, to, prob, word) in pending_transitions {
            fsg.add_transition(from, to, prob, word)?;
        }
        Ok(fsg)
    }

    /// Convert every transition's natural-log `logprob` to the scaled
    /// log-semiring domain used by the search, applying the language
    /// weight and word-insertion penalty (spec §6 `lw`, `wip`).
    pub fn arc_cost(&self, logmath: &LogMath, transition_idx: usize, lw: f64, wip: f64) -> i32 {
        let t = &self.transitions[transition_idx];
        let weighted = t.logprob * lw;
        let base = logmath.ln_to_log(weighted);
        if t.word.is_some() {
            base.saturating_add(logmath.ln_to_log(wip.ln()))
        } else {
            base
        }
    }
}

fn parse_usize(tok: Option<&str>, field: &str) -> Result<usize, DecoderError> {
    tok.and_then(|s| s.parse().ok())
        .ok_or_else(|| DecoderError::Configuration(format!("missing/invalid {field}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_chain(words: &[&str]) -> Fsg {
        let n = words.len() + 1;
        let mut fsg = Fsg::new("chain", n, 0).unwrap();
        fsg.set_final(n - 1, true).unwrap();
        for (i, w) in words.iter().enumerate() {
            fsg.add_transition(i, i + 1, 0.0, Some(w.to_string())).unwrap();
        }
        fsg
    }

    #[test]
    fn round_trips_through_text_format() {
        let fsg = linear_chain(&["go", "forward", "ten", "meters"]);
        let text = fsg.to_text();
        let parsed = Fsg::from_text(&text).unwrap();
        assert_eq!(parsed.n_states(), fsg.n_states());
        assert_eq!(parsed.start_state(), fsg.start_state());
        assert_eq!(parsed.n_transitions(), fsg.n_transitions());
        for s in 0..fsg.n_states() {
            assert_eq!(parsed.is_final(s), fsg.is_final(s));
        }
        for i in 0..fsg.n_transitions() {
            assert_eq!(parsed.transition(i).from, fsg.transition(i).from);
            assert_eq!(parsed.transition(i).to, fsg.transition(i).to);
            assert_eq!(parsed.transition(i).word, fsg.transition(i).word);
        }
    }

    #[test]
    fn duplicate_link_keeps_higher_logprob() {
        let mut fsg = Fsg::new("dup", 2, 0).unwrap();
        fsg.add_transition(0, 1, -5.0, Some("a".into())).unwrap();
        fsg.add_transition(0, 1, -1.0, Some("a".into())).unwrap();
        assert_eq!(fsg.n_transitions(), 1);
        assert_eq!(fsg.transition(0).logprob, -1.0);

        // A lower logprob added afterward must not regress it.
        fsg.add_transition(0, 1, -9.0, Some("a".into())).unwrap();
        assert_eq!(fsg.n_transitions(), 1);
        assert_eq!(fsg.transition(0).logprob, -1.0);
    }

    #[test]
    fn distinct_words_on_same_edge_stay_distinct() {
        let mut fsg = Fsg::new("multi", 2, 0).unwrap();
        fsg.add_transition(0, 1, -1.0, Some("a".into())).unwrap();
        fsg.add_transition(0, 1, -1.0, Some("b".into())).unwrap();
        assert_eq!(fsg.n_transitions(), 2);
    }

    #[test]
    fn epsilon_closure_is_transitive() {
        let mut fsg = Fsg::new("eps", 3, 0).unwrap();
        fsg.add_transition(0, 1, 0.0, None).unwrap();
        fsg.add_transition(1, 2, 0.0, None).unwrap();
        let closure = fsg.epsilon_closure(0).to_vec();
        assert_eq!(closure, vec![0, 1, 2]);
    }

    #[test]
    fn add_silence_loops_every_state_by_default() {
        let mut fsg = linear_chain(&["go"]);
        let added = fsg.add_silence("<sil>", None, 0.005).unwrap();
        assert_eq!(added, fsg.n_states());
        for s in 0..fsg.n_states() {
            let has_loop = fsg
                .out_arcs(s)
                .iter()
                .map(|&i| fsg.transition(i))
                .any(|t| t.from == s && t.to == s && t.word.as_deref() == Some("<sil>"));
            assert!(has_loop, "state {s} missing silence self-loop");
        }
    }

    #[test]
    fn add_silence_can_target_one_state() {
        let mut fsg = linear_chain(&["go"]);
        let added = fsg.add_silence("<sil>", Some(0), 0.005).unwrap();
        assert_eq!(added, 1);
        assert!(fsg.out_arcs(1).iter().all(|&i| fsg.transition(i).word.as_deref() != Some("<sil>")));
    }

    #[test]
    fn add_alt_mirrors_every_baseword_transition() {
        let mut fsg = Fsg::new("alt", 3, 0).unwrap();
        fsg.add_transition(0, 1, -1.0, Some("read".into())).unwrap();
        fsg.add_transition(1, 2, -1.0, Some("read".into())).unwrap();
        let added = fsg.add_alt("read", "read(2)").unwrap();
        assert_eq!(added, 2);
        assert_eq!(fsg.n_transitions(), 4);
        let alt_count = (0..fsg.n_transitions())
            .filter(|&i| fsg.transition(i).word.as_deref() == Some("read(2)"))
            .count();
        assert_eq!(alt_count, 2);
    }

    #[test]
    fn rejects_out_of_range_states() {
        let mut fsg = Fsg::new("bad", 2, 0).unwrap();
        assert!(fsg.add_transition(0, 5, 0.0, None).is_err());
        assert!(fsg.set_final(5, true).is_err());
    }
}
