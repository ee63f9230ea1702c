//! Word lattice (spec §4.5 "Lattice construction", §4.6): built from a
//! finished search's backpointer table, then rescored/pruned/iterated by
//! the sibling `posterior` and `nbest` modules.

pub mod alignment;
pub mod nbest;
pub mod posterior;

use crate::search::{BackpointerEntry, BackpointerTable};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct LatticeNode {
    pub word: Option<String>,
    pub start_frame: u32,
}

#[derive(Debug, Clone)]
pub struct LatticeLink {
    pub from: usize,
    pub to: usize,
    /// Acoustic score of this link alone (this entry's score minus its
    /// predecessor's cumulative score).
    pub ascr: i32,
    pub end_frame: u32,
    /// Filled in by `posterior::rescore`.
    pub path_score: i32,
    pub alpha: i32,
    pub beta: i32,
}

pub struct Lattice {
    pub nodes: Vec<LatticeNode>,
    pub links: Vec<LatticeLink>,
    /// node index -> outgoing link indices
    pub out_links: Vec<Vec<usize>>,
    /// node index -> incoming link indices
    pub in_links: Vec<Vec<usize>>,
    pub final_node: usize,
}

/// Silence/filler penalty applied to links ending in one of these words
/// (spec §4.6 "Filler-word treatment"). Plain additive offsets in the
/// scaled-log domain.
pub struct FillerPenalties {
    pub silence_words: HashSet<String>,
    pub filler_words: HashSet<String>,
    pub silence_penalty: i32,
    pub filler_penalty: i32,
}

impl Lattice {
    /// Build by walking the backpointer table end-to-start (spec §4.5):
    /// each distinct `(word, start-frame)` pair becomes a node, each
    /// backpointer entry a link from its predecessor's node to this
    /// one. Nodes not co-reachable from `final_entry` are deleted.
    pub fn from_backpointers(
        bp: &BackpointerTable,
        final_entry: usize,
        penalties: &FillerPenalties,
    ) -> Self {
        // First pass: every entry on some path to final_entry.
        let mut reachable_backward: HashSet<usize> = HashSet::new();
        let mut stack = vec![final_entry];
        while let Some(idx) = stack.pop() {
            if !reachable_backward.insert(idx) {
                continue;
            }
            if let Some(p) = bp.get(idx).predecessor {
                stack.push(p);
            }
        }

        let mut node_of_key: HashMap<(Option<String>, u32), usize> = HashMap::new();
        let mut nodes = Vec::new();
        let mut node_for_entry: HashMap<usize, usize> = HashMap::new();

        let mut entry_indices: Vec<usize> = reachable_backward.iter().copied().collect();
        entry_indices.sort_unstable();

        for &idx in &entry_indices {
            let e = bp.get(idx);
            let key = (e.word.clone(), entry_start_frame(bp, idx));
            let node_idx = *node_of_key.entry(key).or_insert_with(|| {
                nodes.push(LatticeNode { word: e.word.clone(), start_frame: entry_start_frame(bp, idx) });
                nodes.len() - 1
            });
            node_for_entry.insert(idx, node_idx);
        }

        let mut links = Vec::new();
        for &idx in &entry_indices {
            let e = bp.get(idx);
            let Some(pred) = e.predecessor else { continue };
            if !node_for_entry.contains_key(&pred) {
                continue;
            }
            let from = node_for_entry[&pred];
            let to = node_for_entry[&idx];
            let pred_score = bp.get(pred).score;
            let mut ascr = e.score.saturating_sub(pred_score);
            if let Some(w) = &e.word {
                if penalties.silence_words.contains(w) {
                    ascr = ascr.saturating_add(penalties.silence_penalty);
                } else if penalties.filler_words.contains(w) {
                    ascr = ascr.saturating_add(penalties.filler_penalty);
                }
            }
            links.push(LatticeLink { from, to, ascr, end_frame: e.frame, path_score: i32::MIN, alpha: i32::MIN, beta: i32::MIN });
        }

        let final_node = node_for_entry[&final_entry];

        let mut out_links = vec![Vec::new(); nodes.len()];
        let mut in_links = vec![Vec::new(); nodes.len()];
        for (i, l) in links.iter().enumerate() {
            out_links[l.from].push(i);
            in_links[l.to].push(i);
        }

        Self { nodes, links, out_links, in_links, final_node }
    }

    /// Topological order by `start_frame`/`end_frame`, stable enough for
    /// forward relaxation since the backpointer table is already
    /// frame-monotonic.
    pub fn topo_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.links.len()).collect();
        order.sort_by_key(|&i| self.links[i].end_frame);
        order
    }
}

fn entry_start_frame(bp: &BackpointerTable, idx: usize) -> u32 {
    match bp.get(idx).predecessor {
        Some(p) => bp.get(p).frame,
        None => bp.get(idx).frame,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::BackpointerEntry;

    fn make_bp() -> (BackpointerTable, usize) {
        let mut bp = BackpointerTable::new(0);
        bp.begin_frame(0);
        let a = bp.push(BackpointerEntry { word: Some("GO".into()), frame: 5, score: -10, predecessor: Some(bp.root()), fsg_state: 1 });
        bp.begin_frame(1);
        let b = bp.push(BackpointerEntry { word: Some("FORWARD".into()), frame: 10, score: -25, predecessor: Some(a), fsg_state: 2 });
        (bp, b)
    }

    #[test]
    fn builds_one_node_per_word_and_one_link_per_entry() {
        let (bp, final_entry) = make_bp();
        let penalties = FillerPenalties { silence_words: Default::default(), filler_words: Default::default(), silence_penalty: 0, filler_penalty: 0 };
        let lat = Lattice::from_backpointers(&bp, final_entry, &penalties);
        assert_eq!(lat.nodes.len(), 3); // root + GO + FORWARD
        assert_eq!(lat.links.len(), 2);
    }

    #[test]
    fn link_ascr_is_score_delta() {
        let (bp, final_entry) = make_bp();
        let penalties = FillerPenalties { silence_words: Default::default(), filler_words: Default::default(), silence_penalty: 0, filler_penalty: 0 };
        let lat = Lattice::from_backpointers(&bp, final_entry, &penalties);
        let last_link = lat.links.iter().find(|l| l.end_frame == 10).unwrap();
        assert_eq!(last_link.ascr, -25 - -10);
    }

    #[test]
    fn silence_penalty_applies_to_matching_links() {
        let mut bp = BackpointerTable::new(0);
        bp.begin_frame(0);
        let a = bp.push(BackpointerEntry { word: Some("<sil>".into()), frame: 3, score: -4, predecessor: Some(bp.root()), fsg_state: 1 });
        let penalties = FillerPenalties {
            silence_words: ["<sil>".to_string()].into_iter().collect(),
            filler_words: Default::default(),
            silence_penalty: -7,
            filler_penalty: 0,
        };
        let lat = Lattice::from_backpointers(&bp, a, &penalties);
        assert_eq!(lat.links[0].ascr, -4 + -7);
    }
}
