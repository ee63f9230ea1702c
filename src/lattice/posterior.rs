//! Best-path rescoring and forward/backward posterior computation
//! (spec §4.6), including the REDESIGN-FLAGGED `Z`-clamp rule (spec §9
//! open question 2): if `Z <= worst_representable + beam`, pruning is
//! skipped and a warning is logged instead of silently discarding the
//! entire lattice.

use super::Lattice;
use crate::logmath::LogMath;
use crate::logsink::LogSink;

/// Rescore by forward topological relaxation: `path_score = ascr +
/// max(predecessor path_score)`. Also computes `alpha` (log-sum over
/// predecessors, acoustic scores scaled by `ascale`). Returns the index
/// of the best-scoring link into the lattice's final node.
pub fn rescore(lattice: &mut Lattice, logmath: &LogMath, ascale: f64) -> Option<usize> {
    let order = lattice.topo_order();
    let zero = logmath.zero();

    for &link_idx in &order {
        let from = lattice.links[link_idx].from;
        let preds = &lattice.in_links[from];
        let best_pred_path = preds.iter().map(|&p| lattice.links[p].path_score).max().unwrap_or(0);
        let best_pred_alpha = preds.iter().map(|&p| lattice.links[p].alpha).fold(zero, i32::max);

        let scaled_ascr = (lattice.links[link_idx].ascr as f64 * ascale) as i32;
        lattice.links[link_idx].path_score = best_pred_path.saturating_add(lattice.links[link_idx].ascr);

        let ascr_in = if preds.is_empty() { scaled_ascr } else { best_pred_alpha.saturating_add(scaled_ascr) };
        let mut alpha = zero;
        for &p in preds {
            alpha = logmath.add(alpha, lattice.links[p].alpha.saturating_add(scaled_ascr));
        }
        lattice.links[link_idx].alpha = if preds.is_empty() { ascr_in } else { alpha };
    }

    lattice
        .in_links
        .get(lattice.final_node)
        .into_iter()
        .flatten()
        .copied()
        .max_by_key(|&l| lattice.links[l].path_score)
}

/// Backward relaxation to compute `beta`, the normalizer `Z`, and
/// per-edge/per-node posteriors; prunes edges below `beam` unless the
/// `Z`-clamp rule fires.
pub fn compute_posteriors(
    lattice: &mut Lattice,
    logmath: &LogMath,
    ascale: f64,
    beam_logb: i32,
    sink: &mut LogSink,
) {
    let zero = logmath.zero();
    let order = lattice.topo_order();

    for &link_idx in order.iter().rev() {
        let to = lattice.links[link_idx].to;
        let succs = &lattice.out_links[to];
        let mut beta = zero;
        for &s in succs {
            let scaled = (lattice.links[s].ascr as f64 * ascale) as i32;
            beta = logmath.add(beta, lattice.links[s].beta.saturating_add(scaled));
        }
        lattice.links[link_idx].beta = if succs.is_empty() { 0 } else { beta };
    }

    let z = lattice
        .in_links
        .get(lattice.final_node)
        .into_iter()
        .flatten()
        .fold(zero, |acc, &l| logmath.add(acc, lattice.links[l].alpha));

    let worst_representable = zero;
    if z <= worst_representable.saturating_add(beam_logb) {
        sink.warn(format_args!(
            "posterior Z at the degenerate floor; skipping edge pruning for this lattice"
        ));
        return;
    }

    let threshold = z.saturating_add(beam_logb);
    let mut keep = vec![true; lattice.links.len()];
    for (i, link) in lattice.links.iter().enumerate() {
        let posterior = link.alpha.saturating_add(link.beta).saturating_sub(z);
        if posterior < threshold {
            keep[i] = false;
        }
    }
    prune_links(lattice, &keep);
}

/// Walk the best path from the final node back to the start, by
/// max-`path_score` predecessor at each step, and return the link
/// indices in forward (start-to-end) order. Only meaningful after
/// [`rescore`] has populated `path_score` on every link; a lattice with
/// no reachable final node yields an empty vector.
pub fn best_path_links(lattice: &Lattice) -> Vec<usize> {
    let mut links = Vec::new();
    let mut node = lattice.final_node;
    loop {
        let incoming = &lattice.in_links[node];
        let Some(&best) = incoming.iter().max_by_key(|&&l| lattice.links[l].path_score) else {
            break;
        };
        links.push(best);
        node = lattice.links[best].from;
    }
    links.reverse();
    links
}

fn prune_links(lattice: &mut Lattice, keep: &[bool]) {
    let kept_links: Vec<super::LatticeLink> = lattice
        .links
        .iter()
        .zip(keep.iter())
        .filter_map(|(l, &k)| if k { Some(l.clone()) } else { None })
        .collect();
    lattice.links = kept_links;
    for v in &mut lattice.out_links {
        v.clear();
    }
    for v in &mut lattice.in_links {
        v.clear();
    }
    for (i, l) in lattice.links.iter().enumerate() {
        lattice.out_links[l.from].push(i);
        lattice.in_links[l.to].push(i);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logsink::LogSink;
    use crate::search::{BackpointerEntry, BackpointerTable};

    fn small_lattice() -> Lattice {
        let mut bp = BackpointerTable::new(0);
        bp.begin_frame(0);
        let a = bp.push(BackpointerEntry { word: Some("GO".into()), frame: 5, score: -10, predecessor: Some(bp.root()), fsg_state: 1 });
        bp.begin_frame(1);
        let b = bp.push(BackpointerEntry { word: Some("FORWARD".into()), frame: 10, score: -25, predecessor: Some(a), fsg_state: 2 });
        let penalties = super::super::FillerPenalties {
            silence_words: Default::default(),
            filler_words: Default::default(),
            silence_penalty: 0,
            filler_penalty: 0,
        };
        super::super::Lattice::from_backpointers(&bp, b, &penalties)
    }

    #[test]
    fn rescore_finds_a_best_link_into_final_node() {
        let lm = LogMath::default_base();
        let mut lat = small_lattice();
        let best = rescore(&mut lat, &lm, 1.0);
        assert!(best.is_some());
    }

    #[test]
    fn forward_backward_identity_holds_on_bestpath() {
        let lm = LogMath::default_base();
        let mut lat = small_lattice();
        let best = rescore(&mut lat, &lm, 1.0).unwrap();
        let mut sink = LogSink::new();
        // A beam of probability 1.0 (logb 0) keeps everything; use a
        // tiny width so the Z-clamp rule doesn't fire in this toy case.
        compute_posteriors(&mut lat, &lm, 1.0, lm.log(1e-10), &mut sink);
        let z = lat
            .in_links
            .get(lat.final_node)
            .into_iter()
            .flatten()
            .fold(lm.zero(), |acc, &l| lm.add(acc, lat.links[l].alpha));
        let edge = &lat.links[best.min(lat.links.len() - 1)];
        assert!(edge.alpha.saturating_add(edge.beta) <= z);
    }
}
