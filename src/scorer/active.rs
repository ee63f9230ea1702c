//! Active-senone list: bit-vector → sorted delta-compressed list (spec
//! §4.3 "Active-senone list").
//!
//! Deltas wider than 255 are bridged with zero-value placeholder
//! entries rather than widening the delta representation — "a harmless
//! extra evaluation, preferable to widening the representation".

const MAX_DELTA: u32 = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSenoneList {
    /// Deltas between consecutive active senone ids, first delta is
    /// relative to 0. A `0` delta mid-list is a bridging placeholder,
    /// not a real repeated senone.
    deltas: Vec<u8>,
}

impl ActiveSenoneList {
    /// Build from an explicit bit-vector, one bool per senone id.
    pub fn from_bitvec(bits: &[bool]) -> Self {
        let ids: Vec<usize> = bits
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| if b { Some(i) } else { None })
            .collect();
        Self::from_sorted_ids(&ids)
    }

    /// Build directly from an already-sorted, deduplicated id list.
    pub fn from_sorted_ids(ids: &[usize]) -> Self {
        let mut deltas = Vec::with_capacity(ids.len());
        let mut prev: i64 = -1;
        for &id in ids {
            let mut gap = id as i64 - prev;
            debug_assert!(gap > 0, "active senone ids must be sorted and deduplicated");
            while gap as u32 > MAX_DELTA {
                deltas.push(0); // bridge placeholder: advances prev by MAX_DELTA
                gap -= MAX_DELTA as i64;
            }
            deltas.push(gap as u8);
            prev = id as i64;
        }
        Self { deltas }
    }

    /// Expand back to the sorted list of real active senone ids,
    /// skipping the bridging placeholders.
    pub fn decode(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut cur: i64 = -1;
        let mut pending_bridge = false;
        for &d in &self.deltas {
            if d == 0 {
                cur += MAX_DELTA as i64;
                pending_bridge = true;
                continue;
            }
            cur += d as i64;
            out.push(cur as usize);
            pending_bridge = false;
        }
        debug_assert!(!pending_bridge, "active list must not end on a bridge placeholder");
        out
    }

    pub fn len(&self) -> usize {
        self.decode().len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_simple_list() {
        let ids = vec![0, 3, 4, 100];
        let list = ActiveSenoneList::from_sorted_ids(&ids);
        assert_eq!(list.decode(), ids);
    }

    #[test]
    fn round_trips_from_bitvec() {
        let mut bits = vec![false; 10];
        bits[1] = true;
        bits[2] = true;
        bits[9] = true;
        let list = ActiveSenoneList::from_bitvec(&bits);
        assert_eq!(list.decode(), vec![1, 2, 9]);
    }

    #[test]
    fn bridges_deltas_wider_than_255() {
        let ids = vec![0, 1000];
        let list = ActiveSenoneList::from_sorted_ids(&ids);
        // gap of 1000 needs 3 bridge placeholders (3*255=765) plus a
        // final real delta of 1000-765=235.
        assert_eq!(list.decode(), ids);
        assert!(list.deltas.iter().filter(|&&d| d == 0).count() >= 3);
    }

    #[test]
    fn empty_list_round_trips() {
        let list = ActiveSenoneList::from_sorted_ids(&[]);
        assert!(list.is_empty());
        assert_eq!(list.decode(), Vec::<usize>::new());
    }
}
