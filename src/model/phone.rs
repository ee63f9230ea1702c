//! Phonetic model definition (spec §3, §6): base phones, triphones,
//! their senone-sequence ids, and the triphone-context map.
//!
//! As with the other model tables, parsing the on-disk `mdef` format is
//! out of scope; this type is built from already-resolved phone and
//! triphone tables.

use crate::error::DecoderError;
use std::collections::HashMap;

/// Word position of a triphone within its word, affecting which
/// contexts apply (matches the sphinx `wpos` convention: word-internal,
/// begin, end, single-phone-word, or context-independent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WordPosition {
    Internal,
    Begin,
    End,
    Single,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriphoneKey {
    pub base: String,
    pub left: Option<String>,
    pub right: Option<String>,
    pub position: WordPosition,
}

pub struct PhoneticModel {
    base_phones: Vec<String>,
    base_index: HashMap<String, usize>,
    /// Senone ids for each distinct state-sequence, one per triphone;
    /// index is the "senone-sequence id" referenced by HMM instances.
    senone_sequences: Vec<[u32; 3]>,
    /// Maps a fully-specified triphone context to a senone-sequence id.
    triphone_map: HashMap<TriphoneKey, usize>,
    /// Base-phone index -> transition-matrix id (spec §3: "a reference
    /// to a transition-matrix id (one per base phone)").
    tmat_for_base: Vec<usize>,
}

impl PhoneticModel {
    pub fn new(base_phones: Vec<String>) -> Self {
        let base_index = base_phones
            .iter()
            .enumerate()
            .map(|(i, p)| (p.clone(), i))
            .collect();
        let n = base_phones.len();
        Self {
            base_phones,
            base_index,
            senone_sequences: Vec::new(),
            triphone_map: HashMap::new(),
            tmat_for_base: (0..n).collect(),
        }
    }

    pub fn base_phones(&self) -> &[String] {
        &self.base_phones
    }

    pub fn base_index(&self, phone: &str) -> Option<usize> {
        self.base_index.get(phone).copied()
    }

    pub fn set_tmat_for_base(&mut self, base_idx: usize, tmat_id: usize) -> Result<(), DecoderError> {
        if base_idx >= self.tmat_for_base.len() {
            return Err(DecoderError::Model(format!("unknown base phone index {base_idx}")));
        }
        self.tmat_for_base[base_idx] = tmat_id;
        Ok(())
    }

    pub fn tmat_for_base(&self, base_idx: usize) -> Option<usize> {
        self.tmat_for_base.get(base_idx).copied()
    }

    /// Register a triphone with its 3 senone ids; returns the assigned
    /// senone-sequence id, reusing an existing one if this exact
    /// `[u32; 3]` sequence was already registered (senone sequences are
    /// shared across identical triphones, spec §3).
    pub fn add_triphone(&mut self, key: TriphoneKey, senones: [u32; 3]) -> usize {
        let seq_id = if let Some(existing) = self
            .senone_sequences
            .iter()
            .position(|s| *s == senones)
        {
            existing
        } else {
            self.senone_sequences.push(senones);
            self.senone_sequences.len() - 1
        };
        self.triphone_map.insert(key, seq_id);
        seq_id
    }

    pub fn lookup_triphone(&self, key: &TriphoneKey) -> Option<usize> {
        self.triphone_map.get(key).copied()
    }

    pub fn senones(&self, seq_id: usize) -> Option<[u32; 3]> {
        self.senone_sequences.get(seq_id).copied()
    }

    pub fn n_senone_sequences(&self) -> usize {
        self.senone_sequences.len()
    }
}
