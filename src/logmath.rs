//! Scaled negative-log-probability semiring (spec §2, §3 "Log-semiring").
//!
//! Probabilities flow through the whole pipeline as `i32`s in this
//! domain: `logb(p) = log(p) / log(base)`, rounded and right-shifted by
//! a configurable `shift` to keep the dynamic range inside `i32` without
//! overflow. Since `0 < p <= 1`, every finite value is non-positive;
//! `0` represents certainty (`p == 1`) and `zero()` (a large negative
//! sentinel, not literal zero) represents impossibility (`p == 0`).
//! `add` computes `logb(p + q)` from `logb(p)` and `logb(q)` via a
//! precomputed lookup table instead of calling `exp`/`log` on the hot
//! path, exactly as `original_source/src/logmath.c` does.

use std::sync::Arc;

/// log-add table entry width, chosen from `base` at construction so the
/// table never needs more than 4 bytes per entry.
#[derive(Clone)]
enum AddTable {
    W1(Vec<u8>),
    W2(Vec<u16>),
    W4(Vec<u32>),
}

impl AddTable {
    fn len(&self) -> usize {
        match self {
            AddTable::W1(v) => v.len(),
            AddTable::W2(v) => v.len(),
            AddTable::W4(v) => v.len(),
        }
    }

    fn get(&self, i: usize) -> i64 {
        match self {
            AddTable::W1(v) => v[i] as i64,
            AddTable::W2(v) => v[i] as i64,
            AddTable::W4(v) => v[i] as i64,
        }
    }
}

/// Shared, immutable log-semiring instance. Cheap to clone (an `Arc`
/// handle), shared across decoder instances the way model tables are
/// (spec §3 "Ownership").
#[derive(Clone)]
pub struct LogMath {
    inner: Arc<LogMathInner>,
}

struct LogMathInner {
    base: f64,
    log_of_base: f64,
    log10_of_base: f64,
    inv_log_of_base: f64,
    inv_log10_of_base: f64,
    shift: u32,
    zero: i32,
    table: AddTable,
}

impl LogMath {
    /// `base` must be > 1.0 (§6 default `logbase = 1.0001`). `shift`
    /// trades table size for resolution; `0` is exact-resolution and is
    /// the right default unless the add-table would be enormous.
    pub fn new(base: f64, shift: u32) -> Option<Self> {
        if base <= 1.0 {
            return None;
        }
        let log_of_base = base.ln();
        let log10_of_base = base.log10();
        let inv_log_of_base = 1.0 / log_of_base;
        let inv_log10_of_base = 1.0 / log10_of_base;
        let zero = (i32::MIN >> (shift + 2)) as i32;

        let table = build_add_table(base, inv_log_of_base, shift);

        Some(Self {
            inner: Arc::new(LogMathInner {
                base,
                log_of_base,
                log10_of_base,
                inv_log_of_base,
                inv_log10_of_base,
                shift,
                zero,
                table,
            }),
        })
    }

    /// Convenience: the spec's default `logbase = 1.0001`, no table
    /// down-shifting.
    pub fn default_base() -> Self {
        Self::new(1.0001, 0).expect("1.0001 > 1.0")
    }

    pub fn base(&self) -> f64 {
        self.inner.base
    }

    pub fn shift(&self) -> u32 {
        self.inner.shift
    }

    /// The sentinel representing probability zero. Always `<=` any
    /// finite value produced by this instance.
    pub fn zero(&self) -> i32 {
        self.inner.zero
    }

    /// `logb(p)`. Returns `zero()` for `p <= 0`.
    pub fn log(&self, p: f64) -> i32 {
        if p <= 0.0 {
            return self.inner.zero;
        }
        ((p.ln() * self.inner.inv_log_of_base) as i64 >> self.inner.shift) as i32
    }

    /// Inverse of [`LogMath::log`]: recovers `p` from `logb(p)`.
    pub fn exp(&self, logb_p: i32) -> f64 {
        self.inner.base.powf(((logb_p as i64) << self.inner.shift) as f64)
    }

    pub fn ln_to_log(&self, ln_p: f64) -> i32 {
        ((ln_p * self.inner.inv_log_of_base) as i64 >> self.inner.shift) as i32
    }

    pub fn log_to_ln(&self, logb_p: i32) -> f64 {
        ((logb_p as i64) << self.inner.shift) as f64 * self.inner.log_of_base
    }

    pub fn log10_to_log(&self, log10_p: f64) -> i32 {
        ((log10_p * self.inner.inv_log10_of_base) as i64 >> self.inner.shift) as i32
    }

    pub fn log_to_log10(&self, logb_p: i32) -> f64 {
        ((logb_p as i64) << self.inner.shift) as f64 * self.inner.log10_of_base
    }

    /// `logb(p + q)` given `logb(p)` and `logb(q)`, via the lookup
    /// table built at construction. Handles the `0 + x = x` identity
    /// (where `0` here means the `zero()` sentinel) without consulting
    /// the table.
    pub fn add(&self, logb_x: i32, logb_y: i32) -> i32 {
        let zero = self.inner.zero;
        if logb_x <= zero {
            return logb_y;
        }
        if logb_y <= zero {
            return logb_x;
        }

        let (d, r) = if logb_x > logb_y {
            (logb_x as i64 - logb_y as i64, logb_x)
        } else {
            (logb_y as i64 - logb_x as i64, logb_y)
        };

        if d < 0 {
            return r;
        }
        let d = d as usize;
        if d >= self.inner.table.len() {
            return r;
        }
        (r as i64 + self.inner.table.get(d)) as i32
    }

    /// Exact (table-free) version of [`LogMath::add`], used by the
    /// table builder itself and available for testing.
    pub fn add_exact(&self, logb_p: i32, logb_q: i32) -> i32 {
        self.log(self.exp(logb_p) + self.exp(logb_q))
    }

    /// `max(a, b)` in this semiring is just integer `max`, since larger
    /// `logb` always means more probable.
    #[inline]
    pub fn max(a: i32, b: i32) -> i32 {
        a.max(b)
    }
}

fn build_add_table(base: f64, inv_log_of_base: f64, shift: u32) -> AddTable {
    // Determine table entry width from how many steps it takes base^(y-x)
    // to decay past log(2) (mirrors logmath_init's "poor man's log2").
    let maxyx = ((2.0f64.ln() / base.ln() + 0.5) as i64) >> shift;
    let width = if maxyx < 256 {
        1
    } else if maxyx < 65536 {
        2
    } else {
        4
    };

    let mut entries: Vec<i64> = Vec::new();
    let mut byx = 1.0f64;
    loop {
        let lobyx = (1.0 + byx).ln() * inv_log_of_base;
        let k = ((lobyx + 0.5 * (1u64 << shift) as f64) as i64) >> shift;
        let idx = (entries.len() as i64) >> shift;
        let idx = idx as usize;
        if idx >= entries.len() {
            entries.push(k.max(0));
        }
        if k <= 0 {
            break;
        }
        byx /= base;
        if entries.len() > 1_000_000 {
            // Pathological base very close to 1; bail with what we have.
            break;
        }
    }
    if entries.len() < 256 {
        entries.resize(256, 0);
    }

    match width {
        1 => AddTable::W1(entries.iter().map(|&v| v.clamp(0, 255) as u8).collect()),
        2 => AddTable::W2(entries.iter().map(|&v| v.clamp(0, 65535) as u16).collect()),
        _ => AddTable::W4(entries.iter().map(|&v| v as u32).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_identity() {
        let lm = LogMath::default_base();
        let z = lm.zero();
        assert_eq!(lm.add(z, -100), -100);
        assert_eq!(lm.add(-100, z), -100);
    }

    #[test]
    fn add_is_commutative_and_at_least_the_max() {
        let lm = LogMath::default_base();
        let a = -500;
        let b = -300;
        let ab = lm.add(a, b);
        let ba = lm.add(b, a);
        assert_eq!(ab, ba);
        assert!(ab >= a.max(b));
    }

    #[test]
    fn log_exp_roundtrip_is_close() {
        let lm = LogMath::default_base();
        let p = 0.25;
        let logb = lm.log(p);
        let back = lm.exp(logb);
        assert!((back - p).abs() < 0.01, "back={back} p={p}");
    }

    #[test]
    fn log_of_zero_is_sentinel() {
        let lm = LogMath::default_base();
        assert_eq!(lm.log(0.0), lm.zero());
        assert_eq!(lm.log(-1.0), lm.zero());
    }

    #[test]
    fn rejects_base_at_or_below_one() {
        assert!(LogMath::new(1.0, 0).is_none());
        assert!(LogMath::new(0.5, 0).is_none());
    }

    #[test]
    fn ln_log_roundtrip() {
        let lm = LogMath::default_base();
        let x = -3.2;
        let logb = lm.ln_to_log(x);
        let back = lm.log_to_ln(logb);
        assert!((back - x).abs() < 1e-3);
    }
}
