//! Deterministic freshness decay.
//!
//! `score = max(min_freshness, floor(100 * 2^-(dt / half_life)))` where `dt`
//! is the distance from `attested_at_input` to the current input index. The
//! exponent is rational, so the factor is evaluated in Q64 fixed point:
//! whole halvings are right shifts, and the fractional part is decomposed
//! into 32 binary digits whose per-bit factors `2^-(1/2^i)` come from
//! repeated integer square roots. Only u128 arithmetic with truncating
//! division is used; the evaluation order is pinned, so every platform
//! produces identical scores.

use lcore_storage::Store;
use lcore_types::{InputIndex, RequestError};
use std::collections::BTreeMap;

const ONE_Q64: u128 = 1u128 << 64;
const HALF_Q64: u128 = 1u128 << 63;
/// Binary digits of the fractional exponent. 32 bits is far below one unit
/// of score precision.
const FRAC_BITS: u32 = 32;
/// floor(100 * 2^-q) is zero from q = 7 on.
const MAX_HALVINGS: u64 = 7;

/// floor(sqrt(n)) for u128, by Babylonian convergence. Truncating integer
/// division only.
fn isqrt(n: u128) -> u128 {
    if n == 0 {
        return 0;
    }
    let bits = 128 - n.leading_zeros();
    let mut x = 1u128 << ((bits + 1) / 2);
    loop {
        let next = (x + n / x) / 2;
        if next >= x {
            return x;
        }
        x = next;
    }
}

/// Square root in Q64: both input and output scaled by 2^64. Valid for
/// inputs below 2^64 (all factors here are at most 1.0).
fn sqrt_q64(x: u128) -> u128 {
    isqrt(x << 64)
}

/// Product of two Q64 values, truncated.
fn mul_q64(a: u128, b: u128) -> u128 {
    (a * b) >> 64
}

/// The decayed score for an attestation `dt` input-index units old.
pub fn decay_score(dt: u64, half_life: u64, min_freshness: u8) -> u8 {
    if half_life == 0 {
        // Schema registration rejects this; treat defensively as fully decayed.
        return min_freshness;
    }
    let halvings = dt / half_life;
    if halvings >= MAX_HALVINGS {
        return min_freshness;
    }
    let mut remainder = (dt % half_life) as u128;
    let half_life = half_life as u128;

    // factor = 2^-(remainder / half_life) in Q64, MSB-first over the binary
    // expansion of the fraction. root starts at 0.5 and takes one square
    // root per digit position.
    let mut factor = ONE_Q64;
    let mut root = HALF_Q64;
    for _ in 0..FRAC_BITS {
        root = sqrt_q64(root);
        remainder *= 2;
        if remainder >= half_life {
            remainder -= half_life;
            factor = mul_q64(factor, root);
        }
    }

    let score = ((100u128 * factor) >> 64) >> halvings;
    (score as u8).max(min_freshness)
}

/// The bulk recalculation run at the start of every advance request: every
/// active attestation's score is recomputed from its active schema's
/// parameters. Attestations whose schema pair has no active version keep
/// their current score.
pub fn run_decay_pass(store: &mut Store, current_input: InputIndex) -> Result<(), RequestError> {
    let rows = store.freshness_rows()?;
    if rows.is_empty() {
        return Ok(());
    }

    let mut schema_cache: BTreeMap<(String, String), Option<(u64, u8)>> = BTreeMap::new();
    let mut updates = Vec::new();
    for row in rows {
        let key = (row.provider.clone(), row.flow_type.clone());
        let params = match schema_cache.get(&key) {
            Some(cached) => *cached,
            None => {
                let looked_up = store
                    .active_schema(&row.provider, &row.flow_type)?
                    .map(|s| (s.freshness_half_life, s.min_freshness));
                schema_cache.insert(key, looked_up);
                looked_up
            }
        };
        let Some((half_life, min_freshness)) = params else {
            continue;
        };
        let dt = current_input.saturating_sub(row.attested_at_input);
        let score = decay_score(dt, half_life, min_freshness);
        if score != row.freshness_score {
            updates.push((row.id, score));
        }
    }
    store.apply_freshness(&updates)?;
    if !updates.is_empty() {
        tracing::debug!(updated = updates.len(), current_input, "freshness decay pass");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isqrt_floors() {
        assert_eq!(isqrt(0), 0);
        assert_eq!(isqrt(1), 1);
        assert_eq!(isqrt(2), 1);
        assert_eq!(isqrt(4), 2);
        assert_eq!(isqrt(10), 3);
        assert_eq!(isqrt(1 << 62), 1 << 31);
        assert_eq!(isqrt(u128::MAX), u64::MAX as u128);
    }

    #[test]
    fn exact_halving_points() {
        // Scenario fixed by the protocol: half-life 1000, attested at 100.
        assert_eq!(decay_score(0, 1000, 0), 100);
        assert_eq!(decay_score(1000, 1000, 0), 50);
        assert_eq!(decay_score(2000, 1000, 0), 25);
        assert_eq!(decay_score(3000, 1000, 0), 12);
        assert_eq!(decay_score(6000, 1000, 0), 1);
        assert_eq!(decay_score(7000, 1000, 0), 0);
    }

    #[test]
    fn fractional_exponents() {
        // 100 * 2^-0.5 = 70.71..
        assert_eq!(decay_score(500, 1000, 0), 70);
        // 100 * 2^-0.25 = 84.08..
        assert_eq!(decay_score(250, 1000, 0), 84);
        // 100 * 2^-1.5 = 35.35..
        assert_eq!(decay_score(1500, 1000, 0), 35);
    }

    #[test]
    fn min_freshness_is_a_floor() {
        assert_eq!(decay_score(10_000, 1000, 20), 20);
        assert_eq!(decay_score(1000, 1000, 20), 50);
        assert_eq!(decay_score(u64::MAX, 3, 5), 5);
    }

    #[test]
    fn score_is_non_increasing_in_age() {
        let mut last = u8::MAX;
        for dt in (0..5000).step_by(7) {
            let score = decay_score(dt, 997, 0);
            assert!(score <= last, "dt={dt}: {score} > {last}");
            last = score;
        }
    }

    #[test]
    fn evaluation_is_deterministic() {
        for _ in 0..10 {
            assert_eq!(decay_score(123_456, 9_999, 3), decay_score(123_456, 9_999, 3));
        }
        // A value pinned once and for all: any change to the evaluation
        // order shows up here.
        assert_eq!(decay_score(333, 1000, 0), 79);
    }
}
