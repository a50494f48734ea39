//! NTT-friendly prime search.
//!
//! Walks downward from `2^bits` in steps of `2n`, so every candidate already
//! satisfies `q ≡ 1 (mod 2n)`, and keeps the first primes it finds.

use super::modular::{mul_mod, pow_mod};

/// Witnesses that make Miller-Rabin deterministic for every `u64`.
const WITNESSES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

/// Deterministic primality test for 64-bit integers
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    for &p in &WITNESSES {
        if n % p == 0 {
            return n == p;
        }
    }

    let mut d = n - 1;
    let mut s = 0;
    while d % 2 == 0 {
        d /= 2;
        s += 1;
    }

    'witness: for &a in &WITNESSES {
        let mut x = pow_mod(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..s {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Find the `count` largest primes of exactly `bits` bits with `q ≡ 1 (mod 2n)`.
///
/// Primes listed in `exclude` are skipped. Returns `None` when the bit size
/// runs out of candidates before `count` primes are found.
pub fn ntt_primes(bits: u32, n: usize, count: usize, exclude: &[u64]) -> Option<Vec<u64>> {
    if !(2..=62).contains(&bits) {
        return None;
    }
    let step = 2 * n as u64;
    let upper = 1u64 << bits;
    let lower = 1u64 << (bits - 1);

    // Largest value below 2^bits that is ≡ 1 (mod 2n)
    let mut candidate = ((upper - 1) / step) * step + 1;
    if candidate >= upper {
        candidate = candidate.checked_sub(step)?;
    }

    let mut found = Vec::with_capacity(count);
    while found.len() < count {
        if candidate < lower {
            return None;
        }
        if is_prime(candidate) && !exclude.contains(&candidate) {
            found.push(candidate);
        }
        candidate = candidate.checked_sub(step)?;
    }
    Some(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_primes() {
        let primes: Vec<u64> = (0..40).filter(|&n| is_prime(n)).collect();
        assert_eq!(primes, vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37]);
        assert!(is_prime(65537));
        assert!(!is_prime(65535));
    }

    #[test]
    fn test_carmichael_rejected() {
        for n in [561u64, 1105, 1729, 2465, 2821, 6601] {
            assert!(!is_prime(n), "{} is a Carmichael number", n);
        }
    }

    #[test]
    fn test_ntt_primes_60_bit() {
        let primes = ntt_primes(60, 64, 4, &[]).unwrap();
        assert_eq!(
            primes,
            vec![
                1152921504606844417,
                1152921504606844289,
                1152921504606842753,
                1152921504606837377
            ]
        );
        for q in primes {
            assert_eq!(q % 128, 1);
            assert_eq!(64 - q.leading_zeros(), 60);
        }
    }

    #[test]
    fn test_ntt_primes_exclusion() {
        let first = ntt_primes(61, 64, 2, &[]).unwrap();
        let skipped = ntt_primes(61, 64, 1, &first[..1]).unwrap();
        assert_eq!(skipped[0], first[1]);
    }

    #[test]
    fn test_ntt_primes_exhausted() {
        // Only a handful of 8-bit values are ≡ 1 mod 128
        assert!(ntt_primes(8, 64, 5, &[]).is_none());
    }
}
