//! Word-sized modular arithmetic
//!
//! All helpers assume operands are already reduced into `[0, q)` unless the
//! name says otherwise. Products go through `u128`, so any `q < 2^63` works.

/// Add two values modulo q
#[inline]
pub fn add_mod(a: u64, b: u64, q: u64) -> u64 {
    let sum = a + b;
    if sum >= q {
        sum - q
    } else {
        sum
    }
}

/// Subtract two values modulo q
#[inline]
pub fn sub_mod(a: u64, b: u64, q: u64) -> u64 {
    if a >= b {
        a - b
    } else {
        q - b + a
    }
}

/// Multiply two values modulo q
#[inline]
pub fn mul_mod(a: u64, b: u64, q: u64) -> u64 {
    ((a as u128 * b as u128) % q as u128) as u64
}

/// Negate a value modulo q
#[inline]
pub fn neg_mod(a: u64, q: u64) -> u64 {
    if a == 0 {
        0
    } else {
        q - a
    }
}

/// Compute `base^exp mod q` by square-and-multiply
pub fn pow_mod(base: u64, mut exp: u64, q: u64) -> u64 {
    let mut result = 1u64 % q;
    let mut base = base % q;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mul_mod(result, base, q);
        }
        base = mul_mod(base, base, q);
        exp >>= 1;
    }
    result
}

/// Modular inverse via the extended Euclidean algorithm.
///
/// Returns `None` when `gcd(a, q) != 1`.
pub fn inv_mod(a: u64, q: u64) -> Option<u64> {
    let mut t: i128 = 0;
    let mut new_t: i128 = 1;
    let mut r: i128 = q as i128;
    let mut new_r: i128 = (a % q) as i128;

    while new_r != 0 {
        let quotient = r / new_r;
        (t, new_t) = (new_t, t - quotient * new_t);
        (r, new_r) = (new_r, r - quotient * new_r);
    }

    if r != 1 {
        return None;
    }
    if t < 0 {
        t += q as i128;
    }
    Some(t as u64)
}

/// Map `[0, q)` onto the centered range `(-q/2, q/2]`
#[inline]
pub fn center(a: u64, q: u64) -> i64 {
    if a > q / 2 {
        -((q - a) as i64)
    } else {
        a as i64
    }
}

/// Reduce a signed value into `[0, q)`
#[inline]
pub fn reduce_signed(a: i64, q: u64) -> u64 {
    if a >= 0 {
        (a as u64) % q
    } else {
        let r = a.unsigned_abs() % q;
        if r == 0 {
            0
        } else {
            q - r
        }
    }
}

/// Lift a value mod `t` into mod `q` through its centered representative
#[inline]
pub fn lift_centered(a: u64, t: u64, q: u64) -> u64 {
    reduce_signed(center(a, t), q)
}

/// Number of significant bits of `q`
#[inline]
pub fn bit_length(q: u64) -> u32 {
    64 - q.leading_zeros()
}
