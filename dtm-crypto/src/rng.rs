//! PRNG helpers for padding lengths and obfuscation delays.
//!
//! Fixed-size secret material (keys, ivs, nonces) is drawn with
//! `getrandom::getrandom` directly, the same way
//! `layer-mtproto/authentication.rs` fills its step buffers. Variable-range
//! draws (pad lengths, delay durations) go through `rand::Rng::gen_range`.

use rand::Rng;

/// Fill `buf` with cryptographically secure random bytes.
pub fn fill_random(buf: &mut [u8]) {
    getrandom::getrandom(buf).expect("getrandom");
}

/// Draw a `u16` uniformly from `[max / 2, max]`, per the padding profile's
/// length rule. `max == 0` always returns `0` (no padding).
pub fn uniform_pad_len(max: u16) -> u16 {
    if max == 0 {
        return 0;
    }
    let lo = max / 2;
    if lo >= max {
        return max;
    }
    rand::thread_rng().gen_range(lo..=max)
}

/// Draw a delay in milliseconds uniformly from `[max / 2, max]`, following
/// the same obfuscation-delay rule as padding length. `max == 0` means
/// "skip waiting".
pub fn uniform_delay_ms(max: u32) -> u32 {
    if max == 0 {
        return 0;
    }
    let lo = max / 2;
    if lo >= max {
        return max;
    }
    rand::thread_rng().gen_range(lo..=max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_max_is_always_zero() {
        for _ in 0..20 {
            assert_eq!(uniform_pad_len(0), 0);
            assert_eq!(uniform_delay_ms(0), 0);
        }
    }

    #[test]
    fn draws_stay_in_range() {
        for _ in 0..200 {
            let v = uniform_pad_len(100);
            assert!((50..=100).contains(&v));
            let d = uniform_delay_ms(40);
            assert!((20..=40).contains(&d));
        }
    }
}
