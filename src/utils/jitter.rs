//! Lightweight jitter generation for retry backoff
//!
//! Uses system time as pseudo-randomness; cryptographic quality is not a
//! requirement for spreading retries.

/// Generate a pseudo-random jitter value between 0 and `max_jitter_ms`
pub fn generate_jitter_ms(max_jitter_ms: u64) -> u64 {
    if max_jitter_ms == 0 {
        return 0;
    }

    (std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        % (max_jitter_ms + 1) as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_in_bounds() {
        for _ in 0..50 {
            assert!(generate_jitter_ms(100) <= 100);
        }
        assert_eq!(generate_jitter_ms(0), 0);
    }
}
