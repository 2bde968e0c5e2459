//! Presigned-transfer expiry policy.
//!
//! TTLs are size-aware so large uploads do not fail mid-transfer, and bounded
//! so a writable credential never stays valid indefinitely. The same formula
//! parameterizes PUT (upload) and GET (retrieval) presigning.

use std::time::Duration;

/// Minimum TTL in seconds for a presigned URL.
pub const PRESIGN_TTL_FLOOR: u64 = 300;

/// Maximum TTL in seconds for a presigned URL.
pub const PRESIGN_TTL_CEILING: u64 = 3600;

/// Conservative assumed transfer rate: 50 KiB/s.
const ASSUMED_RATE_BYTES_PER_SEC: u64 = 50 * 1024;

/// Fixed safety buffer added on top of the estimated transfer time.
const SAFETY_BUFFER_SECS: u64 = 300;

/// Compute the presigned-URL TTL for a declared upload size.
///
/// Estimated transfer time at [`ASSUMED_RATE_BYTES_PER_SEC`] plus
/// [`SAFETY_BUFFER_SECS`], clamped to `[PRESIGN_TTL_FLOOR, PRESIGN_TTL_CEILING]`.
/// Monotonically non-decreasing in `size_bytes`.
pub fn presign_ttl(size_bytes: u64) -> Duration {
    let transfer_secs = size_bytes / ASSUMED_RATE_BYTES_PER_SEC;
    let secs = (transfer_secs + SAFETY_BUFFER_SECS).clamp(PRESIGN_TTL_FLOOR, PRESIGN_TTL_CEILING);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_sizes_hit_the_floor_plus_buffer() {
        assert_eq!(presign_ttl(0).as_secs(), 300);
        assert_eq!(presign_ttl(1024).as_secs(), 300);
        // 10 MiB at 50 KiB/s is ~205s transfer + 300s buffer
        assert_eq!(presign_ttl(10 * 1024 * 1024).as_secs(), 504);
    }

    #[test]
    fn large_sizes_clamp_to_ceiling() {
        assert_eq!(presign_ttl(5_000_000_000).as_secs(), PRESIGN_TTL_CEILING);
        assert_eq!(presign_ttl(u64::MAX).as_secs(), PRESIGN_TTL_CEILING);
    }

    #[test]
    fn ttl_is_monotone_non_decreasing() {
        let sizes = [
            0u64,
            1,
            1024,
            50 * 1024,
            1024 * 1024,
            100 * 1024 * 1024,
            1024 * 1024 * 1024,
            5_000_000_000,
        ];
        let mut last = 0;
        for size in sizes {
            let ttl = presign_ttl(size).as_secs();
            assert!(ttl >= last, "ttl decreased at size {}", size);
            last = ttl;
        }
    }

    #[test]
    fn ttl_always_within_bounds() {
        for size in [0u64, 512, 1 << 20, 1 << 30, 1 << 40, u64::MAX] {
            let secs = presign_ttl(size).as_secs();
            assert!((PRESIGN_TTL_FLOOR..=PRESIGN_TTL_CEILING).contains(&secs));
        }
    }
}
