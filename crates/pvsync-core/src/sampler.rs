//! Deterministic file sampling
//!
//! Each file identity hashes to a fixed point in `[0, 1)`; a file is included
//! iff that point is below the sample rate. Raising the rate therefore only
//! ever adds files, which is what lets a project widen its sample without
//! invalidating committed data.

use crate::types::FileIdentity;

/// Stable pseudo-random value in `[0, 1)` for a file.
pub fn sample_value(file: &FileIdentity) -> f64 {
    let hash = blake3::hash(file.key().as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&hash.as_bytes()[..8]);
    // Top 53 bits fit an f64 mantissa exactly, keeping the result below 1.0
    let bits = u64::from_le_bytes(head) >> 11;
    bits as f64 / (1u64 << 53) as f64
}

/// Whether `file` belongs to the sample at `sample_rate`.
pub fn include(file: &FileIdentity, sample_rate: f64) -> bool {
    if sample_rate >= 1.0 {
        return true;
    }
    if sample_rate <= 0.0 {
        return false;
    }
    sample_value(file) < sample_rate
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn files(days: u32) -> Vec<FileIdentity> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        start
            .iter_days()
            .take(days as usize)
            .flat_map(|d| (0..24).map(move |h| FileIdentity::pageviews(d, h)))
            .collect()
    }

    #[test]
    fn value_in_unit_interval() {
        for f in files(10) {
            let v = sample_value(&f);
            assert!((0.0..1.0).contains(&v), "{v} out of range for {f}");
        }
    }

    #[test]
    fn deterministic() {
        let f = FileIdentity::pageviews(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), 7);
        assert_eq!(sample_value(&f), sample_value(&f.clone()));
        assert_eq!(include(&f, 0.42), include(&f, 0.42));
    }

    #[test]
    fn rate_monotonic() {
        let rates = [0.0, 0.05, 0.1, 0.3, 0.5, 0.7, 0.99, 1.0];
        for f in files(30) {
            for (i, lo) in rates.iter().enumerate() {
                for hi in &rates[i..] {
                    if include(&f, *lo) {
                        assert!(include(&f, *hi), "{f} included at {lo} but not {hi}");
                    }
                }
            }
        }
    }

    #[test]
    fn bounds() {
        for f in files(2) {
            assert!(include(&f, 1.0));
            assert!(!include(&f, 0.0));
        }
    }

    #[test]
    fn rate_roughly_respected() {
        let all = files(100);
        let kept = all.iter().filter(|f| include(f, 0.25)).count();
        let frac = kept as f64 / all.len() as f64;
        assert!((0.18..0.32).contains(&frac), "sampled fraction {frac}");
    }

    #[test]
    fn partition_changes_value() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let a = FileIdentity::new(d, 0, "pageviews");
        let b = FileIdentity::new(d, 0, "projectviews");
        assert_ne!(sample_value(&a), sample_value(&b));
    }
}
