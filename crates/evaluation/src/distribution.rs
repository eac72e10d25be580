//! Deterministic variant selection for percentage rollouts.
//!
//! The bucketing hash is CRC-32/IEEE over the flag key concatenated with the
//! bucketing value. Changing it would reshuffle every rollout in the field,
//! so it is part of the configuration format contract.

use flagcast_core::types::DistributionEntry;

/// Pick the variant an entity falls into.
///
/// The hash point is mapped into `[0, total_weight)` and matched against the
/// cumulative weights of the ordered entries, so identical
/// `(flag key, bucketing value, distribution)` inputs select the identical
/// variant in every process. Zero-weight entries are skipped by
/// construction. Returns `None` only for a zero total weight, which
/// snapshot validation rejects before a distribution can reach evaluation.
pub fn select_variant<'a>(
    distribution: &'a [DistributionEntry],
    flag_key: &str,
    entity_id: &str,
    bucketing_key: Option<&str>,
) -> Option<&'a str> {
    let total: u64 = distribution.iter().map(|d| u64::from(d.weight)).sum();
    if total == 0 {
        return None;
    }

    let bucketing_value = bucketing_key.unwrap_or(entity_id);
    let hash = crc32fast::hash(format!("{flag_key}{bucketing_value}").as_bytes());
    let point = u64::from(hash) % total;

    let mut cumulative = 0u64;
    for entry in distribution {
        cumulative += u64::from(entry.weight);
        if point < cumulative {
            return Some(&entry.variant_key);
        }
    }

    None
}
