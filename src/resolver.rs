//! Address → index position resolution
//!
//! Narrows the search to the bucket of the address's leading octet, then
//! binary-searches for the entry with the largest start address not
//! exceeding the target. The midpoint is rounded up so that the
//! `low = mid` step always makes progress when `high == low + 1`.

use crate::index::Index;

/// Find the index position owning `ip`.
///
/// Returns `None` only when no entry shares the address's leading octet.
/// An address below the first entry of its bucket resolves to that first
/// entry, so a result does not prove the address lies inside the entry's
/// range; use [`crate::Database::entry_range`] for that.
pub fn locate(index: &Index, ip: u32) -> Option<usize> {
    let bucket = index.bucket((ip >> 24) as u8)?;
    let entries = index.entries();

    let mut low = bucket.start;
    let mut high = bucket.end;

    while low < high {
        let mid = (low + high + 1) / 2;
        let mid_ip = entries[mid].ip;

        if mid_ip < ip {
            low = mid;
        } else if mid_ip > ip {
            high = mid - 1;
        } else {
            return Some(mid);
        }
    }

    Some(low)
}
