//! Longest Increasing Subsequence
//!
//! Used by the keyed diff: among the reused children, the longest strictly
//! increasing run of old indices is the maximal subset already in correct
//! relative order, so everything in it can stay put and only the rest is
//! moved.

/// Indices of a longest strictly-increasing subsequence of `values`.
///
/// O(n log n): patience-style tails with a predecessor chain for
/// reconstruction. Negative entries are skipped: the keyed diff uses `-1`
/// as the "no old counterpart" sentinel and those slots are fresh mounts,
/// not candidates for staying in place.
pub fn longest_increasing_indices(values: &[i64]) -> Vec<usize> {
    // `result` holds, for each subsequence length, the index of the
    // smallest possible tail value; `prev` chains each chosen index to its
    // predecessor in the subsequence ending at it.
    let mut result: Vec<usize> = Vec::new();
    let mut prev = vec![0usize; values.len()];

    for (i, &v) in values.iter().enumerate() {
        if v < 0 {
            continue;
        }

        if let Some(&last) = result.last() {
            if values[last] < v {
                prev[i] = last;
                result.push(i);
                continue;
            }
        } else {
            result.push(i);
            continue;
        }

        // First tail >= v gets replaced by i.
        let (mut lo, mut hi) = (0usize, result.len());
        while lo < hi {
            let mid = (lo + hi) / 2;
            if values[result[mid]] < v {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if lo > 0 {
            prev[i] = result[lo - 1];
        }
        result[lo] = i;
    }

    // Walk the predecessor chain back from the final tail.
    let mut k = result.len();
    if k > 0 {
        let mut idx = result[k - 1];
        while k > 0 {
            k -= 1;
            result[k] = idx;
            idx = prev[idx];
        }
    }
    result
}
