//! Deterministic evenly-spaced row selection.
//!
//! Mirrors selecting `count` positions linearly spaced over `[0, len - 1]`
//! with both endpoints included and fractional positions truncated toward
//! zero. Subsampling a split keeps one example in `ratio` this way.

/// Indices of `count` evenly spaced rows in `0..len`.
///
/// The first index is always 0 and the last always `len - 1` (for
/// `count >= 2`). Interior positions are truncated, never rounded, so the
/// selection matches linear interpolation with integer casts. The result is
/// strictly increasing.
pub fn evenly_spaced_indices(len: usize, count: usize) -> Vec<usize> {
    if len == 0 || count == 0 {
        return Vec::new();
    }
    if count == 1 {
        return vec![0];
    }
    if count >= len {
        return (0..len).collect();
    }

    let step = (len - 1) as f64 / (count - 1) as f64;
    let mut indices = Vec::with_capacity(count);
    for i in 0..count {
        indices.push((step * i as f64) as usize);
    }
    // Pin the endpoint exactly; float accumulation must not shave it.
    indices[count - 1] = len - 1;
    indices
}

/// Number of rows a one-in-`ratio` subsample keeps, at least one for a
/// non-empty input.
pub fn ratio_count(len: usize, ratio: usize) -> usize {
    if len == 0 {
        return 0;
    }
    if ratio == 0 {
        return len;
    }
    std::cmp::max(1, len / ratio)
}
