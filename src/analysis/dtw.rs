//! Dynamic time warping over single-feature sequences.

/// Squared-difference DTW between `a` and `b`.
///
/// Returns the accumulated cost and the number of points on the optimal
/// warping path, or `None` if either sequence is empty.
pub fn dtw(a: &[f64], b: &[f64]) -> Option<(f64, usize)> {
    let (n, m) = (a.len(), b.len());
    if n == 0 || m == 0 {
        return None;
    }
    let idx = |i: usize, j: usize| i * m + j;
    let mut cost = vec![f64::INFINITY; n * m];

    for i in 0..n {
        for j in 0..m {
            let d = (a[i] - b[j]).powi(2);
            let best = match (i, j) {
                (0, 0) => 0.0,
                (0, _) => cost[idx(0, j - 1)],
                (_, 0) => cost[idx(i - 1, 0)],
                _ => cost[idx(i - 1, j - 1)]
                    .min(cost[idx(i - 1, j)])
                    .min(cost[idx(i, j - 1)]),
            };
            cost[idx(i, j)] = d + best;
        }
    }

    // Walk back from the end, diagonal first on ties
    let (mut i, mut j, mut steps) = (n - 1, m - 1, 1);
    while i > 0 || j > 0 {
        (i, j) = match (i, j) {
            (0, _) => (0, j - 1),
            (_, 0) => (i - 1, 0),
            _ => {
                let diag = cost[idx(i - 1, j - 1)];
                let up = cost[idx(i - 1, j)];
                let left = cost[idx(i, j - 1)];
                if diag <= up && diag <= left {
                    (i - 1, j - 1)
                } else if up <= left {
                    (i - 1, j)
                } else {
                    (i, j - 1)
                }
            }
        };
        steps += 1;
    }
    Some((cost[idx(n - 1, m - 1)], steps))
}

/// DTW distance divided by the warping path length.
pub fn normalized_dtw(a: &[f64], b: &[f64]) -> Option<f64> {
    dtw(a, b).map(|(dist, len)| dist / len as f64)
}
