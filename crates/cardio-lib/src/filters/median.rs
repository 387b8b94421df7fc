/// Running median with an odd `window`, zero-padded at both ends.
///
/// Keeps a sorted copy of the current window and updates it by binary
/// search, so each step costs `O(window)` rather than a full sort.
pub fn median_filter(data: &[f64], window: usize) -> Vec<f64> {
    let n = data.len();
    if n == 0 || window <= 1 {
        return data.to_vec();
    }
    let window = if window % 2 == 0 { window - 1 } else { window };
    let half = window / 2;
    let at = |i: isize| -> f64 {
        if i < 0 || i as usize >= n {
            0.0
        } else {
            data[i as usize]
        }
    };

    let mut sorted: Vec<f64> = (-(half as isize)..=half as isize).map(at).collect();
    sorted.sort_by(f64::total_cmp);

    let mut out = Vec::with_capacity(n);
    out.push(sorted[half]);
    for i in 1..n {
        let leaving = at(i as isize - half as isize - 1);
        let entering = at(i as isize + half as isize);
        if let Ok(pos) = sorted.binary_search_by(|v| v.total_cmp(&leaving)) {
            sorted.remove(pos);
        }
        let pos = sorted
            .binary_search_by(|v| v.total_cmp(&entering))
            .unwrap_or_else(|p| p);
        sorted.insert(pos, entering);
        out.push(sorted[half]);
    }
    out
}
