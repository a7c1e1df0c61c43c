use std::ops::Range;

///
/// Number of upper-triangular cells `(i, j)`, `i <= j`, of the block
/// `rows x cols`, optionally restricted to `j - i < band`.
///
/// Used to size zero-filled populations without enumerating them.
///
pub fn count_upper_triangular(rows: &Range<u64>, cols: &Range<u64>, band: Option<u64>) -> u64 {
    let mut total = 0u64;
    for i in rows.clone() {
        let lo = cols.start.max(i);
        let hi = match band {
            Some(w) => cols.end.min(i.saturating_add(w)),
            None => cols.end,
        };
        total += hi.saturating_sub(lo);
    }
    total
}

///
/// Number of cells `(i, j)` of the block `rows x cols` with `|i - j| < band`, or all
/// cells when no band is given.
///
pub fn count_cells(rows: &Range<u64>, cols: &Range<u64>, band: Option<u64>) -> u64 {
    match band {
        None => (rows.end - rows.start) * (cols.end - cols.start),
        Some(w) => rows
            .clone()
            .map(|i| {
                let lo = cols.start.max(i.saturating_sub(w.saturating_sub(1)));
                let hi = cols.end.min(i.saturating_add(w));
                hi.saturating_sub(lo)
            })
            .sum(),
    }
}
