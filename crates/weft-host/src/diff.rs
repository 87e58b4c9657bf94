//! Result comparison helpers.

/// Index and values of the first element where `actual` and `expected`
/// differ, comparing the common prefix when the lengths differ.
pub fn first_mismatch(actual: &[i8], expected: &[i8]) -> Option<(usize, i8, i8)> {
    actual
        .iter()
        .zip(expected)
        .enumerate()
        .find(|(_, (a, e))| a != e)
        .map(|(i, (&a, &e))| (i, a, e))
}

/// Short decimal preview of a result vector: the first `limit` values,
/// with an ellipsis when truncated.
pub fn format_preview(values: &[i8], limit: usize) -> String {
    let shown: Vec<String> = values.iter().take(limit).map(i8::to_string).collect();
    if values.len() > limit {
        format!("[{}, …; {}]", shown.join(", "), values.len())
    } else {
        format!("[{}]", shown.join(", "))
    }
}
