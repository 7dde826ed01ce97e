/// Line token that ends a batch.
pub const BATCH_SEPARATOR: &str = "GO";

/// Split a script into independently executable batches.
///
/// A line whose trimmed content is `GO` (any case) closes the current batch.
/// Separator lines are not part of any batch and whitespace-only batches are
/// dropped, so a script of blank lines and separators yields nothing.
pub fn split_batches(script: &str) -> Vec<String> {
    let mut batches = Vec::new();
    let mut current = String::new();

    for line in script.lines() {
        if line.trim().eq_ignore_ascii_case(BATCH_SEPARATOR) {
            flush(&mut batches, &mut current);
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    flush(&mut batches, &mut current);

    batches
}

fn flush(batches: &mut Vec<String>, current: &mut String) {
    if current.trim().is_empty() {
        current.clear();
    } else {
        batches.push(std::mem::take(current));
    }
}
