//! Form selection, from a flag or interactively.

use std::io::{self, BufRead, Write};

use mediaferry_transfer::FormInfo;

/// Parses a selection against a listing of `count` forms.
///
/// Accepts `all` or comma-separated 1-based numbers. Returns 0-based
/// indices deduplicated in input order, or `None` when any token is
/// invalid or out of range.
pub fn parse_selection(input: &str, count: usize) -> Option<Vec<usize>> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("all") {
        return Some((0..count).collect());
    }

    let mut indices = Vec::new();
    for token in input.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let number: usize = token.parse().ok()?;
        if number == 0 || number > count {
            return None;
        }
        let index = number - 1;
        if !indices.contains(&index) {
            indices.push(index);
        }
    }

    if indices.is_empty() { None } else { Some(indices) }
}

/// Prints the numbered form listing and reads a selection from stdin.
/// An unparseable answer selects nothing.
pub fn prompt_selection(forms: &[FormInfo]) -> io::Result<Vec<usize>> {
    println!("\nAvailable forms:");
    for (position, form) in forms.iter().enumerate() {
        println!("  {}. {} ({})", position + 1, form.name, form.id);
    }
    print!("Transfer which forms? (comma-separated numbers, or 'all'): ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(parse_selection(&line, forms.len()).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_selects_everything() {
        assert_eq!(parse_selection("all", 3), Some(vec![0, 1, 2]));
        assert_eq!(parse_selection(" ALL ", 2), Some(vec![0, 1]));
    }

    #[test]
    fn numbers_are_one_based() {
        assert_eq!(parse_selection("1,3", 3), Some(vec![0, 2]));
        assert_eq!(parse_selection("2", 3), Some(vec![1]));
    }

    #[test]
    fn duplicates_collapse_in_order() {
        assert_eq!(parse_selection("3,1,3", 3), Some(vec![2, 0]));
    }

    #[test]
    fn invalid_tokens_rejected() {
        assert_eq!(parse_selection("0", 3), None);
        assert_eq!(parse_selection("4", 3), None);
        assert_eq!(parse_selection("one", 3), None);
        assert_eq!(parse_selection("", 3), None);
        assert_eq!(parse_selection(",,", 3), None);
    }
}
