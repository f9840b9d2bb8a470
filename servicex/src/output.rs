//! Reply formatting helpers for IRC output.

/// Lay items out in a left-aligned grid, column-major, two spaces between
/// columns.
pub fn grid(items: &[String], columns: usize) -> String {
    if items.is_empty() || columns == 0 {
        return String::new();
    }

    let cols: Vec<Vec<&str>> = (0..columns)
        .map(|i| {
            items
                .iter()
                .skip(i)
                .step_by(columns)
                .map(String::as_str)
                .collect()
        })
        .collect();
    let widths: Vec<usize> = cols
        .iter()
        .map(|col| col.iter().map(|s| s.chars().count()).max().unwrap_or(0))
        .collect();
    let rows = cols.iter().map(Vec::len).max().unwrap_or(0);

    let mut lines = Vec::with_capacity(rows);
    for row in 0..rows {
        let mut parts = Vec::new();
        for (i, col) in cols.iter().enumerate() {
            if let Some(item) = col.get(row) {
                parts.push(format!("{item:<width$}", width = widths[i]));
            }
        }
        lines.push(parts.join("  ").trim_end().to_string());
    }
    lines.join("\n")
}

/// Wrap a single line of text at word boundaries to at most `max` chars.
/// Words longer than `max` are hard-split.
pub fn wrap_line(text: &str, max: usize) -> Vec<String> {
    if text.chars().count() <= max {
        return vec![text.to_string()];
    }

    let mut out = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        let current_len = current.chars().count();
        if current_len + word_len + usize::from(!current.is_empty()) > max {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            if word_len > max {
                let mut rest: Vec<char> = word.chars().collect();
                while rest.len() > max {
                    out.push(rest.drain(..max).collect());
                }
                current = rest.into_iter().collect();
                continue;
            }
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Describe the joined-channel set in natural language.
pub fn channel_summary(channels: &[String]) -> String {
    match channels {
        [] => "I am not in any channels on this IRC network.".to_string(),
        [only] => format!("I am just in {only} on this IRC network."),
        _ => {
            let all_but_last = channels[..channels.len() - 1].join(", ");
            let last = &channels[channels.len() - 1];
            let total = channels.len();
            format!(
                "I am in {all_but_last} and {last} on this IRC network, a total of {total} channels."
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn grid_two_columns() {
        let out = grid(&strings(&["alpha", "be", "charlie", "dx"]), 2);
        let lines: Vec<&str> = out.lines().collect();
        // Column-major: alpha/charlie stack in column one
        assert_eq!(lines, vec!["alpha    be", "charlie  dx"]);
    }

    #[test]
    fn grid_uneven_items() {
        let out = grid(&strings(&["a", "b", "c"]), 2);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "a  b");
        assert_eq!(lines[1], "c");
    }

    #[test]
    fn grid_empty() {
        assert_eq!(grid(&[], 2), "");
        assert_eq!(grid(&strings(&["x"]), 0), "");
    }

    #[test]
    fn wrap_short_line_untouched() {
        assert_eq!(wrap_line("short", 400), vec!["short"]);
    }

    #[test]
    fn wrap_splits_at_word_boundaries() {
        let out = wrap_line("one two three four", 9);
        assert_eq!(out, vec!["one two", "three", "four"]);
        for line in &out {
            assert!(line.chars().count() <= 9);
        }
    }

    #[test]
    fn wrap_hard_splits_monster_words() {
        let out = wrap_line(&"x".repeat(25), 10);
        assert_eq!(out, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);
    }

    #[test]
    fn channel_summary_phrasing() {
        assert_eq!(
            channel_summary(&[]),
            "I am not in any channels on this IRC network."
        );
        assert_eq!(
            channel_summary(&strings(&["#a"])),
            "I am just in #a on this IRC network."
        );
        assert_eq!(
            channel_summary(&strings(&["#a", "#b", "#c"])),
            "I am in #a, #b and #c on this IRC network, a total of 3 channels."
        );
    }
}
