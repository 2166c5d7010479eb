/// Render one HTML page to plain text.
pub fn html_to_text(html: &str) -> String {
    clean_text(&html2md::parse_html(html, false))
}

fn clean_text(text: &str) -> String {
    let mut result = text.to_string();

    // Collapse 3+ consecutive blank lines to 2
    while result.contains("\n\n\n") {
        result = result.replace("\n\n\n", "\n\n");
    }

    // Trim trailing whitespace per line
    result = result
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n");

    // Ensure single trailing newline
    let trimmed = result.trim_end().to_string();
    if trimmed.is_empty() {
        String::new()
    } else {
        trimmed + "\n"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markup() {
        let out = html_to_text("<html><body><h1>Title</h1><p>Hello world</p></body></html>");
        assert!(out.contains("Hello world"));
        assert!(!out.contains("<p>"));
    }

    #[test]
    fn collapses_blank_runs_and_trailing_space() {
        let out = clean_text("a   \n\n\n\n\nb\n");
        assert_eq!(out, "a\n\nb\n");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(clean_text("  \n \n"), "");
    }
}
