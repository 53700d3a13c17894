use pulldown_cmark::{html, Options, Parser};

fn unit_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_SMART_PUNCTUATION
}

/// Render unit content written in Markdown to HTML safe to embed in a view.
///
/// Raw HTML in the content is reduced to ammonia's default allow-list, so
/// scripts and event handlers never reach a viewer.
pub fn render_markdown(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }

    let mut rendered = String::with_capacity(raw.len() * 3 / 2);
    html::push_html(&mut rendered, Parser::new_ext(raw, unit_options()));
    ammonia::clean(&rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_paragraph() {
        let result = render_markdown("Hello, world!");
        assert_eq!(result.trim(), "<p>Hello, world!</p>");
    }

    #[test]
    fn test_heading() {
        let result = render_markdown("# Binomial formulas");
        assert_eq!(result.trim(), "<h1>Binomial formulas</h1>");
    }

    #[test]
    fn test_bold_and_italic() {
        let result = render_markdown("**bold** and *italic*");
        assert!(result.contains("<strong>bold</strong>"));
        assert!(result.contains("<em>italic</em>"));
    }

    #[test]
    fn test_table() {
        let input = "| a | b |\n|---|---|\n| 1 | 2 |";
        let result = render_markdown(input);
        assert!(result.contains("<table>"));
        assert!(result.contains("<td>1</td>"));
    }

    #[test]
    fn test_script_is_removed() {
        let result = render_markdown("Hint <script>alert('x')</script> here");
        assert!(!result.contains("<script"));
        assert!(!result.contains("alert"));
        assert!(result.contains("Hint"));
    }

    #[test]
    fn test_event_handlers_are_removed() {
        let result = render_markdown("<img src=\"a.png\" onerror=\"steal()\">");
        assert!(!result.contains("onerror"));
    }

    #[test]
    fn test_links_survive() {
        let result = render_markdown("[Solution video](https://example.com/v)");
        assert!(result.contains("href=\"https://example.com/v\""));
        assert!(result.contains("Solution video"));
    }

    #[test]
    fn test_blank_input() {
        assert_eq!(render_markdown(""), "");
        assert_eq!(render_markdown("  \n\t"), "");
    }
}
