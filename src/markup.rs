//! Small helpers for the HTML and XML documents the crate renders.

/// Escape `&`, `<`, `>` and quotes for use in HTML/XML text and attributes.
pub(crate) fn escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#x27;"),
            _ => result.push(c),
        }
    }
    result
}

/// Wrap an HTML fragment in a minimal page. `title` is escaped, `body` is not.
pub(crate) fn html_page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 2em; color: #222; }}
        table {{ border-collapse: collapse; }}
        th, td {{ text-align: left; padding: 4px 12px; border-bottom: 1px solid #ddd; }}
        pre {{ background: #f5f5f5; padding: 1em; overflow-x: auto; }}
    </style>
</head>
<body>
<h1>{title}</h1>
{body}
</body>
</html>
"#,
        title = escape(title),
        body = body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("<a href=\"x\">&'</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&#x27;&lt;/a&gt;");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn test_html_page_escapes_title() {
        let page = html_page("A & B", "<p>ok</p>");
        assert!(page.contains("<title>A &amp; B</title>"));
        assert!(page.contains("<p>ok</p>"));
    }
}
