/// Strips markdown code fences and surrounding whitespace from model output.
///
/// A leading fence may carry a language tag (```` ```html ````). Text without fences
/// comes back unchanged apart from outer whitespace.
///
/// ```
/// use selfui::sanitize::sanitize_markup;
///
/// assert_eq!(sanitize_markup("```html\n<div>x</div>\n```"), "<div>x</div>");
/// assert_eq!(sanitize_markup("<div>x</div>"), "<div>x</div>");
/// ```
pub fn sanitize_markup(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        let (first_line, remainder) = rest.split_once('\n').unwrap_or((rest, ""));
        text = if first_line.trim().chars().all(is_language_tag_char) {
            remainder
        } else {
            rest
        };
    }

    text = text.trim_end();
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }

    text.trim().to_string()
}

fn is_language_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '_' | '.')
}
