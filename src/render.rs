use pulldown_cmark::{html, Options, Parser};

pub const MORE_MARKER: &str = "<!--more-->";

// GFM extras used by post bodies; smart punctuation stays off so code
// samples keep their quotes.
fn body_options() -> Options {
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_TABLES);
    opts.insert(Options::ENABLE_FOOTNOTES);
    opts.insert(Options::ENABLE_STRIKETHROUGH);
    opts.insert(Options::ENABLE_TASKLISTS);
    opts
}

/// Post body as HTML. The more-marker is kept in the output as a comment.
pub fn render_markdown(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len() + markdown.len() / 2);
    html::push_html(&mut out, Parser::new_ext(markdown, body_options()));
    out
}

/// The part of a post above the `<!--more-->` marker, rendered.
pub fn summary(markdown: &str) -> String {
    match markdown.split_once(MORE_MARKER) {
        Some((head, _)) => render_markdown(head),
        None => render_markdown(markdown),
    }
}

/// Text content of an HTML fragment with runs of whitespace collapsed.
pub fn html_to_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                text.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Plain text of `html`, cut to `max_chars`.
pub fn excerpt(html: &str, max_chars: usize) -> String {
    html_to_text(html).chars().take(max_chars).collect()
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
