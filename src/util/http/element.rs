use anyhow::{anyhow, Result};
use scraper::{Html, Selector};

/// Elements whose text is never rendered to the reader.
const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Collects the text a reader would see on the page, one text node per line.
/// Text inside `script`, `style`, `noscript` and `template` is skipped.
pub fn visible_text(document: &Html) -> String {
    let mut lines = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|e| HIDDEN_ELEMENTS.contains(&e.name()))
        });
        if hidden {
            continue;
        }

        let trimmed = text.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }

    lines.join("\n")
}

/// Joins the text of every element matching `css_selector`.
///
/// An invalid selector is an error; a valid selector matching nothing yields
/// an empty string.
pub fn select_text(document: &Html, css_selector: &str) -> Result<String> {
    let selector = Selector::parse(css_selector)
        .map_err(|why| anyhow!("Failed to Selector::parse '{}' because: {:?}", css_selector, why))?;

    Ok(document
        .select(&selector)
        .map(|element| element.text().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n"))
}
