//! Discovery and in-place replacement of embedded media references.

use once_cell::sync::Lazy;
use scraper::{Html, Node, Selector, StrTendril};

static MEDIA_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("img[src], video[src], audio[src], source[src]")
        .expect("media selector is valid")
});

/// Every distinct `src` of an embedded media element, in document order.
pub fn collect_media_sources(html: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(html);
    let mut sources: Vec<String> = Vec::new();
    for element in fragment.select(&MEDIA_SELECTOR) {
        if let Some(src) = element.value().attr("src") {
            let src = src.trim();
            if !src.is_empty() && !sources.iter().any(|s| s == src) {
                sources.push(src.to_string());
            }
        }
    }
    sources
}

/// Point the `src` of every media element whose source is `old` at `new`.
///
/// Only the `src` attribute of `img`, `video`, `audio` and `source`
/// elements is touched; other attributes and text keep their
/// value. Returns the rewritten markup and the number of elements changed.
/// With no match the input comes back verbatim.
pub fn rewrite_media_source(html: &str, old: &str, new: &str) -> (String, usize) {
    let mut fragment = Html::parse_fragment(html);
    let targets: Vec<_> = fragment
        .select(&MEDIA_SELECTOR)
        .filter(|element| element.value().attr("src").map(str::trim) == Some(old))
        .map(|element| element.id())
        .collect();
    if targets.is_empty() {
        return (html.to_string(), 0);
    }

    for id in &targets {
        let Some(mut node) = fragment.tree.get_mut(*id) else {
            continue;
        };
        if let Node::Element(element) = node.value() {
            for (name, value) in element.attrs.iter_mut() {
                if &*name.local == "src" {
                    *value = StrTendril::from(new);
                }
            }
        }
    }
    (fragment.root_element().inner_html(), targets.len())
}
