use std::path::Path;

use opml::{Outline, OPML};

use crate::error::Result;

/// Reads `(topic, feed url)` pairs from an OPML file. The topic is the
/// outline's text, lower-cased; nested outlines are flattened.
pub fn parse_opml_file(path: &Path) -> Result<Vec<(String, String)>> {
    let content = std::fs::read_to_string(path)?;
    parse_opml(&content)
}

fn parse_opml(content: &str) -> Result<Vec<(String, String)>> {
    let document = OPML::from_str(content)?;
    let mut feeds = Vec::new();
    for outline in &document.body.outlines {
        collect(outline, &mut feeds);
    }
    Ok(feeds)
}

fn collect(outline: &Outline, feeds: &mut Vec<(String, String)>) {
    if let Some(url) = outline.xml_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        let name = if outline.text.trim().is_empty() {
            outline.title.as_deref().unwrap_or_default()
        } else {
            outline.text.as_str()
        };
        let topic = name.trim().to_lowercase();
        if topic.is_empty() {
            tracing::warn!("Skipping unnamed OPML outline for {}", url);
        } else {
            feeds.push((topic, url.to_string()));
        }
    }

    for child in &outline.outlines {
        collect(child, feeds);
    }
}
