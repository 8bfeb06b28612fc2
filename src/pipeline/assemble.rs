//! Assembly: pages + descriptions → one document string.
//!
//! Substitution is positional. Each page is a list of [`Segment`]s and an
//! image segment is rendered from the description table by its token; the
//! text segments are copied verbatim and never searched. Whatever bytes the
//! PDF text contains, including something that looks like a token, it cannot
//! be mistaken for an image position.

use crate::config::PageSeparator;
use crate::document::{Description, ImageToken, PageText, Segment};
use crate::prompts::FALLBACK_DESCRIPTION;
use std::collections::BTreeMap;
use tracing::warn;

/// Token → description table, complete before assembly starts.
pub type DescriptionTable = BTreeMap<ImageToken, Description>;

/// Render what goes at an image's position.
pub fn render_description(description: &Description) -> String {
    match description {
        Description::Generated(text) => format!("[image: {}]", text),
        Description::Fallback => FALLBACK_DESCRIPTION.to_string(),
    }
}

/// Join pages in ascending page order, separated by `separator`.
///
/// Every segment is followed by a newline. An image with no table entry is
/// rendered as the fallback (and logged), so no image position is ever left
/// empty.
pub fn assemble(
    pages: &[PageText],
    descriptions: &DescriptionTable,
    separator: &PageSeparator,
) -> String {
    let mut ordered: Vec<&PageText> = pages.iter().collect();
    ordered.sort_by_key(|p| p.page_index);

    let mut out = String::new();
    for (i, page) in ordered.iter().enumerate() {
        if i > 0 {
            out.push_str(&separator.render(page.page_index + 1));
        }
        for segment in &page.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Image(token) => match descriptions.get(token) {
                    Some(d) => out.push_str(&render_description(d)),
                    None => {
                        warn!("{}: no description recorded, using fallback", token);
                        out.push_str(FALLBACK_DESCRIPTION);
                    }
                },
            }
            out.push('\n');
        }
    }
    out
}
