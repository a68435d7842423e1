//! Image placeholder substitution for OCR Markdown.
//!
//! The OCR service emits images as `![id](id)`, i.e. alt text and link
//! target are both the image id. Each placeholder is rewritten to point at
//! the image payload so the Markdown becomes self-contained.

use crate::ocr::PageFragment;

/// Separator placed between consecutive pages in the combined document.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Build the literal placeholder the OCR service emits for an image id.
pub fn placeholder(id: &str) -> String {
    format!("![{id}]({id})")
}

/// Replace every `![id](id)` with `![id](payload)` for each `(id, payload)`
/// pair, in the order given.
///
/// Pure textual substitution: ids that never appear are a no-op, and
/// placeholders whose id is missing from `images` are left untouched.
pub fn inline_images<K, V>(markdown: &str, images: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut out = markdown.to_string();
    for (id, payload) in images {
        let id = id.as_ref();
        let needle = placeholder(id);
        if !out.contains(&needle) {
            continue;
        }
        out = out.replace(&needle, &format!("![{}]({})", id, payload.as_ref()));
    }
    out
}

/// Inline one page using only that page's images, in page order.
pub fn inline_page(page: &PageFragment) -> String {
    let images: Vec<(&str, &str)> = page
        .images
        .iter()
        .map(|img| (img.id.as_str(), img.payload.as_str()))
        .collect();
    inline_images(&page.markdown, &images)
}

/// Inline each page independently, then join them in page order.
///
/// Empty pages still contribute an (empty) entry to the join.
pub fn combine_pages(pages: &[PageFragment]) -> String {
    pages
        .iter()
        .map(inline_page)
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR)
}
