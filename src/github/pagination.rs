//! `Link` header handling for paginated listings.

use reqwest::header::{HeaderMap, LINK};
use reqwest::Url;

/// Where a listing goes after the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextPage {
    /// No `rel="next"` link: the listing is complete.
    End,
    /// The page number carried by the next link.
    Page(u32),
    /// A next link exists but its `page` parameter is unusable.
    Malformed(String),
}

/// Extract the `rel="next"` target from a `Link` header value.
pub fn next_link(value: &str) -> Option<&str> {
    value.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|param| {
            let param = param.trim();
            param == r#"rel="next""# || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        target.strip_prefix('<')?.strip_suffix('>')
    })
}

/// Decide the next page number from the response headers.
///
/// The page is read from the server-provided link rather than counted
/// locally, so the walk follows whatever paging the server chose.
pub fn next_page(headers: &HeaderMap) -> NextPage {
    let Some(link) = headers.get(LINK).and_then(|v| v.to_str().ok()) else {
        return NextPage::End;
    };
    let Some(target) = next_link(link) else {
        return NextPage::End;
    };
    page_from_url(target)
}

fn page_from_url(target: &str) -> NextPage {
    let url = match Url::parse(target) {
        Ok(url) => url,
        Err(e) => return NextPage::Malformed(format!("unparsable next URL {target}: {e}")),
    };
    let Some(raw) = url
        .query_pairs()
        .find(|(key, _)| key == "page")
        .map(|(_, value)| value.into_owned())
    else {
        return NextPage::Malformed(format!("no page parameter in next URL {target}"));
    };
    match raw.parse::<i64>() {
        Ok(page) if page > 0 => match u32::try_from(page) {
            Ok(page) => NextPage::Page(page),
            Err(_) => NextPage::Malformed(format!("page number {page} out of range")),
        },
        Ok(page) => NextPage::Malformed(format!("invalid page number {page}")),
        Err(e) => NextPage::Malformed(format!("invalid page parameter {raw:?}: {e}")),
    }
}
