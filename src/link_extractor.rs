use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Container tags whose links are navigation chrome, not content.
const EXCLUDED_TAGS: [&str; 7] = [
    "nav", "footer", "aside", "header", "script", "style", "noscript",
];

/// Class/id fragments that mark non-content page furniture.
const EXCLUDED_NAME_FRAGMENTS: [&str; 9] = [
    "nav", "menu", "footer", "sidebar", "header", "comment", "social", "share", "widget",
];

/// Path fragments that identify listing/utility pages rather than articles.
const SKIP_PATH_PATTERNS: [&str; 21] = [
    "/tag/",
    "/tags/",
    "/category/",
    "/categories/",
    "/author/",
    "/page/",
    "/search",
    "/login",
    "/register",
    "/signup",
    "/about",
    "/contact",
    "/privacy",
    "/terms",
    "/feed",
    "/rss",
    ".xml",
    ".pdf",
    ".jpg",
    ".png",
    ".gif",
];

/// Path fragments that suggest an external link is an article.
const ARTICLE_PATH_HINTS: [&str; 6] = ["/article/", "/post/", "/blog/", "/news/", "/story/", "/20"];

/// Extract candidate article URLs from a listing page, in first-seen order.
///
/// Links inside navigation/footer/sidebar chrome are ignored, URLs are
/// resolved against `base_url` and normalized (fragment stripped, query
/// kept), and listing/utility/asset paths are rejected. Internal links are
/// accepted unconditionally; external links only when their path looks like
/// an article.
pub fn extract_article_links(html: &str, base_url: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let anchors = Selector::parse("a[href]").expect("static selector");

    let mut links = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for anchor in document.select(&anchors) {
        if in_excluded_container(&anchor) {
            continue;
        }

        let href = anchor.value().attr("href").unwrap_or_default();
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
        {
            continue;
        }

        let Ok(mut absolute) = base_url.join(href) else {
            continue;
        };
        if !matches!(absolute.scheme(), "http" | "https") {
            continue;
        }
        absolute.set_fragment(None);
        let normalized = absolute.to_string();

        if !seen.insert(normalized.clone()) {
            continue;
        }

        let path_lower = absolute.path().to_lowercase();
        if SKIP_PATH_PATTERNS.iter().any(|p| path_lower.contains(p)) {
            continue;
        }
        if absolute.path().trim_matches('/').len() < 3 {
            continue;
        }

        let is_internal = absolute.host_str() == base_url.host_str();
        if is_internal || looks_like_article_url(&absolute) {
            links.push(normalized);
        }
    }

    links
}

fn looks_like_article_url(url: &Url) -> bool {
    let path = url.path().to_lowercase();
    ARTICLE_PATH_HINTS.iter().any(|p| path.contains(p))
}

/// True if the element or any ancestor is navigation chrome, either by tag or
/// by a blacklisted class/id fragment.
fn in_excluded_container(element: &ElementRef) -> bool {
    if is_excluded_element(element) {
        return true;
    }
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|e| is_excluded_element(&e))
}

fn is_excluded_element(element: &ElementRef) -> bool {
    let value = element.value();
    if EXCLUDED_TAGS.contains(&value.name()) {
        return true;
    }
    for attr in ["class", "id"] {
        if let Some(names) = value.attr(attr) {
            let names = names.to_lowercase();
            if EXCLUDED_NAME_FRAGMENTS.iter().any(|f| names.contains(f)) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://security.example.com/blog").unwrap()
    }

    fn extract(html: &str) -> Vec<String> {
        extract_article_links(html, &base())
    }

    #[test]
    fn accepts_internal_content_links() {
        let links = extract(
            r#"<main>
                <a href="/posts/new-cve-disclosed">CVE</a>
                <a href="https://security.example.com/posts/patch-tuesday">Patch</a>
            </main>"#,
        );
        assert_eq!(
            links,
            vec![
                "https://security.example.com/posts/new-cve-disclosed",
                "https://security.example.com/posts/patch-tuesday",
            ]
        );
    }

    #[test]
    fn ignores_links_inside_navigation_chrome() {
        let links = extract(
            r#"<nav><a href="/posts/from-nav">nav</a></nav>
               <footer><a href="/posts/from-footer">footer</a></footer>
               <div class="sidebar-widget"><a href="/posts/from-sidebar">side</a></div>
               <div id="comments"><a href="/posts/from-comments">comment</a></div>
               <main><a href="/posts/kept-article">keep</a></main>"#,
        );
        assert_eq!(links, vec!["https://security.example.com/posts/kept-article"]);
    }

    #[test]
    fn ignores_anchor_with_blacklisted_class() {
        let links = extract(
            r#"<a class="social-share" href="/posts/share-me">share</a>
               <a href="/posts/real-article">real</a>"#,
        );
        assert_eq!(links, vec!["https://security.example.com/posts/real-article"]);
    }

    #[test]
    fn rejects_listing_and_asset_paths() {
        let links = extract(
            r#"<a href="/tag/malware">tag</a>
               <a href="/category/news">cat</a>
               <a href="/author/jane">author</a>
               <a href="/page/2">page</a>
               <a href="/about">about</a>
               <a href="/feed.xml">feed</a>
               <a href="/report.pdf">pdf</a>
               <a href="/images/diagram.png">img</a>
               <a href="/posts/actual-story">story</a>"#,
        );
        assert_eq!(links, vec!["https://security.example.com/posts/actual-story"]);
    }

    #[test]
    fn rejects_non_http_and_trivial_hrefs() {
        let links = extract(
            r##"<a href="#section">frag</a>
               <a href="javascript:void(0)">js</a>
               <a href="mailto:team@example.com">mail</a>
               <a href="tel:+15550100">tel</a>
               <a href="ftp://example.com/files/report">ftp</a>
               <a href="/a">short</a>"##,
        );
        assert!(links.is_empty());
    }

    #[test]
    fn external_links_need_article_shaped_paths() {
        let links = extract(
            r#"<a href="https://other.example.org/">home</a>
               <a href="https://other.example.org/products/widget">product</a>
               <a href="https://other.example.org/news/big-breach">news</a>
               <a href="https://other.example.org/2026/02/exploit-writeup">dated</a>"#,
        );
        assert_eq!(
            links,
            vec![
                "https://other.example.org/news/big-breach",
                "https://other.example.org/2026/02/exploit-writeup",
            ]
        );
    }

    #[test]
    fn strips_fragment_and_keeps_query() {
        let links = extract(r#"<a href="/posts/advisory?id=42#details">adv</a>"#);
        assert_eq!(
            links,
            vec!["https://security.example.com/posts/advisory?id=42"]
        );
    }

    #[test]
    fn deduplicates_preserving_first_seen_order() {
        let links = extract(
            r#"<a href="/posts/second-story">b</a>
               <a href="/posts/first-story">a</a>
               <a href="/posts/second-story#comments">b again</a>"#,
        );
        assert_eq!(
            links,
            vec![
                "https://security.example.com/posts/second-story",
                "https://security.example.com/posts/first-story",
            ]
        );
    }
}
