//! Visible-text extraction from HTML pages.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static META_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"meta[name="description"]"#));
static OG_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"meta[property="og:description"]"#));
static HEADINGS: LazyLock<Selector> = LazyLock::new(|| selector("h1, h2, h3"));
static MAIN: LazyLock<Selector> = LazyLock::new(|| selector("main"));
static BODY: LazyLock<Selector> = LazyLock::new(|| selector("body"));

const HIDDEN: [&str; 3] = ["script", "style", "noscript"];

/// Keeps a keyword phrase from spanning two parts of the page.
const PART_SEPARATOR: &str = " | ";

/// Lower-cased, whitespace-collapsed text from the title, meta description,
/// h1–h3 headings outside the content root, and `<main>` (or `<body>` when
/// there is no main).
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let content = document
        .select(&MAIN)
        .next()
        .or_else(|| document.select(&BODY).next());

    let mut parts: Vec<String> = Vec::new();
    parts.extend(document.select(&TITLE).map(|t| element_text(&t)));
    parts.extend(meta_content(&document, &META_DESCRIPTION));
    parts.extend(
        document
            .select(&HEADINGS)
            .filter(|h| content.map_or(true, |root| !h.ancestors().any(|a| a.id() == root.id())))
            .map(|h| element_text(&h)),
    );
    if let Some(root) = content {
        parts.push(element_text(&root));
    }
    parts.retain(|p| !p.is_empty());

    parts.join(PART_SEPARATOR).to_lowercase()
}

/// Profile bio as exposed in `og:description`, falling back to the plain
/// `description` meta tag.
pub fn meta_bio(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    meta_content(&document, &OG_DESCRIPTION)
        .or_else(|| meta_content(&document, &META_DESCRIPTION))
}

fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .filter_map(|m| m.value().attr("content"))
        .map(collapse)
        .find(|c| !c.is_empty())
}

/// Text under `root`, skipping script/style/noscript subtrees.
fn element_text(root: &ElementRef) -> String {
    let mut out: Vec<&str> = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| HIDDEN.contains(&e.name()))
        });
        if !hidden {
            out.push(text);
        }
    }
    collapse(&out.join(" "))
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
