use scraper::{ElementRef, Html, Selector};

/// Containers that usually hold the article body, most specific first.
const CONTENT_SELECTORS: &[&str] = &[
    "[itemprop=articleBody]",
    "article",
    ".entry-content",
    ".post-content",
    ".article-content",
    ".article-body",
    ".post-body",
    "main",
    "#content",
];

/// Elements whose text is never article content.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "aside", "form", "figure",
    "template", "svg", "button",
];

/// A container must yield at least this many characters of paragraph text
/// to be accepted; otherwise the next selector is tried.
const MIN_CONTENT_LEN: usize = 200;

/// Extract the main readable text from an HTML page.
///
/// Tries [`CONTENT_SELECTORS`] in order and takes the paragraphs of the
/// richest matching container. Falls back to every paragraph in the page,
/// then to the visible body text. Returns `None` when nothing readable is
/// left.
pub fn extract_main_text(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let paragraphs = Selector::parse("p, h2, h3, blockquote, li").ok()?;

    let mut best: Option<String> = None;
    for css in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        for container in document.select(&selector) {
            let text = block_text(container, &paragraphs);
            if best.as_ref().is_none_or(|b| text.len() > b.len()) {
                best = Some(text);
            }
        }
        if best.as_ref().is_some_and(|b| b.len() >= MIN_CONTENT_LEN) {
            return best;
        }
    }

    let body = Selector::parse("body").ok()?;
    let fallback = document
        .select(&body)
        .next()
        .map(|body| {
            let text = block_text(body, &paragraphs);
            if text.is_empty() {
                visible_text(body)
            } else {
                text
            }
        })
        .unwrap_or_default();

    [best.unwrap_or_default(), fallback]
        .into_iter()
        .filter(|t| !t.is_empty())
        .max_by_key(String::len)
}

/// Paragraph-level blocks under `root`, one per line pair.
///
/// A matched block nested inside another matched block (an `li` holding a
/// `p`) is skipped so its text is not emitted twice.
fn block_text(root: ElementRef<'_>, blocks: &Selector) -> String {
    let mut parts = Vec::new();
    for block in root.select(blocks) {
        if is_skipped(block, root) || has_block_ancestor(block, root, blocks) {
            continue;
        }
        let text = visible_text(block);
        if !text.is_empty() {
            parts.push(text);
        }
    }
    parts.join("\n\n")
}

/// Whitespace-normalized text of `root`, ignoring [`SKIP_TAGS`] subtrees.
fn visible_text(root: ElementRef<'_>) -> String {
    let mut words: Vec<&str> = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .take_while(|el| *el != root)
            .any(|el| SKIP_TAGS.contains(&el.value().name()));
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }
    words.join(" ")
}

fn is_skipped(element: ElementRef<'_>, root: ElementRef<'_>) -> bool {
    std::iter::once(element)
        .chain(
            element
                .ancestors()
                .filter_map(ElementRef::wrap)
                .take_while(|el| *el != root),
        )
        .any(|el| SKIP_TAGS.contains(&el.value().name()))
}

fn has_block_ancestor(element: ElementRef<'_>, root: ElementRef<'_>, blocks: &Selector) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .take_while(|el| *el != root)
        .any(|el| blocks.matches(&el))
}
