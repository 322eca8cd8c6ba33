//! Article content extraction.
//!
//! Two backends sit behind [`Extractor`]:
//! - **html** (default): fetch the article page and pull the main text out
//!   locally with CSS-selector heuristics
//! - **reader**: delegate to a jina.ai compatible reader service and strip
//!   the boilerplate it leaves behind

mod extractor;
mod html;
mod reader;

pub use extractor::{
    ContentError, Extractor, ExtractorBackend, ExtractorConfig, DEFAULT_CONTENT_TIMEOUT,
};
pub use html::extract_main_text;
pub use reader::DEFAULT_READER_BASE_URL;
