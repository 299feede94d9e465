//! Computations over stored recipes that are not plain CRUD: the shopping
//! list aggregation and its rendering to a downloadable document.

pub mod document;
pub mod error;
pub mod shopping_list;

pub use document::{DocumentRenderer, PdfRenderer, TextRenderer};
pub use shopping_list::{Selection, ShoppingListComputer};

/// Returns the renderer used when the client does not ask for a specific format.
pub fn default_renderer() -> Box<dyn DocumentRenderer> {
    Box::new(PdfRenderer::new())
}

/// Looks up a renderer by its file extension (`pdf`, `txt`).
pub fn renderer_for(format: &str) -> Option<Box<dyn DocumentRenderer>> {
    match format.to_ascii_lowercase().as_str() {
        "pdf" => Some(Box::new(PdfRenderer::new())),
        "txt" | "text" => Some(Box::new(TextRenderer)),
        _ => None,
    }
}
