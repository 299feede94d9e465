//! Rendering of a shopping list into a downloadable document.

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, StringFormat, dictionary};
use tracing::{debug, instrument};

use crate::error::Result;
use crate::shopping_list::ShoppingList;

/// Produces a file body for a shopping list.
pub trait DocumentRenderer: Send + Sync {
    /// MIME type sent in the `Content-Type` header.
    fn content_type(&self) -> &'static str;

    /// Extension used to build the attachment file name.
    fn file_extension(&self) -> &'static str;

    fn render(&self, title: &str, list: &ShoppingList) -> Result<Vec<u8>>;
}

/// One checkbox line per item, e.g. `[ ] flour: 300 g`.
pub fn document_lines(list: &ShoppingList) -> Vec<String> {
    list.items()
        .iter()
        .map(|item| format!("[ ] {}: {} {}", item.name, item.amount, item.measurement_unit))
        .collect()
}

/// Plain UTF-8 text, title first.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextRenderer;

impl DocumentRenderer for TextRenderer {
    fn content_type(&self) -> &'static str {
        "text/plain; charset=utf-8"
    }

    fn file_extension(&self) -> &'static str {
        "txt"
    }

    fn render(&self, title: &str, list: &ShoppingList) -> Result<Vec<u8>> {
        let mut out = String::from(title);
        out.push('\n');
        for line in document_lines(list) {
            out.push('\n');
            out.push_str(&line);
        }
        out.push('\n');
        Ok(out.into_bytes())
    }
}

/// A4 PDF with the builtin Courier font.
#[derive(Debug, Clone, Copy)]
pub struct PdfRenderer {
    font_size: i64,
    leading: i64,
    lines_per_page: usize,
}

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 50;

impl Default for PdfRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfRenderer {
    pub fn new() -> Self {
        let font_size = 12;
        let leading = 16;
        let usable = (PAGE_HEIGHT - 2 * MARGIN) / leading;
        Self {
            font_size,
            leading,
            lines_per_page: usable as usize,
        }
    }

    fn page_content(&self, lines: &[String]) -> Result<Vec<u8>> {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), self.font_size.into()]),
            Operation::new("TL", vec![self.leading.into()]),
            Operation::new("Td", vec![MARGIN.into(), (PAGE_HEIGHT - MARGIN).into()]),
        ];
        for line in lines {
            operations.push(Operation::new("Tj", vec![encode_text(line)]));
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new("ET", vec![]));

        Ok(Content { operations }.encode()?)
    }
}

/// The standard Type1 fonts only cover WinAnsi, anything beyond Latin-1 becomes `?`.
fn encode_text(text: &str) -> Object {
    let bytes = text
        .chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect();
    Object::String(bytes, StringFormat::Literal)
}

impl DocumentRenderer for PdfRenderer {
    fn content_type(&self) -> &'static str {
        "application/pdf"
    }

    fn file_extension(&self) -> &'static str {
        "pdf"
    }

    #[instrument(skip(self, list), fields(items = list.len()))]
    fn render(&self, title: &str, list: &ShoppingList) -> Result<Vec<u8>> {
        let mut lines = vec![title.to_string(), String::new()];
        lines.extend(document_lines(list));

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for chunk in lines.chunks(self.lines_per_page) {
            let content_id = doc.add_object(Stream::new(dictionary! {}, self.page_content(chunk)?));
            let page_id: ObjectId = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        debug!("Rendering shopping list on {} pages", kids.len());
        let pages = dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)?;
        Ok(buffer)
    }
}
