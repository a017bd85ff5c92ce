//! Document export

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Value, json};

use super::{ToolContext, ToolHandler, ToolOutcome, str_arg};
use crate::{Error, Result};

static UNSAFE_TITLE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]").expect("valid regex"));

/// Replace every character outside `[A-Za-z0-9]` with `_`
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    UNSAFE_TITLE_CHARS.replace_all(title, "_").into_owned()
}

/// Output format of a generated document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Txt,
}

impl DocumentFormat {
    /// Parse a format name; unknown or missing names mean PDF
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::to_ascii_uppercase).as_deref() {
            Some("DOCX") => Self::Docx,
            Some("TXT") => Self::Txt,
            _ => Self::Pdf,
        }
    }

    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Txt => "txt",
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Docx => "DOCX",
            Self::Txt => "Text",
        }
    }
}

/// A document to render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRequest {
    /// Title as given, used as the document heading
    pub title: String,
    /// Sanitized title, used as the file stem
    pub file_stem: String,
    pub content: String,
    pub format: DocumentFormat,
}

impl DocumentRequest {
    #[must_use]
    pub fn new(title: Option<&str>, content: Option<&str>, format: DocumentFormat) -> Self {
        let title = title.unwrap_or("Document").to_string();
        Self {
            file_stem: sanitize_title(&title),
            title,
            content: content.unwrap_or_default().to_string(),
            format,
        }
    }

    /// File name including extension
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.file_stem, self.format.extension())
    }
}

/// Renders documents to files
#[async_trait]
pub trait DocumentExporter: Send + Sync {
    /// Render and save `doc`, returning where it was written
    ///
    /// # Errors
    ///
    /// Returns `Error::Export` if rendering or writing fails
    async fn export(&self, doc: &DocumentRequest) -> Result<PathBuf>;
}

/// A4 page size in millimetres
const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 15.0;
const LINE_HEIGHT_MM: f32 = 7.0;
const TITLE_Y_MM: f32 = 20.0;
const BODY_START_Y_MM: f32 = 35.0;

/// Body characters per line at 12pt Helvetica inside the margins
const PDF_WRAP_COLUMNS: usize = 85;

/// Writes documents into a directory
#[derive(Debug, Clone)]
pub struct FileExporter {
    dir: PathBuf,
}

impl FileExporter {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl DocumentExporter for FileExporter {
    async fn export(&self, doc: &DocumentRequest) -> Result<PathBuf> {
        let owned = doc.clone();
        let bytes = tokio::task::spawn_blocking(move || render(&owned))
            .await
            .map_err(|e| Error::Export(format!("render task failed: {e}")))??;

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(doc.file_name());
        tokio::fs::write(&path, bytes).await?;

        tracing::info!(path = %path.display(), format = doc.format.label(), "document exported");
        Ok(path)
    }
}

/// Render `doc` in its own format
///
/// # Errors
///
/// Returns `Error::Export` if rendering fails
pub fn render(doc: &DocumentRequest) -> Result<Vec<u8>> {
    match doc.format {
        DocumentFormat::Pdf => render_pdf(doc),
        DocumentFormat::Docx => render_docx(doc),
        DocumentFormat::Txt => Ok(doc.content.clone().into_bytes()),
    }
}

/// Title in bold 18pt, then the body wrapped and paginated in 12pt
///
/// # Errors
///
/// Returns `Error::Export` if the PDF cannot be assembled
pub fn render_pdf(doc: &DocumentRequest) -> Result<Vec<u8>> {
    use printpdf::{BuiltinFont, Mm, PdfDocument};

    let pdf_err = |e: printpdf::Error| Error::Export(format!("PDF: {e}"));

    let (pdf, page, layer) =
        PdfDocument::new(&doc.title, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
    let bold = pdf.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_err)?;
    let regular = pdf.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_err)?;

    let mut current = pdf.get_page(page).get_layer(layer);
    current.use_text(
        doc.title.as_str(),
        18.0,
        Mm(MARGIN_MM),
        Mm(PAGE_HEIGHT_MM - TITLE_Y_MM),
        &bold,
    );

    let mut cursor = BODY_START_Y_MM;
    for line in wrap_lines(&doc.content, PDF_WRAP_COLUMNS) {
        if cursor + LINE_HEIGHT_MM > PAGE_HEIGHT_MM - MARGIN_MM {
            let (page, layer) = pdf.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
            current = pdf.get_page(page).get_layer(layer);
            cursor = TITLE_Y_MM;
        }
        current.use_text(line, 12.0, Mm(MARGIN_MM), Mm(PAGE_HEIGHT_MM - cursor), &regular);
        cursor += LINE_HEIGHT_MM;
    }

    pdf.save_to_bytes().map_err(pdf_err)
}

/// Bold title paragraph, then one paragraph per content line
///
/// # Errors
///
/// Returns `Error::Export` if the package cannot be written
pub fn render_docx(doc: &DocumentRequest) -> Result<Vec<u8>> {
    use docx_rs::{Docx, Paragraph, Run};

    // Sizes are in half-points
    let heading = Paragraph::new().add_run(Run::new().add_text(doc.title.as_str()).bold().size(32));
    let docx = doc.content.split('\n').fold(Docx::new().add_paragraph(heading), |docx, line| {
        docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(line)))
    });

    let mut buf = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut buf)
        .map_err(|e| Error::Export(format!("DOCX: {e}")))?;
    Ok(buf.into_inner())
}

/// Word-wrap each line of `text` to at most `columns` characters
///
/// Words longer than a line are split. Blank lines are kept.
#[must_use]
pub fn wrap_lines(text: &str, columns: usize) -> Vec<String> {
    let columns = columns.max(1);
    let mut lines = Vec::new();

    for raw in text.lines() {
        let mut line = String::new();
        for word in raw.split_whitespace() {
            let mut word = word;
            while word.chars().count() > columns {
                if !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                }
                let split = word.char_indices().nth(columns).map_or(word.len(), |(i, _)| i);
                lines.push(word[..split].to_string());
                word = &word[split..];
            }

            let needed = if line.is_empty() { 0 } else { line.chars().count() + 1 };
            if needed + word.chars().count() > columns {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }
        lines.push(line);
    }

    lines
}

pub struct CreateDocumentTool;

#[async_trait]
impl ToolHandler for CreateDocumentTool {
    fn name(&self) -> &'static str {
        "create_document"
    }

    async fn call(&self, args: &Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let format = DocumentFormat::parse(str_arg(args, "format"));
        let request = DocumentRequest::new(
            str_arg(args, "title"),
            args.get("content").and_then(Value::as_str),
            format,
        );

        match ctx.exporter.export(&request).await {
            Ok(_) => Ok(ToolOutcome::ok(json!({
                "success": true,
                "message": format!("{} document saved as {}", format.label(), request.file_name()),
            }))),
            Err(e) => {
                tracing::warn!(error = %e, file = %request.file_name(), "document export failed");
                Ok(ToolOutcome::failure(format!("Failed to generate document: {e}")))
            }
        }
    }
}
