use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::LazyLock;

use pulldown_cmark::{Event, Parser, Tag};
use regex::Regex;

use super::LoadError;
use crate::domain::{Document, DocumentMetadata};

/// Runs inside `word/document.xml`: text runs, paragraph ends, tabs, breaks.
static DOCX_TOKENS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|</w:p>|<w:tab/>|<w:br\b[^>]*/>")
        .expect("docx token pattern is valid")
});

static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank-line pattern is valid"));

static XML_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:#x([0-9A-Fa-f]{1,6})|#([0-9]{1,7})|(lt|gt|quot|apos|amp));")
        .expect("entity pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    PlainText,
    Pdf,
    Docx,
    Markdown,
}

impl DocumentFormat {
    pub const ALL: [DocumentFormat; 4] = [Self::PlainText, Self::Pdf, Self::Docx, Self::Markdown];

    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "txt" => Ok(Self::PlainText),
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            "md" | "markdown" => Ok(Self::Markdown),
            _ => Err(LoadError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::PlainText => "text",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Markdown => "markdown",
        }
    }

    pub fn parse(&self, path: &Path, bytes: &[u8]) -> Result<Vec<Document>, LoadError> {
        match self {
            Self::PlainText => parse_text(path, bytes),
            Self::Pdf => parse_pdf(path, bytes),
            Self::Docx => parse_docx(path, bytes),
            Self::Markdown => parse_markdown(path, bytes),
        }
    }

    fn metadata(&self, path: &Path) -> DocumentMetadata {
        DocumentMetadata::new(path.display().to_string(), self.name())
    }

    fn parse_error(&self, path: &Path, message: impl ToString) -> LoadError {
        LoadError::Parse {
            path: path.to_path_buf(),
            format: self.name(),
            message: message.to_string(),
        }
    }
}

fn utf8(format: DocumentFormat, path: &Path, bytes: &[u8]) -> Result<String, LoadError> {
    let text = std::str::from_utf8(bytes).map_err(|e| format.parse_error(path, e))?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text).to_string())
}

pub fn parse_text(path: &Path, bytes: &[u8]) -> Result<Vec<Document>, LoadError> {
    let format = DocumentFormat::PlainText;
    let text = utf8(format, path, bytes)?;
    Ok(vec![Document::new(text, format.metadata(path))])
}

/// Renders Markdown to plain text: markup dropped, block elements separated
/// by blank lines.
pub fn parse_markdown(path: &Path, bytes: &[u8]) -> Result<Vec<Document>, LoadError> {
    let format = DocumentFormat::Markdown;
    let source = utf8(format, path, bytes)?;

    let mut text = String::with_capacity(source.len());
    for event in Parser::new(&source) {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(&t),
            Event::SoftBreak | Event::HardBreak => text.push('\n'),
            Event::End(
                Tag::Paragraph
                | Tag::Heading(..)
                | Tag::Item
                | Tag::CodeBlock(_)
                | Tag::BlockQuote
                | Tag::TableRow,
            )
            | Event::Rule => text.push_str("\n\n"),
            Event::End(Tag::TableCell) => text.push(' '),
            _ => {}
        }
    }

    let text = BLANK_RUNS.replace_all(text.trim(), "\n\n").into_owned();
    Ok(vec![Document::new(text, format.metadata(path))])
}

/// One document per page, `page` numbered from 1.
pub fn parse_pdf(path: &Path, bytes: &[u8]) -> Result<Vec<Document>, LoadError> {
    let format = DocumentFormat::Pdf;
    let pdf = lopdf::Document::load_mem(bytes).map_err(|e| format.parse_error(path, e))?;

    pdf.get_pages()
        .keys()
        .map(|&page| {
            let text = pdf
                .extract_text(&[page])
                .map_err(|e| format.parse_error(path, format!("page {page}: {e}")))?;
            Ok::<_, LoadError>(Document::new(
                text,
                format.metadata(path).with_page(page as usize),
            ))
        })
        .collect()
}

pub fn parse_docx(path: &Path, bytes: &[u8]) -> Result<Vec<Document>, LoadError> {
    let format = DocumentFormat::Docx;
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| format.parse_error(path, e))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| format.parse_error(path, e))?
        .read_to_string(&mut xml)
        .map_err(|e| format.parse_error(path, e))?;

    Ok(vec![Document::new(
        docx_plain_text(&xml),
        format.metadata(path),
    )])
}

/// Plain text of a WordprocessingML body, one paragraph per line.
pub fn docx_plain_text(xml: &str) -> String {
    let mut text = String::new();
    for caps in DOCX_TOKENS.captures_iter(xml) {
        match caps.get(1) {
            Some(run) => text.push_str(&unescape_xml(run.as_str())),
            None => match &caps[0] {
                "</w:p>" => text.push('\n'),
                "<w:tab/>" => text.push('\t'),
                _ => text.push('\n'),
            },
        }
    }
    text.trim_end().to_string()
}

/// Decodes the predefined entities and numeric character references in one
/// pass. References to invalid code points are left as written.
fn unescape_xml(raw: &str) -> String {
    XML_ENTITY
        .replace_all(raw, |caps: &regex::Captures| {
            let code = match (caps.get(1), caps.get(2)) {
                (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
                (_, Some(dec)) => dec.as_str().parse().ok(),
                _ => {
                    return match &caps[3] {
                        "lt" => "<",
                        "gt" => ">",
                        "quot" => "\"",
                        "apos" => "'",
                        _ => "&",
                    }
                    .to_string()
                }
            };
            code.and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
