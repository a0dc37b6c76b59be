//! Text extraction for binary and markup formats (PDF, OOXML, HTML).
//!
//! Loaders hand raw bytes to these functions and get plain UTF-8 text back.
//! Nothing here touches the network or the filesystem. Extraction never
//! panics: malformed input returns an [`ExtractError`] and the loader skips
//! that source.

use std::io::Read;

use quick_xml::events::Event;
use thiserror::Error;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Elements whose content is never visible text.
const SKIPPED_HTML_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "svg"];

/// Elements that start a new line in the extracted text.
const BLOCK_HTML_ELEMENTS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "td", "th",
    "table", "section", "article", "header", "footer", "nav", "main", "aside", "blockquote",
    "pre", "hr", "dd", "dt", "figcaption",
];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

/// Extract text from a PDF, one string per page.
pub fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

/// Extract the body text of a `.docx`, one line per paragraph.
pub fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    extract_paragraph_text(&xml)
}

/// Extract the text of every slide in a `.pptx`, in slide order.
///
/// Slides are separated by a blank line so the chunker sees them as
/// paragraphs.
pub fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    slide_names.sort_by_key(|name| {
        name.trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    let mut slides = Vec::with_capacity(slide_names.len());
    for name in slide_names {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let text = extract_paragraph_text(&xml)?;
        if !text.trim().is_empty() {
            slides.push(text.trim().to_string());
        }
    }
    Ok(slides.join("\n\n"))
}

/// Collect `<*:t>` run text, breaking lines at the end of each `<*:p>`.
///
/// WordprocessingML (`w:t`, `w:p`) and DrawingML (`a:t`, `a:p`) share local
/// names, so the same walk serves both formats.
fn extract_paragraph_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"t" {
                    in_text = false;
                } else if name.as_ref() == b"p" && !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Ok(Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

/// Visible text and `<title>` of an HTML page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HtmlText {
    pub title: Option<String>,
    pub text: String,
}

/// Convert HTML to readable plain text.
///
/// Drops scripts, styles and comments, turns block elements into line
/// breaks, decodes character references, and collapses whitespace.
pub fn html_to_text(html: &str) -> HtmlText {
    // ASCII lowercasing keeps byte offsets aligned with `html`.
    let lower = html.to_ascii_lowercase();
    let mut raw = String::with_capacity(html.len() / 2);
    let mut title: Option<String> = None;
    let mut pos = 0;

    while pos < html.len() {
        let Some(rel) = html[pos..].find('<') else {
            raw.push_str(&decode_entities(&html[pos..]));
            break;
        };
        let tag_start = pos + rel;
        raw.push_str(&decode_entities(&html[pos..tag_start]));

        if lower[tag_start..].starts_with("<!--") {
            pos = match lower[tag_start + 4..].find("-->") {
                Some(end) => tag_start + 4 + end + 3,
                None => html.len(),
            };
            continue;
        }

        let Some(tag_end) = find_tag_end(html, tag_start) else {
            break;
        };
        let inner = &lower[tag_start + 1..tag_end - 1];
        let closing = inner.starts_with('/');
        let name: String = inner
            .trim_start_matches('/')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();
        pos = tag_end;

        if name == "title" && !closing {
            let end = lower[pos..].find("</title").map(|i| pos + i);
            if let Some(end) = end {
                let t = collapse_whitespace(&decode_entities(&html[pos..end]));
                if !t.is_empty() {
                    title = Some(t);
                }
                pos = end;
            }
            continue;
        }

        if !closing && SKIPPED_HTML_ELEMENTS.contains(&name.as_str()) && !inner.ends_with('/') {
            let needle = format!("</{}", name);
            pos = match lower[pos..].find(&needle) {
                Some(i) => {
                    let after = pos + i;
                    lower[after..]
                        .find('>')
                        .map(|j| after + j + 1)
                        .unwrap_or(html.len())
                }
                None => html.len(),
            };
            continue;
        }

        if BLOCK_HTML_ELEMENTS.contains(&name.as_str()) {
            raw.push('\n');
        } else {
            raw.push(' ');
        }
    }

    HtmlText {
        title,
        text: normalize_lines(&raw),
    }
}

/// Byte offset just past the `>` closing the tag opened at `start`.
/// A `>` inside a quoted attribute value does not close the tag.
fn find_tag_end(html: &str, start: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    let mut prev = b'<';
    for (i, b) in html.bytes().enumerate().skip(start + 1) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if (b == b'"' || b == b'\'') && prev == b'=' => quote = Some(b),
            None if b == b'>' => return Some(i + 1),
            None => {}
        }
        if !b.is_ascii_whitespace() {
            prev = b;
        }
    }
    None
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapse intra-line whitespace and keep at most one blank line in a row.
fn normalize_lines(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut blank_run = 0;
    for line in s.lines() {
        let line = collapse_whitespace(line);
        if line.is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run > 1 { "\n\n" } else { "\n" });
        }
        out.push_str(&line);
        blank_run = 0;
    }
    out
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&rest[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" | "#39" => Some('\''),
        "nbsp" => Some(' '),
        "ndash" => Some('\u{2013}'),
        "mdash" => Some('\u{2014}'),
        "hellip" => Some('\u{2026}'),
        "copy" => Some('\u{00a9}'),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
