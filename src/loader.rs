//! Document loading from URLs and local files.
//!
//! Each source identifier is classified into a [`SourceKind`] by a pure
//! function of its text: an `http://` or `https://` prefix means a web page,
//! otherwise the file extension decides. Each kind knows how to load itself.
//!
//! | Kind | Identifiers | Documents |
//! |------|-------------|-----------|
//! | `Web` | `http(s)://…` | one, HTML reduced to text, `<title>` kept |
//! | `Pdf` | `.pdf` | one per non-blank page, `page` is 0-based |
//! | `Markdown` | `.md`, `.markdown` | one |
//! | `Slides` | `.pptx`, `.ppt` | one, slides separated by blank lines |
//! | `WordDoc` | `.docx`, `.doc` | one |
//! | `PlainText` | `.txt` | one |
//!
//! Directories are expanded recursively, in sorted order, into the files
//! they contain that have a supported extension.
//!
//! A source that fails to load is logged and skipped; only a batch where
//! every source fails is an error.

use std::path::Path;
use std::time::Duration;

use walkdir::WalkDir;

use crate::config::ProviderConfig;
use crate::error::{RagError, Result};
use crate::extract;
use crate::models::{Document, DocumentMetadata};

/// Loader capability selected by a source identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Web,
    Pdf,
    Markdown,
    Slides,
    WordDoc,
    PlainText,
}

impl SourceKind {
    /// Pick the loader for `identifier` without touching the network or disk.
    pub fn classify(identifier: &str) -> Result<Self> {
        let trimmed = identifier.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(SourceKind::Web);
        }

        let ext = Path::new(trimmed)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("pdf") => Ok(SourceKind::Pdf),
            Some("md") | Some("markdown") => Ok(SourceKind::Markdown),
            Some("pptx") | Some("ppt") => Ok(SourceKind::Slides),
            Some("docx") | Some("doc") => Ok(SourceKind::WordDoc),
            Some("txt") => Ok(SourceKind::PlainText),
            _ => Err(RagError::UnsupportedSource(identifier.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Web => "web",
            SourceKind::Pdf => "pdf",
            SourceKind::Markdown => "markdown",
            SourceKind::Slides => "slides",
            SourceKind::WordDoc => "word",
            SourceKind::PlainText => "text",
        }
    }

    /// Load `identifier` as this kind. Blank documents are dropped.
    pub async fn load(self, identifier: &str, loader: &Loader) -> Result<Vec<Document>> {
        let docs = match self {
            SourceKind::Web => loader.fetch_web(identifier).await?,
            SourceKind::Pdf => {
                let bytes = tokio::fs::read(identifier).await?;
                pdf_documents(identifier, bytes).await?
            }
            SourceKind::Markdown | SourceKind::PlainText => {
                let bytes = tokio::fs::read(identifier).await?;
                let text = String::from_utf8_lossy(&bytes).trim().to_string();
                vec![document(identifier, self, text)]
            }
            SourceKind::Slides => {
                let bytes = tokio::fs::read(identifier).await?;
                let text = blocking(identifier, move || extract::extract_pptx(&bytes)).await?;
                vec![document(identifier, self, text)]
            }
            SourceKind::WordDoc => {
                let bytes = tokio::fs::read(identifier).await?;
                let text = blocking(identifier, move || extract::extract_docx(&bytes)).await?;
                vec![document(identifier, self, text)]
            }
        };

        Ok(docs
            .into_iter()
            .filter(|d| !d.content.trim().is_empty())
            .collect())
    }
}

fn document(identifier: &str, kind: SourceKind, content: String) -> Document {
    Document {
        content,
        metadata: DocumentMetadata::new(identifier, kind.as_str()),
    }
}

async fn pdf_documents(identifier: &str, bytes: Vec<u8>) -> Result<Vec<Document>> {
    let pages = blocking(identifier, move || extract::extract_pdf_pages(&bytes)).await?;
    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            let mut doc = document(identifier, SourceKind::Pdf, text.trim().to_string());
            doc.metadata.page = Some(i as u32);
            doc
        })
        .collect())
}

/// Run CPU-bound extraction off the async workers.
async fn blocking<T, F>(identifier: &str, f: F) -> Result<T>
where
    F: FnOnce() -> std::result::Result<T, extract::ExtractError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| anyhow::anyhow!("extraction task failed: {}", e))?
        .map_err(|e| RagError::extract(identifier, e))
}

/// Settings for web fetches.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    pub user_agent: String,
    pub timeout: Duration,
}

impl LoaderOptions {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            user_agent: config.effective_user_agent(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self::from_config(&ProviderConfig::default())
    }
}

/// A source that could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: String,
    pub reason: String,
}

/// Documents from a batch plus the sources that were skipped.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub documents: Vec<Document>,
    pub failures: Vec<SourceFailure>,
}

pub struct Loader {
    client: reqwest::Client,
}

impl Loader {
    pub fn new(options: &LoaderOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(options.user_agent.clone())
            .timeout(options.timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Load every source, skipping the ones that fail.
    pub async fn load_all(&self, sources: &[String]) -> Result<LoadOutcome> {
        if sources.iter().all(|s| s.trim().is_empty()) {
            return Err(RagError::InvalidInput("no sources given".into()));
        }

        let mut outcome = LoadOutcome::default();
        for source in expand_sources(sources) {
            let loaded = match SourceKind::classify(&source) {
                Ok(kind) => kind.load(&source, self).await,
                Err(e) => Err(e),
            };
            match loaded {
                Ok(docs) => {
                    tracing::debug!(source = %source, documents = docs.len(), "source loaded");
                    outcome.documents.extend(docs);
                }
                Err(e) => {
                    tracing::warn!(source = %source, error = %e, "skipping source");
                    outcome.failures.push(SourceFailure {
                        source,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if outcome.documents.is_empty() {
            return Err(RagError::NoDocumentsLoaded);
        }
        Ok(outcome)
    }

    async fn fetch_web(&self, url: &str) -> Result<Vec<Document>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| RagError::extract(url, e))?;

        let is_pdf = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("application/pdf"))
            .unwrap_or(false);

        if is_pdf {
            let bytes = response.bytes().await.map_err(|e| RagError::extract(url, e))?;
            let mut docs = pdf_documents(url, bytes.to_vec()).await?;
            for doc in &mut docs {
                doc.metadata.kind = SourceKind::Web.as_str().to_string();
            }
            return Ok(docs);
        }

        let body = response.text().await.map_err(|e| RagError::extract(url, e))?;
        let page = extract::html_to_text(&body);
        let mut doc = document(url, SourceKind::Web, page.text);
        doc.metadata.title = page.title;
        Ok(vec![doc])
    }
}

/// Load `sources` with a fresh [`Loader`]. Fails if none load.
pub async fn load_sources(sources: &[String], options: &LoaderOptions) -> Result<Vec<Document>> {
    Ok(Loader::new(options)?.load_all(sources).await?.documents)
}

/// Replace directory paths with the supported files beneath them.
fn expand_sources(sources: &[String]) -> Vec<String> {
    let mut expanded = Vec::new();
    for source in sources {
        let source = source.trim();
        if source.is_empty() {
            continue;
        }
        let path = Path::new(source);
        if !matches!(SourceKind::classify(source), Ok(SourceKind::Web)) && path.is_dir() {
            for entry in WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let file = entry.path().to_string_lossy().to_string();
                if SourceKind::classify(&file).is_ok() {
                    expanded.push(file);
                }
            }
        } else {
            expanded.push(source.to_string());
        }
    }
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn classify_by_scheme_and_extension() {
        assert_eq!(
            SourceKind::classify("https://www.iiitb.ac.in/about").unwrap(),
            SourceKind::Web
        );
        assert_eq!(SourceKind::classify("HTTP://x.org/a.pdf").unwrap(), SourceKind::Web);
        assert_eq!(SourceKind::classify("docs/about.PDF").unwrap(), SourceKind::Pdf);
        assert_eq!(SourceKind::classify("notes.markdown").unwrap(), SourceKind::Markdown);
        assert_eq!(SourceKind::classify("deck.ppt").unwrap(), SourceKind::Slides);
        assert_eq!(SourceKind::classify("rules.docx").unwrap(), SourceKind::WordDoc);
        assert_eq!(SourceKind::classify("faq.txt").unwrap(), SourceKind::PlainText);
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let err = SourceKind::classify("missing.xyz").unwrap_err();
        assert!(matches!(err, RagError::UnsupportedSource(ref s) if s == "missing.xyz"));
        assert!(SourceKind::classify("README").is_err());
    }

    #[tokio::test]
    async fn empty_source_list_is_invalid_input() {
        let err = load_sources(&[], &LoaderOptions::default()).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn loads_markdown_with_source_metadata() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("welcome.md");
        std::fs::write(&path, "# Welcome\n\nOrientation starts Monday.\n").unwrap();
        let source = path.to_string_lossy().to_string();

        let docs = load_sources(&[source.clone()], &LoaderOptions::default())
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].metadata.source, source);
        assert_eq!(docs[0].metadata.kind, "markdown");
        assert!(docs[0].content.starts_with("# Welcome"));
    }

    #[tokio::test]
    async fn failures_are_skipped_and_reported() {
        let tmp = TempDir::new().unwrap();
        let good = tmp.path().join("faq.txt");
        std::fs::write(&good, "Library opens at 9am.").unwrap();
        let sources = vec![
            good.to_string_lossy().to_string(),
            "missing.xyz".to_string(),
            tmp.path().join("gone.md").to_string_lossy().to_string(),
        ];

        let outcome = Loader::new(&LoaderOptions::default())
            .unwrap()
            .load_all(&sources)
            .await
            .unwrap();
        assert_eq!(outcome.documents.len(), 1);
        assert_eq!(outcome.failures.len(), 2);
        assert_eq!(outcome.failures[0].source, "missing.xyz");
    }

    #[tokio::test]
    async fn all_failures_is_no_documents() {
        let err = load_sources(&["missing.xyz".to_string()], &LoaderOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::NoDocumentsLoaded));
    }

    #[tokio::test]
    async fn legacy_word_doc_fails_extraction() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("old.doc");
        std::fs::write(&path, b"\xd0\xcf\x11\xe0 not a zip").unwrap();
        let err = SourceKind::WordDoc
            .load(&path.to_string_lossy(), &Loader::new(&LoaderOptions::default()).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Extract { .. }));
    }

    #[test]
    fn directories_expand_sorted_and_filtered() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("b.md"), "b").unwrap();
        std::fs::write(tmp.path().join("a.txt"), "a").unwrap();
        std::fs::write(tmp.path().join("image.png"), "x").unwrap();
        std::fs::write(tmp.path().join("sub").join("c.md"), "c").unwrap();

        let expanded = expand_sources(&[tmp.path().to_string_lossy().to_string()]);
        let names: Vec<String> = expanded
            .iter()
            .map(|p| {
                Path::new(p)
                    .strip_prefix(tmp.path())
                    .unwrap()
                    .to_string_lossy()
                    .to_string()
            })
            .collect();
        assert_eq!(names, vec!["a.txt", "b.md", "sub/c.md"]);
    }
}
