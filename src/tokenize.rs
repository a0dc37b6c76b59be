//! Tokenizers used to measure and split text for chunking.
//!
//! The chunker only needs token *spans*: the byte range each token covers in
//! the original text. Two backends produce them:
//!
//! - [`HfTokenizer`]: any Hugging Face `tokenizer.json`. The default is the
//!   cl100k-family BPE published as `Xenova/text-embedding-ada-002`,
//!   downloaded once into `~/.cache/onboard-rag/tokenizers/`.
//! - [`WordTokenizer`]: the `tokenizers` crate's whitespace pre-tokenizer
//!   (`\w+|[^\w\s]+`). Needs no model files; used offline and in tests.
//!
//! [`TokenizerSpec::parse`] maps the `chunking.tokenizer` config value to a
//! backend and [`load_tokenizer`] builds it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokenizers::pre_tokenizers::whitespace::Whitespace;
use tokenizers::{OffsetReferential, OffsetType, PreTokenizedString, PreTokenizer, Tokenizer};

use crate::error::Result;

/// Byte range `[start, end)` of one token.
pub type Span = (usize, usize);

/// Anything that can split text into ordered token spans.
pub trait TextTokenizer: Send + Sync {
    /// Short identifier for logs (e.g. `"words"`, `"hf:Xenova/..."`).
    fn name(&self) -> &str;

    /// Token spans over `text`, in order, as byte offsets into `text`.
    fn token_spans(&self, text: &str) -> Result<Vec<Span>>;

    fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(self.token_spans(text)?.len())
    }
}

/// Word and punctuation tokens, no vocabulary required.
#[derive(Debug, Default, Clone)]
pub struct WordTokenizer;

impl TextTokenizer for WordTokenizer {
    fn name(&self) -> &str {
        "words"
    }

    fn token_spans(&self, text: &str) -> Result<Vec<Span>> {
        let mut pre = PreTokenizedString::from(text);
        Whitespace::default()
            .pre_tokenize(&mut pre)
            .map_err(|e| anyhow::anyhow!("word pre-tokenization failed: {}", e))?;
        Ok(pre
            .get_splits(OffsetReferential::Original, OffsetType::Byte)
            .into_iter()
            .map(|(_, offsets, _)| offsets)
            .collect())
    }
}

/// A Hugging Face tokenizer loaded from `tokenizer.json`.
pub struct HfTokenizer {
    name: String,
    inner: Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(path: &Path) -> Result<Self> {
        let inner = Tokenizer::from_file(path).map_err(|e| {
            anyhow::anyhow!("failed to load tokenizer {}: {}", path.display(), e)
        })?;
        Ok(Self {
            name: path.display().to_string(),
            inner,
        })
    }

    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Self> {
        let name = name.into();
        let inner = Tokenizer::from_bytes(bytes)
            .map_err(|e| anyhow::anyhow!("failed to parse tokenizer {}: {}", name, e))?;
        Ok(Self { name, inner })
    }
}

impl TextTokenizer for HfTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn token_spans(&self, text: &str) -> Result<Vec<Span>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| anyhow::anyhow!("tokenization failed: {}", e))?;
        Ok(sanitize_spans(text, encoding.get_offsets()))
    }
}

/// Clamp spans to the text, snap them to char boundaries, and drop empty or
/// backwards ones.
///
/// Byte-level BPE can report several tokens for one multi-byte character
/// with identical or mid-character offsets.
fn sanitize_spans(text: &str, offsets: &[(usize, usize)]) -> Vec<Span> {
    let mut spans: Vec<Span> = Vec::with_capacity(offsets.len());
    let mut last_end = 0;
    for &(start, end) in offsets {
        let start = snap_to_char_boundary(text, start.max(last_end));
        let end = snap_up_to_char_boundary(text, end.min(text.len()));
        if end <= start {
            continue;
        }
        spans.push((start, end));
        last_end = end;
    }
    spans
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
pub(crate) fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn snap_up_to_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Parsed form of the `chunking.tokenizer` setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenizerSpec {
    Words,
    /// A Hugging Face repository containing `tokenizer.json`.
    HuggingFace(String),
    /// A local `tokenizer.json`.
    File(PathBuf),
}

impl TokenizerSpec {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.eq_ignore_ascii_case("words") {
            TokenizerSpec::Words
        } else if let Some(repo) = value.strip_prefix("hf:") {
            TokenizerSpec::HuggingFace(repo.to_string())
        } else {
            TokenizerSpec::File(PathBuf::from(value))
        }
    }
}

/// Build the tokenizer named by `spec`, downloading Hugging Face files on
/// first use.
pub async fn load_tokenizer(spec: &TokenizerSpec) -> Result<Arc<dyn TextTokenizer>> {
    match spec {
        TokenizerSpec::Words => Ok(Arc::new(WordTokenizer)),
        TokenizerSpec::File(path) => Ok(Arc::new(HfTokenizer::from_file(path)?)),
        TokenizerSpec::HuggingFace(repo) => {
            let path = ensure_cached(repo).await?;
            let mut tokenizer = HfTokenizer::from_file(&path)?;
            tokenizer.name = format!("hf:{}", repo);
            Ok(Arc::new(tokenizer))
        }
    }
}

fn cache_dir() -> PathBuf {
    let base = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(base)
        .join(".cache")
        .join("onboard-rag")
        .join("tokenizers")
}

async fn ensure_cached(repo: &str) -> Result<PathBuf> {
    let path = cache_dir()
        .join(repo.replace('/', "__"))
        .join("tokenizer.json");
    if path.exists() {
        return Ok(path);
    }

    let url = format!("https://huggingface.co/{}/resolve/main/tokenizer.json", repo);
    tracing::info!(%url, "downloading tokenizer");
    let bytes = reqwest::get(&url)
        .await?
        .error_for_status()?
        .bytes()
        .await?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    // Write-then-rename so a concurrent reader never sees a partial file.
    let tmp = path.with_extension("json.partial");
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, &path).await?;
    Ok(path)
}
