//! Deterministic providers and fixtures shared by the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use onboard_rag::app::App;
use onboard_rag::config::Config;
use onboard_rag::embedding::Embedder;
use onboard_rag::error::Result;
use onboard_rag::llm::{ChatModel, ChatRequest};
use onboard_rag::tokenize::WordTokenizer;

const DIMS: usize = 64;

/// Hashed bag-of-words embeddings: texts sharing words point the same way.
pub struct BagOfWords;

impl BagOfWords {
    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIMS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            let mut hash: u64 = 0xcbf29ce484222325;
            for byte in word.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }
            v[(hash % DIMS as u64) as usize] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

#[async_trait]
impl Embedder for BagOfWords {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::vector(text))
    }
}

/// Chat model that echoes queries back and records every request.
///
/// Rewrites return the question unchanged; answers are `"Answer: <question>"`.
#[derive(Default)]
pub struct EchoChat {
    requests: Mutex<Vec<ChatRequest>>,
}

impl EchoChat {
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for EchoChat {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        let last = request
            .messages
            .last()
            .map(|t| t.content.clone())
            .unwrap_or_default();

        let reply = match request.system.as_deref() {
            None => last
                .lines()
                .find_map(|l| l.strip_prefix("Original question: "))
                .unwrap_or(&last)
                .to_string(),
            Some(system) if system.starts_with("Given a chat history") => last,
            Some(_) => format!("Answer: {}", last),
        };
        Ok(reply)
    }
}

/// Chat model that takes `delay` to answer.
pub struct SlowChat {
    pub delay: Duration,
}

#[async_trait]
impl ChatModel for SlowChat {
    fn model_name(&self) -> &str {
        "slow"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        tokio::time::sleep(self.delay).await;
        Ok(request
            .messages
            .last()
            .map(|t| t.content.clone())
            .unwrap_or_default())
    }
}

pub fn test_config(root: &Path) -> Config {
    let mut config = Config::with_root(root);
    config.chunking.tokenizer = "words".to_string();
    config.chunking.chunk_size = 50;
    config.chunking.chunk_overlap = 10;
    config
}

pub async fn test_app(config: Config) -> (App, Arc<EchoChat>) {
    let chat = Arc::new(EchoChat::default());
    let app = App::with_providers(config, Arc::new(BagOfWords), chat.clone(), Arc::new(WordTokenizer))
        .await
        .unwrap();
    (app, chat)
}

pub async fn app_with_chat(config: Config, chat: Arc<dyn ChatModel>) -> App {
    App::with_providers(config, Arc::new(BagOfWords), chat, Arc::new(WordTokenizer))
        .await
        .unwrap()
}

/// Minimal single-page PDF showing `text` in Helvetica.
pub fn minimal_pdf(text: &str) -> Vec<u8> {
    let stream = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", text);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            stream.len(),
            stream
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n");
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

pub fn write_pdf(dir: &Path, name: &str, text: &str) -> String {
    write_file(dir, name, &minimal_pdf(text))
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> String {
    let path: PathBuf = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path.to_string_lossy().into_owned()
}
