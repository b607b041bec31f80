//! Chunk indexing and retrieval-augmented answering over stored job offers.

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::db::{self, StoredChunk};
use crate::llm::{ChatModel, Embedder};
use crate::split::TextSplitter;

pub const NO_DOCUMENT_ANSWER: &str = "No relevant document found.";

const SYSTEM_PROMPT: &str = "Use the given context to answer the question. \
By the end of each answer, get the Link to inform user more about the job info. \
If you don't know the answer, say you don't know. \
Use three sentence maximum and keep the answer concise.\n\
Context:\n{context}\n";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub query_text: String,
    pub response_text: String,
    pub sources: Vec<String>,
}

// ── Indexing ──

/// Re-chunk the whole job-offer collection and replace the stored chunks.
pub fn index_job_offers<E: Embedder>(
    conn: &Connection,
    embedder: &E,
    splitter: &TextSplitter,
) -> Result<usize> {
    let offers = db::fetch_job_offers(conn)?;
    let corpus = offers
        .iter()
        .map(|o| o.job_offer.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let texts = splitter.split(&corpus);
    info!(offers = offers.len(), chunks = texts.len(), "Text split into chunks");

    let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let vectors = embedder.embed(&inputs)?;
    anyhow::ensure!(
        vectors.len() == texts.len(),
        "embedder returned {} vectors for {} chunks",
        vectors.len(),
        texts.len()
    );

    let rows: Vec<(String, Vec<f32>)> = texts.into_iter().zip(vectors).collect();
    db::replace_chunks(conn, &rows)
}

/// Store each job offer's own embedding on its document.
pub fn embed_job_offers<E: Embedder>(conn: &Connection, embedder: &E) -> Result<usize> {
    let offers = db::fetch_job_offers(conn)?;
    let inputs: Vec<&str> = offers.iter().map(|o| o.job_offer.as_str()).collect();
    let vectors = embedder.embed(&inputs)?;

    let mut updated = 0;
    for (offer, vector) in offers.iter().zip(&vectors) {
        if db::set_offer_embedding(conn, offer.job_id, vector)? {
            updated += 1;
        }
    }
    Ok(updated)
}

// ── Retrieval ──

pub fn vector_query<E: Embedder, C: ChatModel>(
    conn: &Connection,
    embedder: &E,
    chat: &C,
    question: &str,
    top_k: usize,
) -> Result<QueryResponse> {
    let chunks = db::fetch_chunks(conn)?;
    if chunks.is_empty() {
        return Ok(QueryResponse {
            query_text: question.to_string(),
            response_text: NO_DOCUMENT_ANSWER.to_string(),
            sources: Vec::new(),
        });
    }

    let query = embedder
        .embed(&[question])?
        .into_iter()
        .next()
        .context("embedder returned no vector for the question")?;

    let sources: Vec<String> = rank_chunks(chunks, &query, top_k)
        .into_iter()
        .map(|(_, chunk)| chunk.text)
        .collect();
    debug!(retrieved = sources.len(), "Ranked chunks");

    let system = SYSTEM_PROMPT.replace("{context}", &sources.join("\n\n"));
    let response_text = chat.complete(&system, question)?;

    Ok(QueryResponse {
        query_text: question.to_string(),
        response_text,
        sources,
    })
}

/// Highest cosine similarity first; ties keep storage order.
fn rank_chunks(chunks: Vec<StoredChunk>, query: &[f32], top_k: usize) -> Vec<(f32, StoredChunk)> {
    let mut scored = score_chunks(chunks, query);
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.truncate(top_k);
    scored
}

#[cfg(feature = "rayon")]
fn score_chunks(chunks: Vec<StoredChunk>, query: &[f32]) -> Vec<(f32, StoredChunk)> {
    chunks
        .into_par_iter()
        .map(|c| (cosine_similarity(query, &c.embedding), c))
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn score_chunks(chunks: Vec<StoredChunk>, query: &[f32]) -> Vec<(f32, StoredChunk)> {
    chunks
        .into_iter()
        .map(|c| (cosine_similarity(query, &c.embedding), c))
        .collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
