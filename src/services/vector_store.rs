use std::collections::HashSet;
use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::models::SchemaDocument;
use crate::services::embedding::Embedder;

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Documents and their embeddings, searched by cosine similarity
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    entries: Vec<(SchemaDocument, Vec<f32>)>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, document: SchemaDocument, embedding: Vec<f32>) {
        self.entries.push((document, embedding));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top `k` documents, best first; ties keep insertion order
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SchemaDocument> {
        let mut scored: Vec<(f32, &SchemaDocument)> = self
            .entries
            .iter()
            .map(|(doc, embedding)| (cosine_similarity(query, embedding), doc))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.into_iter().take(k).map(|(_, doc)| doc.clone()).collect()
    }
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Retrieves the schema documents most relevant to a question
pub struct SchemaRetriever {
    documents: Vec<SchemaDocument>,
    store: Option<InMemoryVectorStore>,
    embedder: Option<Arc<dyn Embedder>>,
    top_k: usize,
}

impl SchemaRetriever {
    /// Embed every document up front; without an embedder, retrieval is lexical
    pub async fn build(
        documents: Vec<SchemaDocument>,
        embedder: Option<Arc<dyn Embedder>>,
        top_k: usize,
    ) -> Result<Self, AppError> {
        let store = match &embedder {
            Some(embedder) => {
                let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
                let vectors = embedder.embed_documents(&texts).await?;
                let mut store = InMemoryVectorStore::new();
                for (doc, vector) in documents.iter().cloned().zip(vectors) {
                    store.add(doc, vector);
                }
                tracing::debug!("Indexed {} schema documents", store.len());
                Some(store)
            }
            None => {
                tracing::debug!("No embedding endpoint configured, using lexical retrieval");
                None
            }
        };

        Ok(Self {
            documents,
            store,
            embedder,
            top_k,
        })
    }

    pub async fn retrieve(&self, question: &str) -> Result<Vec<SchemaDocument>, AppError> {
        let store = self.store.as_ref().filter(|s| !s.is_empty());
        if let (Some(store), Some(embedder)) = (store, &self.embedder) {
            let query = embedder.embed_query(question).await?;
            return Ok(store.search(&query, self.top_k));
        }
        Ok(self.lexical_search(question))
    }

    fn lexical_search(&self, question: &str) -> Vec<SchemaDocument> {
        let wanted = tokens(question);
        let mut scored: Vec<(usize, &SchemaDocument)> = self
            .documents
            .iter()
            .map(|doc| {
                let mut doc_tokens = tokens(&doc.content);
                doc_tokens.extend(tokens(&doc.table.replace('_', " ")));
                (wanted.intersection(&doc_tokens).count(), doc)
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(self.top_k).map(|(_, doc)| doc.clone()).collect()
    }
}
