//! History-aware retrieval and answer generation.
//!
//! A turn runs in two model calls at most:
//!
//! 1. With prior history, the model rewrites the question so it stands on
//!    its own ("what about page two?" becomes a full question). Without
//!    history the question is used as-is.
//! 2. The standalone question is embedded, the nearest passages are
//!    retrieved, and the model answers the *original* question with those
//!    passages stuffed into the system prompt.
//!
//! The retrieved passages are returned alongside the answer so the caller
//! can render citations.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::{embed_query, Embedder};
use crate::llm::ChatModel;
use crate::models::{ChatTurn, RetrievedPassage};
use crate::vector_store::VectorStore;

pub const CONTEXTUALIZE_SYSTEM_PROMPT: &str = "Given a chat history and the latest user question \
which might reference context in the chat history, formulate a standalone question which can be \
understood without the chat history. Do NOT answer the question, just reformulate it if needed \
and otherwise return it as is.";

pub const QA_SYSTEM_PROMPT: &str = "You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer the question. \
If you don't know the answer, just say that you don't know.

{context}";

#[derive(Debug, Clone, PartialEq)]
pub struct RagResponse {
    pub answer: String,
    /// Passages the answer was grounded on, in retrieval order.
    pub context: Vec<RetrievedPassage>,
}

#[async_trait]
pub trait ConversationalChain: Send + Sync {
    async fn invoke(&self, query: &str, history: &[ChatTurn]) -> Result<RagResponse>;
}

pub struct RagChain {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn ChatModel>,
    top_k: usize,
}

impl RagChain {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn ChatModel>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            llm,
            top_k: top_k.max(1),
        }
    }

    async fn standalone_question(&self, query: &str, history: &[ChatTurn]) -> Result<String> {
        if history.is_empty() {
            return Ok(query.to_string());
        }
        let rewritten = self
            .llm
            .generate(CONTEXTUALIZE_SYSTEM_PROMPT, history, query)
            .await?;
        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            return Ok(query.to_string());
        }
        tracing::debug!(original = query, standalone = rewritten, "contextualized question");
        Ok(rewritten.to_string())
    }
}

#[async_trait]
impl ConversationalChain for RagChain {
    async fn invoke(&self, query: &str, history: &[ChatTurn]) -> Result<RagResponse> {
        let question = self.standalone_question(query, history).await?;
        let vector = embed_query(self.embedder.as_ref(), &question).await?;
        let context = self.store.query(&vector, self.top_k).await?;
        tracing::debug!(passages = context.len(), "retrieved context");

        let system = qa_system_prompt(&context);
        let answer = self.llm.generate(&system, history, query).await?;

        Ok(RagResponse { answer, context })
    }
}

/// Fill the QA prompt's `{context}` slot with passage texts separated by blank lines.
pub fn qa_system_prompt(context: &[RetrievedPassage]) -> String {
    let joined = context
        .iter()
        .map(|p| p.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    QA_SYSTEM_PROMPT.replace("{context}", &joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, PageNumber};
    use crate::vector_store::InMemoryStore;
    use std::sync::Mutex;

    /// Maps text to a 2-d vector: "refund" leans one way, everything else the other.
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.to_lowercase().contains("refund") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct RecordingModel {
        calls: Mutex<Vec<(String, usize, String)>>,
    }

    #[async_trait]
    impl ChatModel for RecordingModel {
        async fn generate(
            &self,
            system: &str,
            history: &[ChatTurn],
            input: &str,
        ) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((system.to_string(), history.len(), input.to_string()));
            if system == CONTEXTUALIZE_SYSTEM_PROMPT {
                Ok("What is the refund window?".to_string())
            } else {
                Ok("Thirty days.".to_string())
            }
        }
    }

    fn chunk(id: &str, page: u64, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            source: "policy.pdf".to_string(),
            page,
            chunk_index: 0,
            text: text.to_string(),
            hash: String::new(),
        }
    }

    async fn chain(model: Arc<RecordingModel>) -> RagChain {
        let store = InMemoryStore::new();
        store
            .upsert(
                &[
                    chunk("r", 4, "Refunds are accepted within thirty days."),
                    chunk("t", 9, "Travel must be booked two weeks ahead."),
                ],
                &[vec![1.0, 0.0], vec![0.0, 1.0]],
            )
            .await
            .unwrap();
        RagChain::new(Arc::new(KeywordEmbedder), Arc::new(store), model, 1)
    }

    #[tokio::test]
    async fn first_turn_skips_contextualization() {
        let model = Arc::new(RecordingModel::default());
        let rag = chain(model.clone()).await;

        let response = rag.invoke("How do refunds work?", &[]).await.unwrap();
        assert_eq!(response.answer, "Thirty days.");
        assert_eq!(response.context.len(), 1);
        assert_eq!(response.context[0].page, PageNumber::Known(4));

        let calls = model.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.contains("Refunds are accepted within thirty days."));
        assert!(!calls[0].0.contains("{context}"));
    }

    #[tokio::test]
    async fn follow_up_retrieves_with_rewritten_question() {
        let model = Arc::new(RecordingModel::default());
        let rag = chain(model.clone()).await;
        let history = vec![
            ChatTurn::human("Tell me about the policy."),
            ChatTurn::ai("It covers travel and returns."),
        ];

        // "How long?" alone would embed toward travel; the rewrite mentions refunds.
        let response = rag.invoke("How long?", &history).await.unwrap();
        assert_eq!(response.context[0].content, "Refunds are accepted within thirty days.");

        let calls = model.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, CONTEXTUALIZE_SYSTEM_PROMPT);
        assert_eq!(calls[1].1, 2);
        assert_eq!(calls[1].2, "How long?");
    }

    #[test]
    fn context_passages_joined_with_blank_lines() {
        let ctx = vec![
            RetrievedPassage::new(Some("a.pdf"), PageNumber::Known(0), "one"),
            RetrievedPassage::new(Some("a.pdf"), PageNumber::Known(1), "two"),
        ];
        let prompt = qa_system_prompt(&ctx);
        assert!(prompt.ends_with("one\n\ntwo"));
        assert!(prompt.starts_with("You are an assistant"));
    }
}
