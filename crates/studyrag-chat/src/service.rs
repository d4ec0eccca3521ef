use serde::Serialize;
use std::sync::Arc;

use studyrag_core::config::Settings;
use studyrag_retrieval::RetrievalEngine;

use crate::client::GenerationClient;
use crate::error::Result;
use crate::followup::generate_follow_ups;
use crate::orchestrator::GenerationOrchestrator;
use crate::outcome::Reply;
use crate::prompt::{build_context, tutor_prompt, ChatMessage, PromptStyle};
use crate::sources::{build_sources, Source};

/// The answer shape is the same whether generation succeeded or degraded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatAnswer {
    pub message: String,
    pub sources: Vec<Source>,
    pub follow_up_questions: Vec<String>,
    pub prompt_style: PromptStyle,
}

pub struct ChatService {
    engine: Arc<RetrievalEngine>,
    orchestrator: GenerationOrchestrator,
    top_k: usize,
    max_sources: usize,
    default_relevance: f32,
}

impl ChatService {
    pub fn new(
        engine: Arc<RetrievalEngine>,
        client: Arc<dyn GenerationClient>,
        settings: &Settings,
    ) -> Self {
        Self {
            engine,
            orchestrator: GenerationOrchestrator::new(client, &settings.generation),
            top_k: settings.retrieval.top_k_results,
            max_sources: settings.retrieval.max_sources,
            default_relevance: settings.retrieval.default_relevance,
        }
    }

    pub fn orchestrator(&self) -> &GenerationOrchestrator { &self.orchestrator }

    pub async fn answer(
        &self,
        query: &str,
        history: &[ChatMessage],
        style: PromptStyle,
    ) -> Result<ChatAnswer> {
        let results = self.engine.search(query, self.top_k, None).await?;
        let context = build_context(&results);
        let prompt = tutor_prompt(query, &context, history, style);
        tracing::info!(style = %style, hits = results.len(), "generating answer");

        match self.orchestrator.generate(prompt).await.into_reply()? {
            Reply::Degraded(reason) => Ok(ChatAnswer {
                message: reason.message(),
                sources: Vec::new(),
                follow_up_questions: Vec::new(),
                prompt_style: style,
            }),
            Reply::Text(message) => {
                let sources = build_sources(&results, self.max_sources, self.default_relevance);
                let follow_up_questions =
                    generate_follow_ups(&self.orchestrator, query, &message).await;
                Ok(ChatAnswer { message, sources, follow_up_questions, prompt_style: style })
            }
        }
    }
}
