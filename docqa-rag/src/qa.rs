//! Conversational question answering over a persisted index.
//!
//! Each call to [`QaOrchestrator::ask`] walks one request through
//! `Idle → Retrieving → Generating → Done`, or ends in `Failed`. The
//! orchestrator keeps no state between requests: the caller hands in its
//! [`ConversationHistory`] and receives the updated one in the response. On
//! every failure path the returned history is the one that was passed in.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::RagConfig;
use crate::document::ScoredPassage;
use crate::error::{RagError, Result};
use crate::history::{ConversationHistory, ConversationTurn};
use crate::llm::{GenerationRequest, LanguageModel};
use crate::retriever::{RetrievalPolicy, Retriever};

/// Text shown to the user when a request fails.
pub const NO_ANSWER: &str = "No answer available.";

const ANSWER_INSTRUCTIONS: &str = "Answer the user's question using only the document passages below. \
If the passages do not contain the answer, say that you do not know rather than inventing one.";

const CONDENSE_INSTRUCTIONS: &str = "Rewrite the user's latest message as a single standalone question \
that can be understood without the earlier conversation. Keep the language of the original message. \
Reply with the rewritten question only.";

/// Phases of a single question/answer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QaState {
    Idle,
    Retrieving,
    Generating,
    Done,
    Failed,
}

/// Outcome reported to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QaStatus {
    Success,
    Failure,
}

/// Result of one [`QaOrchestrator::ask`] call.
#[derive(Debug)]
pub struct QaResponse {
    pub status: QaStatus,
    /// The grounded answer, present only on success.
    pub answer: Option<String>,
    /// Passages the answer was grounded on, most relevant first.
    pub sources: Vec<ScoredPassage>,
    /// History to pass into the next request.
    pub history: ConversationHistory,
    /// Why the request failed, present only on failure.
    pub error: Option<RagError>,
}

impl QaResponse {
    pub fn is_success(&self) -> bool {
        self.status == QaStatus::Success
    }

    /// The answer, or [`NO_ANSWER`] on failure.
    pub fn answer_or_default(&self) -> &str {
        self.answer.as_deref().unwrap_or(NO_ANSWER)
    }
}

/// Combines retrieval, conversation history and a language model into
/// grounded answers. Construct one via [`QaOrchestrator::builder()`].
///
/// # Example
///
/// ```rust,ignore
/// let qa = QaOrchestrator::builder()
///     .retriever(Retriever::new(embedder, store))
///     .language_model(Arc::new(OpenAIChatModel::from_env()?))
///     .storage_path("faiss_index")
///     .build()?;
///
/// let first = qa.ask("What is X?", &ConversationHistory::new()).await?;
/// let second = qa.ask("And how does it relate to Y?", &first.history).await?;
/// ```
pub struct QaOrchestrator {
    retriever: Retriever,
    model: Arc<dyn LanguageModel>,
    storage_path: PathBuf,
    policy: RetrievalPolicy,
    max_turns: usize,
    condense_question: bool,
}

impl QaOrchestrator {
    /// Create a new [`QaOrchestratorBuilder`].
    pub fn builder() -> QaOrchestratorBuilder {
        QaOrchestratorBuilder::default()
    }

    /// The retrieval policy used for every request.
    pub fn policy(&self) -> &RetrievalPolicy {
        &self.policy
    }

    /// Answer `question` in the context of `history`.
    ///
    /// Service and index failures do not surface as `Err`: they produce a
    /// [`QaStatus::Failure`] response carrying the error and the unchanged
    /// history.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidQuery`] if the question is empty or blank;
    /// nothing is retrieved or generated in that case.
    pub async fn ask(&self, question: &str, history: &ConversationHistory) -> Result<QaResponse> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidQuery("question must not be empty".to_string()));
        }

        let span = info_span!(
            "qa.ask",
            storage_path = %self.storage_path.display(),
            policy = self.policy.name(),
            history_len = history.len(),
        );
        self.run(question, history).instrument(span).await
    }

    async fn run(&self, question: &str, history: &ConversationHistory) -> Result<QaResponse> {
        let mut state = QaState::Idle;
        advance(&mut state, QaState::Retrieving);

        let context = history.recent(self.max_turns);
        let search_query = if self.condense_question && !context.is_empty() {
            match self.condense(question, context).await {
                Ok(q) => q,
                Err(e) => return Ok(fail(&mut state, history, e, Vec::new())),
            }
        } else {
            question.to_string()
        };

        let sources = match self
            .retriever
            .retrieve(&search_query, &self.storage_path, &self.policy)
            .await
        {
            Ok(sources) => sources,
            Err(e) => return Ok(fail(&mut state, history, e, Vec::new())),
        };

        advance(&mut state, QaState::Generating);

        let request = GenerationRequest {
            system: grounded_instructions(&sources),
            history: context.to_vec(),
            prompt: question.to_string(),
        };
        let answer = match self.model.generate(&request).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                let e = RagError::EmptyResponse { service: self.model.name().to_string() };
                return Ok(fail(&mut state, history, e, sources));
            }
            Err(e) => return Ok(fail(&mut state, history, e, sources)),
        };

        advance(&mut state, QaState::Done);
        let history = history.append(question, answer.as_str(), self.max_turns);
        info!(source_count = sources.len(), history_len = history.len(), "answered question");

        Ok(QaResponse {
            status: QaStatus::Success,
            answer: Some(answer),
            sources,
            history,
            error: None,
        })
    }

    /// Ask the model to turn a follow-up into a standalone question. An empty
    /// rewrite falls back to the original question.
    async fn condense(&self, question: &str, context: &[ConversationTurn]) -> Result<String> {
        let request = GenerationRequest {
            system: CONDENSE_INSTRUCTIONS.to_string(),
            history: context.to_vec(),
            prompt: question.to_string(),
        };
        let rewritten = self.model.generate(&request).await?;
        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            return Ok(question.to_string());
        }
        debug!(standalone_question = rewritten, "condensed follow-up question");
        Ok(rewritten.to_string())
    }
}

fn advance(state: &mut QaState, next: QaState) {
    debug!(from = ?*state, to = ?next, "qa state transition");
    *state = next;
}

fn fail(
    state: &mut QaState,
    history: &ConversationHistory,
    error: RagError,
    sources: Vec<ScoredPassage>,
) -> QaResponse {
    if error.is_index_unavailable() {
        warn!(phase = ?*state, error = %error, "no index available, returning no answer");
    } else {
        error!(phase = ?*state, error = %error, "question answering failed");
    }
    advance(state, QaState::Failed);

    QaResponse {
        status: QaStatus::Failure,
        answer: None,
        sources,
        history: history.clone(),
        error: Some(error),
    }
}

/// System instructions followed by the retrieved passages, labelled by page.
fn grounded_instructions(sources: &[ScoredPassage]) -> String {
    let mut out = String::from(ANSWER_INSTRUCTIONS);
    out.push_str("\n\n----------------\n");
    if sources.is_empty() {
        out.push_str("(no relevant passages were found)");
    }
    for (i, source) in sources.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        out.push_str(&format!("[page {}] {}", source.passage.source_page, source.passage.text.trim()));
    }
    out
}

/// Builder for constructing a [`QaOrchestrator`].
///
/// The retriever, language model and storage path are required. Policy,
/// turn bound and question condensation come from the [`RagConfig`].
#[derive(Default)]
pub struct QaOrchestratorBuilder {
    config: Option<RagConfig>,
    retriever: Option<Retriever>,
    model: Option<Arc<dyn LanguageModel>>,
    storage_path: Option<PathBuf>,
}

impl QaOrchestratorBuilder {
    /// Set the configuration (retrieval policy, `max_turns`, condensation).
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the retriever.
    pub fn retriever(mut self, retriever: Retriever) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Set the language model used for condensation and answering.
    pub fn language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Set the storage path of the index to answer from.
    pub fn storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Build the [`QaOrchestrator`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] if a required field is missing or
    /// the configuration is invalid.
    pub fn build(self) -> Result<QaOrchestrator> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let retriever = self
            .retriever
            .ok_or_else(|| RagError::Configuration("retriever is required".to_string()))?;
        let model = self
            .model
            .ok_or_else(|| RagError::Configuration("language_model is required".to_string()))?;
        let storage_path = self
            .storage_path
            .ok_or_else(|| RagError::Configuration("storage_path is required".to_string()))?;

        Ok(QaOrchestrator {
            retriever,
            model,
            storage_path,
            policy: config.retrieval,
            max_turns: config.max_turns,
            condense_question: config.condense_question,
        })
    }
}
