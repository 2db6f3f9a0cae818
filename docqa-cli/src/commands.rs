use std::sync::Arc;

use anyhow::{Context, Result};
use docqa_rag::openai::{OpenAIChatModel, OpenAIEmbeddingProvider};
use docqa_rag::{
    ConversationHistory, EmbeddingProvider, IndexStore, Indexer, LanguageModel, QaOrchestrator,
    QaResponse, Retriever, TextFileSource,
};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{debug, info, warn};

use crate::args::{AskArgs, ChatArgs, ChatModelArgs, EmbeddingModelArgs, IndexArgs, SessionArgs};

const PROMPT: &str = "docqa> ";

fn embedding_provider(models: &EmbeddingModelArgs) -> Result<Arc<dyn EmbeddingProvider>> {
    let mut provider = OpenAIEmbeddingProvider::from_env()?.with_model(&models.embedding_model);
    if let Some(dims) = models.embedding_dimensions {
        provider = provider.with_dimensions(dims);
    }
    Ok(Arc::new(provider))
}

fn language_model(models: &ChatModelArgs) -> Result<Arc<dyn LanguageModel>> {
    let mut model = OpenAIChatModel::from_env()?.with_model(&models.chat_model);
    if let Some(temperature) = models.temperature {
        model = model.with_temperature(temperature);
    }
    Ok(Arc::new(model))
}

fn orchestrator(session: &SessionArgs) -> Result<QaOrchestrator> {
    let retriever = Retriever::new(embedding_provider(&session.embedding)?, Arc::new(IndexStore::new()));
    let qa = QaOrchestrator::builder()
        .config(session.config()?)
        .retriever(retriever)
        .language_model(language_model(&session.chat)?)
        .storage_path(&session.index_dir)
        .build()?;
    Ok(qa)
}

pub async fn index(args: IndexArgs) -> Result<()> {
    let indexer = Indexer::builder()
        .config(args.config()?)
        .embedding_provider(embedding_provider(&args.embedding)?)
        .build()?;

    let summary = indexer
        .build_from_source(&TextFileSource::new(), &args.document, &args.index_dir)
        .await
        .with_context(|| format!("failed to index {}", args.document.display()))?;

    println!("Indexed {} passages into {}", summary.passage_count, summary.storage_path.display());
    Ok(())
}

pub async fn ask(args: AskArgs) -> Result<()> {
    let qa = orchestrator(&args.session)?;
    let response = qa.ask(&args.question, &ConversationHistory::new()).await?;
    print_response(&response, args.session.show_sources);
    Ok(())
}

pub async fn chat(args: ChatArgs) -> Result<()> {
    let qa = orchestrator(&args.session)?;
    let mut editor = DefaultEditor::new()?;
    let mut history = ConversationHistory::new();

    println!("Ask about the document. /clear forgets the conversation, /exit quits.");
    loop {
        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        remember(&mut editor, input);

        match input {
            "/exit" | "/quit" => break,
            "/clear" => {
                history = ConversationHistory::clear();
                info!("conversation cleared");
                println!("Conversation cleared.");
            }
            question => match qa.ask(question, &history).await {
                Ok(response) => {
                    print_response(&response, args.session.show_sources);
                    history = response.history;
                }
                Err(e) => {
                    warn!(error = %e, "question rejected");
                    println!("{e}");
                }
            },
        }
    }
    Ok(())
}

/// Add `line` to the editor's recall history. Returns whether it was added;
/// repeated lines are skipped.
fn remember(editor: &mut DefaultEditor, line: &str) -> bool {
    match editor.add_history_entry(line) {
        Ok(added) => added,
        Err(e) => {
            debug!(error = %e, "could not record line in editor history");
            false
        }
    }
}

fn print_response(response: &QaResponse, show_sources: bool) {
    println!("{}", response.answer_or_default());
    if let Some(error) = &response.error {
        eprintln!("  ({error})");
    }
    if show_sources {
        for source in &response.sources {
            println!("  [page {}] score {:.3}", source.passage.source_page, source.score);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_lines_are_remembered_once() {
        let mut editor = DefaultEditor::new().unwrap();
        assert!(remember(&mut editor, "When is tuition due?"));
        assert!(!remember(&mut editor, "When is tuition due?"));
        assert!(remember(&mut editor, "/clear"));
    }
}
