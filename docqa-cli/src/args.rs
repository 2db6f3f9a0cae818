use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use docqa_rag::{RagConfig, RetrievalPolicy};

#[derive(Parser, Debug)]
#[command(
    name = "docqa",
    version,
    about = "Index a document and ask questions about it, with follow-ups"
)]
pub struct Cli {
    /// Write logs as JSON lines
    #[arg(long, global = true, env = "DOCQA_LOG_JSON")]
    pub log_json: bool,

    /// Export spans to this OTLP/gRPC collector
    #[arg(long, global = true, env = "DOCQA_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Split a text export of the document into passages, embed them and publish the index
    Index(IndexArgs),
    /// Answer a single question
    Ask(AskArgs),
    /// Interactive question answering that remembers recent turns
    Chat(ChatArgs),
}

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// UTF-8 text file; pages are separated by form feeds
    #[arg(long)]
    pub document: PathBuf,

    #[arg(long, env = "DOCQA_INDEX_DIR", default_value = "faiss_index")]
    pub index_dir: PathBuf,

    /// Maximum characters per passage
    #[arg(long, default_value_t = 1500)]
    pub chunk_size: usize,

    /// Characters shared by consecutive passages
    #[arg(long, default_value_t = 200)]
    pub chunk_overlap: usize,

    /// Passages sent per embedding request
    #[arg(long, default_value_t = 256)]
    pub embed_batch_size: usize,

    #[command(flatten)]
    pub embedding: EmbeddingModelArgs,
}

#[derive(Args, Debug)]
pub struct AskArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    pub question: String,
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    #[command(flatten)]
    pub session: SessionArgs,
}

#[derive(Args, Debug)]
pub struct SessionArgs {
    #[arg(long, env = "DOCQA_INDEX_DIR", default_value = "faiss_index")]
    pub index_dir: PathBuf,

    #[command(flatten)]
    pub retrieval: RetrievalArgs,

    /// Turns of conversation kept as context
    #[arg(long, default_value_t = 4)]
    pub max_turns: usize,

    /// Retrieve with the follow-up question as typed instead of a standalone rewrite
    #[arg(long)]
    pub no_condense: bool,

    /// Print the pages each answer was grounded on
    #[arg(long)]
    pub show_sources: bool,

    #[command(flatten)]
    pub embedding: EmbeddingModelArgs,

    #[command(flatten)]
    pub chat: ChatModelArgs,
}

/// Must match between `index` and the sessions that query the index.
#[derive(Args, Debug)]
pub struct EmbeddingModelArgs {
    #[arg(long, env = "DOCQA_EMBEDDING_MODEL", default_value = "text-embedding-ada-002")]
    pub embedding_model: String,

    /// Requested embedding size, for models that support truncation
    #[arg(long, env = "DOCQA_EMBEDDING_DIMENSIONS")]
    pub embedding_dimensions: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ChatModelArgs {
    #[arg(long, env = "DOCQA_CHAT_MODEL", default_value = "gpt-4")]
    pub chat_model: String,

    #[arg(long)]
    pub temperature: Option<f32>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyKind {
    Similarity,
    Mmr,
}

#[derive(Args, Debug)]
pub struct RetrievalArgs {
    #[arg(long, value_enum, default_value_t = PolicyKind::Similarity)]
    pub policy: PolicyKind,

    /// Passages returned per question
    #[arg(long)]
    pub k: Option<usize>,

    /// Candidates considered by MMR
    #[arg(long)]
    pub fetch_k: Option<usize>,

    /// Minimum similarity for the similarity policy
    #[arg(long)]
    pub threshold: Option<f32>,

    /// MMR trade-off: 1.0 is pure relevance, 0.0 pure diversity
    #[arg(long)]
    pub lambda: Option<f32>,
}

impl RetrievalArgs {
    /// Policy defaults overridden by whichever flags were given.
    pub fn policy(&self) -> RetrievalPolicy {
        let mut policy = match self.policy {
            PolicyKind::Similarity => RetrievalPolicy::similarity(),
            PolicyKind::Mmr => RetrievalPolicy::mmr(),
        };
        match &mut policy {
            RetrievalPolicy::Similarity { k, score_threshold } => {
                *k = self.k.unwrap_or(*k);
                *score_threshold = self.threshold.or(*score_threshold);
            }
            RetrievalPolicy::Mmr { k, fetch_k, lambda } => {
                *k = self.k.unwrap_or(*k);
                *fetch_k = self.fetch_k.unwrap_or(*fetch_k);
                *lambda = self.lambda.unwrap_or(*lambda);
            }
        }
        policy
    }
}

impl IndexArgs {
    pub fn config(&self) -> docqa_rag::Result<RagConfig> {
        RagConfig::builder()
            .chunk_size(self.chunk_size)
            .chunk_overlap(self.chunk_overlap)
            .embed_batch_size(self.embed_batch_size)
            .build()
    }
}

impl SessionArgs {
    pub fn config(&self) -> docqa_rag::Result<RagConfig> {
        RagConfig::builder()
            .retrieval(self.retrieval.policy())
            .max_turns(self.max_turns)
            .condense_question(!self.no_condense)
            .build()
    }
}
