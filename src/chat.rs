//! Terminal chat session.
//!
//! A line-oriented REPL over any reader/writer pair so the loop can be driven
//! from tests. Each answer is followed by a deduplicated `Sources:` block
//! unless the prompt was small talk.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Result;

use crate::citation::render_citations;
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::llm::GeminiModel;
use crate::models::ChatTurn;
use crate::rag::{ConversationalChain, RagChain};
use crate::vector_store::PineconeStore;

const EXIT_WORDS: [&str; 3] = ["exit", "quit", "q"];
const SMALL_TALK: [&str; 6] = ["thank", "thanks", "goodbye", "bye", "hello", "hi"];

/// True for greetings, thanks, and other prompts too short to deserve citations.
pub fn is_conversational(prompt: &str) -> bool {
    let words: Vec<String> = prompt
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .collect();
    if words.len() < 4 {
        return true;
    }
    words.iter().any(|w| SMALL_TALK.contains(&w.as_str()))
}

fn is_exit(line: &str) -> bool {
    let lowered = line.trim().to_lowercase();
    EXIT_WORDS.contains(&lowered.as_str())
}

/// Run the REPL until an exit word or end of input.
///
/// Chain failures are printed inline and leave the history untouched.
pub async fn run_session<R, W>(
    chain: &dyn ConversationalChain,
    mut input: R,
    output: &mut W,
) -> Result<Vec<ChatTurn>>
where
    R: BufRead,
    W: Write,
{
    let mut history: Vec<ChatTurn> = Vec::new();
    writeln!(output, "Chat ready. Type 'exit', 'quit' or 'q' to quit.")?;

    loop {
        write!(output, "You: ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            break;
        }
        let query = line.trim();

        if is_exit(query) {
            writeln!(output, "Ending session.")?;
            break;
        }
        if query.is_empty() {
            continue;
        }

        writeln!(output, "Thinking...")?;
        match chain.invoke(query, &history).await {
            Ok(response) => {
                writeln!(output, "\nAnswer:\n{}\n", response.answer)?;
                if !is_conversational(query) {
                    let sources = render_citations(&response.context);
                    if !sources.is_empty() {
                        writeln!(output, "Sources:\n{}\n", sources)?;
                    }
                }
                history.push(ChatTurn::human(query));
                history.push(ChatTurn::ai(response.answer));
            }
            Err(e) => {
                tracing::warn!(error = %e, "chat turn failed");
                writeln!(output, "Error: {:#}", e)?;
            }
        }
    }

    Ok(history)
}

/// `ragdesk chat`: wire the hosted collaborators and run on stdin/stdout.
pub async fn run_chat(config: &Config) -> Result<()> {
    config.require_chat()?;

    let embedder = create_embedder(&config.embedding, config.secrets.openai_api_key.as_deref())?;
    let store = PineconeStore::new(
        config.require_index_name()?,
        config.require_pinecone_key()?,
        config.vector_store.timeout_secs,
    )?;
    let llm = GeminiModel::new(&config.llm, config.require_google_key()?)?;
    tracing::info!(model = llm.model(), "starting chat session");

    let chain = RagChain::new(
        Arc::from(embedder),
        Arc::new(store),
        Arc::new(llm),
        config.retrieval.top_k,
    );

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    run_session(&chain, stdin.lock(), &mut stdout).await?;
    Ok(())
}
