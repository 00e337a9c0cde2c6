use std::collections::VecDeque;
use std::io::Write;

use anyhow::Result;
use colored::Colorize;
use mcpchat_agents::{ChatMessage, ReactAgent, ThreadConfig};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

/// All turns share one thread so the agent sees the whole conversation.
const THREAD_ID: &str = "mcpchat-conversation";

/// What to do with one line of user input.
#[derive(Debug, PartialEq, Eq)]
pub enum QueryInput {
    Quit,
    Query(String),
    /// Empty input replaced by the next example query.
    Example(String),
    /// Empty input with no example queries left.
    NeedInput,
}

/// Interpret a line read from the prompt; `None` means end of input.
pub fn next_query(line: Option<&str>, remaining: &mut VecDeque<String>) -> QueryInput {
    let Some(line) = line else {
        return QueryInput::Quit;
    };
    let query = line.trim();

    if query.eq_ignore_ascii_case("quit") || query.eq_ignore_ascii_case("q") {
        return QueryInput::Quit;
    }
    if query.is_empty() {
        return match remaining.pop_front() {
            Some(example) => QueryInput::Example(example),
            None => QueryInput::NeedInput,
        };
    }
    QueryInput::Query(query.to_string())
}

pub async fn run(agent: &ReactAgent, example_queries: Vec<String>) -> Result<()> {
    let lines = BufReader::new(tokio::io::stdin()).lines();
    converse(agent, example_queries, lines, tokio::signal::ctrl_c()).await
}

/// Conversation loop over `lines`. `interrupt` is one listener for the whole
/// conversation; when it resolves, at the prompt or during a turn, the
/// conversation ends like `quit`.
async fn converse<R, I, T>(
    agent: &ReactAgent,
    example_queries: Vec<String>,
    mut lines: Lines<R>,
    interrupt: I,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    I: Future<Output = T>,
{
    let mut remaining: VecDeque<String> = example_queries.into();

    println!("\nConversation started. Type 'quit' or 'q' to end the conversation.\n");
    if !remaining.is_empty() {
        println!("Example Queries (just type Enter to supply them one by one):");
        for query in &remaining {
            println!("- {query}");
        }
        println!();
    }

    let thread = ThreadConfig::new(THREAD_ID);
    tokio::pin!(interrupt);

    loop {
        let query = tokio::select! {
            query = read_query(&mut lines, &mut remaining) => query?,
            _ = &mut interrupt => None,
        };
        println!();

        let Some(query) = query else {
            println!("{}\n", "Goodbye!".cyan());
            return Ok(());
        };

        let state = tokio::select! {
            state = agent.invoke(vec![ChatMessage::user(query)], &thread) => state?,
            _ = &mut interrupt => {
                println!("\n{}\n", "Goodbye!".cyan());
                return Ok(());
            }
        };
        if state.answer_follows_tool_output() {
            println!();
        }
        println!("{}\n", state.final_text().cyan());
    }
}

async fn read_query<R: AsyncBufRead + Unpin>(
    lines: &mut Lines<R>,
    remaining: &mut VecDeque<String>,
) -> Result<Option<String>> {
    loop {
        print!("{}", "Query: ".yellow());
        std::io::stdout().flush()?;

        let line = lines.next_line().await?;

        match next_query(line.as_deref(), remaining) {
            QueryInput::Quit => return Ok(None),
            QueryInput::Query(query) => return Ok(Some(query)),
            QueryInput::Example(query) => {
                // Replace the empty prompt line with the chosen example.
                print!("\x1b[1A\x1b[2K");
                println!("{}", format!("Example Query: {query}").yellow());
                return Ok(Some(query));
            }
            QueryInput::NeedInput => {
                println!("\nPlease type a query, or 'quit' or 'q' to exit\n");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use mcpchat_agents::providers::{ContentBlock, LlmRequest, LlmResponse};
    use mcpchat_agents::{LlmProvider, MemorySaver};

    use super::*;

    /// Answers every turn with "ok", or never answers when `hang` is set.
    struct StubModel {
        hang: bool,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl LlmProvider for StubModel {
        fn provider_id(&self) -> &str {
            "stub"
        }
        fn model(&self) -> &str {
            "stub"
        }
        async fn complete(&self, _request: &LlmRequest) -> mcpchat_common::Result<LlmResponse> {
            *self.calls.lock().unwrap() += 1;
            if self.hang {
                std::future::pending::<()>().await;
            }
            Ok(LlmResponse {
                content: vec![ContentBlock::Text { text: "ok".into() }],
                model: "stub".into(),
                usage: None,
                stop_reason: None,
            })
        }
    }

    fn agent(hang: bool) -> (ReactAgent, Arc<StubModel>) {
        let model = Arc::new(StubModel {
            hang,
            calls: Mutex::new(0),
        });
        let agent = ReactAgent::new(model.clone(), vec![], Arc::new(MemorySaver::new()));
        (agent, model)
    }

    fn input(text: &'static str) -> Lines<BufReader<&'static [u8]>> {
        BufReader::new(text.as_bytes()).lines()
    }

    #[tokio::test]
    async fn interrupt_during_a_turn_ends_the_conversation() {
        let (agent, model) = agent(true);
        let interrupt = tokio::time::sleep(Duration::from_millis(50));

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            converse(&agent, vec![], input("list the files\n"), interrupt),
        )
        .await;

        assert!(matches!(result, Ok(Ok(()))));
        assert_eq!(*model.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn interrupt_at_the_prompt_ends_the_conversation() {
        let (agent, model) = agent(false);
        // The writer half stays open, so the prompt waits for input.
        let (_writer, reader) = tokio::io::duplex(64);
        let lines = BufReader::new(reader).lines();
        let interrupt = tokio::time::sleep(Duration::from_millis(50));

        let result =
            tokio::time::timeout(Duration::from_secs(5), converse(&agent, vec![], lines, interrupt))
                .await;

        assert!(matches!(result, Ok(Ok(()))));
        assert_eq!(*model.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn turns_run_until_quit() {
        let (agent, model) = agent(false);
        let examples = vec!["first example".to_string()];

        converse(
            &agent,
            examples,
            input("\nsecond\nq\n"),
            std::future::pending::<()>(),
        )
        .await
        .unwrap();

        assert_eq!(*model.calls.lock().unwrap(), 2);
    }

    fn examples(items: &[&str]) -> VecDeque<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn quit_words_and_eof_end_the_conversation() {
        let mut remaining = examples(&[]);
        for input in [Some("quit"), Some("Q"), Some("  QUIT \n"), None] {
            assert_eq!(next_query(input, &mut remaining), QueryInput::Quit);
        }
    }

    #[test]
    fn empty_input_consumes_examples_in_order() {
        let mut remaining = examples(&["Are there any weather alerts in California?", "Read README.md"]);

        assert_eq!(
            next_query(Some(""), &mut remaining),
            QueryInput::Example("Are there any weather alerts in California?".into())
        );
        assert_eq!(
            next_query(Some("   "), &mut remaining),
            QueryInput::Example("Read README.md".into())
        );
        assert_eq!(next_query(Some(""), &mut remaining), QueryInput::NeedInput);
    }

    #[test]
    fn typed_queries_are_trimmed_and_leave_examples_alone() {
        let mut remaining = examples(&["example"]);
        assert_eq!(
            next_query(Some("  what's in /tmp?  "), &mut remaining),
            QueryInput::Query("what's in /tmp?".into())
        );
        assert_eq!(remaining.len(), 1);
    }

    #[test]
    fn quit_inside_a_sentence_is_a_query() {
        let mut remaining = examples(&[]);
        assert_eq!(
            next_query(Some("how do I quit vim"), &mut remaining),
            QueryInput::Query("how do I quit vim".into())
        );
    }
}
