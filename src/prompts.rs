//! Prompt templates and character budgeting.
//!
//! Every builder takes a `budget` (from `chat.max_prompt_chars`) and
//! guarantees the summed length of the returned message contents never
//! exceeds it. The instruction and the question are kept first (the
//! question is truncated only if the two alone overflow), then as much
//! history as fits, newest turns first, then as much of the formatted
//! context (see [`crate::retriever::format_documents`]) as remains, cut at
//! a char boundary.

use crate::llm::ChatMessage;
use crate::models::Turn;

pub const CONDENSE_INSTRUCTION: &str = "Given the following conversation about a codebase and a follow up question, rephrase the follow up question to be a standalone question.";

pub const ANSWER_INSTRUCTION: &str = "Use the following pieces of context to answer the question at the end. If you don't know the answer, try to make up answers based on the provided code.";

pub const BUGS_INSTRUCTION: &str = "You are reviewing code from a software project. Using the code below, list the bugs and risky patterns relevant to the request. Name the file for each finding.";

pub const READABILITY_INSTRUCTION: &str = "Review the readability of the code below with respect to the request. Point out unclear naming and overly long functions, and suggest concrete rewrites.";

pub const DOCS_INSTRUCTION: &str = "Write developer documentation for the function described at the end, using the code below. Describe its purpose, parameters, return value and known bugs.";

pub const PROGRESS_INSTRUCTION: &str = "Compare the client requirements with the documented work below and summarise the project's progress. List the requirements that look complete and those still outstanding.";

pub const FILE_ANALYSIS_INSTRUCTION: &str = "Analyse every function in the file below. For each function give its name, a one-line summary and any problems you notice.";

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Total characters across message contents.
pub fn prompt_chars(messages: &[ChatMessage]) -> usize {
    messages.iter().map(|m| char_len(&m.content)).sum()
}

struct Budget {
    remaining: usize,
}

impl Budget {
    fn new(total: usize, fixed: usize) -> Self {
        Self {
            remaining: total.saturating_sub(fixed),
        }
    }

    fn try_spend(&mut self, n: usize) -> bool {
        if n > self.remaining {
            return false;
        }
        self.remaining -= n;
        true
    }
}

/// Shorten `question` so `overhead + question` fits `budget`.
fn fit_question(question: &str, overhead: usize, budget: usize) -> &str {
    truncate_chars(question, budget.saturating_sub(overhead))
}

/// Newest turns that fit, returned oldest first.
fn fit_history<'a>(history: &'a [Turn], budget: &mut Budget) -> &'a [Turn] {
    let mut start = history.len();
    for (i, turn) in history.iter().enumerate().rev() {
        if !budget.try_spend(char_len(&turn.question) + char_len(&turn.answer)) {
            break;
        }
        start = i;
    }
    &history[start..]
}

fn fit_context<'a>(context: &'a str, budget: &mut Budget) -> &'a str {
    let fitted = truncate_chars(context, budget.remaining);
    budget.remaining -= char_len(fitted);
    fitted
}

fn history_messages(turns: &[Turn]) -> impl Iterator<Item = ChatMessage> + '_ {
    turns.iter().flat_map(|t| {
        [
            ChatMessage::user(t.question.clone()),
            ChatMessage::assistant(t.answer.clone()),
        ]
    })
}

/// Rephrase a follow-up into a standalone question.
pub fn condense_prompt(history: &[Turn], question: &str, budget: usize) -> Vec<ChatMessage> {
    const PREFIX: &str = "Follow Up Input: ";
    const SUFFIX: &str = " Standalone question:";

    let overhead = char_len(CONDENSE_INSTRUCTION) + char_len(PREFIX) + char_len(SUFFIX);
    let question = fit_question(question, overhead, budget);
    let mut remaining = Budget::new(budget, overhead + char_len(question));
    let turns = fit_history(history, &mut remaining);

    let mut messages = vec![ChatMessage::system(CONDENSE_INSTRUCTION)];
    messages.extend(history_messages(turns));
    messages.push(ChatMessage::user(format!("{}{}{}", PREFIX, question, SUFFIX)));
    messages
}

/// Answer `question` from retrieved `context` and the conversation so far.
pub fn answer_prompt(
    context: &str,
    history: &[Turn],
    question: &str,
    budget: usize,
) -> Vec<ChatMessage> {
    const QUESTION_PREFIX: &str = "Question: ";

    // instruction + "\n\n" + context + "\n\n"
    let overhead = char_len(ANSWER_INSTRUCTION) + 4 + char_len(QUESTION_PREFIX);
    let question = fit_question(question, overhead, budget);
    let mut remaining = Budget::new(budget, overhead + char_len(question));
    let turns = fit_history(history, &mut remaining);
    let context = fit_context(context, &mut remaining);

    let mut messages = vec![ChatMessage::system(format!(
        "{}\n\n{}\n\n",
        ANSWER_INSTRUCTION, context
    ))];
    messages.extend(history_messages(turns));
    messages.push(ChatMessage::user(format!("{}{}", QUESTION_PREFIX, question)));
    messages
}

/// One-shot task prompt: `instruction` plus context, then `task`.
pub fn task_prompt(instruction: &str, context: &str, task: &str, budget: usize) -> Vec<ChatMessage> {
    // instruction + "\n\n" + context
    let overhead = char_len(instruction) + 2;
    let task = fit_question(task, overhead, budget);
    let mut remaining = Budget::new(budget, overhead + char_len(task));
    let context = fit_context(context, &mut remaining);

    vec![
        ChatMessage::system(format!("{}\n\n{}", instruction, context)),
        ChatMessage::user(task),
    ]
}
