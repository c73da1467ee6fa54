//! Terminal implementations of the interactive ports, plus rendering of
//! live agent events.
//!
//! Questions go to stderr and answers come from stdin, so stdout carries
//! only the model's text.

use async_trait::async_trait;
use kestrel_agent::{AgentStreamEvent, PlanApprover, PlanDecision};
use kestrel_security::{PermissionChoice, PermissionPrompt, PermissionRequest};
use std::future::Future;
use std::io::{self, Write};

/// Print `question` and read one line. `None` on EOF or read failure.
pub async fn ask(question: String) -> Option<String> {
    tokio::task::spawn_blocking(move || {
        let mut err = io::stderr();
        write!(err, "{question}").ok()?;
        err.flush().ok()?;

        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    })
    .await
    .ok()
    .flatten()
}

/// Map a 1-based menu answer to a choice.
pub fn parse_choice(answer: &str) -> Option<PermissionChoice> {
    let index: usize = answer.trim().parse().ok()?;
    PermissionChoice::ALL.get(index.checked_sub(1)?).copied()
}

/// Keep asking until the answer names a menu entry. `None` once the
/// input ends.
pub async fn ask_choice<F, Fut>(question: String, mut ask: F) -> Option<PermissionChoice>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Option<String>>,
{
    let mut prompt = question;
    loop {
        let answer = ask(prompt).await?;
        if let Some(choice) = parse_choice(&answer) {
            return Some(choice);
        }
        prompt = format!("Not a menu entry: {:?}. Choose [1-5]: ", answer.trim());
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

pub struct TerminalPrompt;

#[async_trait]
impl PermissionPrompt for TerminalPrompt {
    async fn choose(&self, request: &PermissionRequest) -> Option<PermissionChoice> {
        let mut question = format!(
            "\nPermission required: {} {}\n",
            request.operation, request.resource
        );
        for (i, choice) in PermissionChoice::ALL.iter().enumerate() {
            question.push_str(&format!("  {}. {}\n", i + 1, choice.label()));
        }
        question.push_str("Choose [1-5]: ");

        ask_choice(question, ask).await
    }

    async fn confirm_dangerous(&self, command: &str, description: &str) -> bool {
        let question = format!(
            "\nDANGEROUS COMMAND ({description}):\n  {command}\nRun it anyway? [y/N]: "
        );
        ask(question).await.is_some_and(|a| is_yes(&a))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAnswer {
    Approve,
    Modify,
    Reject,
}

/// Parse the approve/modify/reject answer. Empty means approve.
pub fn parse_plan_answer(answer: &str) -> Option<PlanAnswer> {
    match answer.trim().to_lowercase().as_str() {
        "" | "a" | "approve" | "y" | "yes" => Some(PlanAnswer::Approve),
        "m" | "modify" => Some(PlanAnswer::Modify),
        "r" | "reject" | "n" | "no" => Some(PlanAnswer::Reject),
        _ => None,
    }
}

pub struct TerminalApprover;

#[async_trait]
impl PlanApprover for TerminalApprover {
    async fn approve(&self, plan: &str) -> PlanDecision {
        let rule = "=".repeat(70);
        eprintln!("\n{rule}\nImplementation plan\n{rule}\n{plan}\n{rule}");

        loop {
            // EOF rejects
            let Some(answer) = ask("Approve this plan? [approve/modify/reject] (approve): ".into()).await
            else {
                return PlanDecision::Reject;
            };
            match parse_plan_answer(&answer) {
                Some(PlanAnswer::Approve) => return PlanDecision::Approve,
                Some(PlanAnswer::Reject) => return PlanDecision::Reject,
                Some(PlanAnswer::Modify) => {
                    let changes = ask("What modifications would you like? ".into())
                        .await
                        .unwrap_or_default();
                    return PlanDecision::Modify(changes);
                }
                None => continue,
            }
        }
    }
}

/// Write one event: model text to `out`, tool activity to `log`.
pub fn render(event: &AgentStreamEvent, out: &mut impl Write, log: &mut impl Write) -> io::Result<()> {
    match event {
        AgentStreamEvent::Chunk { content } => {
            write!(out, "{content}")?;
            out.flush()
        }
        AgentStreamEvent::ToolCall { name, parameters } => {
            writeln!(log, "\n  -> {name} {parameters}")
        }
        AgentStreamEvent::ToolResult {
            name,
            output,
            success,
        } => {
            let status = if *success { "ok" } else { "failed" };
            let first = output.lines().next().unwrap_or_default();
            writeln!(log, "  <- {name} {status}: {first}")
        }
        AgentStreamEvent::Dropped { count } => {
            writeln!(log, "  !! {count} tool call(s) over the per-turn limit were skipped")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[test]
    fn menu_answers() {
        assert_eq!(parse_choice("1"), Some(PermissionChoice::AllowOnce));
        assert_eq!(parse_choice(" 5 "), Some(PermissionChoice::DenyAlwaysInDirectory));
        assert_eq!(parse_choice("0"), None);
        assert_eq!(parse_choice("6"), None);
        assert_eq!(parse_choice("yes"), None);
    }

    #[tokio::test]
    async fn invalid_menu_answers_ask_again() {
        let mut answers = VecDeque::from(["9", "yes", " 2 "]);
        let mut asked = Vec::new();
        let choice = ask_choice("Choose [1-5]: ".into(), |q| {
            asked.push(q);
            let answer = answers.pop_front().map(String::from);
            async move { answer }
        })
        .await;

        assert_eq!(choice, Some(PermissionChoice::AllowSession));
        assert_eq!(asked.len(), 3);
        assert!(asked[1].starts_with("Not a menu entry: \"9\""));
    }

    #[tokio::test]
    async fn end_of_input_denies() {
        let mut answers = VecDeque::from(["0"]);
        let choice = ask_choice("Choose [1-5]: ".into(), |_| {
            let answer = answers.pop_front().map(String::from);
            async move { answer }
        })
        .await;
        assert_eq!(choice, None);
    }

    #[test]
    fn plan_answers() {
        assert_eq!(parse_plan_answer(""), Some(PlanAnswer::Approve));
        assert_eq!(parse_plan_answer("Approve"), Some(PlanAnswer::Approve));
        assert_eq!(parse_plan_answer("m"), Some(PlanAnswer::Modify));
        assert_eq!(parse_plan_answer("reject"), Some(PlanAnswer::Reject));
        assert_eq!(parse_plan_answer("maybe"), None);
    }

    #[test]
    fn rendering_splits_text_and_activity() {
        let mut out = Vec::new();
        let mut log = Vec::new();
        let events = [
            AgentStreamEvent::Chunk { content: "Hel".into() },
            AgentStreamEvent::Chunk { content: "lo".into() },
            AgentStreamEvent::ToolResult {
                name: "run_bash".into(),
                output: "Command: ls\nExit code: 0".into(),
                success: true,
            },
            AgentStreamEvent::Dropped { count: 2 },
        ];
        for event in &events {
            render(event, &mut out, &mut log).unwrap();
        }
        assert_eq!(String::from_utf8(out).unwrap(), "Hello");
        let log = String::from_utf8(log).unwrap();
        assert!(log.contains("<- run_bash ok: Command: ls"));
        assert!(log.contains("2 tool call(s)"));
    }
}
