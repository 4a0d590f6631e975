//! Test doubles shared by the unit tests of this crate

use crate::poll::Sleeper;
use async_trait::async_trait;
use enabler_rs::{CommandOutput, CommandRunner, ToolError, command_line};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Reply {
    Output(CommandOutput),
    NotFound,
}

#[derive(Debug)]
struct Rule {
    prefix: String,
    replies: VecDeque<Reply>,
}

/// Runner that answers from a script and records every command line.
///
/// Rules match on a command-line prefix; the first matching rule wins.
/// A rule with several replies hands them out in order and then keeps
/// repeating the last one. Unmatched commands succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, prefix: &str, output: CommandOutput) -> Self {
        self.on_seq(prefix, vec![output])
    }

    pub fn on_seq(self, prefix: &str, outputs: Vec<CommandOutput>) -> Self {
        self.push(prefix, outputs.into_iter().map(Reply::Output).collect());
        self
    }

    /// Pretend `program` is not installed
    pub fn missing(self, program: &str) -> Self {
        self.push(program, VecDeque::from([Reply::NotFound]));
        self
    }

    fn push(&self, prefix: &str, replies: VecDeque<Reply>) {
        self.rules.lock().unwrap().push(Rule {
            prefix: prefix.to_string(),
            replies,
        });
    }

    /// Every command line run so far
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Command lines starting with `prefix`
    pub fn calls_to(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn output(&self, program: &str, args: &[String]) -> Result<CommandOutput, ToolError> {
        let line = command_line(program, args);
        self.calls.lock().unwrap().push(line.clone());

        let mut rules = self.rules.lock().unwrap();
        let Some(rule) = rules.iter_mut().find(|r| line.starts_with(&r.prefix)) else {
            return Ok(CommandOutput::ok(""));
        };
        let reply = if rule.replies.len() > 1 {
            rule.replies.pop_front()
        } else {
            rule.replies.front().cloned()
        };
        match reply {
            Some(Reply::Output(output)) => Ok(output),
            Some(Reply::NotFound) => Err(ToolError::NotFound {
                program: program.to_string(),
            }),
            None => Ok(CommandOutput::ok("")),
        }
    }
}

/// Sleeper that only records what it was asked to do
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}
