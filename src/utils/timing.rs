use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::handlers::invocation::CommandInvocation;

const TIMING_TEXT_LIMIT: usize = 300;

#[derive(Debug)]
pub struct CommandTimer {
    command: String,
    chat_id: i64,
    user_id: Option<i64>,
    username: Option<String>,
    message_id: i32,
    text: String,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    status: String,
    detail: Option<String>,
    completed: bool,
}

impl CommandTimer {
    pub fn from_invocation(command: &str, invocation: &CommandInvocation) -> Self {
        let text: String = invocation
            .args
            .replace('\n', " ")
            .chars()
            .take(TIMING_TEXT_LIMIT)
            .collect();

        CommandTimer {
            command: command.to_string(),
            chat_id: invocation.chat_id,
            user_id: invocation.user_id,
            username: invocation.username.clone(),
            message_id: invocation.message_id,
            text,
            started_at: Utc::now(),
            started_perf: Instant::now(),
            status: "aborted".to_string(),
            detail: None,
            completed: false,
        }
    }

    pub fn log_received(&self) {
        info!(
            target: "bot.timing",
            "event=command_received command={} chat_id={} user_id={:?} username={:?} message_id={} received_at={} text={:?}",
            self.command,
            self.chat_id,
            self.user_id,
            self.username,
            self.message_id,
            self.started_at.to_rfc3339(),
            self.text
        );
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn mark_status(&mut self, status: &str, detail: Option<String>) {
        self.status = status.to_string();
        self.detail = detail;
    }

    pub fn log_completed(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        let completed_at = Utc::now();
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: "bot.timing",
            "event=command_completed command={} chat_id={} user_id={:?} message_id={} started_at={} completed_at={} duration_s={:.3} status={} detail={}",
            self.command,
            self.chat_id,
            self.user_id,
            self.message_id,
            self.started_at.to_rfc3339(),
            completed_at.to_rfc3339(),
            duration,
            self.status(),
            self.detail.clone().unwrap_or_default()
        );
    }
}

impl Drop for CommandTimer {
    fn drop(&mut self) {
        self.log_completed();
    }
}

pub fn start_command_timer(command: &str, invocation: &CommandInvocation) -> CommandTimer {
    let timer = CommandTimer::from_invocation(command, invocation);
    timer.log_received();
    timer
}

pub fn complete_command_timer(timer: &mut CommandTimer, status: &str, detail: Option<String>) {
    timer.mark_status(status, detail);
    timer.log_completed();
}
