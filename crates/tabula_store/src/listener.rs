use std::time::Duration;

use tabula_core::{Argument, render_arguments};

/// The SQL of one execution and the arguments bound to it.
#[derive(Clone, Debug, PartialEq)]
pub struct StatementContext {
    pub sql: String,
    pub args: Vec<Argument>,
}

impl StatementContext {
    pub fn new(sql: impl Into<String>, args: Vec<Argument>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    /// The statement text with every placeholder replaced by its argument
    /// rendered as a literal. Placeholders inside quoted text are left alone.
    pub fn expand_args(&self) -> String {
        let mut out = String::with_capacity(self.sql.len());
        let mut chars = self.sql.chars().peekable();
        let mut quote: Option<char> = None;
        let mut next_arg = 0;
        while let Some(ch) = chars.next() {
            if let Some(open) = quote {
                out.push(ch);
                if ch == open {
                    quote = None;
                }
                continue;
            }
            match ch {
                '\'' | '"' | '`' => {
                    quote = Some(ch);
                    out.push(ch);
                }
                '?' => {
                    out.push_str(&self.render_arg(next_arg));
                    next_arg += 1;
                }
                '$' if chars.peek().is_some_and(char::is_ascii_digit) => {
                    let mut digits = String::new();
                    while let Some(digit) = chars.peek().copied().filter(char::is_ascii_digit) {
                        digits.push(digit);
                        chars.next();
                    }
                    match digits.parse::<usize>() {
                        Ok(position) if position >= 1 => {
                            out.push_str(&self.render_arg(position - 1))
                        }
                        _ => {
                            out.push('$');
                            out.push_str(&digits);
                        }
                    }
                }
                other => out.push(other),
            }
        }
        out
    }

    fn render_arg(&self, index: usize) -> String {
        match self.args.get(index) {
            Some(arg) => arg.to_string(),
            None => "?".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExecutionOutcome {
    Rows(usize),
    Updated(Vec<u64>),
    Failed(String),
}

/// Observer notified around every statement a session executes.
pub trait StatementListener: Send + Sync {
    fn before_execution(&self, _context: &StatementContext) {}

    fn after_execution(
        &self,
        contexts: &[StatementContext],
        outcome: &ExecutionOutcome,
        elapsed: Duration,
    );
}

/// Writes executed statements to the `log` facade.
pub struct LogStatementListener {
    session: String,
    slow_threshold: Duration,
}

impl LogStatementListener {
    pub fn new(session: impl Into<String>, slow_threshold: Duration) -> Self {
        Self {
            session: session.into(),
            slow_threshold,
        }
    }
}

impl StatementListener for LogStatementListener {
    fn after_execution(
        &self,
        contexts: &[StatementContext],
        outcome: &ExecutionOutcome,
        elapsed: Duration,
    ) {
        let Some(first) = contexts.first() else {
            return;
        };
        let sql = if log::log_enabled!(log::Level::Debug) || elapsed >= self.slow_threshold {
            first.expand_args()
        } else {
            String::new()
        };
        match outcome {
            ExecutionOutcome::Failed(message) => log::warn!(
                "tabula[{}]: statement failed after {:?}: {message}; sql={} args=[{}]",
                self.session,
                elapsed,
                first.sql,
                render_arguments(&first.args)
            ),
            _ if elapsed >= self.slow_threshold => log::warn!(
                "tabula[{}]: slow statement ({:?}, {} executions): {sql}",
                self.session,
                elapsed,
                contexts.len()
            ),
            ExecutionOutcome::Rows(rows) => {
                log::debug!("tabula[{}]: {sql} -> {rows} rows in {:?}", self.session, elapsed)
            }
            ExecutionOutcome::Updated(counts) => log::debug!(
                "tabula[{}]: {sql} -> {:?} updated in {:?} ({} executions)",
                self.session,
                counts,
                elapsed,
                contexts.len()
            ),
        }
    }
}
