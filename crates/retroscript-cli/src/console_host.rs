//! Host implementation for running scripts from a terminal.
//!
//! File commands touch the real file system. Dialogs use the terminal:
//! alerts and notifications go to stderr, confirm and prompt read answers
//! from stdin. Window, audio and video commands have nothing to drive here
//! and are only logged.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use retroscript_core::host::{Host, HostCommand, HostError};
use retroscript_core::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub struct ConsoleHost {
    input: Mutex<Lines<BufReader<Stdin>>>,
}

impl ConsoleHost {
    pub fn new() -> Self {
        Self {
            input: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    /// Shows `question` on stderr and reads one line. `None` at end of input.
    async fn ask(&self, question: &str) -> Result<Option<String>, HostError> {
        let mut stderr = tokio::io::stderr();
        stderr.write_all(question.as_bytes()).await?;
        stderr.flush().await?;
        let answer = self.input.lock().await.next_line().await?;
        Ok(answer.map(|line| line.trim_end_matches('\r').to_string()))
    }
}

#[async_trait(?Send)]
impl Host for ConsoleHost {
    async fn execute(&self, command: HostCommand) -> Result<Value, HostError> {
        match command {
            HostCommand::Wait { seconds } => {
                let duration = Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX);
                tokio::time::sleep(duration).await;
                Ok(Value::Null)
            }
            HostCommand::Write { path, content } => {
                tokio::fs::write(&path, content).await?;
                debug!(%path, "wrote file");
                Ok(Value::Null)
            }
            HostCommand::Read { path } => {
                let content = tokio::fs::read_to_string(&path).await?;
                Ok(Value::String(content))
            }
            HostCommand::Mkdir { path } => {
                tokio::fs::create_dir_all(&path).await?;
                Ok(Value::Null)
            }
            HostCommand::Delete { path } => {
                remove_path(Path::new(&path)).await?;
                Ok(Value::Null)
            }
            HostCommand::Alert { message } => {
                eprintln!("[alert] {}", message);
                Ok(Value::Null)
            }
            HostCommand::Notify { message, title } => {
                match title {
                    Some(title) => eprintln!("[{}] {}", title, message),
                    None => eprintln!("[notice] {}", message),
                }
                Ok(Value::Null)
            }
            HostCommand::Confirm { message } => {
                let answer = self.ask(&format!("{} [y/N] ", message)).await?;
                let yes = answer
                    .map(|a| matches!(a.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
                    .unwrap_or(false);
                Ok(Value::Bool(yes))
            }
            HostCommand::Prompt { message, default } => {
                let question = match &default {
                    Some(default) => format!("{} [{}] ", message, default),
                    None => format!("{} ", message),
                };
                let answer = self.ask(&question).await?.filter(|a| !a.is_empty());
                Ok(Value::String(answer.or(default).unwrap_or_default()))
            }
            other => {
                info!(command = other.name(), "console host cannot perform command, skipping");
                Ok(other.default_response())
            }
        }
    }
}

async fn remove_path(path: &Path) -> std::io::Result<()> {
    if tokio::fs::metadata(path).await?.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_commands() {
        let dir = tempfile::tempdir().unwrap();
        let host = ConsoleHost::new();
        let nested = dir.path().join("a/b");
        let file = nested.join("note.txt");
        let path = |p: &Path| p.to_string_lossy().into_owned();

        host.execute(HostCommand::Mkdir { path: path(&nested) }).await.unwrap();
        host.execute(HostCommand::Write { path: path(&file), content: "hello".into() })
            .await
            .unwrap();
        let read = host.execute(HostCommand::Read { path: path(&file) }).await.unwrap();
        assert_eq!(read, Value::from("hello"));

        host.execute(HostCommand::Delete { path: path(&dir.path().join("a")) }).await.unwrap();
        assert!(!nested.exists());
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let host = ConsoleHost::new();
        let err = host
            .execute(HostCommand::Read { path: "/definitely/not/here.txt".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::Io(_)));
    }

    #[tokio::test]
    async fn test_unsupported_commands_are_skipped() {
        let host = ConsoleHost::new();
        let result = host.execute(HostCommand::Launch { target: "notepad".into() }).await.unwrap();
        assert_eq!(result, Value::Null);
    }
}
