//! In-memory session answering commands from a script.

use async_trait::async_trait;
use mongo_core::bson::{Bson, Document};
use mongo_core::source::command_name;
use mongo_core::{ExporterError, Result, Session};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
enum Reply {
    Document(Document),
    Failure(String),
    Timeout,
    Panic,
}

#[derive(Clone, Default)]
pub struct ScriptedSession {
    replies: Arc<Mutex<HashMap<String, Reply>>>,
    calls: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(self, key: String, reply: Reply) -> Self {
        self.replies.lock().unwrap().insert(key, reply);
        self
    }

    pub fn reply(self, database: &str, command: &str, document: Document) -> Self {
        self.script(format!("{}.{}", database, command), Reply::Document(document))
    }

    /// Reply only when the command's argument is `argument`, e.g. one `collStats`.
    pub fn reply_for(self, database: &str, command: &str, argument: &str, document: Document) -> Self {
        self.script(
            format!("{}.{}.{}", database, command, argument),
            Reply::Document(document),
        )
    }

    pub fn fail(self, database: &str, command: &str, message: &str) -> Self {
        self.script(
            format!("{}.{}", database, command),
            Reply::Failure(message.to_string()),
        )
    }

    pub fn time_out(self, database: &str, command: &str) -> Self {
        self.script(format!("{}.{}", database, command), Reply::Timeout)
    }

    pub fn panic_on(self, database: &str, command: &str) -> Self {
        self.script(format!("{}.{}", database, command), Reply::Panic)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Session for ScriptedSession {
    async fn run_command(
        &self,
        database: &str,
        command: Document,
        timeout: Duration,
    ) -> Result<Document> {
        let name = command_name(&command);
        let generic = format!("{}.{}", database, name);
        let specific = match command.get(&name) {
            Some(Bson::String(argument)) => Some(format!("{}.{}", generic, argument)),
            _ => None,
        };
        self.calls.lock().unwrap().push(generic.clone());

        let reply = {
            let replies = self.replies.lock().unwrap();
            specific
                .and_then(|key| replies.get(&key).cloned())
                .or_else(|| replies.get(&generic).cloned())
        };

        match reply {
            Some(Reply::Document(document)) => Ok(document),
            Some(Reply::Failure(message)) => Err(ExporterError::command(name, message)),
            Some(Reply::Timeout) => Err(ExporterError::Timeout {
                command: name,
                timeout,
            }),
            Some(Reply::Panic) => panic!("scripted panic for {}", generic),
            None => Err(ExporterError::command(name, "no such cmd")),
        }
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
