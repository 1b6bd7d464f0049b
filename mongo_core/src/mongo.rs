use crate::{
    error::{ExporterError, Result},
    source::{command_name, DataSource, Session},
};
use async_trait::async_trait;
use mongodb::{
    bson::{doc, Document},
    options::ClientOptions,
    Client,
};
use std::time::Duration;
use tracing::debug;

const APP_NAME: &str = "mongodb_exporter";

#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub uri: String,
    pub connect_timeout: Duration,
}

impl SessionOptions {
    pub fn new(uri: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            uri: uri.into(),
            connect_timeout,
        }
    }

    /// URI with the user-info part masked.
    pub fn redacted_uri(&self) -> String {
        redact_uri(&self.uri)
    }
}

pub fn redact_uri(uri: &str) -> String {
    let Some(scheme_end) = uri.find("://") else {
        return uri.to_string();
    };
    let rest = &uri[scheme_end + 3..];
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{}://***@{}", &uri[..scheme_end], &rest[at + 1..]),
        None => uri.to_string(),
    }
}

/// A lone `mongodb://` seed is pinned so secondaries and arbiters are
/// scraped themselves. Seed lists and SRV records keep topology discovery.
fn wants_direct_connection(uri: &str) -> bool {
    let Some(rest) = uri.strip_prefix("mongodb://") else {
        return false;
    };
    let authority = rest.split(['/', '?']).next().unwrap_or_default();
    let hosts = authority.rsplit('@').next().unwrap_or_default();
    !hosts.is_empty() && !hosts.contains(',')
}

/// Opens a connection per pull, like a one-shot admin shell.
pub struct MongoDataSource {
    options: SessionOptions,
}

impl MongoDataSource {
    pub fn new(options: SessionOptions) -> Self {
        Self { options }
    }

    async fn client_options(&self) -> Result<ClientOptions> {
        let mut client_options = ClientOptions::parse(&self.options.uri)
            .await
            .map_err(|e| ExporterError::Connection(e.to_string()))?;
        if client_options.direct_connection.is_none()
            && wants_direct_connection(&self.options.uri)
        {
            client_options.direct_connection = Some(true);
        }
        client_options.connect_timeout = Some(self.options.connect_timeout);
        client_options.server_selection_timeout = Some(self.options.connect_timeout);
        client_options.app_name = Some(APP_NAME.to_string());
        Ok(client_options)
    }

    async fn connect(&self) -> Result<Client> {
        let client_options = self.client_options().await?;
        let client = Client::with_options(client_options)
            .map_err(|e| ExporterError::Connection(e.to_string()))?;

        // The driver connects lazily; ping so an unreachable server fails here.
        let admin = client.database("admin");
        let ping = admin.run_command(doc! { "ping": 1 }, None);
        match tokio::time::timeout(self.options.connect_timeout, ping).await {
            Ok(Ok(_)) => Ok(client),
            Ok(Err(e)) => Err(ExporterError::Connection(e.to_string())),
            Err(_) => Err(ExporterError::Timeout {
                command: "ping".to_string(),
                timeout: self.options.connect_timeout,
            }),
        }
    }
}

#[async_trait]
impl DataSource for MongoDataSource {
    async fn acquire(&self) -> Result<Box<dyn Session>> {
        let client = self.connect().await?;
        debug!("Connected to {}", self.describe());
        Ok(Box::new(MongoSession { client }))
    }

    fn describe(&self) -> String {
        self.options.redacted_uri()
    }
}

struct MongoSession {
    client: Client,
}

#[async_trait]
impl Session for MongoSession {
    async fn run_command(
        &self,
        database: &str,
        command: Document,
        timeout: Duration,
    ) -> Result<Document> {
        let name = command_name(&command);
        let db = self.client.database(database);
        let run = db.run_command(command, None);

        match tokio::time::timeout(timeout, run).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(ExporterError::command(name, e)),
            Err(_) => Err(ExporterError::Timeout {
                command: name,
                timeout,
            }),
        }
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
    }
}
