use crate::error::{ExporterError, Result};
use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Authenticated handle used for the duration of one pull.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Session: Send + Sync {
    /// Run a diagnostic command against `database`, bounded by `timeout`.
    async fn run_command(
        &self,
        database: &str,
        command: Document,
        timeout: Duration,
    ) -> Result<Document>;

    /// Release the handle. Called exactly once per acquired session.
    async fn close(&self);
}

/// Something that can hand out sessions against the monitored instance.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn Session>>;

    /// Target description safe to put in logs.
    fn describe(&self) -> String;
}

pub type DynDataSource = Arc<dyn DataSource>;

/// Databases that are never walked by the per-database collectors.
pub const SKIPPED_DATABASES: &[&str] = &["admin", "test"];

/// Adds a server-side `maxTimeMS` bound matching the client deadline.
pub fn with_max_time(mut command: Document, timeout: Duration) -> Document {
    let millis = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
    command.insert("maxTimeMS", millis);
    command
}

/// Name of a command document, i.e. its first key.
pub fn command_name(command: &Document) -> String {
    command
        .keys()
        .next()
        .cloned()
        .unwrap_or_else(|| "<empty>".to_string())
}

/// Numeric BSON value as f64, whatever its wire width.
pub fn bson_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(v) => Some(*v),
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn bson_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(i64::from(*v)),
        Bson::Int64(v) => Some(*v),
        Bson::Double(v) => Some(*v as i64),
        _ => None,
    }
}

/// Names of all databases except [`SKIPPED_DATABASES`], sorted.
pub async fn list_database_names(session: &dyn Session, timeout: Duration) -> Result<Vec<String>> {
    let command = with_max_time(
        mongodb::bson::doc! { "listDatabases": 1, "nameOnly": true },
        timeout,
    );
    let reply = session.run_command("admin", command, timeout).await?;

    let mut names: Vec<String> = reply
        .get_array("databases")?
        .iter()
        .filter_map(|entry| entry.as_document())
        .filter_map(|entry| entry.get_str("name").ok())
        .filter(|name| !SKIPPED_DATABASES.contains(name))
        .map(str::to_string)
        .collect();
    names.sort();
    Ok(names)
}

/// Names of the collections of `database`, sorted. Views are left out since
/// `collStats` rejects them.
///
/// The whole listing comes back in the first batch. Every `run_command` gets
/// its own implicit session, so a `getMore` would be refused by the server.
pub async fn list_collection_names(
    session: &dyn Session,
    database: &str,
    timeout: Duration,
) -> Result<Vec<String>> {
    let command = with_max_time(
        mongodb::bson::doc! { "listCollections": 1, "nameOnly": true },
        timeout,
    );
    let reply = session.run_command(database, command, timeout).await?;
    let cursor = reply.get_document("cursor")?;

    let mut names: Vec<String> = cursor
        .get_array("firstBatch")?
        .iter()
        .filter_map(|entry| entry.as_document())
        .filter(|entry| entry.get_str("type").map(|t| t != "view").unwrap_or(true))
        .filter_map(|entry| entry.get_str("name").ok())
        .map(str::to_string)
        .collect();

    let cursor_id = cursor
        .get("id")
        .and_then(bson_i64)
        .ok_or_else(|| ExporterError::Decode("cursor without id".to_string()))?;
    if cursor_id != 0 {
        warn!(
            "Collection listing of {} was truncated after {} names",
            database,
            names.len()
        );
    }

    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn test_with_max_time() {
        let command = with_max_time(doc! { "collStats": "users" }, Duration::from_millis(1500));
        assert_eq!(command.get_i64("maxTimeMS").unwrap(), 1500);
        assert_eq!(command_name(&command), "collStats");
    }

    #[test]
    fn test_bson_number_widths() {
        assert_eq!(bson_number(&Bson::Int32(3)), Some(3.0));
        assert_eq!(bson_number(&Bson::Int64(4)), Some(4.0));
        assert_eq!(bson_number(&Bson::Double(0.5)), Some(0.5));
        assert_eq!(bson_number(&Bson::Boolean(true)), Some(1.0));
        assert_eq!(bson_number(&Bson::String("1".into())), None);
    }

    #[tokio::test]
    async fn test_list_database_names_skips_internal() {
        let mut session = MockSession::new();
        session
            .expect_run_command()
            .withf(|db, cmd, _| db == "admin" && cmd.contains_key("listDatabases"))
            .times(1)
            .returning(|_, _, _| {
                Ok(doc! {
                    "databases": [
                        { "name": "test" },
                        { "name": "shop" },
                        { "name": "admin" },
                        { "name": "analytics" },
                    ],
                    "ok": 1.0,
                })
            });

        let names = list_database_names(&session, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(names, vec!["analytics".to_string(), "shop".to_string()]);
    }

    #[tokio::test]
    async fn test_list_database_names_is_bounded() {
        let mut session = MockSession::new();
        session
            .expect_run_command()
            .withf(|_, cmd, _| cmd.get_i64("maxTimeMS").ok() == Some(2000))
            .times(1)
            .returning(|_, _, _| Ok(doc! { "databases": [], "ok": 1.0 }));

        let names = list_database_names(&session, Duration::from_secs(2))
            .await
            .unwrap();
        assert!(names.is_empty());
    }

    #[tokio::test]
    async fn test_list_collection_names_reads_single_batch() {
        let mut session = MockSession::new();
        session
            .expect_run_command()
            .withf(|db, cmd, _| {
                db == "shop"
                    && cmd.contains_key("listCollections")
                    && !cmd.contains_key("cursor")
                    && cmd.contains_key("maxTimeMS")
            })
            .times(1)
            .returning(|_, _, _| {
                let batch: Vec<Bson> = (0..250)
                    .map(|i| Bson::Document(doc! { "name": format!("c{:03}", i), "type": "collection" }))
                    .chain(std::iter::once(Bson::Document(
                        doc! { "name": "order_totals", "type": "view" },
                    )))
                    .collect();
                Ok(doc! {
                    "cursor": {
                        "id": 0_i64,
                        "ns": "shop.$cmd.listCollections",
                        "firstBatch": batch,
                    },
                    "ok": 1.0,
                })
            });

        let names = list_collection_names(&session, "shop", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(names.len(), 250);
        assert_eq!(names.first().map(String::as_str), Some("c000"));
        assert!(!names.contains(&"order_totals".to_string()));
    }

    #[tokio::test]
    async fn test_open_cursor_is_not_followed() {
        let mut session = MockSession::new();
        session
            .expect_run_command()
            .times(1)
            .returning(|_, _, _| {
                Ok(doc! {
                    "cursor": {
                        "id": 42_i64,
                        "ns": "shop.$cmd.listCollections",
                        "firstBatch": [ { "name": "orders", "type": "collection" } ],
                    },
                    "ok": 1.0,
                })
            });

        let names = list_collection_names(&session, "shop", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(names, vec!["orders".to_string()]);
    }

    #[tokio::test]
    async fn test_list_collection_names_propagates_failure() {
        let mut session = MockSession::new();
        session
            .expect_run_command()
            .withf(|db, _, _| db == "shop")
            .returning(|_, _, _| Err(ExporterError::command("listCollections", "unauthorized")));

        let result = list_collection_names(&session, "shop", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ExporterError::Command { .. })));
    }
}
