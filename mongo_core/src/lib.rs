pub mod error;
pub mod mongo;
pub mod source;

pub use error::{ExporterError, Result};
pub use mongo::{MongoDataSource, SessionOptions};
pub use source::{DataSource, DynDataSource, Session};

// Re-export commonly used types
pub use async_trait::async_trait;
pub use mongodb::bson;
