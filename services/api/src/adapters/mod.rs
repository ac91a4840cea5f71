pub mod db;
pub mod memory;
pub mod openai;
pub mod pdf;

pub use db::{PgStore, PgUsageCounter};
pub use memory::{InMemoryStore, InMemoryUsageCounter};
pub use openai::{OpenAiTextAdapter, UnconfiguredGenerator};
pub use pdf::PdfExtractor;
