// Adapters: concrete implementations of the domain ports for external systems.

pub mod anki;
pub mod http;
pub mod task_file;

pub use anki::AnkiConnect;
pub use http::HttpFetcher;
pub use task_file::{load_task_list, parse_task_list};
