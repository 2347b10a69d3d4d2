pub mod extract;
pub mod pipeline;
pub mod retry;
pub mod selection;
pub mod stages;

pub use crate::domain::model::{Card, Task, TaskSpec};
pub use crate::domain::ports::{Fetcher, NoteStore};
pub use crate::utils::error::Result;
