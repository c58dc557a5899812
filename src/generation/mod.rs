//! Model-facing steps of the ask pipeline: prompt rendering, SQL synthesis
//! and result summaries.

pub mod presenter;
pub mod prompt;
pub mod synthesizer;

pub use presenter::{PREVIEW_ROWS, ResultPresenter};
pub use prompt::{Prompt, PromptBuilder};
pub use synthesizer::{SqlSynthesizer, extract_sql};
