//! Context assembly: the prompt prefix plus a budgeted slice of room history.
//!
//! | Part | Source | Bound |
//! |------|--------|-------|
//! | System | `system_prompt` template | Never dropped |
//! | Additional prompts | `additional_prompt` entries | Fewer than `max_context_messages` |
//! | History | [`HistoryWalker`] | `max_words`, `max_context_messages` |

pub mod assembler;
pub mod walker;

pub use assembler::{ContextAssembler, MULTI_USER_INSTRUCTIONS};
pub use walker::{HistoryWalker, WalkMode};
