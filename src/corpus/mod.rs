//! Passage corpus: the prepared, embedded biography chunks.

mod store;

pub use store::{normalize_alias, Corpus, PassageRecord};
