mod bson;
mod collection;
mod counter;
mod errors;

pub use bson::{optional_datetime, u32_id_filter, Id};
pub use collection::{case_insensitive, ensure_indexes_exist, Coll, MongoCollection};
pub use counter::{ensure_counters_exist, Counter, CHOICE_COUNTER, QUESTION_COUNTER, USER_COUNTER};
pub use errors::is_duplicate_key_error;
