pub mod record;

pub use record::{Collection, Record};
