pub mod fake;
pub mod fanout;
pub mod push;
pub mod types;
