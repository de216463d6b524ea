pub mod operation;
pub mod prompt;
