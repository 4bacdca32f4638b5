pub mod document;
pub mod lock;
