pub mod document;
pub mod sections;
