// Document model mutation: Section Store + Document Assembler.
// All writes to the CV document go through `DocumentAssembler`.

pub mod assembler;
pub mod sections;

pub use assembler::DocumentAssembler;
pub use sections::SectionError;
