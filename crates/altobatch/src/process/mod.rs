pub mod alto_import;

pub use alto_import::{AltoImportProcess, AltoSink};
