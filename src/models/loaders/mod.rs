pub mod toml_loader;

pub use toml_loader::{load_vocabulary, load_vocabulary_or_builtin};
