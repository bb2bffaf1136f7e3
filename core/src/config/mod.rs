pub mod types;
pub mod validation;

pub use types::*;
pub use validation::{Validate, from_toml_str, load_from_file};
