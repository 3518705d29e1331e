pub mod sanitizer;
pub mod sql_validator;

pub use sanitizer::strip_code_fences;
pub use sql_validator::SqlValidator;
