pub mod catalog;
pub mod conversation;
pub mod query;
pub mod result_set;
pub mod turn;

pub use catalog::*;
pub use conversation::*;
pub use query::*;
pub use result_set::*;
pub use turn::*;
