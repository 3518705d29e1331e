pub mod catalog;
pub mod session;

pub use session::AppState;
