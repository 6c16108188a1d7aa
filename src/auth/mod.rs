pub mod flows;
pub mod password;
pub mod session;

pub use session::{Session, session_middleware};
