mod health;
mod pages;
mod session;

pub use health::{health_check, readiness_check};
pub use pages::page_shell;
pub use session::{api_not_found, current_session};
