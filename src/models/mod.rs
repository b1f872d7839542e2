mod api;

pub use api::{HealthResponse, SessionResponse, SessionUser};
