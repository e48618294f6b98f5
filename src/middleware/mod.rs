pub mod identity;
pub mod response;

pub use identity::identity_middleware;
pub use response::{ApiResponse, ApiResult};
