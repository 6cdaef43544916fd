pub mod service_auth;
pub mod user_id;

pub use service_auth::{CronAuth, InternalAuth, INTERNAL_KEY_HEADER};
pub use user_id::{UserId, USER_ID_HEADER};
