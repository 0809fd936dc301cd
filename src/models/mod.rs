pub mod activity;
pub mod response;

pub use activity::{Activity, ActivityStatus};
pub use response::{NewResponse, ResponseRecord};
