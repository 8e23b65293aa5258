pub mod backoff;
pub mod datetime;
pub mod http;
pub mod text;
