pub mod channel;
pub mod join_request;
