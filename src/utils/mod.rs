pub mod http;
pub mod logging;
pub mod request_log;
pub mod telegram;
pub mod timing;
