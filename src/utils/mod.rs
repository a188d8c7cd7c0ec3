pub mod link_header;
pub mod logger;
