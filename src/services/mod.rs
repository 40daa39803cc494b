pub mod error;
pub mod relay;
pub mod resolver;
pub mod source;
pub mod storage;
pub mod transfer;
pub mod upload;
