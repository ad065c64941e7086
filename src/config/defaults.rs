//! Default value functions for serde deserialization

use std::path::PathBuf;

pub fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub fn default_port() -> u16 {
    8321
}

pub fn default_request_timeout_seconds() -> u64 {
    30
}

pub fn default_retry_attempts() -> u32 {
    3
}

pub fn default_page_size() -> u32 {
    500
}

pub fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
