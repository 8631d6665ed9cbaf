pub mod aspect;
pub mod storage_key;
pub mod video;
