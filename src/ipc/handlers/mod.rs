pub mod adapter;
pub mod core;
pub mod export;
pub mod portal;
pub mod records;
