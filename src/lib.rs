#![warn(clippy::all, rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod histoer;
pub mod naming;
pub mod pipeline;
pub mod storage;
pub mod summary;
pub mod transfer;

pub use error::{Haa4bError, Result};
