#![doc = include_str!("../README.md")]

pub mod channel;
mod common;
pub mod pagination;
pub mod session;

pub use common::*;
