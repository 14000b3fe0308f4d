pub mod ai;
pub mod common;
pub mod demo;
pub mod edit;
