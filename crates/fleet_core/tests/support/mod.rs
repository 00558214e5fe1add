#![allow(dead_code)]

pub mod agents;
pub mod env;
