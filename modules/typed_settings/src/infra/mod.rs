//! Infrastructure layer - persistence backends

pub mod storage;
