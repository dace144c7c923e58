//! Example host implementations built on the tracer

pub mod graph;
