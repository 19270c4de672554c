//! Source documents the executor can navigate.

pub mod xml;

pub use xslproc_xpath1::datasource::{DataSourceNode, NodeType, QName};
