//! Behavioural suites for the courier node.

mod support;
