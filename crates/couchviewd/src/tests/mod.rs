//! Test suites for the query server.

mod behaviour;
mod support;
mod unit;
