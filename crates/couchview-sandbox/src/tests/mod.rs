//! Test suites for the snippet compiler and its typed functions.

mod support;
mod unit;
