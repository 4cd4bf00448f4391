//! Exit codes for the CLI

#![allow(dead_code)]

/// Success
pub const SUCCESS: i32 = 0;

/// General error
pub const ERROR: i32 = 1;

/// Configuration error
pub const CONFIG_ERROR: i32 = 2;

/// Graph error (cycle, unknown reference)
pub const GRAPH_ERROR: i32 = 3;

/// One or more actions failed
pub const ACTION_FAILED: i32 = 4;

/// User cancelled
pub const CANCELLED: i32 = 130;
