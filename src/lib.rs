//! Compile declarative query specs against a stored database metadata
//! snapshot into nested-JSON SQL queries and matching result type
//! declarations, without touching a live database.

pub mod dbmd;
pub mod error;
pub mod output;
pub mod restype;
pub mod spec;
pub mod sqlgen;
pub mod strings;
