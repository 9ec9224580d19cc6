// SPDX-License-Identifier: MIT

pub mod chain;
pub mod condition;
pub mod fields;
pub mod graph;
pub mod json_path;
pub mod loader;
pub mod machine;
pub mod state;
