// SPDX-License-Identifier: MIT

pub mod aspect;
pub mod dependency;
pub mod error;
pub mod names;
pub mod spec;
pub mod token;
pub mod tree;
