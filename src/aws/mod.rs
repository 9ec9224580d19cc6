// SPDX-License-Identifier: MIT

pub mod compute;
pub mod iam;
