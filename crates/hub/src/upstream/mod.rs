// SPDX-License-Identifier: Apache-2.0

//! Outbound side of the hub: agent client, discovery probe, background
//! health refresh.

pub mod client;
pub mod health;
pub mod probe;
