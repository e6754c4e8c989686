// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! JSON text-frame message types for both WebSocket edges of the broker:
//! client ↔ broker ([`client`]) and broker ↔ worker ([`worker`]). [`codec`]
//! provides tolerant decode/encode helpers shared by both.

pub mod client;
pub mod codec;
pub mod worker;

pub use client::{BrokerMessage, ClientMessage};
pub use codec::{decode, encode, DecodeError, Decoded};
pub use worker::{WorkerCommand, WorkerEvent};
