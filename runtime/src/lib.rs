// Copyright 2026 StatWatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! StatWatch runtime library — fetch, extract, notify, and schedule around the
//! `statwatch` change engine.
//!
//! This library crate exposes the runtime modules for integration testing.

pub mod acquisition;
pub mod cli;
pub mod config;
pub mod notify;
pub mod scheduler;
pub mod watcher;
