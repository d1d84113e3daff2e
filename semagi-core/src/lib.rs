#![doc = "semagi-core: core logic library for the SEMagi task client."]

//! This crate contains the task lifecycle logic for the SEMagi client:
//! settings resolution, input inspection, the transport contract and the
//! adaptive polling controller. HTTP, terminal output and argument parsing
//! live in the `semagi` binary crate.
//!
//! # Usage
//! Resolve a [`resolve::Resolved`] request from a [`settings::Settings`]
//! document and [`settings::Overrides`], prepare a [`keywords::TaskRequest`],
//! then drive it with [`controller::run`] against any [`contract::TaskApi`].

pub mod contract;
pub mod controller;
pub mod error;
pub mod keywords;
pub mod resolve;
pub mod schedule;
pub mod settings;
pub mod task;
