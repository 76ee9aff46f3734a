//! Sitewright: a workflow engine for multi-step site generation.
//!
//! A fixed catalog of pipeline steps (repository setup, scraping, content
//! generation, deployment) is driven either one step at a time, fully
//! automatically with optional operator checkpoints, or in batch over a
//! roster of sites. Step results live in a shared data store keyed by the
//! step contracts in [`contract`].

pub mod config;
pub mod contract;
pub mod engine;
pub mod errors;
pub mod events;
pub mod executors;
pub mod graph;
pub mod session;
pub mod sites;
pub mod step;
pub mod store;
pub mod ui;
