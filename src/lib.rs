#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub(crate) mod api;
pub mod app;
pub mod classifier;
pub mod clients;
pub mod config;
pub mod embedding;
pub mod error;
pub mod evaluation;
pub mod model;
pub mod observability;
pub mod retrain;
pub mod training;
pub mod util;
