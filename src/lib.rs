#![forbid(unsafe_code)]

pub mod anilist;
pub mod calibre;
pub mod cli;
pub mod config;
pub mod logging;
pub mod login;
pub mod model;
pub mod reconcile;
pub mod sync;
