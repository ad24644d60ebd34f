//Texas Instruments Z-Stack (ZNP) coordinator driver

pub mod api;
pub mod application;
pub mod backup;
pub mod commands;
pub mod config;
pub mod error;
pub mod mt;
pub mod nvram;
pub mod security;
pub mod transport;
pub mod types;
pub mod zdp;

pub use api::{ Matcher, Znp };
pub use application::{ Application, ApplicationListener, ApplicationState, Device, StartMode };
pub use error::Error;
