// WhatNext Library
// Conversational location recommendation: an agent loop over a geo/attribute query engine

pub mod agent;
pub mod config;
pub mod error;
pub mod hours;
pub mod locations;
pub mod profiles;
pub mod reasoning;
#[cfg(feature = "server")]
pub mod server;
pub mod services;
pub mod session;
pub mod tools;
pub mod vocabulary;

pub use error::{Result, WhatnextError};
pub use services::{ServiceParts, Services};
