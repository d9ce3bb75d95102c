//! Core processing engine for optimarr.
//!
//! This module contains the subsystems that make up the service core:
//! - `paths` for confining user-supplied paths to configured roots
//! - `progress` for parsing encoder progress streams into structured events
//! - `jobs` for the persistent, bounded-concurrency job manager
//! - `scanner` for mode-driven directory monitoring and job ingestion
//!
#![allow(dead_code)]

pub mod jobs;
pub mod paths;
pub mod progress;
pub mod scanner;
