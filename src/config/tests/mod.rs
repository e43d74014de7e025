//! Unit tests for podwire configuration types.
//!
//! This module contains tests organised into:
//! - [`helpers`] - Shared fixtures and helper functions
//! - [`cli_tests`] - Subcommand argument parsing
//! - [`types_tests`] - Defaults, serialisation and conversion tests
//! - [`validation`] - `TransportConfig` validation tests
//! - [`layer_precedence_tests`] - `MergeComposer` layer precedence tests

mod helpers;
