//! Integration tests for rememberit-ankiweb
//!
//! Uses wiremock to stand in for the AnkiWeb sync and web service hosts and
//! checks the request shapes and response handling of both clients.

mod common;

mod test_sync_protocol;
mod test_web_service;
