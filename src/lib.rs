//! Purpose: Shared library crate used by the `alchemist` CLI, server, and tests.
//! Exports: `core` (scanner, decoder, errors) and `api` (history store, remote client).
//! Role: Internal library backing the binary; not yet a stable public SDK.
//! Invariants: `core` performs no I/O; decoding is a pure function of its input.
//! Invariants: `api` is the only path to persistence and network access.
pub mod api;
pub mod core;
