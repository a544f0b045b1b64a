//! Purpose: Split-aware reader turning headered comma-delimited text into records.
//! Exports: `api` (public surface) and `core` (scanner, reader, errors).
//! Role: Library backing the `splitcsv` CLI and embedding batch hosts.
//! Invariants: Readers are single-threaded and own their channel; instances share no state.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
