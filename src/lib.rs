//! # pixgate
//!
//! An on-demand image transform server. Every transform is addressed by a URL
//! on a single route (`?source=…&w=…&h=…&fit=…&fmt=…&q=…`), resolved to a
//! canonical form, and memoized on disk under the hash of that form.
//!
//! # Architecture: Canonical URL as Identity
//!
//! ```text
//! request URL ─► decode ─► descriptor ─► encode ─► canonical URL ─► SHA-256 ─► cache key
//!                                                                               │
//!                        ┌──────────────────────────── hit ◄─── disk lookup ◄───┘
//!                        │                                           │ miss
//!                     respond ◄── publish ◄── engine ◄── fetch ◄── validate
//! ```
//!
//! Decoding fills in defaults and ignores unknown parameters; encoding emits
//! only non-default fields in a fixed order. Requests that mean the same
//! transform therefore collapse to one canonical URL and one cache entry, no
//! matter how they were spelled.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`descriptor`] | The transform request value: dimensions, fit, format, quality, source |
//! | [`codec`] | Query-string codec: strict integers, enum literals, canonical encoding |
//! | [`cache`] | Key derivation and the sharded two-file disk cache |
//! | [`validate`] | Source URL checks: scheme, credentials, host allowlist |
//! | [`fetch`] | Bounded upstream HTTP fetch with re-validated redirects |
//! | [`imaging`] | Pure-Rust decode, orient, resize, and re-encode |
//! | [`handler`] | Per-request orchestration and error-to-status mapping |
//! | [`server`] | axum router, response headers, graceful shutdown |
//! | [`config`] | `pixgate.toml` loading, merging, and validation |
//!
//! # Design Decisions
//!
//! ## Cache Hits Skip Validation
//!
//! A hit is served straight from disk without re-checking the source against
//! the allowlist. Entries only ever exist for sources that passed validation
//! when they were published; tightening the allowlist later does not purge
//! them.
//!
//! ## Publish by Rename
//!
//! Body and metadata are written to temp files in the shard directory and
//! renamed into place. Readers never see a partial file, and a torn pair
//! (body from one writer, metadata from another) is caught by comparing the
//! stored `contentLength` against the body. Concurrent misses for the same key
//! each publish; the last rename wins.
//!
//! ## Engine Off the Executor
//!
//! Decoding and encoding are CPU-bound. The [`imaging::ImageBackend`] runs on
//! the rayon pool and the request task awaits it over a oneshot channel, so a
//! slow AVIF encode never stalls the async workers.

pub mod cache;
pub mod codec;
pub mod config;
pub mod descriptor;
pub mod fetch;
pub mod handler;
pub mod imaging;
pub mod server;
pub mod validate;

#[cfg(test)]
pub(crate) mod test_helpers;
