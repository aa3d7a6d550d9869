//! Network-facing collaborators the core storage engine hands off to.
//!
//! Neither adaptor touches `Storage`, `Cache`, `Expire`, or `Backend`
//! directly; they exist because a complete build of this engine always
//! ships the adaptors the embedded scripting host would otherwise call
//! out to, even though the scripting host itself is out of scope here.

#[cfg(feature = "http_adaptor")]
pub mod http;

#[cfg(feature = "xmlrpc_adaptor")]
pub mod xmlrpc;
