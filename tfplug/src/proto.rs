//! Protocol buffer types for Terraform Plugin Protocol v6
//!
//! Generated at build time by tonic_build from `proto/tfplugin6.proto`.
//! Request/Response pairs live in snake_case modules named after the RPC
//! (e.g. `plan_resource_change::Request`). Several generated types share a
//! name with framework types (`DynamicValue`, `Diagnostic`, `Schema`), so refer
//! to these through the `proto::` prefix.

include!(concat!(env!("OUT_DIR"), "/tfplugin6.rs"));

pub use provider_server::{Provider as ProviderService, ProviderServer};
