//! OTLP protobuf message definitions.
//!
//! Hand-maintained `prost` renditions of the published OTLP schema. The
//! module tree follows the protocol package tree
//! (`opentelemetry.proto.common.v1` → [`common::v1`], ...).

pub mod collector;
pub mod common;
pub mod logs;
pub mod metrics;
pub mod resource;
pub mod trace;
