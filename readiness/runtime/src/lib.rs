#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use policy_readiness_core as core;
pub use policy_readiness_k8s as k8s;

mod args;
mod discover;
mod probe;

pub use self::args::Args;
