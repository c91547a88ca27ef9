//! Federated query fan-out across the partner network.

pub mod proxy;

pub use proxy::{
    FanoutConfig, FederationProxy, PartnerFailure, PartnerOutcome, AUTH_HEADER, MATCH_ENDPOINT,
};
