//! Kubeconfig handling for Skiff.
//!
//! Parses standard multi-context Kubernetes client-configuration
//! documents into normalized per-cluster records, infers the hosting
//! provider and region from cluster names and API server addresses,
//! validates live connectivity, and mints minimal single-context
//! documents for handing out least-privilege credentials.

pub mod connectivity;
pub mod document;
pub mod error;
pub mod infer;
pub mod parser;

pub use connectivity::{client_for_document, ConnectivityReport, ContextConnectivity};
pub use document::{
    ClusterDetail, ContextDetail, KubeconfigDoc, NamedCluster, NamedContext, NamedUser, UserDetail,
};
pub use error::KubeconfigError;
pub use parser::{KubeconfigParser, ParsedClusterContext, ParserConfig};
