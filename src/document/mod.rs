//! Input document handling for the Stackform provisioning engine.
//!
//! The stack document is the static, declarative description of the desired
//! resource graph: resource kind + property bag + dependency references.

mod hash;
mod parser;
mod spec;

pub use hash::PropertyHasher;
pub use parser::{find_document_file, DocumentParser};
pub use spec::{ProviderConfig, ResourceDecl, StackConfig, StackDocument, StateConfig};
