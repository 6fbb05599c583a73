//! Shared field extractors.
//!
//! Parsing routines reused across source adapters: CVSS metric selection
//! ([`cvss`]), CPE configuration-tree decomposition ([`cpe`]), CWE
//! flattening ([`cwe`]) and the vendor impact-phrase vocabularies
//! ([`impact`]).
//!
//! Extractors never fail a pipeline run: malformed input for a single record
//! degrades to empty sets or `"N/A"` sentinels and the caller decides whether
//! to log and skip.

pub mod cpe;
pub mod cvss;
pub mod cwe;
pub mod impact;

pub use cpe::{CpeMatch, CpeNode, extract_cpe};
pub use cvss::{ImpactBlock, extract_cvss};
pub use cwe::{ProblemType, extract_cwe};
