//! CPE configuration-tree decomposition.
//!
//! NVD configurations are trees of boolean nodes terminating in CPE 2.3 URI
//! leaf matches. The tree is modeled as a tagged variant ([`CpeNode`]) and
//! walked with a structural recursion: AND nodes descend their children when
//! they have any, otherwise collect their own leaf matches; OR nodes collect
//! leaf matches directly. Each URI splits on `:` into
//! `cpe:2.3:{part}:{vendor}:{product}:...`.

use crate::models::Part;
use std::collections::BTreeSet;

/// One leaf match inside a configuration node.
#[derive(Debug, Clone)]
pub struct CpeMatch {
    pub vulnerable: bool,
    /// CPE 2.3 formatted URI, e.g. `cpe:2.3:o:microsoft:windows_10:1607:*:...`.
    pub uri: String,
}

/// A boolean configuration node.
#[derive(Debug, Clone)]
pub enum CpeNode {
    And {
        children: Vec<CpeNode>,
        matches: Vec<CpeMatch>,
    },
    Or {
        matches: Vec<CpeMatch>,
    },
}

/// Decompose a configuration tree into deduplicated part/vendor/product sets.
///
/// A node with neither children nor matches contributes nothing; malformed
/// URIs (fewer than five colon-delimited fields) are skipped, and part tags
/// that are not one of `h`/`o`/`a` are dropped.
pub fn extract_cpe(nodes: &[CpeNode]) -> (BTreeSet<Part>, BTreeSet<String>, BTreeSet<String>) {
    let mut parts = BTreeSet::new();
    let mut vendors = BTreeSet::new();
    let mut products = BTreeSet::new();

    for node in nodes {
        collect(node, &mut parts, &mut vendors, &mut products);
    }

    (parts, vendors, products)
}

fn collect(
    node: &CpeNode,
    parts: &mut BTreeSet<Part>,
    vendors: &mut BTreeSet<String>,
    products: &mut BTreeSet<String>,
) {
    match node {
        CpeNode::And { children, matches } => {
            if children.is_empty() {
                collect_matches(matches, parts, vendors, products);
            } else {
                for child in children {
                    collect(child, parts, vendors, products);
                }
            }
        }
        CpeNode::Or { matches } => collect_matches(matches, parts, vendors, products),
    }
}

fn collect_matches(
    matches: &[CpeMatch],
    parts: &mut BTreeSet<Part>,
    vendors: &mut BTreeSet<String>,
    products: &mut BTreeSet<String>,
) {
    for cpe in matches {
        let pieces: Vec<&str> = cpe.uri.split(':').collect();
        if pieces.len() < 5 {
            continue;
        }

        if let Some(part) = Part::from_cpe_tag(pieces[2]) {
            parts.insert(part);
        }
        vendors.insert(pieces[3].to_string());
        products.insert(pieces[4].to_string());
    }
}
