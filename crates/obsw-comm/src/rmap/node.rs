//! Registry of RMAP target nodes.
//!
//! A target node bundles the addressing information of one remote memory
//! endpoint: the SpaceWire path to reach it, its logical addresses and
//! the destination key. Transactions look the node up by name and copy
//! its addressing into the packet.

use super::{DEFAULT_LOGICAL_ADDRESS, MAX_NUMBER_OF_TARGET_NODES, MAX_PHYSICAL_ROUTER_OUTPUT_PORTS};

pub const MAX_NODE_NAME_LENGTH: usize = 20;

#[derive(Debug, Clone)]
pub struct RmapTargetNode {
    name: String,
    target_spacewire_address: Vec<u8>,
    reply_address: Vec<u8>,
    target_logical_address: u8,
    key: u8,
}

impl RmapTargetNode {
    /// `None` when the name or the path address exceeds its bound.
    pub fn new(
        name: &str,
        target_spacewire_address: &[u8],
        reply_address: &[u8],
        target_logical_address: u8,
        key: u8,
    ) -> Option<Self> {
        if name.is_empty()
            || name.len() > MAX_NODE_NAME_LENGTH
            || target_spacewire_address.len() > MAX_PHYSICAL_ROUTER_OUTPUT_PORTS
            || reply_address.len() > 12
        {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            target_spacewire_address: target_spacewire_address.to_vec(),
            reply_address: reply_address.to_vec(),
            target_logical_address,
            key,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target_spacewire_address(&self) -> &[u8] {
        &self.target_spacewire_address
    }

    pub fn reply_address(&self) -> &[u8] {
        &self.reply_address
    }

    pub fn target_logical_address(&self) -> u8 {
        self.target_logical_address
    }

    pub fn key(&self) -> u8 {
        self.key
    }

    pub fn set_key(&mut self, key: u8) {
        self.key = key;
    }

    pub fn set_target_logical_address(&mut self, address: u8) {
        self.target_logical_address = address;
    }
}

impl Default for RmapTargetNode {
    fn default() -> Self {
        Self {
            name: String::new(),
            target_spacewire_address: Vec::new(),
            reply_address: Vec::new(),
            target_logical_address: DEFAULT_LOGICAL_ADDRESS,
            key: 0,
        }
    }
}

/// Fixed-capacity node registry.
#[derive(Debug, Default)]
pub struct RmapTargetNodeList {
    nodes: Vec<RmapTargetNode>,
}

impl RmapTargetNodeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails (returns `false`) when the list is full or a node of that
    /// name is already registered.
    pub fn add_node(&mut self, node: RmapTargetNode) -> bool {
        if self.nodes.len() >= MAX_NUMBER_OF_TARGET_NODES
            || self.find(node.name()).is_some()
        {
            return false;
        }
        self.nodes.push(node);
        true
    }

    pub fn find(&self, name: &str) -> Option<&RmapTargetNode> {
        self.nodes.iter().find(|node| node.name() == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut RmapTargetNode> {
        self.nodes.iter_mut().find(|node| node.name() == name)
    }

    pub fn find_by_logical_address(&self, address: u8) -> Option<&RmapTargetNode> {
        self.nodes
            .iter()
            .find(|node| node.target_logical_address() == address)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, logical: u8) -> RmapTargetNode {
        RmapTargetNode::new(name, &[1, 2], &[], logical, 0x20).unwrap()
    }

    #[test]
    fn lookup_by_name_and_address() {
        let mut list = RmapTargetNodeList::new();
        assert!(list.add_node(node("mass-memory", 0x6C)));
        assert!(list.add_node(node("star-tracker", 0x5A)));

        assert_eq!(list.find("mass-memory").unwrap().target_logical_address(), 0x6C);
        assert_eq!(list.find_by_logical_address(0x5A).unwrap().name(), "star-tracker");
        assert!(list.find("gyro").is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut list = RmapTargetNodeList::new();
        assert!(list.add_node(node("a", 1)));
        assert!(!list.add_node(node("a", 2)));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn capacity_is_bounded() {
        let mut list = RmapTargetNodeList::new();
        for i in 0..MAX_NUMBER_OF_TARGET_NODES {
            assert!(list.add_node(node(&format!("n{i}"), i as u8)));
        }
        assert!(!list.add_node(node("overflow", 0xEE)));
    }

    #[test]
    fn invalid_nodes_are_refused() {
        assert!(RmapTargetNode::new("", &[], &[], 0, 0).is_none());
        assert!(RmapTargetNode::new(&"x".repeat(21), &[], &[], 0, 0).is_none());
        assert!(RmapTargetNode::new("p", &[0; 33], &[], 0, 0).is_none());
    }
}
