use std::collections::BTreeMap;

use super::Row;

/// A value stored in the [`Directory`](super::Directory): either a plain
/// field value or a named set of nested values (a row is a branch of leaves)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Leaf(String),
    Branch(BTreeMap<String, Node>),
}

impl Node {
    pub fn empty() -> Self {
        Node::Branch(BTreeMap::new())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Leaf(value) => Some(value.as_str()),
            Node::Branch(_) => None,
        }
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        match self {
            Node::Leaf(_) => None,
            Node::Branch(children) => children.get(name),
        }
    }

    /// Walk nested branches, one path component at a time
    pub fn lookup(&self, path: &[&str]) -> Option<&Node> {
        match path.split_first() {
            None => Some(self),
            Some((first, rest)) => self.child(first)?.lookup(rest),
        }
    }

    /// String value of a direct child (a row field)
    pub fn field(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(Node::as_str)
    }

    /// Flatten the leaf children of a branch back into a row
    pub fn to_row(&self) -> Row {
        match self {
            Node::Leaf(_) => Row::new(),
            Node::Branch(children) => children
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect(),
        }
    }
}

impl From<Row> for Node {
    fn from(row: Row) -> Self {
        Node::Branch(row.into_iter().map(|(k, v)| (k, Node::Leaf(v))).collect())
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::Leaf(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> Node {
        let mut localhost = Row::new();
        localhost.insert("bgp_asn".to_string(), "65100".to_string());
        localhost.insert("type".to_string(), "ToRRouter".to_string());
        let mut slot = BTreeMap::new();
        slot.insert("localhost".to_string(), Node::from(localhost));
        Node::Branch(slot)
    }

    #[test]
    fn test_lookup() {
        let node = metadata();
        assert_eq!(
            node.lookup(&["localhost", "bgp_asn"]).and_then(Node::as_str),
            Some("65100")
        );
        assert!(node.lookup(&["localhost", "deployment_id"]).is_none());
        assert!(node.lookup(&["localhost", "bgp_asn", "deeper"]).is_none());
        assert_eq!(node.lookup(&[]), Some(&node));
    }

    #[test]
    fn test_to_row() {
        let node = metadata();
        let row = node.child("localhost").unwrap().to_row();
        assert_eq!(row.get("type").map(String::as_str), Some("ToRRouter"));
        assert!(Node::from("leaf").to_row().is_empty());
    }
}
