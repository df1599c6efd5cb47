use crate::tokenizer::named_characters::NAMED_ENTITIES;
use lazy_static::lazy_static;

/// One node in the entity name trie. Edges are byte-keyed and kept sorted, so
/// a lookup is a binary search over a handful of entries instead of a 256-way
/// array per node.
#[derive(Debug, Default)]
pub struct EntityNode {
    children: Vec<(u8, EntityNode)>,
    value: Option<&'static str>,
}

impl EntityNode {
    /// Follows the edge for the given byte, if present
    pub fn child(&self, byte: u8) -> Option<&EntityNode> {
        self.children
            .binary_search_by_key(&byte, |(edge, _)| *edge)
            .ok()
            .map(|i| &self.children[i].1)
    }

    /// The replacement code points when this node terminates an entity name
    pub fn value(&self) -> Option<&'static str> {
        self.value
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    fn child_mut_or_insert(&mut self, byte: u8) -> &mut EntityNode {
        let i = match self
            .children
            .binary_search_by_key(&byte, |(edge, _)| *edge)
        {
            Ok(i) => i,
            Err(i) => {
                self.children.insert(i, (byte, EntityNode::default()));
                i
            }
        };
        &mut self.children[i].1
    }
}

/// Trie over the full named entity table, keyed by the bytes of the entity
/// name including the leading `&`. A node is a terminal when some entity's
/// full name ends there; terminals can still have descendants (`&not` vs
/// `&notin;`), which is what makes longest-match tracking necessary.
#[derive(Debug)]
pub struct EntityTrie {
    root: EntityNode,
}

impl EntityTrie {
    fn build() -> Self {
        let mut root = EntityNode::default();

        for (name, replacement) in NAMED_ENTITIES.iter() {
            let mut node = &mut root;
            for byte in name.bytes() {
                node = node.child_mut_or_insert(byte);
            }
            node.value = Some(replacement);
        }

        Self { root }
    }

    pub fn root(&self) -> &EntityNode {
        &self.root
    }

    /// Descends the trie along the given bytes. Returns the node reached by
    /// consuming the whole prefix, or None on a missing edge.
    pub fn find(&self, prefix: &[u8]) -> Option<&EntityNode> {
        let mut node = &self.root;
        for &byte in prefix {
            node = node.child(byte)?;
        }
        Some(node)
    }
}

lazy_static! {
    /// The entity trie is read-only and shared by every tokenizer instance
    pub static ref ENTITY_TRIE: EntityTrie = EntityTrie::build();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_size() {
        assert_eq!(NAMED_ENTITIES.len(), 2231);
        assert!(NAMED_ENTITIES.iter().all(|(name, _)| name.starts_with('&')));
    }

    #[test]
    fn test_terminal_lookup() {
        let node = ENTITY_TRIE.find(b"&amp;").expect("&amp; in trie");
        assert_eq!(node.value(), Some("&"));

        // The historical form without semicolon is its own terminal
        let node = ENTITY_TRIE.find(b"&amp").expect("&amp in trie");
        assert_eq!(node.value(), Some("&"));
    }

    #[test]
    fn test_prefix_without_terminal() {
        let node = ENTITY_TRIE.find(b"&Ar").expect("&Ar is a valid prefix");
        assert_eq!(node.value(), None);
        assert!(node.has_children());
    }

    #[test]
    fn test_missing_edge() {
        assert!(ENTITY_TRIE.find(b"&nosuchentity").is_none());
        assert!(ENTITY_TRIE.find(b"x").is_none());
    }

    #[test]
    fn test_terminal_with_descendants() {
        // &not is an entity AND a prefix of &notin;
        let node = ENTITY_TRIE.find(b"&not").expect("&not in trie");
        assert_eq!(node.value(), Some("\u{AC}"));
        assert!(node.has_children());

        let node = ENTITY_TRIE.find(b"&notin;").expect("&notin; in trie");
        assert_eq!(node.value(), Some("\u{2209}"));
    }

    #[test]
    fn test_two_code_point_replacement() {
        let node = ENTITY_TRIE.find(b"&NotEqualTilde;").expect("in trie");
        assert_eq!(node.value(), Some("\u{2242}\u{338}"));
    }

    #[test]
    fn test_every_row_reachable() {
        for (name, replacement) in NAMED_ENTITIES.iter() {
            let node = ENTITY_TRIE.find(name.as_bytes()).expect("row in trie");
            assert_eq!(node.value(), Some(*replacement));
        }
    }
}
