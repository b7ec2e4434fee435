use std::collections::BTreeSet;
use std::net::Ipv4Addr;

/// Multicast groups the host currently listens to
#[derive(Debug, Clone, Default)]
pub struct Membership {
    groups: BTreeSet<Ipv4Addr>,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `group`, returning whether it was new
    pub fn add(&mut self, group: Ipv4Addr) -> bool {
        self.groups.insert(group)
    }

    /// Removes `group`, returning whether it was present
    pub fn remove(&mut self, group: Ipv4Addr) -> bool {
        self.groups.remove(&group)
    }

    pub fn contains(&self, group: Ipv4Addr) -> bool {
        self.groups.contains(&group)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Groups in address order
    pub fn iter(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.groups.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_remove() {
        let mut membership = Membership::new();
        let group = Ipv4Addr::new(239, 1, 1, 1);

        assert!(membership.is_empty());
        assert!(membership.add(group));
        assert!(!membership.add(group));
        assert_eq!(membership.len(), 1);
        assert!(membership.contains(group));

        assert!(membership.remove(group));
        assert!(!membership.remove(group));
        assert!(membership.is_empty());
    }

    #[test]
    fn test_iteration_order() {
        let mut membership = Membership::new();
        membership.add(Ipv4Addr::new(239, 2, 2, 2));
        membership.add(Ipv4Addr::new(239, 1, 1, 1));
        let groups: Vec<_> = membership.iter().collect();
        assert_eq!(
            groups,
            vec![Ipv4Addr::new(239, 1, 1, 1), Ipv4Addr::new(239, 2, 2, 2)]
        );
    }
}
