//! Links of the simulated network and fault injection on them.

use crate::routing::RouterId;
use std::{collections::HashMap, fmt};
use thiserror::Error;

/// Unique identifier of the link between two nodes
///
/// The link is bidirectional and is unique for two nodes. I.e.
/// For all nodes `n1` and `n2` the identifier `(n1, n2)` is the
/// same as the identifier `(n2, n1)`.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkId {
    smaller_id: RouterId,
    larger_id: RouterId,
}

/// Index of a network interface, local to its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterfaceIndex(u32);

impl LinkId {
    /// create the link identifier from the given node tuple.
    ///
    /// ```
    /// # use routeconv_core::{link::LinkId, routing::RouterId};
    /// # let n1 = RouterId::new(1);
    /// # let n2 = RouterId::new(2);
    /// assert_eq!(LinkId::new((n1, n2)), LinkId::new((n2, n1)));
    /// ```
    pub fn new((a, b): (RouterId, RouterId)) -> Self {
        if a < b {
            Self {
                smaller_id: a,
                larger_id: b,
            }
        } else {
            Self {
                smaller_id: b,
                larger_id: a,
            }
        }
    }

    /// get the [`RouterId`]s that compose this link identifier
    ///
    /// # Note
    ///
    /// This function may return the identifiers in a different
    /// order than when constructed
    ///
    /// ```
    /// # use routeconv_core::{link::LinkId, routing::RouterId};
    /// # let n1 = RouterId::new(2);
    /// # let n2 = RouterId::new(1);
    /// let (n2, n1) =
    ///   // construct a LinkId with (n1, n2)
    ///   LinkId::new((n1, n2))
    ///   // converting it back to a tuple
    ///   .into_nodes();
    /// # assert_eq!(n2, RouterId::new(1));
    /// # assert_eq!(n1, RouterId::new(2));
    /// ```
    #[inline]
    pub fn into_nodes(self) -> (RouterId, RouterId) {
        (self.smaller_id, self.larger_id)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{}", self.smaller_id, self.larger_id)
    }
}

impl InterfaceIndex {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn into_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for InterfaceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    /// No link was registered between the two nodes.
    #[error("Link ({from} -> {to}) Not Found: the nodes are not directly connected")]
    UnknownLink { from: RouterId, to: RouterId },
    #[error("Link ({link}) is already registered")]
    DuplicateLink { link: LinkId },
    #[error("Node ({node}) cannot be linked to itself")]
    SelfLoop { node: RouterId },
}

/// Control over the interfaces of the simulated network's nodes.
pub trait InterfaceControl {
    fn set_interface_up(&mut self, node: RouterId, interface: InterfaceIndex);
    fn set_interface_down(&mut self, node: RouterId, interface: InterfaceIndex);
}

/// Mapping from `(node, peer)` to the interface of `node` facing `peer`.
///
/// Built once with [`LinkMapBuilder`] while the topology is set up and
/// read-only afterward. Both directions of every link are present.
#[derive(Debug, Clone, Default)]
pub struct LinkMap {
    interfaces: HashMap<(RouterId, RouterId), InterfaceIndex>,
}

/// Builder of the [`LinkMap`], one [`register`] per physical link.
///
/// [`register`]: LinkMapBuilder::register
#[derive(Debug, Default)]
pub struct LinkMapBuilder {
    map: LinkMap,
}

impl LinkMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the link between `a` and `b`: `a_interface` is the
    /// interface of `a` facing `b` and `b_interface` the one of `b` facing
    /// `a`.
    ///
    /// # Errors
    ///
    /// A link may only be registered once and may not connect a node to
    /// itself.
    pub fn register(
        &mut self,
        (a, a_interface): (RouterId, InterfaceIndex),
        (b, b_interface): (RouterId, InterfaceIndex),
    ) -> Result<LinkId, LinkError> {
        if a == b {
            return Err(LinkError::SelfLoop { node: a });
        }
        let link = LinkId::new((a, b));
        if self.map.interfaces.contains_key(&(a, b)) {
            return Err(LinkError::DuplicateLink { link });
        }

        self.map.interfaces.insert((a, b), a_interface);
        self.map.interfaces.insert((b, a), b_interface);

        Ok(link)
    }

    pub fn build(self) -> LinkMap {
        self.map
    }
}

impl LinkMap {
    pub fn builder() -> LinkMapBuilder {
        LinkMapBuilder::new()
    }

    /// number of links
    pub fn len(&self) -> usize {
        self.interfaces.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    /// the interface of `node` facing `peer`
    pub fn interface(&self, node: RouterId, peer: RouterId) -> Result<InterfaceIndex, LinkError> {
        self.interfaces
            .get(&(node, peer))
            .copied()
            .ok_or(LinkError::UnknownLink {
                from: node,
                to: peer,
            })
    }

    /// both ends of `link`: each node with its interface facing the other
    pub fn endpoints(
        &self,
        link: LinkId,
    ) -> Result<[(RouterId, InterfaceIndex); 2], LinkError> {
        let (a, b) = link.into_nodes();
        Ok([(a, self.interface(a, b)?), (b, self.interface(b, a)?)])
    }

    pub fn contains(&self, link: LinkId) -> bool {
        let (a, b) = link.into_nodes();
        self.interfaces.contains_key(&(a, b))
    }

    /// all the registered links, in no particular order
    pub fn links(&self) -> impl Iterator<Item = LinkId> + '_ {
        self.interfaces
            .keys()
            .filter(|(a, b)| a < b)
            .map(|&(a, b)| LinkId::new((a, b)))
    }
}

/// Tears links down and brings them back up.
///
/// Both operations take effect on the interfaces at the instant they are
/// invoked. Whether the routing reacts is only visible through the routing
/// tables afterward. Tearing down a link that is already down (or
/// restoring one that is up) is left to the [`InterfaceControl`]
/// implementation.
#[derive(Debug, Clone, Copy)]
pub struct LinkFaultInjector<'a> {
    links: &'a LinkMap,
}

impl<'a> LinkFaultInjector<'a> {
    pub fn new(links: &'a LinkMap) -> Self {
        Self { links }
    }

    /// Disable both interfaces of `link`.
    ///
    /// # Errors
    ///
    /// [`LinkError::UnknownLink`] if the link was never registered, in which
    /// case no interface is touched.
    pub fn tear_down<N>(&self, network: &mut N, link: LinkId) -> Result<(), LinkError>
    where
        N: InterfaceControl + ?Sized,
    {
        let endpoints = self.links.endpoints(link)?;
        for (node, interface) in endpoints {
            network.set_interface_down(node, interface);
        }
        log::info!("link {link} torn down");
        Ok(())
    }

    /// Re-enable both interfaces of `link`.
    ///
    /// # Errors
    ///
    /// [`LinkError::UnknownLink`] if the link was never registered, in which
    /// case no interface is touched.
    pub fn restore<N>(&self, network: &mut N, link: LinkId) -> Result<(), LinkError>
    where
        N: InterfaceControl + ?Sized,
    {
        let endpoints = self.links.endpoints(link)?;
        for (node, interface) in endpoints {
            network.set_interface_up(node, interface);
        }
        log::info!("link {link} restored");
        Ok(())
    }
}
