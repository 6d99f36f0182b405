//! Typed gates on a behaviour.
//!
//! A portal wraps one `Prop` and remembers which links touch it. The owning
//! behaviour is implied by where the portal lives; links address a portal
//! through a `PortalRef` (behaviour id + portal name).

use crate::id::{Name, ShallowId};
use crate::prop::{Prop, PropToken, PropertyType};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Direction / role of a portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortalType {
    /// Flow sink.
    Input,
    /// Flow source.
    Output,
    /// Data sink.
    Parameter,
    /// Data source.
    Product,
}

impl PortalType {
    /// True for the source side of a link.
    pub fn is_source(self) -> bool {
        matches!(self, PortalType::Output | PortalType::Product)
    }
}

/// Address of a portal: owning behaviour plus portal name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortalRef {
    pub behaviour: ShallowId,
    pub portal: Name,
}

impl PortalRef {
    pub fn new(behaviour: ShallowId, portal: impl Into<Name>) -> Self {
        Self {
            behaviour,
            portal: portal.into(),
        }
    }
}

/// A typed connection point on a behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct Portal {
    pub name: Name,
    pub kind: PortalType,
    pub property: Prop,
    /// User-added portal. Structural (template) portals have `custom = false`.
    pub custom: bool,
    /// Ids of every link that starts or ends here.
    pub links: SmallVec<[ShallowId; 4]>,
}

/// Wire form of a portal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalToken {
    pub name: Name,
    #[serde(rename = "type")]
    pub kind: PortalType,
    #[serde(default)]
    pub custom: bool,
    pub property: PropToken,
}

impl Portal {
    /// Build a portal around `property`; the portal takes the property's name.
    pub fn new(kind: PortalType, property: Prop, custom: bool) -> Self {
        Self {
            name: property.name,
            kind,
            property,
            custom,
            links: SmallVec::new(),
        }
    }

    /// Replace the carried property. Existing links stay attached.
    pub fn edit(&mut self, property: Prop) {
        self.name = property.name;
        self.property = property;
    }

    /// Can a link run from `source` into this portal?
    ///
    /// Flow edges (`Output -> Input`) always match. Data edges
    /// (`Product -> Parameter`) need the same property type, with `Object`
    /// acting as a wildcard on either side.
    pub fn check_portal_link(&self, source: &Portal) -> bool {
        match (source.kind, self.kind) {
            (PortalType::Output, PortalType::Input) => true,
            (PortalType::Product, PortalType::Parameter) => {
                let (from, to) = (source.property.kind, self.property.kind);
                from == to || from == PropertyType::Object || to == PropertyType::Object
            }
            _ => false,
        }
    }

    /// Attach a link id. Returns false if it was already attached.
    pub fn add_link(&mut self, link: ShallowId) -> bool {
        if self.links.contains(&link) {
            return false;
        }
        self.links.push(link);
        true
    }

    /// Detach a link id. Returns false if it was not attached.
    pub fn remove_link(&mut self, link: ShallowId) -> bool {
        let before = self.links.len();
        self.links.retain(|l| *l != link);
        self.links.len() != before
    }

    /// Links whose drawn geometry depends on this portal's position.
    /// Called after the owning behaviour moves.
    pub fn update_all_links(&self) -> &[ShallowId] {
        &self.links
    }

    pub fn tokenize(&self) -> PortalToken {
        PortalToken {
            name: self.name,
            kind: self.kind,
            custom: self.custom,
            property: self.property.to_token(),
        }
    }

    /// Rebuild from a token. Links are attached later by the link phase.
    pub fn detokenize(token: PortalToken) -> Self {
        let mut property = Prop::detokenize(token.property);
        // The portal name is authoritative for addressing
        property.name = token.name;
        Self {
            name: token.name,
            kind: token.kind,
            property,
            custom: token.custom,
            links: SmallVec::new(),
        }
    }

    /// Copy of this portal's shape with no links attached.
    pub fn detached(&self) -> Self {
        Self {
            links: SmallVec::new(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prop::PropValue;

    fn portal(name: &str, kind: PortalType, ty: PropertyType) -> Portal {
        Portal::new(kind, Prop::empty(name, ty), false)
    }

    #[test]
    fn flow_links_ignore_data_type() {
        let out = portal("Out", PortalType::Output, PropertyType::Bool);
        let inp = portal("In", PortalType::Input, PropertyType::Number);
        assert!(inp.check_portal_link(&out));
        // Direction matters
        assert!(!out.check_portal_link(&inp));
    }

    #[test]
    fn data_links_need_matching_type() {
        let number = portal("N", PortalType::Product, PropertyType::Number);
        let text = portal("T", PortalType::Product, PropertyType::Text);
        let any = portal("A", PortalType::Product, PropertyType::Object);
        let param = portal("P", PortalType::Parameter, PropertyType::Number);

        assert!(param.check_portal_link(&number));
        assert!(!param.check_portal_link(&text));
        assert!(param.check_portal_link(&any));
    }

    #[test]
    fn flow_cannot_feed_parameter() {
        let out = portal("Out", PortalType::Output, PropertyType::Object);
        let param = portal("P", PortalType::Parameter, PropertyType::Object);
        assert!(!param.check_portal_link(&out));
    }

    #[test]
    fn links_list_has_no_duplicates() {
        let mut p = portal("In", PortalType::Input, PropertyType::Bool);
        assert!(p.add_link(ShallowId(7)));
        assert!(!p.add_link(ShallowId(7)));
        assert_eq!(p.links.len(), 1);
        assert!(p.remove_link(ShallowId(7)));
        assert!(!p.remove_link(ShallowId(7)));
    }

    #[test]
    fn edit_keeps_links() {
        let mut p = portal("Count", PortalType::Parameter, PropertyType::Number);
        p.add_link(ShallowId(3));
        p.edit(Prop::new("Total", PropValue::Number(4.0), PropertyType::Number));
        assert_eq!(p.name.as_str(), "Total");
        assert_eq!(p.links.as_slice(), &[ShallowId(3)]);
    }
}
