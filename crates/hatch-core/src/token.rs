//! Wire format of a persisted container.
//!
//! The server stores `ContainerToken` as an opaque JSON string. Items are a
//! flat record keyed by a numeric `type`; subtype fields are optional and
//! omitted when absent.

use crate::id::{ContainerId, Name, ScriptId, ShallowId};
use crate::portal::{PortalToken, PortalType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Numeric item discriminant on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ItemType {
    Link = 0,
    Behaviour = 1,
    BehaviourAsset = 2,
    BehaviourComment = 3,
    BehaviourInstance = 4,
    BehaviourScript = 5,
    BehaviourPortal = 6,
    BehaviourShortcut = 7,
}

impl From<ItemType> for u8 {
    fn from(t: ItemType) -> Self {
        t as u8
    }
}

impl TryFrom<u8> for ItemType {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Ok(match v {
            0 => ItemType::Link,
            1 => ItemType::Behaviour,
            2 => ItemType::BehaviourAsset,
            3 => ItemType::BehaviourComment,
            4 => ItemType::BehaviourInstance,
            5 => ItemType::BehaviourScript,
            6 => ItemType::BehaviourPortal,
            7 => ItemType::BehaviourShortcut,
            other => return Err(format!("unknown canvas item type {other}")),
        })
    }
}

/// One canvas item on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemToken {
    pub shallow_id: ShallowId,
    #[serde(rename = "type")]
    pub kind: ItemType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<String>,

    // Behaviour
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behaviour_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_ghost: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_update: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub portals: Vec<PortalToken>,

    // BehaviourPortal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portal: Option<PortalToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portal_type: Option<PortalType>,

    // BehaviourScript
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_id: Option<ScriptId>,

    // BehaviourShortcut
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_id: Option<ShallowId>,

    // BehaviourInstance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<ContainerId>,

    // BehaviourComment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,

    // Link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_portal: Option<Name>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_portal: Option<Name>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_behaviour: Option<ShallowId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_behaviour: Option<ShallowId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_delay: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
}

impl ItemToken {
    /// A token with only the shared fields set.
    pub fn new(shallow_id: ShallowId, kind: ItemType) -> Self {
        Self {
            shallow_id,
            kind,
            left: None,
            top: None,
            alias: None,
            text: None,
            behaviour_type: None,
            can_ghost: None,
            requires_update: None,
            portals: Vec::new(),
            portal: None,
            portal_type: None,
            script_id: None,
            original_id: None,
            container_id: None,
            width: None,
            height: None,
            start_portal: None,
            end_portal: None,
            start_behaviour: None,
            end_behaviour: None,
            frame_delay: None,
            properties: None,
        }
    }

    pub fn is_link(&self) -> bool {
        self.kind == ItemType::Link
    }
}

/// A whole container graph on the wire.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContainerToken {
    pub items: Vec<ItemToken>,
    #[serde(default)]
    pub properties: Value,
}

impl ContainerToken {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn item_type_is_numeric_on_the_wire() {
        let token = ItemToken::new(ShallowId(3), ItemType::Link);
        let v = serde_json::to_value(&token).unwrap();
        assert_eq!(v, json!({ "shallowId": 3, "type": 0 }));
    }

    #[test]
    fn unknown_item_type_is_rejected() {
        let err = serde_json::from_value::<ItemToken>(json!({ "shallowId": 1, "type": 42 }));
        assert!(err.is_err());
    }

    #[test]
    fn link_fields_use_camel_case() {
        let v = json!({
            "shallowId": 9,
            "type": 0,
            "startPortal": "Out",
            "endPortal": "In",
            "startBehaviour": 1,
            "endBehaviour": 2,
            "frameDelay": 3
        });
        let token: ItemToken = serde_json::from_value(v).unwrap();
        assert_eq!(token.start_behaviour, Some(ShallowId(1)));
        assert_eq!(token.end_portal.map(|n| n.as_str().to_string()), Some("In".into()));
        assert_eq!(token.frame_delay, Some(3));
    }
}
