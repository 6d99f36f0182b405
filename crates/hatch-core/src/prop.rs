//! Typed, named properties and the ordered sets that own them.
//!
//! A `Prop` carries one value plus the metadata the property editor needs
//! (category, options, advisory type). An `EditableSet` owns props by name and
//! is the only place values change: every `set_value` records a `PropEdit` in
//! the set's outbox, which the owner drains and forwards as notifications.

use crate::error::{GraphError, GraphResult};
use crate::id::{AssetId, GroupId, Name};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

// ─── Types & values ──────────────────────────────────────────────────────

/// Advisory data type of a property. Never enforced on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PropertyType {
    Bool,
    Number,
    Text,
    Color,
    Options,
    Asset,
    AssetList,
    Group,
    File,
    Script,
    #[default]
    Object,
    Hidden,
}

/// The value held by a property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Asset(Option<AssetId>),
    AssetList(Vec<AssetId>),
    Group(Option<GroupId>),
    /// Anything else, kept verbatim.
    Object(Value),
}

impl PropValue {
    /// The natural empty value for a property type.
    pub fn default_for(kind: PropertyType) -> Self {
        match kind {
            PropertyType::Bool => PropValue::Bool(false),
            PropertyType::Number => PropValue::Number(0.0),
            PropertyType::Text
            | PropertyType::Color
            | PropertyType::Options
            | PropertyType::File
            | PropertyType::Script => PropValue::Text(String::new()),
            PropertyType::Asset => PropValue::Asset(None),
            PropertyType::AssetList => PropValue::AssetList(Vec::new()),
            PropertyType::Group => PropValue::Group(None),
            PropertyType::Object | PropertyType::Hidden => PropValue::Object(Value::Null),
        }
    }

    /// Raw JSON form used on the wire.
    pub fn to_json(&self) -> Value {
        match self {
            PropValue::Bool(b) => Value::Bool(*b),
            PropValue::Number(n) => json!(n),
            PropValue::Text(s) => Value::String(s.clone()),
            PropValue::Asset(id) => id
                .as_ref()
                .map_or(Value::Null, |id| Value::String(id.0.clone())),
            PropValue::AssetList(ids) => {
                Value::Array(ids.iter().map(|id| Value::String(id.0.clone())).collect())
            }
            PropValue::Group(id) => id
                .as_ref()
                .map_or(Value::Null, |id| Value::String(id.0.clone())),
            PropValue::Object(v) => v.clone(),
        }
    }

    /// Interpret raw JSON according to `kind`.
    ///
    /// Mismatched shapes are kept as `Object` rather than rejected, since the
    /// type is advisory.
    pub fn from_json(kind: PropertyType, value: Value) -> Self {
        match (kind, value) {
            (PropertyType::Bool, Value::Bool(b)) => PropValue::Bool(b),
            (PropertyType::Number, Value::Number(n)) => {
                PropValue::Number(n.as_f64().unwrap_or_default())
            }
            (
                PropertyType::Text
                | PropertyType::Color
                | PropertyType::Options
                | PropertyType::File
                | PropertyType::Script,
                Value::String(s),
            ) => PropValue::Text(s),
            (PropertyType::Asset, Value::Null) => PropValue::Asset(None),
            (PropertyType::Asset, Value::String(s)) => PropValue::Asset(Some(AssetId(s))),
            (PropertyType::Group, Value::Null) => PropValue::Group(None),
            (PropertyType::Group, Value::String(s)) => PropValue::Group(Some(GroupId(s))),
            (PropertyType::AssetList, Value::Array(items)) if items.iter().all(Value::is_string) => {
                PropValue::AssetList(
                    items
                        .into_iter()
                        .filter_map(|v| v.as_str().map(AssetId::from))
                        .collect(),
                )
            }
            (_, other) => PropValue::Object(other),
        }
    }

    /// Every asset this value points at.
    pub fn asset_refs(&self) -> Vec<&AssetId> {
        match self {
            PropValue::Asset(Some(id)) => vec![id],
            PropValue::AssetList(ids) => ids.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// The group this value points at, if any.
    pub fn group_ref(&self) -> Option<&GroupId> {
        match self {
            PropValue::Group(Some(id)) => Some(id),
            _ => None,
        }
    }
}

// ─── Prop ────────────────────────────────────────────────────────────────

/// A single named, typed, categorized value.
#[derive(Debug, Clone, PartialEq)]
pub struct Prop {
    pub name: Name,
    pub value: PropValue,
    pub category: String,
    pub options: Option<Value>,
    pub kind: PropertyType,
}

/// Full (non-slim) wire form of a `Prop`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropToken {
    pub value: Value,
    pub name: Name,
    #[serde(rename = "type", default)]
    pub kind: PropertyType,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl Prop {
    pub fn new(name: impl Into<Name>, value: PropValue, kind: PropertyType) -> Self {
        Self {
            name: name.into(),
            value,
            category: String::from("General Properties"),
            options: None,
            kind,
        }
    }

    /// A prop holding the empty value for its type.
    pub fn empty(name: impl Into<Name>, kind: PropertyType) -> Self {
        Self::new(name, PropValue::default_for(kind), kind)
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }

    /// Slim form: the raw value only. Full form: everything needed to rebuild
    /// the prop standalone.
    pub fn tokenize(&self, slim: bool) -> Value {
        if slim {
            return self.value.to_json();
        }
        // PropToken only holds JSON-safe fields
        serde_json::to_value(self.to_token()).unwrap_or(Value::Null)
    }

    pub fn to_token(&self) -> PropToken {
        PropToken {
            value: self.value.to_json(),
            name: self.name,
            kind: self.kind,
            category: self.category.clone(),
            options: self.options.clone(),
        }
    }

    /// Rebuild from the full form.
    pub fn detokenize(token: PropToken) -> Self {
        Self {
            name: token.name,
            value: PropValue::from_json(token.kind, token.value),
            category: token.category,
            options: token.options,
            kind: token.kind,
        }
    }
}

// ─── EditableSet ─────────────────────────────────────────────────────────

/// A recorded property edit, produced by every `EditableSet::set_value`.
#[derive(Debug, Clone, PartialEq)]
pub struct PropEdit {
    pub name: Name,
    pub old: PropValue,
    pub new: PropValue,
}

/// Ordered mapping from property name to `Prop`.
#[derive(Debug, Clone, Default)]
pub struct EditableSet {
    props: IndexMap<Name, Prop>,
    edits: Vec<PropEdit>,
}

impl EditableSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a prop; names must stay unique.
    pub fn add(&mut self, prop: Prop) -> GraphResult<()> {
        if self.props.contains_key(&prop.name) {
            return Err(GraphError::DuplicateProperty(prop.name));
        }
        self.props.insert(prop.name, prop);
        Ok(())
    }

    pub fn remove(&mut self, name: Name) -> Option<Prop> {
        self.props.shift_remove(&name)
    }

    pub fn get(&self, name: Name) -> Option<&Prop> {
        self.props.get(&name)
    }

    pub fn value(&self, name: Name) -> Option<&PropValue> {
        self.props.get(&name).map(|p| &p.value)
    }

    /// Change a prop's value and notify the owner through the edit outbox.
    pub fn set_value(&mut self, name: Name, value: PropValue) -> GraphResult<()> {
        let prop = self
            .props
            .get_mut(&name)
            .ok_or(GraphError::UnknownProperty(name))?;
        let old = std::mem::replace(&mut prop.value, value.clone());
        self.notify_edit(PropEdit {
            name,
            old,
            new: value,
        });
        Ok(())
    }

    fn notify_edit(&mut self, edit: PropEdit) {
        log::trace!("prop `{}` edited", edit.name);
        self.edits.push(edit);
    }

    /// Drain edits recorded since the last call.
    pub fn take_edits(&mut self) -> Vec<PropEdit> {
        std::mem::take(&mut self.edits)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Prop> {
        self.props.values()
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    /// Slim: `{ name: value }`. Full: an array of full prop tokens.
    pub fn tokenize(&self, slim: bool) -> Value {
        if slim {
            let map: Map<String, Value> = self
                .props
                .values()
                .map(|p| (p.name.as_str().to_string(), p.tokenize(true)))
                .collect();
            Value::Object(map)
        } else {
            Value::Array(self.props.values().map(|p| p.tokenize(false)).collect())
        }
    }

    /// Rebuild from the full form. `null` yields an empty set.
    pub fn detokenize(data: &Value) -> GraphResult<Self> {
        let mut set = Self::new();
        if data.is_null() {
            return Ok(set);
        }
        let tokens: Vec<PropToken> = serde_json::from_value(data.clone())?;
        for token in tokens {
            set.add(Prop::detokenize(token))?;
        }
        Ok(set)
    }

    /// Copy of this set with values taken from a slim `{ name: value }` map.
    /// Names the set does not declare are ignored.
    pub fn with_slim_values(&self, data: &Map<String, Value>) -> Self {
        let mut set = self.clone();
        set.edits.clear();
        for prop in set.props.values_mut() {
            if let Some(raw) = data.get(prop.name.as_str()) {
                prop.value = PropValue::from_json(prop.kind, raw.clone());
            }
        }
        set
    }
}

impl PartialEq for EditableSet {
    fn eq(&self, other: &Self) -> bool {
        self.props == other.props
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn full_token_roundtrip() {
        let prop = Prop::new("Speed", PropValue::Number(2.5), PropertyType::Number)
            .with_category("Motion")
            .with_options(json!({ "min": 0, "max": 10 }));
        let token: PropToken = serde_json::from_value(prop.tokenize(false)).unwrap();
        assert_eq!(Prop::detokenize(token), prop);
    }

    #[test]
    fn slim_token_is_raw_value() {
        let prop = Prop::new(
            "Texture",
            PropValue::Asset(Some(AssetId::new("a1"))),
            PropertyType::Asset,
        );
        assert_eq!(prop.tokenize(true), json!("a1"));
    }

    #[test]
    fn mismatched_value_kept_as_object() {
        let value = PropValue::from_json(PropertyType::Number, json!("fast"));
        assert_eq!(value, PropValue::Object(json!("fast")));
    }

    #[test]
    fn set_rejects_duplicate_names() {
        let mut set = EditableSet::new();
        set.add(Prop::empty("Label", PropertyType::Text)).unwrap();
        let err = set.add(Prop::empty("Label", PropertyType::Bool)).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateProperty(_)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn set_value_records_edit() {
        let mut set = EditableSet::new();
        set.add(Prop::empty("Visible", PropertyType::Bool)).unwrap();
        set.set_value(Name::intern("Visible"), PropValue::Bool(true))
            .unwrap();

        let edits = set.take_edits();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].old, PropValue::Bool(false));
        assert_eq!(edits[0].new, PropValue::Bool(true));
        assert!(set.take_edits().is_empty());
    }

    #[test]
    fn set_tokens_roundtrip_in_order() {
        let mut set = EditableSet::new();
        set.add(Prop::empty("B", PropertyType::Text)).unwrap();
        set.add(Prop::empty("A", PropertyType::Number)).unwrap();
        let restored = EditableSet::detokenize(&set.tokenize(false)).unwrap();
        assert_eq!(restored, set);
        let names: Vec<_> = restored.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
    }
}
