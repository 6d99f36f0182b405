use lasso::{Spur, ThreadedRodeo};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::LazyLock;

// ─── Interned names ──────────────────────────────────────────────────────

/// Process-wide table behind every `Name`. Templates, tokens and user edits
/// all intern into it, so a portal named in a link token compares equal to
/// the portal of the same name on a hydrated behaviour.
static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::default);

/// A portal or property name.
///
/// Portal names are the addresses links use (`PortalRef` pairs one with a
/// behaviour id), and they key property sets, so they are compared far more
/// often than they are printed. On the wire a `Name` is its plain string.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Name(Spur);

impl Name {
    pub fn intern(s: &str) -> Self {
        Name(INTERNER.get_or_intern(s))
    }

    pub fn as_str(&self) -> &str {
        INTERNER.resolve(&self.0)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name::intern(s)
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Name::intern(&s))
    }
}

// ─── Shallow ids ─────────────────────────────────────────────────────────

/// Session-local identity of a canvas item.
///
/// Only unique within one editing session; never persisted as a durable key.
/// Tokens carry it so cross references can be resolved on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShallowId(pub u32);

impl fmt::Display for ShallowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out shallow ids for one editing session.
///
/// Cloning shares the counter, so every canvas of a session draws from the
/// same sequence and ids never repeat across containers.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    next: Rc<Cell<u32>>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id.
    pub fn next(&self) -> ShallowId {
        let id = self.next.get();
        self.next.set(id + 1);
        ShallowId(id)
    }

    /// Bump the counter past `reference` so later ids cannot collide with it.
    /// Returns the id that will be handed out next.
    pub fn generate_local_id(&self, reference: ShallowId) -> ShallowId {
        if reference.0 >= self.next.get() {
            self.next.set(reference.0 + 1);
        }
        ShallowId(self.next.get())
    }

    /// Peek at the next id without allocating it.
    pub fn peek(&self) -> ShallowId {
        ShallowId(self.next.get())
    }
}

// ─── Durable resource ids ────────────────────────────────────────────────

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

resource_id!(
    /// Id of a persisted container, issued by the persistence service.
    ContainerId
);
resource_id!(
    /// Id of an asset owned by the asset service.
    AssetId
);
resource_id!(
    /// Id of an asset group.
    GroupId
);
resource_id!(
    /// Id of a persisted script resource.
    ScriptId
);
