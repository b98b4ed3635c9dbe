//! Job payloads
//!
//! Jobs exchange application-defined values the engine knows nothing about.
//! Every such type implements [`Payload`], which gives it a stable name and a
//! serde encoding. At runtime values travel as [`Data`], an erased handle that
//! can be persisted by name and decoded again through the
//! [`TypeRegistry`](crate::registry::TypeRegistry).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::error::{ActionError, Result};

/// A value that can flow between jobs and be persisted between steps.
///
/// `TYPE_NAME` is written to storage next to the encoded value, so it must
/// stay stable across releases for runs to stay resumable.
pub trait Payload: Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static {
    const TYPE_NAME: &'static str;
}

/// Marker payload for jobs that take or produce nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NilType;

impl Payload for NilType {
    const TYPE_NAME: &'static str = "nil";
}

trait ErasedPayload: Any + Send + Sync {
    fn encode(&self) -> serde_json::Result<String>;
    fn as_any(&self) -> &dyn Any;
    fn debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<P: Payload> ErasedPayload for P {
    fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Type-erased payload passed between hooks
#[derive(Clone)]
pub struct Data {
    type_name: &'static str,
    value: Arc<dyn ErasedPayload>,
}

impl Data {
    pub fn new<P: Payload>(value: P) -> Self {
        Self {
            type_name: P::TYPE_NAME,
            value: Arc::new(value),
        }
    }

    /// Registry name of the wrapped value's type
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<P: Payload>(&self) -> bool {
        self.value.as_any().is::<P>()
    }

    pub fn downcast_ref<P: Payload>(&self) -> Option<&P> {
        self.value.as_any().downcast_ref::<P>()
    }

    /// Clone the wrapped value out as `P`
    pub fn get<P: Payload + Clone>(&self) -> Result<P> {
        self.downcast_ref::<P>()
            .cloned()
            .ok_or(ActionError::PayloadMismatch {
                expected: P::TYPE_NAME,
                found: self.type_name,
            })
    }

    /// JSON encoding of the wrapped value
    pub fn encode(&self) -> serde_json::Result<String> {
        self.value.encode()
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Data<{}>(", self.type_name)?;
        self.value.debug(f)?;
        write!(f, ")")
    }
}

impl<P: Payload> From<P> for Data {
    fn from(value: P) -> Self {
        Data::new(value)
    }
}

/// Describes a payload type well enough to rebuild values of it from storage
#[derive(Clone, Copy)]
pub struct TypeDescriptor {
    name: &'static str,
    type_id: TypeId,
    decode: fn(&str) -> serde_json::Result<Data>,
}

impl TypeDescriptor {
    pub fn of<P: Payload>() -> Self {
        Self {
            name: P::TYPE_NAME,
            type_id: TypeId::of::<P>(),
            decode: decode_as::<P>,
        }
    }

    /// Descriptor of [`NilType`]
    pub fn nil() -> Self {
        Self::of::<NilType>()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn is_nil(&self) -> bool {
        self.type_id == TypeId::of::<NilType>()
    }

    /// Decode a JSON payload into a freshly allocated value of this type
    pub fn decode(&self, raw: &str) -> Result<Data> {
        Ok((self.decode)(raw)?)
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .finish()
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

fn decode_as<P: Payload>(raw: &str) -> serde_json::Result<Data> {
    serde_json::from_str::<P>(raw).map(Data::new)
}
