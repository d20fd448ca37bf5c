//! Extension points around individual members.
//!
//! - [`MemberHook`]: observes or rewrites member values before they are
//!   written and after they are read. Hooks run in registration order.
//! - [`MemberConverter`]: maps a member between its in-memory and persisted
//!   representation; selected per member by `#[persist(converter = "id")]`.

use core::fmt;

use crate::error::Result;
use crate::info::ModelInfo;
use crate::member::MemberDescriptor;
use crate::value::{Value, ValueKind};

// -----------------------------------------------------------------------------
// MemberValue

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberState {
    Unchanged,
    Replaced,
    Skipped,
}

/// One member of one instance, passed through the hook chain.
///
/// It never outlives the visit of its member.
pub struct MemberValue<'a> {
    descriptor: &'a MemberDescriptor,
    owner: &'static ModelInfo,
    value: Value,
    state: MemberState,
}

impl<'a> MemberValue<'a> {
    pub(crate) fn new(descriptor: &'a MemberDescriptor, owner: &'static ModelInfo, value: Value) -> Self {
        Self {
            descriptor,
            owner,
            value,
            state: MemberState::Unchanged,
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.descriptor.name()
    }

    #[inline]
    pub fn descriptor(&self) -> &'a MemberDescriptor {
        self.descriptor
    }

    /// The model type being walked (the most derived one).
    #[inline]
    pub fn owner(&self) -> &'static ModelInfo {
        self.owner
    }

    #[inline]
    pub fn kind(&self) -> &ValueKind {
        self.descriptor.kind()
    }

    #[inline]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Replaces the value that will be written (or assigned).
    pub fn replace(&mut self, value: Value) {
        self.value = value;
        self.state = MemberState::Replaced;
    }

    /// Drops the member: it is not written (or not assigned).
    #[inline]
    pub fn skip(&mut self) {
        self.state = MemberState::Skipped;
    }

    #[inline]
    pub fn is_skipped(&self) -> bool {
        self.state == MemberState::Skipped
    }

    #[inline]
    pub fn is_replaced(&self) -> bool {
        self.state == MemberState::Replaced
    }

    #[inline]
    pub(crate) fn into_value(self) -> Value {
        self.value
    }
}

impl fmt::Debug for MemberValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberValue")
            .field("owner", &self.owner.type_path())
            .field("name", &self.name())
            .field("value", &self.value)
            .field("state", &self.state)
            .finish()
    }
}

// -----------------------------------------------------------------------------
// MemberHook

/// Pre/post member callbacks.
///
/// All methods default to doing nothing. An error aborts the whole call.
///
/// # Example
///
/// ```
/// use vc_persist::{MemberHook, MemberValue, Persist, Result};
///
/// struct RedactSecrets;
///
/// impl MemberHook for RedactSecrets {
///     fn before_serialize(&self, member: &mut MemberValue<'_>) -> Result<()> {
///         if member.name().contains("secret") {
///             member.replace("***".to_string().to_value());
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait MemberHook: Send + Sync {
    /// May replace the value to write, or skip the member.
    fn before_serialize(&self, member: &mut MemberValue<'_>) -> Result<()> {
        let _ = member;
        Ok(())
    }

    /// Called once the member has been handed to the backend.
    fn after_serialize(&self, member: &MemberValue<'_>) -> Result<()> {
        let _ = member;
        Ok(())
    }

    /// May replace the value to assign, or skip the assignment.
    fn after_deserialize(&self, member: &mut MemberValue<'_>) -> Result<()> {
        let _ = member;
        Ok(())
    }
}

/// Runs `step` for every hook until one skips the member.
pub(crate) fn run_chain(
    hooks: &[Box<dyn MemberHook>],
    member: &mut MemberValue<'_>,
    step: impl Fn(&dyn MemberHook, &mut MemberValue<'_>) -> Result<()>,
) -> Result<()> {
    for hook in hooks {
        step(hook.as_ref(), member)?;
        if member.is_skipped() {
            break;
        }
    }
    Ok(())
}

// -----------------------------------------------------------------------------
// MemberConverter

/// Maps a member value to and from its persisted form.
///
/// ```
/// use vc_persist::{Literal, MemberConverter, Result, Value, ValueKind};
///
/// /// Stores a millisecond count as seconds.
/// struct Seconds;
///
/// impl MemberConverter for Seconds {
///     fn to_persisted(&self, value: Value) -> Result<Value> {
///         match value {
///             Value::Literal(Literal::UInt(ms)) => Ok(Literal::Float(ms as f64 / 1000.0).into()),
///             other => Ok(other),
///         }
///     }
///
///     fn from_persisted(&self, value: Value) -> Result<Value> {
///         match value {
///             Value::Literal(Literal::Float(s)) => Ok(Literal::UInt((s * 1000.0) as u64).into()),
///             other => Ok(other),
///         }
///     }
///
///     fn persisted_kind(&self, _declared: &ValueKind) -> ValueKind {
///         ValueKind::Float
///     }
/// }
/// ```
pub trait MemberConverter: Send + Sync {
    fn to_persisted(&self, value: Value) -> Result<Value>;

    fn from_persisted(&self, value: Value) -> Result<Value>;

    /// The type of the persisted form, given the declared one.
    fn persisted_kind(&self, declared: &ValueKind) -> ValueKind {
        declared.clone()
    }
}
