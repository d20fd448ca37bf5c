use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

use crate::info::TypeKey;

/// Alias of `Result` with this crate's [`enum@Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

// -----------------------------------------------------------------------------
// Error

/// Every failure a serialization or deserialization call can produce.
///
/// All of these are terminal for the top-level call: output written so far (or
/// the partially built instance) must be discarded by the caller.
///
/// Variants that can be attributed to a member carry a `member` path such as
/// `owner.pets[2].name`, filled in while the error propagates out of the walk
/// (see [`Error::in_member`]).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The member set of a type could not be described.
    #[error("type `{type_path}` cannot be introspected: {reason}")]
    UnsupportedType {
        type_path: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    /// A model was reached again while it was still being written, and graph
    /// preservation is disabled.
    #[error("circular reference to `{type_path}`{}", At(.member))]
    CircularReference {
        type_path: &'static str,
        member: Option<String>,
    },

    /// The redirect table loops back onto an entry already visited.
    #[error("redirect chain starting at `{origin}` revisits `{revisited}`")]
    RedirectCycle { origin: TypeKey, revisited: TypeKey },

    /// No registered model matches a recorded type, even after redirection.
    #[error("no model registered for `{key}`{}", At(.member))]
    TypeResolution { key: TypeKey, member: Option<String> },

    /// Symbolic or numeric enum value without a matching variant.
    #[error("`{value}` is not a variant of `{enum_path}`{}", At(.member))]
    UnknownEnumValue {
        enum_path: &'static str,
        value: String,
        member: Option<String>,
    },

    /// The walk nested deeper than `SerializationConfig::max_depth`.
    #[error("maximum depth of {max_depth} exceeded{}", At(.member))]
    DepthExceeded {
        max_depth: usize,
        member: Option<String>,
    },

    /// The backend met data it cannot interpret.
    #[error("malformed input: {message}{}", At(.member))]
    Format {
        message: String,
        member: Option<String>,
    },

    /// The input names a member the target type does not declare, and unknown
    /// members are not allowed.
    #[error("`{type_path}` has no member `{member}`")]
    UnknownMember {
        type_path: &'static str,
        member: String,
    },

    /// A declared member was absent from the input while all members are required.
    #[error("member `{member}` of `{type_path}` is missing from the input")]
    MissingMember {
        type_path: &'static str,
        member: String,
    },

    /// A value did not have the shape its declared type expects.
    #[error("expected {expected}, found {found}{}", At(.member))]
    TypeMismatch {
        expected: Cow<'static, str>,
        found: Cow<'static, str>,
        member: Option<String>,
    },

    /// A shared model was mutably borrowed elsewhere during the walk.
    #[error("model `{type_path}` is already borrowed")]
    Borrowed { type_path: &'static str },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Raised by user code such as hooks, converters or custom serializers.
    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Shortcut for [`Error::Format`] without member context.
    #[inline]
    pub fn format(message: impl fmt::Display) -> Self {
        Self::Format {
            message: message.to_string(),
            member: None,
        }
    }

    /// Shortcut for [`Error::TypeMismatch`] without member context.
    #[inline]
    pub fn mismatch(
        expected: impl Into<Cow<'static, str>>,
        found: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
            member: None,
        }
    }

    /// Shortcut for [`Error::Custom`].
    #[inline]
    pub fn custom(message: impl fmt::Display) -> Self {
        Self::Custom(message.to_string())
    }

    /// Prepends `segment` to the member path of this error.
    ///
    /// Index segments (starting with `[`) are joined without a dot.
    #[must_use]
    pub fn in_member(mut self, segment: &str) -> Self {
        if let Some(slot) = self.member_slot() {
            *slot = Some(match slot.take() {
                None => segment.to_string(),
                Some(rest) if rest.starts_with('[') => format!("{segment}{rest}"),
                Some(rest) => format!("{segment}.{rest}"),
            });
        }
        self
    }

    /// Returns the member path this error is attributed to, if any.
    pub fn member(&self) -> Option<&str> {
        match self {
            Self::CircularReference { member, .. }
            | Self::TypeResolution { member, .. }
            | Self::UnknownEnumValue { member, .. }
            | Self::DepthExceeded { member, .. }
            | Self::Format { member, .. }
            | Self::TypeMismatch { member, .. } => member.as_deref(),
            Self::UnknownMember { member, .. } | Self::MissingMember { member, .. } => {
                Some(member)
            }
            _ => None,
        }
    }

    fn member_slot(&mut self) -> Option<&mut Option<String>> {
        match self {
            Self::CircularReference { member, .. }
            | Self::TypeResolution { member, .. }
            | Self::UnknownEnumValue { member, .. }
            | Self::DepthExceeded { member, .. }
            | Self::Format { member, .. }
            | Self::TypeMismatch { member, .. } => Some(member),
            _ => None,
        }
    }
}

/// Renders ` at `path`` when a member path is known.
struct At<'a>(&'a Option<String>);

impl fmt::Display for At<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(path) => write!(f, " at `{path}`"),
            None => Ok(()),
        }
    }
}
