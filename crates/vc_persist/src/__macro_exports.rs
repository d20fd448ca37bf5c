//! Items used by the code `vc_persist_derive` generates. Not public API.

use crate::error::{Error, Result};
use crate::model::Model;
use crate::value::Value;

/// `Persist::from_value` of derived models.
///
/// Accepts a boxed instance of `T`, or a shared one, which is cloned out.
pub fn model_from_value<T: Model + Clone>(value: Value) -> Result<T> {
    let expected = T::model_info().type_path();
    match value {
        Value::Model(model) => {
            let found = model.info().type_path();
            model
                .downcast::<T>()
                .map(|model| *model)
                .ok_or_else(|| Error::mismatch(expected, found))
        }
        Value::Shared(shared) => {
            let model = shared.borrow()?;
            model
                .downcast_ref::<T>()
                .cloned()
                .ok_or_else(|| Error::mismatch(expected, model.info().type_path()))
        }
        other => Err(Error::mismatch(expected, other.kind_name())),
    }
}

/// Error of `Model::set_member` for names the type does not declare.
pub fn unknown_member(type_path: &'static str, name: &str) -> Error {
    Error::UnknownMember {
        type_path,
        member: name.to_owned(),
    }
}

#[cfg(feature = "auto_register")]
pub mod auto_register {
    pub use inventory;

    use crate::registry::ModelRegistry;

    /// Registration function submitted by `#[persist(auto_register)]` types.
    pub struct __AutoRegisterFunc(pub fn(&mut ModelRegistry));

    inventory::collect!(__AutoRegisterFunc);
}
